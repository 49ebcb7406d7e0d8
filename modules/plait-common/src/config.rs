use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
///
/// Only deployment-specific values live here; record semantics and
/// collection names are compiled in.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the embedded store file (WAL/SHM siblings live next to it).
    pub db_path: String,

    /// PDS host records are written to.
    pub pds_host: String,

    /// PLC directory used by the identity resolver.
    pub plc_url: String,

    /// Jetstream endpoint the ingestion loop consumes; the persisted
    /// cursor is appended as `?cursor=<micros>` on reconnect.
    pub jetstream_url: String,

    /// Ingestion worker-pool width.
    pub ingest_workers: usize,

    /// Bounded depth of the transport → dispatcher queue.
    pub ingest_queue_depth: usize,

    // DNS provisioning (signup only)
    pub cloudflare_api_token: Option<String>,
    pub cloudflare_zone_id: Option<String>,

    // Outbound mail
    pub smtp_url: Option<String>,
    pub mail_from: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            db_path: std::env::var("PLAIT_DB_PATH").context("PLAIT_DB_PATH is required")?,
            pds_host: std::env::var("PLAIT_PDS_HOST").context("PLAIT_PDS_HOST is required")?,
            plc_url: std::env::var("PLAIT_PLC_URL").context("PLAIT_PLC_URL is required")?,
            jetstream_url: std::env::var("PLAIT_JETSTREAM_URL")
                .context("PLAIT_JETSTREAM_URL is required")?,
            ingest_workers: env_parse("PLAIT_INGEST_WORKERS", 4)?,
            ingest_queue_depth: env_parse("PLAIT_INGEST_QUEUE_DEPTH", 256)?,
            cloudflare_api_token: std::env::var("CLOUDFLARE_API_TOKEN").ok(),
            cloudflare_zone_id: std::env::var("CLOUDFLARE_ZONE_ID").ok(),
            smtp_url: std::env::var("SMTP_URL").ok(),
            mail_from: std::env::var("MAIL_FROM").ok(),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  PLAIT_DB_PATH: {}", self.db_path);
        tracing::info!("  PLAIT_PDS_HOST: {}", self.pds_host);
        tracing::info!("  PLAIT_PLC_URL: {}", self.plc_url);
        tracing::info!("  PLAIT_JETSTREAM_URL: {}", self.jetstream_url);
        tracing::info!(
            "  ingest: {} workers, queue depth {}",
            self.ingest_workers,
            self.ingest_queue_depth
        );
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.parse::<T>().with_context(|| format!("parsing {key}")),
        Err(_) => Ok(default),
    }
}

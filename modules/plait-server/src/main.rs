use std::sync::Arc;

use anyhow::Result;
use plait_common::AppConfig;
use plait_db::Db;
use plait_ingest::{Dispatcher, IngestPool};
use plait_pds::AllowAll;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("plait=info".parse()?))
        .init();

    info!("plait appview starting...");

    let config = AppConfig::from_env()?;

    // Open the embedded store; DDL and migrations run before anything
    // else touches it.
    let db = Db::open(&config.db_path).await?;

    let resume_from = db.get_cursor().await?;
    info!(?resume_from, url = %config.jetstream_url, "ingestion resume point");

    // RBAC wiring point. The policy engine is an external collaborator;
    // single-tenant deployments run open.
    let authorizer = Arc::new(AllowAll);

    let dispatcher = Arc::new(Dispatcher::new(db.clone(), authorizer));
    let pool = IngestPool::spawn(
        dispatcher,
        config.ingest_workers,
        config.ingest_queue_depth,
    );

    // The jetstream transport (reconnect, backoff, decode) lives outside
    // the core; it feeds `pool.submit` with decoded events and passes
    // `resume_from` as the `cursor` query parameter.
    info!(
        workers = config.ingest_workers,
        queue_depth = config.ingest_queue_depth,
        "ingest pool running; waiting for shutdown signal"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining ingest pool");
    pool.shutdown().await;

    Ok(())
}

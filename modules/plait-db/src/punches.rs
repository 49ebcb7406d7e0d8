//! Punchcards: per-day commit counts keyed `(did, date)`. Upserts
//! accumulate.

use sqlx::FromRow;

use crate::error::Result;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Punch {
    pub did: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub count: i64,
}

impl Db {
    pub async fn record_punch(&self, did: &str, date: &str, count: i64) -> Result<()> {
        sqlx::query(
            r#"
            insert into punches (did, date, count) values (?, ?, ?)
            on conflict(did, date) do update set count = count + excluded.count
            "#,
        )
        .bind(did)
        .bind(date)
        .bind(count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Day buckets in `[since, until]`, ascending. Dates compare
    /// lexicographically in `YYYY-MM-DD` form.
    pub async fn get_punchcard(&self, did: &str, since: &str, until: &str) -> Result<Vec<Punch>> {
        let rows = sqlx::query_as::<_, Punch>(
            "select * from punches where did = ? and date >= ? and date <= ? order by date asc",
        )
        .bind(did)
        .bind(since)
        .bind(until)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

//! Jetstream progress marker: a single row holding the resume cursor in
//! microseconds. Written as the last step of every ingested event, so a
//! crash re-delivers at most the in-flight event.

use sqlx::Row;

use crate::error::Result;
use crate::Db;

impl Db {
    pub async fn get_cursor(&self) -> Result<Option<i64>> {
        let row = sqlx::query("select last_time_us from _jetstream where id = 1")
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get("last_time_us")))
    }

    pub async fn set_cursor(&self, last_time_us: i64) -> Result<()> {
        sqlx::query(
            r#"
            insert into _jetstream (id, last_time_us) values (1, ?)
            on conflict(id) do update set last_time_us = excluded.last_time_us
            "#,
        )
        .bind(last_time_us)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

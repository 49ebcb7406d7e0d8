//! The follow graph. Primary key `(user_did, subject_did)`; self-follows
//! are rejected by the schema.

use std::collections::HashMap;

use sqlx::FromRow;

use crate::error::Result;
use crate::filter::{self, Filter};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Follow {
    pub user_did: String,
    pub subject_did: String,
    pub rkey: String,
    pub followed_at: String,
}

/// Viewer-relative follow state, used by timeline enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowStatus {
    IsSelf,
    IsFollowing,
    IsNotFollowing,
}

impl Db {
    pub async fn put_follow(
        &self,
        user_did: &str,
        subject_did: &str,
        rkey: &str,
        followed_at: Option<String>,
    ) -> Result<()> {
        let followed_at = followed_at.unwrap_or_else(plait_common::now_rfc3339);
        sqlx::query(
            r#"
            insert into follows (user_did, subject_did, rkey, followed_at)
            values (?, ?, ?, ?)
            on conflict(user_did, subject_did) do update set rkey = excluded.rkey
            "#,
        )
        .bind(user_did)
        .bind(subject_did)
        .bind(rkey)
        .bind(&followed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_follow(&self, user_did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from follows where user_did = ? and rkey = ?")
            .bind(user_did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_follows(&self, filters: &[Filter], limit: Option<i64>) -> Result<Vec<Follow>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!("select * from follows{where_sql} order by followed_at desc");
        if let Some(limit) = limit {
            sql.push_str(&format!(" limit {limit}"));
        }
        let mut query = sqlx::query_as::<_, Follow>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    pub async fn follower_count(&self, did: &str) -> Result<i64> {
        let n: (i64,) = sqlx::query_as("select count(*) from follows where subject_did = ?")
            .bind(did)
            .fetch_one(self.pool())
            .await?;
        Ok(n.0)
    }

    pub async fn following_count(&self, did: &str) -> Result<i64> {
        let n: (i64,) = sqlx::query_as("select count(*) from follows where user_did = ?")
            .bind(did)
            .fetch_one(self.pool())
            .await?;
        Ok(n.0)
    }

    /// Batch follower/following counts for a set of subjects.
    pub async fn follow_counts(
        &self,
        dids: &[String],
    ) -> Result<HashMap<String, (i64, i64)>> {
        let mut counts: HashMap<String, (i64, i64)> =
            dids.iter().map(|d| (d.clone(), (0, 0))).collect();

        let followers = self
            .list_follows(&[Filter::r#in("subject_did", dids.to_vec())], None)
            .await?;
        for f in followers {
            counts.entry(f.subject_did).or_default().0 += 1;
        }
        let following = self
            .list_follows(&[Filter::r#in("user_did", dids.to_vec())], None)
            .await?;
        for f in following {
            counts.entry(f.user_did).or_default().1 += 1;
        }
        Ok(counts)
    }

    /// Viewer-relative status for each subject. Subjects absent from the
    /// result default to [`FollowStatus::IsNotFollowing`]; the viewer maps
    /// to [`FollowStatus::IsSelf`].
    pub async fn follow_statuses(
        &self,
        viewer_did: &str,
        subjects: &[String],
    ) -> Result<HashMap<String, FollowStatus>> {
        let followed = self
            .list_follows(
                &[
                    Filter::eq("user_did", viewer_did),
                    Filter::r#in("subject_did", subjects.to_vec()),
                ],
                None,
            )
            .await?;

        let mut statuses: HashMap<String, FollowStatus> = followed
            .into_iter()
            .map(|f| (f.subject_did, FollowStatus::IsFollowing))
            .collect();
        for subject in subjects {
            if subject == viewer_did {
                statuses.insert(subject.clone(), FollowStatus::IsSelf);
            } else {
                statuses
                    .entry(subject.clone())
                    .or_insert(FollowStatus::IsNotFollowing);
            }
        }
        Ok(statuses)
    }
}

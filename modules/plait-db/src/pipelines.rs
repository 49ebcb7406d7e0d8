//! Pipelines, triggers, and workflow-status rollups.
//!
//! The rollup is two queries joined in memory: the second WHERE clause is
//! a disjunction over per-pipeline `(knot, rkey)` pairs, which does not
//! express cleanly as a single join.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use plait_common::Page;
use sqlx::FromRow;

use crate::error::Result;
use crate::filter::{self, Filter, FilterValue};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Trigger {
    pub id: i64,
    pub kind: String,
    pub push_ref: Option<String>,
    pub push_new_sha: Option<String>,
    pub push_old_sha: Option<String>,
    pub pr_source_branch: Option<String>,
    pub pr_target_branch: Option<String>,
    pub pr_source_sha: Option<String>,
    pub pr_action: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTrigger {
    pub kind: String,
    pub push_ref: Option<String>,
    pub push_new_sha: Option<String>,
    pub push_old_sha: Option<String>,
    pub pr_source_branch: Option<String>,
    pub pr_target_branch: Option<String>,
    pub pr_source_sha: Option<String>,
    pub pr_action: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Pipeline {
    pub id: i64,
    pub knot: String,
    pub rkey: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub sha: String,
    pub trigger_id: Option<i64>,
    pub created: String,
}

#[derive(Debug, Clone)]
pub struct NewPipeline {
    pub knot: String,
    pub rkey: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub sha: String,
    pub trigger: NewTrigger,
    pub created: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PipelineStatus {
    pub id: i64,
    pub spindle: String,
    pub rkey: String,
    pub pipeline_knot: String,
    pub pipeline_rkey: String,
    pub workflow: String,
    pub status: String,
    pub error: Option<String>,
    pub exit_code: i64,
    pub created: String,
}

impl PipelineStatus {
    pub fn is_start(&self) -> bool {
        matches!(self.status.as_str(), "pending" | "running")
    }

    pub fn is_finish(&self) -> bool {
        matches!(
            self.status.as_str(),
            "success" | "failure" | "error" | "timeout" | "cancelled"
        )
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        plait_common::parse_rfc3339(&self.created)
    }
}

/// Status events of one workflow, ascending by `(created, id)`.
#[derive(Debug, Clone, Default)]
pub struct WorkflowStatuses(pub Vec<PipelineStatus>);

impl WorkflowStatuses {
    pub fn latest(&self) -> Option<&PipelineStatus> {
        self.0.last()
    }

    /// Wall time between the earliest start and the latest finish; zero
    /// when either is missing or the ordering is inverted.
    pub fn time_taken(&self) -> chrono::Duration {
        let start = self
            .0
            .iter()
            .filter(|s| s.is_start())
            .filter_map(PipelineStatus::created_at)
            .min();
        let finish = self
            .0
            .iter()
            .filter(|s| s.is_finish())
            .filter_map(PipelineStatus::created_at)
            .max();
        match (start, finish) {
            (Some(start), Some(finish)) if finish > start => finish - start,
            _ => chrono::Duration::zero(),
        }
    }
}

/// A pipeline with its trigger and per-workflow status streams.
#[derive(Debug, Clone)]
pub struct PipelineListing {
    pub pipeline: Pipeline,
    pub trigger: Option<Trigger>,
    pub workflows: BTreeMap<String, WorkflowStatuses>,
}

impl PipelineListing {
    /// A spindle is responding when any workflow has reported at least
    /// one status.
    pub fn is_responding(&self) -> bool {
        self.workflows.values().any(|w| !w.0.is_empty())
    }
}

#[derive(Debug, Clone, FromRow)]
struct PipelineJoinRow {
    id: i64,
    knot: String,
    rkey: String,
    repo_owner: String,
    repo_name: String,
    sha: String,
    trigger_id: Option<i64>,
    created: String,
    t_kind: Option<String>,
    t_push_ref: Option<String>,
    t_push_new_sha: Option<String>,
    t_push_old_sha: Option<String>,
    t_pr_source_branch: Option<String>,
    t_pr_target_branch: Option<String>,
    t_pr_source_sha: Option<String>,
    t_pr_action: Option<String>,
}

impl Db {
    /// Upsert a pipeline on `(knot, rkey)`, writing its trigger row in the
    /// same transaction.
    pub async fn put_pipeline(&self, new: NewPipeline) -> Result<Pipeline> {
        let mut tx = self.begin().await?;
        let trigger_id: i64 = sqlx::query_as::<_, (i64,)>(
            r#"
            insert into triggers (kind, push_ref, push_new_sha, push_old_sha,
                                  pr_source_branch, pr_target_branch, pr_source_sha, pr_action)
            values (?, ?, ?, ?, ?, ?, ?, ?)
            returning id
            "#,
        )
        .bind(&new.trigger.kind)
        .bind(&new.trigger.push_ref)
        .bind(&new.trigger.push_new_sha)
        .bind(&new.trigger.push_old_sha)
        .bind(&new.trigger.pr_source_branch)
        .bind(&new.trigger.pr_target_branch)
        .bind(&new.trigger.pr_source_sha)
        .bind(&new.trigger.pr_action)
        .fetch_one(&mut *tx)
        .await?
        .0;

        let created = new.created.unwrap_or_else(plait_common::now_rfc3339);
        let pipeline = sqlx::query_as::<_, Pipeline>(
            r#"
            insert into pipelines (knot, rkey, repo_owner, repo_name, sha, trigger_id, created)
            values (?, ?, ?, ?, ?, ?, ?)
            on conflict(knot, rkey) do update set
                repo_owner = excluded.repo_owner,
                repo_name = excluded.repo_name,
                sha = excluded.sha,
                trigger_id = excluded.trigger_id
            returning *
            "#,
        )
        .bind(&new.knot)
        .bind(&new.rkey)
        .bind(&new.repo_owner)
        .bind(&new.repo_name)
        .bind(&new.sha)
        .bind(trigger_id)
        .bind(&created)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(pipeline)
    }

    /// Upsert a status event on `(spindle, rkey)`.
    pub async fn put_pipeline_status(
        &self,
        spindle: &str,
        rkey: &str,
        pipeline_knot: &str,
        pipeline_rkey: &str,
        workflow: &str,
        status: &str,
        error: Option<&str>,
        exit_code: i64,
        created: Option<String>,
    ) -> Result<()> {
        let created = created.unwrap_or_else(plait_common::now_rfc3339);
        sqlx::query(
            r#"
            insert into pipeline_statuses
                (spindle, rkey, pipeline_knot, pipeline_rkey, workflow, status, error, exit_code, created)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?)
            on conflict(spindle, rkey) do update set
                status = excluded.status,
                error = excluded.error,
                exit_code = excluded.exit_code
            "#,
        )
        .bind(spindle)
        .bind(rkey)
        .bind(pipeline_knot)
        .bind(pipeline_rkey)
        .bind(workflow)
        .bind(status)
        .bind(error)
        .bind(exit_code)
        .bind(&created)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Rollup listing: pipelines joined to triggers, then statuses fetched
    /// for exactly those pipelines and attached per workflow. Pipelines
    /// descend by creation; statuses ascend by `(created, id)`.
    pub async fn get_pipelines(
        &self,
        filters: &[Filter],
        page: Option<Page>,
    ) -> Result<Vec<PipelineListing>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!(
            r#"
            select p.id, p.knot, p.rkey, p.repo_owner, p.repo_name, p.sha, p.trigger_id, p.created,
                   t.kind as t_kind, t.push_ref as t_push_ref,
                   t.push_new_sha as t_push_new_sha, t.push_old_sha as t_push_old_sha,
                   t.pr_source_branch as t_pr_source_branch, t.pr_target_branch as t_pr_target_branch,
                   t.pr_source_sha as t_pr_source_sha, t.pr_action as t_pr_action
            from pipelines p
            left join triggers t on t.id = p.trigger_id{where_sql}
            order by p.created desc
            "#
        );
        if let Some(page) = page {
            sql.push_str(&format!(" limit {} offset {}", page.limit, page.offset));
        }
        let mut query = sqlx::query_as::<_, PipelineJoinRow>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        let rows = query.fetch_all(self.pool()).await?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        // Second pass: one disjunction over the page's (knot, rkey) pairs.
        let mut status_sql =
            String::from("select * from pipeline_statuses where ");
        let mut status_args: Vec<FilterValue> = Vec::with_capacity(rows.len() * 2);
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                status_sql.push_str(" or ");
            }
            status_sql.push_str("(pipeline_knot = ? and pipeline_rkey = ?)");
            status_args.push(FilterValue::Text(row.knot.clone()));
            status_args.push(FilterValue::Text(row.rkey.clone()));
        }
        let mut status_query = sqlx::query_as::<_, PipelineStatus>(&status_sql);
        for arg in &status_args {
            status_query = filter::bind(status_query, arg);
        }
        let statuses = status_query.fetch_all(self.pool()).await?;

        let mut listings: Vec<PipelineListing> = rows
            .into_iter()
            .map(|row| PipelineListing {
                trigger: row.t_kind.clone().map(|kind| Trigger {
                    id: row.trigger_id.unwrap_or_default(),
                    kind,
                    push_ref: row.t_push_ref.clone(),
                    push_new_sha: row.t_push_new_sha.clone(),
                    push_old_sha: row.t_push_old_sha.clone(),
                    pr_source_branch: row.t_pr_source_branch.clone(),
                    pr_target_branch: row.t_pr_target_branch.clone(),
                    pr_source_sha: row.t_pr_source_sha.clone(),
                    pr_action: row.t_pr_action.clone(),
                }),
                pipeline: Pipeline {
                    id: row.id,
                    knot: row.knot,
                    rkey: row.rkey,
                    repo_owner: row.repo_owner,
                    repo_name: row.repo_name,
                    sha: row.sha,
                    trigger_id: row.trigger_id,
                    created: row.created,
                },
                workflows: BTreeMap::new(),
            })
            .collect();

        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        for (i, listing) in listings.iter().enumerate() {
            index.insert(
                format!("{}/{}", listing.pipeline.knot, listing.pipeline.rkey),
                i,
            );
        }
        for status in statuses {
            let key = format!("{}/{}", status.pipeline_knot, status.pipeline_rkey);
            if let Some(&i) = index.get(&key) {
                listings[i]
                    .workflows
                    .entry(status.workflow.clone())
                    .or_default()
                    .0
                    .push(status);
            }
        }
        for listing in &mut listings {
            for workflow in listing.workflows.values_mut() {
                workflow
                    .0
                    .sort_by(|a, b| (&a.created, a.id).cmp(&(&b.created, b.id)));
            }
        }
        Ok(listings)
    }
}

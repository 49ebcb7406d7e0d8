//! Reference links: directed mention edges between record URIs.
//!
//! Bodies mention issues as `#12` / `owner/repo#12` and pulls as `!3`,
//! optionally narrowed to a comment with `-c<n>`. Extraction produces
//! candidate tuples; resolution turns them into canonical record URIs,
//! silently dropping anything that doesn't exist.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use plait_common::{nsid, AtUri};
use regex::Regex;
use sqlx::Row;

use crate::error::Result;
use crate::filter::{self, Filter};
use crate::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Issue,
    Pull,
}

/// An unresolved mention parsed out of a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLink {
    pub kind: RefKind,
    /// Repo owner identity.
    pub handle: String,
    /// Repo name.
    pub repo: String,
    pub subject_id: i64,
    pub comment_id: Option<i64>,
}

/// A resolved inbound reference, rich enough to render.
#[derive(Debug, Clone)]
pub struct Backlink {
    pub kind: RefKind,
    pub handle: String,
    pub repo: String,
    pub subject_id: i64,
    pub comment_id: Option<i64>,
    pub title: String,
    pub state: String,
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:(?P<handle>[\w.:-]+)/(?P<repo>[\w.-]+))?(?P<sigil>[#!])(?P<id>\d+)(?:-c(?P<comment>\d+))?")
            .expect("mention regex is valid")
    })
}

/// Scan `body` for mentions. Bare `#n` / `!n` resolve against the repo the
/// body was written in.
pub fn extract_references(
    default_handle: &str,
    default_repo: &str,
    body: &str,
) -> Vec<ReferenceLink> {
    let mut links = Vec::new();
    for caps in mention_re().captures_iter(body) {
        let Some(id) = caps.name("id").and_then(|m| m.as_str().parse::<i64>().ok()) else {
            continue;
        };
        let kind = match &caps["sigil"] {
            "#" => RefKind::Issue,
            _ => RefKind::Pull,
        };
        let handle = caps
            .name("handle")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| default_handle.to_string());
        let repo = caps
            .name("repo")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| default_repo.to_string());
        let comment_id = caps.name("comment").and_then(|m| m.as_str().parse().ok());
        let link = ReferenceLink {
            kind,
            handle,
            repo,
            subject_id: id,
            comment_id,
        };
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

impl Db {
    /// Resolve candidate links to canonical record URIs. Links to unknown
    /// repos, subjects or comments are dropped, not errors.
    pub async fn resolve_references(&self, links: &[ReferenceLink]) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        for link in links {
            let Some(repo) = self.get_repo(&link.handle, &link.repo).await? else {
                continue;
            };
            match link.kind {
                RefKind::Issue => {
                    let Some(issue) = self.get_issue(&repo.at_uri, link.subject_id).await? else {
                        continue;
                    };
                    match link.comment_id {
                        None => {
                            if let Some(uri) = issue.issue_at {
                                uris.push(uri);
                            }
                        }
                        Some(comment_id) => {
                            let comment = sqlx::query(
                                "select owner_did, rkey from issue_comments where issue_id = ? and comment_id = ?",
                            )
                            .bind(issue.id)
                            .bind(comment_id)
                            .fetch_optional(self.pool())
                            .await?;
                            if let Some(row) = comment {
                                if let Some(rkey) = row.get::<Option<String>, _>("rkey") {
                                    uris.push(plait_common::at_uri(
                                        &row.get::<String, _>("owner_did"),
                                        nsid::ISSUE_COMMENT,
                                        &rkey,
                                    ));
                                }
                            }
                        }
                    }
                }
                RefKind::Pull => {
                    let Some(pull) = self.get_pull_row(&repo.at_uri, link.subject_id).await? else {
                        continue;
                    };
                    match link.comment_id {
                        None => uris.push(plait_common::at_uri(
                            &pull.owner_did,
                            nsid::PULL,
                            &pull.rkey,
                        )),
                        Some(comment_id) => {
                            let comment = sqlx::query(
                                "select comment_at from pull_comments where pull_id = ? and id = ?",
                            )
                            .bind(pull.id)
                            .bind(comment_id)
                            .fetch_optional(self.pool())
                            .await?;
                            if let Some(row) = comment {
                                uris.push(row.get::<String, _>("comment_at"));
                            }
                        }
                    }
                }
            }
        }
        Ok(uris)
    }

    /// Replace the outbound edges of `from_at`: previous edges are deleted
    /// and the new set inserted in one transaction. An empty set just
    /// clears.
    pub async fn put_references(&self, from_at: &str, to: &[String]) -> Result<()> {
        let mut tx = self.begin().await?;
        sqlx::query("delete from reference_links where from_at = ?")
            .bind(from_at)
            .execute(&mut *tx)
            .await?;
        for to_at in to {
            sqlx::query("insert or ignore into reference_links (from_at, to_at) values (?, ?)")
                .bind(from_at)
                .bind(to_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Forward edges grouped by source.
    pub async fn get_references_all(
        &self,
        filters: &[Filter],
    ) -> Result<HashMap<String, Vec<String>>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select from_at, to_at from reference_links{where_sql} order by from_at");
        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        let rows = query.fetch_all(self.pool()).await?;

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for (from_at, to_at) in rows {
            grouped.entry(from_at).or_default().push(to_at);
        }
        Ok(grouped)
    }

    /// Inbound references to `target`, resolved to rich descriptors.
    ///
    /// Sources are bucketed by their collection component (issue,
    /// issue-comment, pull, pull-comment) and each bucket resolved against
    /// its tables; unresolvable sources are dropped.
    pub async fn get_backlinks(&self, target: &str) -> Result<Vec<Backlink>> {
        let sources: Vec<(String,)> =
            sqlx::query_as("select from_at from reference_links where to_at = ? order by from_at")
                .bind(target)
                .fetch_all(self.pool())
                .await?;

        let mut backlinks = Vec::new();
        for (from_at,) in sources {
            let Ok(uri) = AtUri::from_str(&from_at) else {
                continue;
            };
            let resolved = match uri.collection.as_str() {
                nsid::ISSUE => self.backlink_from_issue(&from_at).await?,
                nsid::ISSUE_COMMENT => self.backlink_from_issue_comment(&uri).await?,
                nsid::PULL => self.backlink_from_pull(&uri).await?,
                nsid::PULL_COMMENT => self.backlink_from_pull_comment(&from_at).await?,
                _ => None,
            };
            if let Some(backlink) = resolved {
                backlinks.push(backlink);
            }
        }
        Ok(backlinks)
    }

    async fn backlink_from_issue(&self, issue_at: &str) -> Result<Option<Backlink>> {
        let Some(issue) = self.get_issue_by_at_uri(issue_at).await? else {
            return Ok(None);
        };
        let Some(repo) = self.get_repo_by_at_uri(&issue.repo_at).await? else {
            return Ok(None);
        };
        Ok(Some(Backlink {
            kind: RefKind::Issue,
            handle: repo.did,
            repo: repo.name,
            subject_id: issue.issue_id,
            comment_id: None,
            title: issue.title,
            state: (if issue.open { "open" } else { "closed" }).to_string(),
        }))
    }

    async fn backlink_from_issue_comment(&self, uri: &AtUri) -> Result<Option<Backlink>> {
        let row = sqlx::query(
            "select issue_id, comment_id from issue_comments where owner_did = ? and rkey = ?",
        )
        .bind(&uri.did)
        .bind(&uri.rkey)
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let issue_row_id: i64 = row.get("issue_id");
        let comment_id: i64 = row.get("comment_id");

        let issue = sqlx::query_as::<_, crate::issues::Issue>("select * from issues where id = ?")
            .bind(issue_row_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(issue) = issue else {
            return Ok(None);
        };
        let Some(repo) = self.get_repo_by_at_uri(&issue.repo_at).await? else {
            return Ok(None);
        };
        Ok(Some(Backlink {
            kind: RefKind::Issue,
            handle: repo.did,
            repo: repo.name,
            subject_id: issue.issue_id,
            comment_id: Some(comment_id),
            title: issue.title,
            state: (if issue.open { "open" } else { "closed" }).to_string(),
        }))
    }

    async fn backlink_from_pull(&self, uri: &AtUri) -> Result<Option<Backlink>> {
        let pull = sqlx::query_as::<_, crate::pulls::Pull>(
            "select * from pulls where owner_did = ? and rkey = ?",
        )
        .bind(&uri.did)
        .bind(&uri.rkey)
        .fetch_optional(self.pool())
        .await?;
        let Some(pull) = pull else {
            return Ok(None);
        };
        let Some(repo) = self.get_repo_by_at_uri(&pull.repo_at).await? else {
            return Ok(None);
        };
        let state = pull.state()?.to_string();
        Ok(Some(Backlink {
            kind: RefKind::Pull,
            handle: repo.did,
            repo: repo.name,
            subject_id: pull.pull_id,
            comment_id: None,
            title: pull.title,
            state,
        }))
    }

    async fn backlink_from_pull_comment(&self, comment_at: &str) -> Result<Option<Backlink>> {
        let Some(comment) = self.get_pull_comment_by_at_uri(comment_at).await? else {
            return Ok(None);
        };
        let pull = sqlx::query_as::<_, crate::pulls::Pull>("select * from pulls where id = ?")
            .bind(comment.pull_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(pull) = pull else {
            return Ok(None);
        };
        let Some(repo) = self.get_repo_by_at_uri(&pull.repo_at).await? else {
            return Ok(None);
        };
        let state = pull.state()?.to_string();
        Ok(Some(Backlink {
            kind: RefKind::Pull,
            handle: repo.did,
            repo: repo.name,
            subject_id: pull.pull_id,
            comment_id: Some(comment.id),
            title: pull.title,
            state,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_and_qualified_mentions() {
        let links = extract_references(
            "did:plc:me",
            "widget",
            "fixes #12, see did:plc:other/lib#3 and rework in !7",
        );
        assert_eq!(
            links,
            vec![
                ReferenceLink {
                    kind: RefKind::Issue,
                    handle: "did:plc:me".into(),
                    repo: "widget".into(),
                    subject_id: 12,
                    comment_id: None,
                },
                ReferenceLink {
                    kind: RefKind::Issue,
                    handle: "did:plc:other".into(),
                    repo: "lib".into(),
                    subject_id: 3,
                    comment_id: None,
                },
                ReferenceLink {
                    kind: RefKind::Pull,
                    handle: "did:plc:me".into(),
                    repo: "widget".into(),
                    subject_id: 7,
                    comment_id: None,
                },
            ]
        );
    }

    #[test]
    fn extracts_comment_narrowed_mentions_once() {
        let links = extract_references("did:plc:me", "widget", "#4-c2 and again #4-c2");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].comment_id, Some(2));
    }
}

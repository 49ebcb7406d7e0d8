//! Cross-entity timeline: recent repos, stars and follows merged into one
//! descending event stream.
//!
//! The three sources key differently, so the merge happens in application
//! code: gather each capped at `limit`, enrich, sort by event time, cut.

use std::collections::HashMap;

use chrono::DateTime;
use plait_common::Page;

use crate::error::Result;
use crate::filter::{self, Filter, FilterValue};
use crate::follows::{Follow, FollowStatus};
use crate::profiles::Profile;
use crate::repos::Repo;
use crate::stars::Star;
use crate::Db;

#[derive(Debug, Clone)]
pub enum TimelineEvent {
    Repo {
        repo: Repo,
        /// The source repo when this one is a fork of an indexed repo.
        source: Option<Repo>,
        star_count: i64,
        is_starred: bool,
        event_at: String,
    },
    Star {
        star: Star,
        repo: Repo,
        star_count: i64,
        is_starred: bool,
        event_at: String,
    },
    Follow {
        follow: Follow,
        subject_profile: Option<Profile>,
        follower_count: i64,
        following_count: i64,
        status: FollowStatus,
        event_at: String,
    },
}

impl TimelineEvent {
    pub fn event_at(&self) -> &str {
        match self {
            TimelineEvent::Repo { event_at, .. }
            | TimelineEvent::Star { event_at, .. }
            | TimelineEvent::Follow { event_at, .. } => event_at,
        }
    }
}

impl Db {
    /// Build the global timeline, newest first, truncated to `limit`.
    /// `viewer_did` switches on the viewer-relative annotations
    /// (starred, follow status).
    pub async fn make_timeline(
        &self,
        viewer_did: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TimelineEvent>> {
        let repos = self.list_repos(&[], Some(Page::first(limit))).await?;
        let stars = self.list_stars_with_repos(&[], limit).await?;
        let follows = self.list_follows(&[], Some(limit)).await?;

        // Fork sources in one `in` query.
        let source_uris: Vec<String> = repos
            .iter()
            .filter(|r| r.is_fork())
            .filter_map(|r| r.source.clone())
            .collect();
        let sources: HashMap<String, Repo> = if source_uris.is_empty() {
            HashMap::new()
        } else {
            self.list_repos(&[Filter::r#in("at_uri", source_uris)], None)
                .await?
                .into_iter()
                .map(|r| (r.at_uri.clone(), r))
                .collect()
        };

        // Star annotations for every repo the timeline touches.
        let mut repo_uris: Vec<String> = repos.iter().map(|r| r.at_uri.clone()).collect();
        repo_uris.extend(stars.iter().map(|(_, repo)| repo.at_uri.clone()));
        repo_uris.sort();
        repo_uris.dedup();
        let star_counts = self.star_counts(&repo_uris).await?;
        let starred = match viewer_did {
            Some(viewer) => self.starred_among(viewer, &repo_uris).await?,
            None => Default::default(),
        };

        // Follow enrichment: subject profiles, counts, viewer status.
        let subjects: Vec<String> = follows.iter().map(|f| f.subject_did.clone()).collect();
        let profiles: HashMap<String, Profile> = self
            .list_profiles(&[Filter::r#in("did", subjects.clone())], None)
            .await?
            .into_iter()
            .map(|p| (p.did.clone(), p))
            .collect();
        let follow_counts = self.follow_counts(&subjects).await?;
        let statuses = match viewer_did {
            Some(viewer) => self.follow_statuses(viewer, &subjects).await?,
            None => HashMap::new(),
        };

        let mut events = Vec::with_capacity(repos.len() + stars.len() + follows.len());
        for repo in repos {
            let source = repo.source.as_ref().and_then(|s| sources.get(s)).cloned();
            events.push(TimelineEvent::Repo {
                star_count: star_counts.get(&repo.at_uri).copied().unwrap_or(0),
                is_starred: starred.contains(&repo.at_uri),
                source,
                event_at: repo.created.clone(),
                repo,
            });
        }
        for (star, repo) in stars {
            events.push(TimelineEvent::Star {
                star_count: star_counts.get(&repo.at_uri).copied().unwrap_or(0),
                is_starred: starred.contains(&repo.at_uri),
                event_at: star.created.clone(),
                star,
                repo,
            });
        }
        for follow in follows {
            let (follower_count, following_count) = follow_counts
                .get(&follow.subject_did)
                .copied()
                .unwrap_or((0, 0));
            let status = statuses
                .get(&follow.subject_did)
                .copied()
                .unwrap_or(FollowStatus::IsNotFollowing);
            events.push(TimelineEvent::Follow {
                subject_profile: profiles.get(&follow.subject_did).cloned(),
                follower_count,
                following_count,
                status,
                event_at: follow.followed_at.clone(),
                follow,
            });
        }

        events.sort_by_key(|e| {
            std::cmp::Reverse(
                plait_common::parse_rfc3339(e.event_at())
                    .unwrap_or(DateTime::<chrono::Utc>::MIN_UTC),
            )
        });
        events.truncate(limit as usize);
        Ok(events)
    }

    /// Profile-scoped timeline: the same shape, restricted to one actor's
    /// repos, stars and follows.
    pub async fn make_profile_timeline(
        &self,
        subject_did: &str,
        viewer_did: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TimelineEvent>> {
        let repos = self
            .list_repos(&[Filter::eq("did", subject_did)], Some(Page::first(limit)))
            .await?;
        let stars = self
            .list_stars_with_repos(&[Filter::eq("starred_by_did", subject_did)], limit)
            .await?;
        let follows = self
            .list_follows(&[Filter::eq("user_did", subject_did)], Some(limit))
            .await?;

        let mut events = Vec::with_capacity(repos.len() + stars.len() + follows.len());

        let mut repo_uris: Vec<String> = repos.iter().map(|r| r.at_uri.clone()).collect();
        repo_uris.extend(stars.iter().map(|(_, repo)| repo.at_uri.clone()));
        let star_counts = self.star_counts(&repo_uris).await?;
        let starred = match viewer_did {
            Some(viewer) => self.starred_among(viewer, &repo_uris).await?,
            None => Default::default(),
        };

        for repo in repos {
            events.push(TimelineEvent::Repo {
                star_count: star_counts.get(&repo.at_uri).copied().unwrap_or(0),
                is_starred: starred.contains(&repo.at_uri),
                source: None,
                event_at: repo.created.clone(),
                repo,
            });
        }
        for (star, repo) in stars {
            events.push(TimelineEvent::Star {
                star_count: star_counts.get(&repo.at_uri).copied().unwrap_or(0),
                is_starred: starred.contains(&repo.at_uri),
                event_at: star.created.clone(),
                star,
                repo,
            });
        }
        for follow in follows {
            events.push(TimelineEvent::Follow {
                subject_profile: None,
                follower_count: 0,
                following_count: 0,
                status: FollowStatus::IsNotFollowing,
                event_at: follow.followed_at.clone(),
                follow,
            });
        }

        events.sort_by_key(|e| {
            std::cmp::Reverse(
                plait_common::parse_rfc3339(e.event_at())
                    .unwrap_or(DateTime::<chrono::Utc>::MIN_UTC),
            )
        });
        events.truncate(limit as usize);
        Ok(events)
    }

    /// Batch star counts per repo URI.
    async fn star_counts(&self, repo_uris: &[String]) -> Result<HashMap<String, i64>> {
        if repo_uris.is_empty() {
            return Ok(HashMap::new());
        }
        let in_filter = Filter::r#in("repo_at", FilterValue::TextList(repo_uris.to_vec()));
        let sql = format!(
            "select repo_at, count(*) from stars where {} group by repo_at",
            in_filter.condition()
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for arg in &in_filter.args() {
            query = filter::bind(query, arg);
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().collect())
    }
}

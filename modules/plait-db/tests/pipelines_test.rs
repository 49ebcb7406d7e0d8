//! Pipeline rollup: trigger join, workflow grouping, timings.

use plait_db::pipelines::{NewPipeline, NewTrigger};
use plait_db::Db;

fn sha(c: char) -> String {
    std::iter::repeat(c).take(40).collect()
}

fn pipeline(rkey: &str, created: &str) -> NewPipeline {
    NewPipeline {
        knot: "knot.example.com".into(),
        rkey: rkey.into(),
        repo_owner: "did:web:a".into(),
        repo_name: "widget".into(),
        sha: sha('a'),
        trigger: NewTrigger {
            kind: "push".into(),
            push_ref: Some("refs/heads/main".into()),
            push_new_sha: Some(sha('b')),
            push_old_sha: Some(sha('c')),
            ..Default::default()
        },
        created: Some(created.into()),
    }
}

#[tokio::test]
async fn rollup_groups_statuses_by_workflow() {
    let db = Db::open_memory().await.unwrap();
    db.put_pipeline(pipeline("pl1", "2026-07-01T10:00:00Z")).await.unwrap();
    db.put_pipeline(pipeline("pl2", "2026-07-01T11:00:00Z")).await.unwrap();

    for (rkey, workflow, status, created) in [
        ("st1", "build", "running", "2026-07-01T10:00:05Z"),
        ("st2", "build", "success", "2026-07-01T10:02:05Z"),
        ("st3", "test", "running", "2026-07-01T10:00:10Z"),
    ] {
        db.put_pipeline_status(
            "spindle.example.com",
            rkey,
            "knot.example.com",
            "pl1",
            workflow,
            status,
            None,
            0,
            Some(created.into()),
        )
        .await
        .unwrap();
    }

    let listings = db.get_pipelines(&[], None).await.unwrap();
    assert_eq!(listings.len(), 2);
    // Descending by created: pl2 first, with no statuses yet.
    assert_eq!(listings[0].pipeline.rkey, "pl2");
    assert!(!listings[0].is_responding());

    let pl1 = &listings[1];
    assert!(pl1.is_responding());
    assert_eq!(pl1.trigger.as_ref().unwrap().kind, "push");
    assert_eq!(pl1.workflows.len(), 2);

    let build = &pl1.workflows["build"];
    assert_eq!(build.latest().unwrap().status, "success");
    assert_eq!(build.time_taken(), chrono::Duration::seconds(120));

    // Only a start event: no finish, so no timing.
    let test = &pl1.workflows["test"];
    assert_eq!(test.time_taken(), chrono::Duration::zero());
}

#[tokio::test]
async fn status_upsert_is_keyed_on_spindle_rkey() {
    let db = Db::open_memory().await.unwrap();
    db.put_pipeline(pipeline("pl1", "2026-07-01T10:00:00Z")).await.unwrap();

    for status in ["running", "failure"] {
        db.put_pipeline_status(
            "spindle.example.com",
            "st1",
            "knot.example.com",
            "pl1",
            "build",
            status,
            (status == "failure").then_some("compile error"),
            1,
            Some("2026-07-01T10:00:05Z".into()),
        )
        .await
        .unwrap();
    }

    let listings = db.get_pipelines(&[], None).await.unwrap();
    let build = &listings[0].workflows["build"];
    assert_eq!(build.0.len(), 1, "re-delivery updated in place");
    assert_eq!(build.latest().unwrap().status, "failure");
    assert_eq!(build.latest().unwrap().error.as_deref(), Some("compile error"));
}

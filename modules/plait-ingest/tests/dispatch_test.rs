//! Dispatcher behaviour: cursor advancement, idempotent re-delivery,
//! permission gating, unknown collections.

use std::sync::Arc;

use plait_common::{nsid, AppError};
use plait_db::repos::NewRepo;
use plait_db::{Db, Filter};
use plait_ingest::{Dispatcher, IngestEvent, RecordOp};
use plait_pds::{AllowAll, Authorizer};
use serde_json::json;

struct DenyAll;

#[async_trait::async_trait]
impl Authorizer for DenyAll {
    async fn enforce(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool, AppError> {
        Ok(false)
    }
    async fn add_role(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }
    async fn remove_role(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }
}

fn event(
    did: &str,
    collection: &str,
    rkey: &str,
    op: RecordOp,
    record: Option<serde_json::Value>,
    time_us: i64,
) -> IngestEvent {
    IngestEvent {
        did: did.into(),
        collection: collection.into(),
        rkey: rkey.into(),
        op,
        record,
        time_us,
    }
}

async fn seed_repo(db: &Db) -> plait_db::repos::Repo {
    db.put_repo(NewRepo {
        did: "did:web:owner".into(),
        name: "widget".into(),
        knot: "knot.example.com".into(),
        rkey: "rk1".into(),
        description: None,
        spindle: None,
        source: None,
        created: None,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn cursor_tracks_every_event_even_failures() {
    let db = Db::open_memory().await.unwrap();
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(AllowAll));

    let stream = [
        event(
            "did:web:fan",
            nsid::FOLLOW,
            "f1",
            RecordOp::Create,
            Some(json!({"subject": "did:web:owner"})),
            100,
        ),
        // Malformed record: handler fails, stream continues.
        event("did:web:fan", nsid::FOLLOW, "f2", RecordOp::Create, None, 250),
        // Unknown collection: ignored entirely.
        event(
            "did:web:fan",
            "app.bsky.feed.post",
            "p1",
            RecordOp::Create,
            Some(json!({"text": "hello"})),
            400,
        ),
    ];
    for (i, ev) in stream.iter().enumerate() {
        let expected = ev.time_us + 1;
        dispatcher.ingest(ev.clone()).await;
        assert_eq!(
            db.get_cursor().await.unwrap(),
            Some(expected),
            "cursor after event {i}"
        );
    }

    let follows = db.list_follows(&[], None).await.unwrap();
    assert_eq!(follows.len(), 1);
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(AllowAll));

    let star = event(
        "did:web:fan",
        nsid::STAR,
        "s1",
        RecordOp::Create,
        Some(json!({"subject": repo.at_uri})),
        100,
    );
    dispatcher.ingest(star.clone()).await;
    dispatcher.ingest(star).await;

    assert_eq!(db.star_count(&repo.at_uri).await.unwrap(), 1);

    // Delete, then replayed delete: both fine.
    let unstar = event("did:web:fan", nsid::STAR, "s1", RecordOp::Delete, None, 300);
    dispatcher.ingest(unstar.clone()).await;
    dispatcher.ingest(unstar).await;
    assert_eq!(db.star_count(&repo.at_uri).await.unwrap(), 0);
}

#[tokio::test]
async fn artifact_requires_push_permission() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;

    let artifact = json!({
        "repo": repo.at_uri,
        "tag": "00112233445566778899aabbccddeeff00112233",
        "blobCid": "bafyartifact",
        "name": "widget.tar.gz",
        "size": 2048,
        "mimetype": "application/gzip",
    });

    let denied = Dispatcher::new(db.clone(), Arc::new(DenyAll));
    let ev = event(
        "did:web:stranger",
        nsid::ARTIFACT,
        "a1",
        RecordOp::Create,
        Some(artifact.clone()),
        100,
    );
    let err = denied.dispatch(&ev).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert!(db.list_artifacts(&[]).await.unwrap().is_empty());

    let allowed = Dispatcher::new(db.clone(), Arc::new(AllowAll));
    allowed.dispatch(&ev).await.unwrap();
    let stored = db.list_artifacts(&[]).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].tag.len(), 20);
}

#[tokio::test]
async fn issue_flow_wires_references_and_notifications() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(AllowAll));

    // A first issue, then a second one whose body mentions the first.
    dispatcher
        .dispatch(&event(
            "did:web:owner",
            nsid::ISSUE,
            "i1",
            RecordOp::Create,
            Some(json!({"repo": repo.at_uri, "title": "flaky test", "body": "ci fails"})),
            100,
        ))
        .await
        .unwrap();
    dispatcher
        .dispatch(&event(
            "did:web:reporter",
            nsid::ISSUE,
            "i2",
            RecordOp::Create,
            Some(json!({"repo": repo.at_uri, "title": "dup", "body": "same as #1"})),
            200,
        ))
        .await
        .unwrap();

    let second_uri = format!("at://did:web:reporter/{}/i2", nsid::ISSUE);
    let refs = db
        .get_references_all(&[Filter::eq("from_at", second_uri.clone())])
        .await
        .unwrap();
    let first_uri = format!("at://did:web:owner/{}/i1", nsid::ISSUE);
    assert_eq!(refs[&second_uri], vec![first_uri]);

    // The repo owner was notified about the second issue, not their own.
    assert_eq!(
        db.unread_notification_count("did:web:owner").await.unwrap(),
        1
    );

    // Issue validation failure: unknown repo.
    let err = dispatcher
        .dispatch(&event(
            "did:web:reporter",
            nsid::ISSUE,
            "i3",
            RecordOp::Create,
            Some(json!({"repo": "at://did:web:owner/app.plait.repo/ghost", "title": "x"})),
            300,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn issue_comment_round_trip() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(AllowAll));

    dispatcher
        .dispatch(&event(
            "did:web:owner",
            nsid::ISSUE,
            "i1",
            RecordOp::Create,
            Some(json!({"repo": repo.at_uri, "title": "bug", "body": ""})),
            100,
        ))
        .await
        .unwrap();
    let issue_uri = format!("at://did:web:owner/{}/i1", nsid::ISSUE);

    let comment = |body: &str, op: RecordOp| {
        event(
            "did:web:helper",
            nsid::ISSUE_COMMENT,
            "c1",
            op,
            Some(json!({"issue": issue_uri, "body": body})),
            200,
        )
    };
    dispatcher
        .dispatch(&comment("try rebooting", RecordOp::Create))
        .await
        .unwrap();
    dispatcher
        .dispatch(&comment("try rebooting twice", RecordOp::Update))
        .await
        .unwrap();

    let issue = db.get_issue_by_at_uri(&issue_uri).await.unwrap().unwrap();
    let comments = db.get_issue_comments(issue.id).await.unwrap();
    assert_eq!(comments.len(), 1, "update edited in place");
    assert_eq!(comments[0].body, "try rebooting twice");
    assert!(comments[0].edited.is_some());

    dispatcher
        .dispatch(&event(
            "did:web:helper",
            nsid::ISSUE_COMMENT,
            "c1",
            RecordOp::Delete,
            None,
            300,
        ))
        .await
        .unwrap();
    let comments = db.get_issue_comments(issue.id).await.unwrap();
    assert!(comments[0].deleted.is_some());
    assert!(comments[0].body.is_empty());
}

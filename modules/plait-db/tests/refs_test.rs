//! Reference storage, forward queries, and backlink resolution.

use plait_db::issues::NewIssue;
use plait_db::pulls::NewPull;
use plait_db::refs::{extract_references, RefKind};
use plait_db::repos::NewRepo;
use plait_db::{Db, Filter};

async fn seed_repo(db: &Db) -> plait_db::repos::Repo {
    db.put_repo(NewRepo {
        did: "did:web:a".into(),
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
async fn put_then_get_round_trips() {
    let db = Db::open_memory().await.unwrap();
    let from = "at://did:web:a/app.plait.repo.pull/p1";
    let to = vec![
        "at://did:web:a/app.plait.repo.issue/i1".to_string(),
        "at://did:web:a/app.plait.repo.issue/i2".to_string(),
    ];

    db.put_references(from, &to).await.unwrap();
    let all = db
        .get_references_all(&[Filter::eq("from_at", from)])
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[from], to);
}

#[tokio::test]
async fn rewrite_replaces_previous_edges() {
    let db = Db::open_memory().await.unwrap();
    let from = "at://did:web:a/app.plait.repo.pull/p1";

    db.put_references(from, &["at://x/app.plait.repo.issue/1".to_string()])
        .await
        .unwrap();
    db.put_references(from, &["at://y/app.plait.repo.issue/2".to_string()])
        .await
        .unwrap();

    let all = db.get_references_all(&[]).await.unwrap();
    assert_eq!(all[from], vec!["at://y/app.plait.repo.issue/2".to_string()]);

    // Empty set clears without inserting.
    db.put_references(from, &[]).await.unwrap();
    assert!(db.get_references_all(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn pull_comment_mentioning_issue_shows_in_backlinks() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;

    let issue = db
        .put_issue(NewIssue {
            owner_did: "did:web:a".into(),
            repo_at: repo.at_uri.clone(),
            title: "flaky test".into(),
            body: "fails on CI".into(),
            issue_at: Some("at://did:web:a/app.plait.repo.issue/i1".into()),
            created: None,
        })
        .await
        .unwrap();

    let pull = db
        .create_pull(NewPull {
            repo_at: repo.at_uri.clone(),
            owner_did: "did:web:b".into(),
            rkey: "p1".into(),
            title: "fix flake".into(),
            body: String::new(),
            target_branch: "main".into(),
            source_branch: Some("fix".into()),
            source_repo_at: None,
            stack_id: None,
            change_id: None,
            parent_change_id: None,
            patch: "diff".into(),
            source_rev: None,
            created: None,
        })
        .await
        .unwrap();
    let detail = db.get_pull(&repo.at_uri, pull.pull_id).await.unwrap().unwrap();
    let comment = db
        .add_pull_comment(
            pull.id,
            detail.submissions[0].submission.id,
            &repo.at_uri,
            "did:web:b",
            "at://did:web:b/app.plait.repo.pull.comment/c1",
            "this fixes issue/1",
            None,
        )
        .await
        .unwrap();

    // The comment body mentions issue #1; extraction + resolution give
    // the edge, then the backlink query inverts it.
    let links = extract_references(&repo.did, &repo.name, "fixes #1");
    let targets = db.resolve_references(&links).await.unwrap();
    assert_eq!(targets, vec![issue.issue_at.clone().unwrap()]);
    db.put_references(&comment.comment_at, &targets).await.unwrap();

    let backlinks = db
        .get_backlinks(issue.issue_at.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].kind, RefKind::Pull);
    assert_eq!(backlinks[0].comment_id, Some(comment.id));
    assert_eq!(backlinks[0].subject_id, pull.pull_id);
    assert_eq!(backlinks[0].state, "open");
}

#[tokio::test]
async fn unresolvable_mentions_are_dropped() {
    let db = Db::open_memory().await.unwrap();
    seed_repo(&db).await;

    let links = extract_references("did:web:a", "widget", "see #99 and nobody/nothing#1");
    let targets = db.resolve_references(&links).await.unwrap();
    assert!(targets.is_empty());
}

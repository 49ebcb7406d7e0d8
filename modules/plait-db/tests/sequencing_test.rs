//! Issue and pull numbering: dense, strictly monotonic, per repo.

use plait_db::issues::NewIssue;
use plait_db::pulls::NewPull;
use plait_db::repos::NewRepo;
use plait_db::Db;

async fn seed_repo(db: &Db, did: &str, name: &str, rkey: &str) -> plait_db::repos::Repo {
    db.put_repo(NewRepo {
        did: did.into(),
        name: name.into(),
        knot: "knot.example.com".into(),
        rkey: rkey.into(),
        description: None,
        spindle: None,
        source: None,
        created: None,
    })
    .await
    .expect("repo insert")
}

fn issue(repo_at: &str, title: &str) -> NewIssue {
    NewIssue {
        owner_did: "did:web:a".into(),
        repo_at: repo_at.into(),
        title: title.into(),
        body: "body".into(),
        issue_at: None,
        created: None,
    }
}

#[tokio::test]
async fn issue_ids_are_dense_from_one() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db, "did:web:a", "widget", "rk1").await;

    let a = db.create_issue(issue(&repo.at_uri, "A")).await.unwrap();
    let b = db.create_issue(issue(&repo.at_uri, "B")).await.unwrap();
    let c = db.create_issue(issue(&repo.at_uri, "C")).await.unwrap();

    assert_eq!(
        vec![(a.issue_id, a.title), (b.issue_id, b.title), (c.issue_id, c.title)],
        vec![(1, "A".into()), (2, "B".into()), (3, "C".into())]
    );
}

#[tokio::test]
async fn counters_are_per_repo_and_per_kind() {
    let db = Db::open_memory().await.unwrap();
    let first = seed_repo(&db, "did:web:a", "widget", "rk1").await;
    let second = seed_repo(&db, "did:web:a", "gadget", "rk2").await;

    db.create_issue(issue(&first.at_uri, "A")).await.unwrap();
    db.create_issue(issue(&first.at_uri, "B")).await.unwrap();
    let other = db.create_issue(issue(&second.at_uri, "X")).await.unwrap();
    assert_eq!(other.issue_id, 1);

    // Pull numbering is independent of issue numbering.
    let pull = db
        .create_pull(NewPull {
            repo_at: first.at_uri.clone(),
            owner_did: "did:web:a".into(),
            rkey: "p1".into(),
            title: "first pull".into(),
            body: String::new(),
            target_branch: "main".into(),
            source_branch: Some("feature".into()),
            source_repo_at: None,
            stack_id: None,
            change_id: None,
            parent_change_id: None,
            patch: "diff --git a b".into(),
            source_rev: None,
            created: None,
        })
        .await
        .unwrap();
    assert_eq!(pull.pull_id, 1);
}

#[tokio::test]
async fn redelivered_issue_keeps_its_id() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db, "did:web:a", "widget", "rk1").await;

    db.create_issue(issue(&repo.at_uri, "A")).await.unwrap();

    let mut authored = issue(&repo.at_uri, "B");
    authored.issue_at = Some("at://did:web:a/app.plait.repo.issue/same".into());
    db.put_issue(authored.clone()).await.unwrap();

    // Re-delivery of the same record URI updates in place instead of
    // allocating a fresh number.
    authored.title = "B (edited)".into();
    let updated = db.put_issue(authored).await.unwrap();
    assert_eq!(updated.issue_id, 2);
    assert_eq!(updated.title, "B (edited)");

    let next = db.create_issue(issue(&repo.at_uri, "D")).await.unwrap();
    assert_eq!(next.issue_id, 3);
}

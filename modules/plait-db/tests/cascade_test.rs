//! Deleting a repo removes its entire child closure.

use plait_db::artifacts::NewArtifact;
use plait_db::issues::NewIssue;
use plait_db::pulls::NewPull;
use plait_db::repos::NewRepo;
use plait_db::{Db, Filter};

#[tokio::test]
async fn repo_delete_cascades_to_every_child() {
    let db = Db::open_memory().await.unwrap();
    let repo = db
        .put_repo(NewRepo {
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
        .unwrap();

    let issue = db
        .create_issue(NewIssue {
            owner_did: "did:web:a".into(),
            repo_at: repo.at_uri.clone(),
            title: "t".into(),
            body: "b".into(),
            issue_at: None,
            created: None,
        })
        .await
        .unwrap();
    db.add_issue_comment(&issue, "did:web:b", Some("c1"), "hi", None)
        .await
        .unwrap();

    let pull = db
        .create_pull(NewPull {
            repo_at: repo.at_uri.clone(),
            owner_did: "did:web:a".into(),
            rkey: "p1".into(),
            title: "t".into(),
            body: String::new(),
            target_branch: "main".into(),
            source_branch: None,
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
    db.add_pull_comment(
        pull.id,
        detail.submissions[0].submission.id,
        &repo.at_uri,
        "did:web:b",
        "at://did:web:b/app.plait.repo.pull.comment/c1",
        "hi",
        None,
    )
    .await
    .unwrap();

    db.put_star("did:web:fan", &repo.at_uri, "s1", None).await.unwrap();
    db.add_collaborator("did:web:a", Some("col1"), "did:web:b", &repo.at_uri)
        .await
        .unwrap();
    db.put_artifact(NewArtifact {
        did: "did:web:a".into(),
        rkey: "a1".into(),
        repo_at: repo.at_uri.clone(),
        tag: vec![7u8; 20],
        blob_cid: "bafy...".into(),
        name: "widget.tar.gz".into(),
        size: 1024,
        mimetype: "application/gzip".into(),
        created: None,
    })
    .await
    .unwrap();

    db.delete_repo("did:web:a", "rk1").await.unwrap();

    assert!(db.get_issue(&repo.at_uri, 1).await.unwrap().is_none());
    assert!(db.get_pull(&repo.at_uri, 1).await.unwrap().is_none());
    assert!(db.list_stars(&[], None).await.unwrap().is_empty());
    assert!(db.list_collaborators(&repo.at_uri).await.unwrap().is_empty());
    assert!(db
        .list_artifacts(&[Filter::eq("repo_at", repo.at_uri.clone())])
        .await
        .unwrap()
        .is_empty());

    // Orphaned child tables, checked directly.
    for table in ["issue_comments", "pull_submissions", "pull_comments"] {
        let sql = format!("select count(*) from {table}");
        let (n,): (i64,) = sqlx::query_as(&sql).fetch_one(db.pool()).await.unwrap();
        assert_eq!(n, 0, "{table} not emptied by cascade");
    }
}

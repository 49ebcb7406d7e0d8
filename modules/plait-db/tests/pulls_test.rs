//! Pull lifecycle, submission rounds, and stack reconstruction.

use plait_db::pulls::{NewPull, PullState};
use plait_db::repos::NewRepo;
use plait_db::Db;

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

fn pull(repo_at: &str, rkey: &str) -> NewPull {
    NewPull {
        repo_at: repo_at.into(),
        owner_did: "did:web:a".into(),
        rkey: rkey.into(),
        title: format!("pull {rkey}"),
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
    }
}

#[tokio::test]
async fn merged_is_terminal() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;

    let p = db.create_pull(pull(&repo.at_uri, "p1")).await.unwrap();
    assert_eq!(p.state().unwrap(), PullState::Open);

    let state = db.merge_pull(&repo.at_uri, p.pull_id).await.unwrap();
    assert_eq!(state, PullState::Merged);

    // Closing a merged pull is ignored.
    let state = db.close_pull(&repo.at_uri, p.pull_id).await.unwrap();
    assert_eq!(state, PullState::Merged);

    // So is deleting it.
    let state = db.delete_pull(&repo.at_uri, p.pull_id).await.unwrap();
    assert_eq!(state, PullState::Merged);
}

#[tokio::test]
async fn closed_can_reopen() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let p = db.create_pull(pull(&repo.at_uri, "p1")).await.unwrap();

    assert_eq!(
        db.close_pull(&repo.at_uri, p.pull_id).await.unwrap(),
        PullState::Closed
    );
    assert_eq!(
        db.reopen_pull(&repo.at_uri, p.pull_id).await.unwrap(),
        PullState::Open
    );
}

#[tokio::test]
async fn rounds_are_zero_indexed_and_contiguous() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let p = db.create_pull(pull(&repo.at_uri, "p1")).await.unwrap();

    db.resubmit_pull(p.id, "patch v2", Some("abc")).await.unwrap();
    db.resubmit_pull(p.id, "patch v3", None).await.unwrap();

    let detail = db.get_pull(&repo.at_uri, p.pull_id).await.unwrap().unwrap();
    let rounds: Vec<i64> = detail
        .submissions
        .iter()
        .map(|s| s.submission.round_number)
        .collect();
    assert_eq!(rounds, vec![0, 1, 2]);
    assert!(!detail.submissions.is_empty(), "round 0 exists from creation");
}

#[tokio::test]
async fn comments_attach_to_their_submission() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;
    let p = db.create_pull(pull(&repo.at_uri, "p1")).await.unwrap();
    let detail = db.get_pull(&repo.at_uri, p.pull_id).await.unwrap().unwrap();
    let round0 = detail.submissions[0].submission.id;

    db.add_pull_comment(
        p.id,
        round0,
        &repo.at_uri,
        "did:web:reviewer",
        "at://did:web:reviewer/app.plait.repo.pull.comment/c1",
        "looks good",
        None,
    )
    .await
    .unwrap();

    let detail = db.get_pull(&repo.at_uri, p.pull_id).await.unwrap().unwrap();
    assert_eq!(detail.submissions[0].comments.len(), 1);
    assert_eq!(detail.submissions[0].comments[0].body, "looks good");
}

#[tokio::test]
async fn stack_orders_top_first() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;

    // bottom <- mid <- top, inserted out of order.
    let mut bottom = pull(&repo.at_uri, "p1");
    bottom.stack_id = Some("stack-1".into());
    bottom.change_id = Some("c-bottom".into());

    let mut top = pull(&repo.at_uri, "p3");
    top.stack_id = Some("stack-1".into());
    top.change_id = Some("c-top".into());
    top.parent_change_id = Some("c-mid".into());

    let mut mid = pull(&repo.at_uri, "p2");
    mid.stack_id = Some("stack-1".into());
    mid.change_id = Some("c-mid".into());
    mid.parent_change_id = Some("c-bottom".into());

    db.create_pull(bottom).await.unwrap();
    db.create_pull(top).await.unwrap();
    db.create_pull(mid).await.unwrap();

    let stack = db.get_stack("stack-1").await.unwrap();
    let chain: Vec<Option<&str>> = stack.iter().map(|p| p.change_id.as_deref()).collect();
    assert_eq!(
        chain,
        vec![Some("c-top"), Some("c-mid"), Some("c-bottom")],
        "exactly one childless top, then parents, reaching every member"
    );
}

#[tokio::test]
async fn forked_stack_is_rejected() {
    let db = Db::open_memory().await.unwrap();
    let repo = seed_repo(&db).await;

    let mut root = pull(&repo.at_uri, "p1");
    root.stack_id = Some("stack-1".into());
    root.change_id = Some("c-root".into());

    // Two children of the same parent: two tops.
    for (rkey, change) in [("p2", "c-left"), ("p3", "c-right")] {
        let mut child = pull(&repo.at_uri, rkey);
        child.stack_id = Some("stack-1".into());
        child.change_id = Some(change.into());
        child.parent_change_id = Some("c-root".into());
        db.create_pull(child).await.unwrap();
    }
    db.create_pull(root).await.unwrap();

    assert!(db.get_stack("stack-1").await.is_err());
}

//! Notification bookkeeping: unread counts, scoped deletes, entity join,
//! preferences.

use plait_common::Page;
use plait_db::notifications::{NewNotification, NotificationPreferences};
use plait_db::repos::NewRepo;
use plait_db::{Db, DbError};

fn notif(recipient: &str, kind: &str) -> NewNotification {
    NewNotification {
        recipient_did: recipient.into(),
        actor_did: "did:web:actor".into(),
        r#type: kind.into(),
        entity_type: "repo".into(),
        entity_id: "1".into(),
        repo_id: None,
        issue_id: None,
        pull_id: None,
    }
}

#[tokio::test]
async fn unread_count_and_bulk_read() {
    let db = Db::open_memory().await.unwrap();
    for _ in 0..3 {
        db.create_notification(notif("did:web:me", "repo_starred"))
            .await
            .unwrap();
    }
    db.create_notification(notif("did:web:other", "repo_starred"))
        .await
        .unwrap();

    assert_eq!(db.unread_notification_count("did:web:me").await.unwrap(), 3);

    let marked = db.mark_all_notifications_read("did:web:me").await.unwrap();
    assert_eq!(marked, 3);
    assert_eq!(db.unread_notification_count("did:web:me").await.unwrap(), 0);
    assert_eq!(
        db.unread_notification_count("did:web:other").await.unwrap(),
        1,
        "other recipients untouched"
    );
}

#[tokio::test]
async fn delete_is_scoped_to_recipient() {
    let db = Db::open_memory().await.unwrap();
    let id = db
        .create_notification(notif("did:web:me", "user_followed"))
        .await
        .unwrap();

    let err = db.delete_notification(id, "did:web:intruder").await;
    assert!(matches!(err, Err(DbError::NotFound(_))));

    db.delete_notification(id, "did:web:me").await.unwrap();
}

#[tokio::test]
async fn entity_join_populates_present_side_only() {
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

    let mut with_repo = notif("did:web:me", "repo_starred");
    with_repo.repo_id = Some(repo.id);
    db.create_notification(with_repo).await.unwrap();
    db.create_notification(notif("did:web:me", "user_followed"))
        .await
        .unwrap();

    let listed = db
        .list_notifications_with_entities("did:web:me", Page::first(10))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    let starred = listed
        .iter()
        .find(|n| n.notification.r#type == "repo_starred")
        .unwrap();
    assert_eq!(starred.repo.as_ref().unwrap().name, "widget");
    assert!(starred.issue.is_none() && starred.pull.is_none());

    let followed = listed
        .iter()
        .find(|n| n.notification.r#type == "user_followed")
        .unwrap();
    assert!(followed.repo.is_none());
}

#[tokio::test]
async fn retention_cleanup_drops_old_rows() {
    let db = Db::open_memory().await.unwrap();
    db.create_notification(notif("did:web:me", "repo_starred"))
        .await
        .unwrap();

    // Nothing is older than a day yet.
    let removed = db
        .clear_old_notifications(chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    // Everything is older than "now".
    let removed = db
        .clear_old_notifications(chrono::Duration::seconds(-5))
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn preferences_default_then_upsert() {
    let db = Db::open_memory().await.unwrap();

    let prefs = db
        .get_notification_preferences("did:web:me")
        .await
        .unwrap();
    assert!(prefs.repo_starred);
    assert!(!prefs.email_notifications);

    let mut changed = NotificationPreferences::default_for("did:web:me");
    changed.repo_starred = false;
    changed.email_notifications = true;
    db.put_notification_preferences(&changed).await.unwrap();
    db.put_notification_preferences(&changed).await.unwrap(); // replace, not duplicate

    let stored = db
        .get_notification_preferences("did:web:me")
        .await
        .unwrap();
    assert!(!stored.repo_starred);
    assert!(stored.email_notifications);
}

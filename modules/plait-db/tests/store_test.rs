//! Store open, cursor, punchcards, profiles, emails, registrations.

use plait_db::profiles::NewProfile;
use plait_db::repos::NewRepo;
use plait_db::{Db, DbError};

#[tokio::test]
async fn cursor_round_trips_and_overwrites() {
    let db = Db::open_memory().await.unwrap();
    assert_eq!(db.get_cursor().await.unwrap(), None);

    db.set_cursor(1_700_000_000_000_001).await.unwrap();
    db.set_cursor(1_700_000_000_000_042).await.unwrap();
    assert_eq!(db.get_cursor().await.unwrap(), Some(1_700_000_000_000_042));
}

#[tokio::test]
async fn punches_accumulate_per_day() {
    let db = Db::open_memory().await.unwrap();
    db.record_punch("did:web:a", "2026-07-01", 3).await.unwrap();
    db.record_punch("did:web:a", "2026-07-01", 2).await.unwrap();
    db.record_punch("did:web:a", "2026-07-02", 1).await.unwrap();
    db.record_punch("did:web:b", "2026-07-01", 9).await.unwrap();

    let card = db
        .get_punchcard("did:web:a", "2026-07-01", "2026-07-31")
        .await
        .unwrap();
    assert_eq!(card.len(), 2);
    assert_eq!((card[0].date.as_str(), card[0].count), ("2026-07-01", 5));
    assert_eq!((card[1].date.as_str(), card[1].count), ("2026-07-02", 1));
}

#[tokio::test]
async fn profile_upsert_replaces_children() {
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

    db.put_profile(NewProfile {
        did: "did:web:a".into(),
        description: "first".into(),
        links: vec!["https://one.example".into(), "https://two.example".into()],
        stats: vec!["open-issue-count".into()],
        pins: vec![repo.at_uri.clone(), "at://did:web:a/app.plait.repo/ghost".into()],
        ..Default::default()
    })
    .await
    .unwrap();

    db.put_profile(NewProfile {
        did: "did:web:a".into(),
        description: "second".into(),
        links: vec!["https://three.example".into()],
        stats: vec!["repository-count".into(), "merged-pull-request-count".into()],
        pins: vec![repo.at_uri.clone()],
        ..Default::default()
    })
    .await
    .unwrap();

    let detail = db.get_profile("did:web:a").await.unwrap().unwrap();
    assert_eq!(detail.profile.description, "second");
    assert_eq!(detail.links, vec!["https://three.example".to_string()]);
    assert_eq!(detail.stats.len(), 2);
    // The unknown pin was dropped both times.
    assert_eq!(detail.pins, vec![repo.at_uri]);
}

#[tokio::test]
async fn profile_bounds_are_validated() {
    let db = Db::open_memory().await.unwrap();
    let too_many_links = NewProfile {
        did: "did:web:a".into(),
        links: (0..6).map(|i| format!("https://{i}.example")).collect(),
        ..Default::default()
    };
    assert!(matches!(
        db.put_profile(too_many_links).await,
        Err(DbError::Validation(_))
    ));

    let bad_stat = NewProfile {
        did: "did:web:a".into(),
        stats: vec!["karma".into()],
        ..Default::default()
    };
    assert!(matches!(
        db.put_profile(bad_stat).await,
        Err(DbError::Validation(_))
    ));
}

#[tokio::test]
async fn email_verification_flow() {
    let db = Db::open_memory().await.unwrap();
    let email = db.add_email("did:web:a", "a@example.com").await.unwrap();
    assert!(!email.verified);

    // Resend overwrites the code and refreshes last_sent.
    let rotated = db
        .rotate_verification_code("did:web:a", "a@example.com")
        .await
        .unwrap();
    assert_ne!(rotated.verification_code, email.verification_code);

    // The old code no longer verifies.
    assert!(db
        .verify_email("did:web:a", "a@example.com", &email.verification_code)
        .await
        .is_err());
    db.verify_email("did:web:a", "a@example.com", &rotated.verification_code)
        .await
        .unwrap();

    db.set_primary_email("did:web:a", "a@example.com").await.unwrap();
    let listed = db.list_emails("did:web:a").await.unwrap();
    assert!(listed[0].verified && listed[0].is_primary);
}

#[tokio::test]
async fn knot_registration_lifecycle() {
    let db = Db::open_memory().await.unwrap();
    let first = db
        .register_knot("knot.example.com", "did:web:op")
        .await
        .unwrap();
    assert!(!first.is_registered());

    // Same claimant gets the same secret back.
    let again = db
        .register_knot("knot.example.com", "did:web:op")
        .await
        .unwrap();
    assert_eq!(again.secret, first.secret);

    // A different claimant conflicts.
    assert!(matches!(
        db.register_knot("knot.example.com", "did:web:thief").await,
        Err(DbError::Conflict(_))
    ));

    db.mark_registered("knot.example.com").await.unwrap();
    let stored = db.get_registration("knot.example.com").await.unwrap().unwrap();
    assert!(stored.is_registered());
}

#[tokio::test]
async fn self_follow_is_rejected_by_schema() {
    let db = Db::open_memory().await.unwrap();
    let err = db
        .put_follow("did:web:a", "did:web:a", "f1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Integrity(_)));
}

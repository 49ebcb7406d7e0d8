//! Label definitions and op application through the store.

use plait_db::labels::{LabelOperation, NewLabelDefinition, NewLabelOp};
use plait_db::{Db, Filter};

fn definition(multiple: bool) -> NewLabelDefinition {
    NewLabelDefinition {
        did: "did:plc:labeler".into(),
        rkey: "priority".into(),
        name: "priority".into(),
        value_type: "string".into(),
        value_format: "any".into(),
        value_enum: vec!["low".into(), "med".into(), "high".into()],
        scope: vec![plait_common::nsid::ISSUE.into()],
        color: Some("#ff0000".into()),
        multiple,
        created: None,
    }
}

fn op(rkey: &str, operation: LabelOperation, value: &str, key: &str, subject: &str) -> NewLabelOp {
    NewLabelOp {
        did: "did:plc:labeler".into(),
        rkey: rkey.into(),
        subject: subject.into(),
        operation,
        operand_key: key.into(),
        operand_value: value.into(),
        performed_at: None,
    }
}

#[tokio::test]
async fn single_valued_label_folds_to_last_survivor() {
    let db = Db::open_memory().await.unwrap();
    let def = db.put_label_definition(definition(false)).await.unwrap();
    let key = def.at_uri();
    let subject = "at://did:web:a/app.plait.repo.issue/1";

    db.save_label_ops(vec![
        op("o1", LabelOperation::Add, "low", &key, subject),
        op("o2", LabelOperation::Add, "med", &key, subject),
        op("o3", LabelOperation::Del, "med", &key, subject),
    ])
    .await
    .unwrap();

    let labels = db
        .get_labels(&[Filter::eq("subject", subject)])
        .await
        .unwrap();
    let state = &labels[subject];
    let values: Vec<&str> = state[&key].iter().map(String::as_str).collect();
    assert_eq!(values, vec!["low"]);
}

#[tokio::test]
async fn definition_upsert_is_keyed_on_did_rkey() {
    let db = Db::open_memory().await.unwrap();
    db.put_label_definition(definition(false)).await.unwrap();

    let mut changed = definition(false);
    changed.color = Some("#00ff00".into());
    let def = db.put_label_definition(changed).await.unwrap();

    let all = db.list_label_definitions(&[]).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(def.color.as_deref(), Some("#00ff00"));
    assert_eq!(def.enum_values(), vec!["low", "med", "high"]);
}

#[tokio::test]
async fn batch_reduction_drops_round_trips_before_persisting() {
    let db = Db::open_memory().await.unwrap();
    let def = db.put_label_definition(definition(true)).await.unwrap();
    let key = def.at_uri();
    let subject = "at://did:web:a/app.plait.repo.issue/1";

    let written = db
        .save_label_ops(vec![
            op("o1", LabelOperation::Add, "db", &key, subject),
            op("o2", LabelOperation::Add, "ui", &key, subject),
            op("o3", LabelOperation::Del, "ui", &key, subject),
        ])
        .await
        .unwrap();
    assert_eq!(written, 1, "add/del pair reduced away");

    let ops = db.list_label_ops(&[]).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operand_value, "db");
}

#[tokio::test]
async fn get_labels_buckets_by_subject() {
    let db = Db::open_memory().await.unwrap();
    let def = db.put_label_definition(definition(true)).await.unwrap();
    let key = def.at_uri();
    let first = "at://did:web:a/app.plait.repo.issue/1";
    let second = "at://did:web:a/app.plait.repo.issue/2";

    db.save_label_ops(vec![
        op("o1", LabelOperation::Add, "db", &key, first),
        op("o2", LabelOperation::Add, "ui", &key, second),
    ])
    .await
    .unwrap();

    let labels = db.get_labels(&[]).await.unwrap();
    assert_eq!(labels.len(), 2);
    assert!(labels[first][&key].contains("db"));
    assert!(labels[second][&key].contains("ui"));
}

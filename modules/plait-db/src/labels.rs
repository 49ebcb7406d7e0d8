//! Label definitions, operations, and their deterministic application.
//!
//! Operations are the source of truth; per-subject label state is a pure
//! function of the op sequence. A definition's `multiple` flag decides
//! whether a key holds a set of values or exactly one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use plait_common::AtUri;
use sqlx::FromRow;

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::Db;

/// Applied labels for one subject: key → active values.
///
/// `multiple=false` keys shrink to a single-element set so add/del
/// semantics stay symmetric with multi-valued keys.
pub type LabelState = BTreeMap<String, BTreeSet<String>>;

/// Sentinel for an operation that changes nothing. Swallowed during folds,
/// never surfaced past this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelNoOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOperation {
    Add,
    Del,
}

impl LabelOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelOperation::Add => "add",
            LabelOperation::Del => "del",
        }
    }

    fn inverse(self) -> Self {
        match self {
            LabelOperation::Add => LabelOperation::Del,
            LabelOperation::Del => LabelOperation::Add,
        }
    }
}

impl FromStr for LabelOperation {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(LabelOperation::Add),
            "del" => Ok(LabelOperation::Del),
            other => Err(DbError::Integrity(format!("unknown label operation {other}"))),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LabelDefinition {
    pub id: i64,
    pub did: String,
    pub rkey: String,
    pub name: String,
    /// One of `null`, `string`, `integer`, `boolean`.
    pub value_type: String,
    /// `any` or `did`.
    pub value_format: String,
    /// Comma-joined closed value set; empty means unconstrained.
    pub value_enum: Option<String>,
    /// Comma-joined list of subject collections this label applies to.
    pub scope: String,
    pub color: Option<String>,
    pub multiple: bool,
    pub created: String,
}

impl LabelDefinition {
    pub fn at_uri(&self) -> String {
        plait_common::at_uri(&self.did, plait_common::nsid::LABEL_DEFINITION, &self.rkey)
    }

    pub fn enum_values(&self) -> Vec<&str> {
        self.value_enum
            .as_deref()
            .map(|e| e.split(',').filter(|v| !v.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split(',').filter(|s| !s.is_empty()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewLabelDefinition {
    pub did: String,
    pub rkey: String,
    pub name: String,
    pub value_type: String,
    pub value_format: String,
    pub value_enum: Vec<String>,
    pub scope: Vec<String>,
    pub color: Option<String>,
    pub multiple: bool,
    pub created: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LabelOp {
    pub id: i64,
    pub did: String,
    pub rkey: String,
    pub subject: String,
    pub operation: String,
    /// The label definition's record URI.
    pub operand_key: String,
    pub operand_value: String,
    pub performed_at: Option<String>,
    pub indexed_at: String,
}

impl LabelOp {
    pub fn operation(&self) -> Result<LabelOperation> {
        self.operation.parse()
    }
}

#[derive(Debug, Clone)]
pub struct NewLabelOp {
    pub did: String,
    pub rkey: String,
    pub subject: String,
    pub operation: LabelOperation,
    pub operand_key: String,
    pub operand_value: String,
    pub performed_at: Option<String>,
}

/// Effective sort key of an op.
///
/// A `performed_at` before the UNIX epoch is treated as absent (zero
/// time); one after `indexed_at` is clamped to `indexed_at`. Skewed client
/// clocks therefore cannot reorder history around the indexer.
pub fn sort_at(op: &LabelOp) -> DateTime<Utc> {
    let zero = DateTime::<Utc>::MIN_UTC;
    let indexed = plait_common::parse_rfc3339(&op.indexed_at).unwrap_or(zero);
    match op
        .performed_at
        .as_deref()
        .and_then(plait_common::parse_rfc3339)
    {
        None => zero,
        Some(t) if t < DateTime::UNIX_EPOCH => zero,
        Some(t) if t <= indexed => t,
        Some(_) => indexed,
    }
}

/// Definitions in force while folding ops, keyed by definition URI.
#[derive(Debug, Default)]
pub struct LabelApplicationCtx {
    defs: HashMap<String, LabelDefinition>,
}

impl LabelApplicationCtx {
    pub fn new(defs: impl IntoIterator<Item = LabelDefinition>) -> Self {
        Self {
            defs: defs.into_iter().map(|d| (d.at_uri(), d)).collect(),
        }
    }

    pub fn definition(&self, uri: &str) -> Option<&LabelDefinition> {
        self.defs.get(uri)
    }
}

/// Fold one op into `state`.
///
/// Re-adding a present value and deleting an absent one are no-ops
/// (sentinel error); so is an op against an unknown definition.
pub fn apply_label_op(
    ctx: &LabelApplicationCtx,
    state: &mut LabelState,
    op: &LabelOp,
) -> std::result::Result<(), LabelNoOp> {
    let def = ctx.definition(&op.operand_key).ok_or(LabelNoOp)?;
    let operation = op.operation().map_err(|_| LabelNoOp)?;
    let key = &op.operand_key;
    let value = &op.operand_value;

    match operation {
        LabelOperation::Add => {
            if state.get(key).is_some_and(|vs| vs.contains(value)) {
                return Err(LabelNoOp);
            }
            if def.multiple {
                state.entry(key.clone()).or_default().insert(value.clone());
            } else {
                state.insert(key.clone(), BTreeSet::from([value.clone()]));
            }
        }
        LabelOperation::Del => {
            let Some(values) = state.get_mut(key) else {
                return Err(LabelNoOp);
            };
            if !values.contains(value) {
                return Err(LabelNoOp);
            }
            if def.multiple {
                values.remove(value);
                if values.is_empty() {
                    state.remove(key);
                }
            } else {
                state.remove(key);
            }
        }
    }
    Ok(())
}

/// Fold a whole op sequence: sort ascending by effective time (ties by
/// row id) and apply, swallowing no-ops.
pub fn apply_label_ops(ctx: &LabelApplicationCtx, state: &mut LabelState, ops: &[LabelOp]) {
    let mut ordered: Vec<&LabelOp> = ops.iter().collect();
    ordered.sort_by_key(|op| (sort_at(op), op.id));
    for op in ordered {
        let _ = apply_label_op(ctx, state, op);
    }
}

/// Drop paired inverse operations (same key and value, opposing add/del)
/// in a single pass; survivors keep their relative order.
///
/// Run over user-submitted batches before persisting, so a round-trip
/// add/remove does not pollute history.
pub fn reduce_label_ops(ops: Vec<NewLabelOp>) -> Vec<NewLabelOp> {
    let mut dropped = vec![false; ops.len()];
    for i in 0..ops.len() {
        if dropped[i] {
            continue;
        }
        for j in (i + 1)..ops.len() {
            if dropped[j] {
                continue;
            }
            if ops[i].operand_key == ops[j].operand_key
                && ops[i].operand_value == ops[j].operand_value
                && ops[i].subject == ops[j].subject
                && ops[j].operation == ops[i].operation.inverse()
            {
                dropped[i] = true;
                dropped[j] = true;
                break;
            }
        }
    }
    ops.into_iter()
        .zip(dropped)
        .filter_map(|(op, dropped)| (!dropped).then_some(op))
        .collect()
}

impl Db {
    /// Upsert a definition on `(did, rkey)`.
    pub async fn put_label_definition(&self, new: NewLabelDefinition) -> Result<LabelDefinition> {
        let created = new.created.unwrap_or_else(plait_common::now_rfc3339);
        let def = sqlx::query_as::<_, LabelDefinition>(
            r#"
            insert into label_definitions
                (did, rkey, name, value_type, value_format, value_enum, scope, color, multiple, created)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            on conflict(did, rkey) do update set
                name = excluded.name,
                value_type = excluded.value_type,
                value_format = excluded.value_format,
                value_enum = excluded.value_enum,
                scope = excluded.scope,
                color = excluded.color,
                multiple = excluded.multiple
            returning *
            "#,
        )
        .bind(&new.did)
        .bind(&new.rkey)
        .bind(&new.name)
        .bind(&new.value_type)
        .bind(&new.value_format)
        .bind(new.value_enum.join(","))
        .bind(new.scope.join(","))
        .bind(&new.color)
        .bind(new.multiple)
        .bind(&created)
        .fetch_one(self.pool())
        .await?;
        Ok(def)
    }

    pub async fn get_label_definition(&self, did: &str, rkey: &str) -> Result<Option<LabelDefinition>> {
        let def = sqlx::query_as::<_, LabelDefinition>(
            "select * from label_definitions where did = ? and rkey = ?",
        )
        .bind(did)
        .bind(rkey)
        .fetch_optional(self.pool())
        .await?;
        Ok(def)
    }

    pub async fn delete_label_definition(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from label_definitions where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_label_definitions(&self, filters: &[Filter]) -> Result<Vec<LabelDefinition>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select * from label_definitions{where_sql} order by created desc");
        let mut query = sqlx::query_as::<_, LabelDefinition>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Persist a batch of ops, reduced first so inverse pairs never reach
    /// history. The batch commits atomically.
    pub async fn save_label_ops(&self, ops: Vec<NewLabelOp>) -> Result<usize> {
        let survivors = reduce_label_ops(ops);
        let mut tx = self.begin().await?;
        for op in &survivors {
            sqlx::query(
                r#"
                insert or ignore into label_ops
                    (did, rkey, subject, operation, operand_key, operand_value, performed_at)
                values (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&op.did)
            .bind(&op.rkey)
            .bind(&op.subject)
            .bind(op.operation.as_str())
            .bind(&op.operand_key)
            .bind(&op.operand_value)
            .bind(&op.performed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(survivors.len())
    }

    pub async fn delete_label_ops(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from label_ops where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_label_ops(&self, filters: &[Filter]) -> Result<Vec<LabelOp>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select * from label_ops{where_sql} order by indexed_at asc, id asc");
        let mut query = sqlx::query_as::<_, LabelOp>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Materialise label state per subject for the ops matching `filters`.
    pub async fn get_labels(&self, filters: &[Filter]) -> Result<HashMap<String, LabelState>> {
        let ops = self.list_label_ops(filters).await?;

        let mut by_subject: HashMap<String, Vec<LabelOp>> = HashMap::new();
        let mut def_uris: BTreeSet<String> = BTreeSet::new();
        for op in ops {
            def_uris.insert(op.operand_key.clone());
            by_subject.entry(op.subject.clone()).or_default().push(op);
        }

        let mut defs = Vec::with_capacity(def_uris.len());
        for uri in &def_uris {
            let Ok(parsed) = AtUri::from_str(uri) else {
                continue;
            };
            if let Some(def) = self.get_label_definition(&parsed.did, &parsed.rkey).await? {
                defs.push(def);
            }
        }
        let ctx = LabelApplicationCtx::new(defs);

        let mut result = HashMap::with_capacity(by_subject.len());
        for (subject, ops) in by_subject {
            let mut state = LabelState::new();
            apply_label_ops(&ctx, &mut state, &ops);
            if !state.is_empty() {
                result.insert(subject, state);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(rkey: &str, multiple: bool) -> LabelDefinition {
        LabelDefinition {
            id: 1,
            did: "did:plc:labeler".into(),
            rkey: rkey.into(),
            name: rkey.into(),
            value_type: "string".into(),
            value_format: "any".into(),
            value_enum: Some("low,med,high".into()),
            scope: plait_common::nsid::ISSUE.into(),
            color: None,
            multiple,
            created: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn op(id: i64, operation: LabelOperation, key: &str, value: &str) -> LabelOp {
        LabelOp {
            id,
            did: "did:plc:labeler".into(),
            rkey: format!("op-{id}"),
            subject: "at://did:plc:a/app.plait.repo.issue/1".into(),
            operation: operation.as_str().into(),
            operand_key: key.into(),
            operand_value: value.into(),
            performed_at: Some(format!("2026-01-01T00:00:{id:02}Z")),
            indexed_at: format!("2026-01-01T00:00:{id:02}Z"),
        }
    }

    fn new_op(operation: LabelOperation, key: &str, value: &str) -> NewLabelOp {
        NewLabelOp {
            did: "did:plc:labeler".into(),
            rkey: format!("{key}-{value}-{}", operation.as_str()),
            subject: "at://did:plc:a/app.plait.repo.issue/1".into(),
            operation,
            operand_key: key.into(),
            operand_value: value.into(),
            performed_at: None,
        }
    }

    #[test]
    fn single_valued_add_replaces() {
        let d = def("priority", false);
        let key = d.at_uri();
        let ctx = LabelApplicationCtx::new([d]);
        let mut state = LabelState::new();

        apply_label_ops(
            &ctx,
            &mut state,
            &[
                op(1, LabelOperation::Add, &key, "low"),
                op(2, LabelOperation::Add, &key, "med"),
                op(3, LabelOperation::Del, &key, "med"),
            ],
        );
        assert_eq!(state[&key], BTreeSet::from(["low".to_string()]));
    }

    #[test]
    fn multi_valued_del_shrinks_then_removes() {
        let d = def("area", true);
        let key = d.at_uri();
        let ctx = LabelApplicationCtx::new([d]);
        let mut state = LabelState::new();

        apply_label_ops(
            &ctx,
            &mut state,
            &[
                op(1, LabelOperation::Add, &key, "db"),
                op(2, LabelOperation::Add, &key, "ui"),
                op(3, LabelOperation::Del, &key, "db"),
            ],
        );
        assert_eq!(state[&key], BTreeSet::from(["ui".to_string()]));

        apply_label_ops(&ctx, &mut state, &[op(4, LabelOperation::Del, &key, "ui")]);
        assert!(state.is_empty());
    }

    #[test]
    fn noop_does_not_change_state() {
        let d = def("priority", false);
        let key = d.at_uri();
        let ctx = LabelApplicationCtx::new([d]);
        let mut state = LabelState::new();

        apply_label_ops(&ctx, &mut state, &[op(1, LabelOperation::Add, &key, "low")]);
        let before = state.clone();

        // Re-adding the present value and deleting an absent one are both
        // sentinel no-ops.
        assert_eq!(
            apply_label_op(&ctx, &mut state, &op(2, LabelOperation::Add, &key, "low")),
            Err(LabelNoOp)
        );
        assert_eq!(
            apply_label_op(&ctx, &mut state, &op(3, LabelOperation::Del, &key, "high")),
            Err(LabelNoOp)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn reduction_cancels_inverse_pairs() {
        let ops = vec![
            new_op(LabelOperation::Add, "k", "a"),
            new_op(LabelOperation::Add, "k", "b"),
            new_op(LabelOperation::Del, "k", "a"),
        ];
        let survivors = reduce_label_ops(ops);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].operand_value, "b");
    }

    #[test]
    fn reduction_of_sequence_and_its_reverse_is_empty() {
        let forward = vec![
            new_op(LabelOperation::Add, "k", "a"),
            new_op(LabelOperation::Add, "k", "b"),
            new_op(LabelOperation::Add, "j", "c"),
        ];
        let mut mirrored: Vec<NewLabelOp> = forward
            .iter()
            .rev()
            .map(|op| NewLabelOp {
                operation: op.operation.inverse(),
                ..op.clone()
            })
            .collect();
        let mut all = forward;
        all.append(&mut mirrored);
        assert!(reduce_label_ops(all).is_empty());
    }

    #[test]
    fn clock_skew_clamps_to_indexed_at() {
        let mut skewed = op(1, LabelOperation::Add, "k", "a");
        skewed.performed_at = Some("2099-01-01T00:00:00Z".into());
        skewed.indexed_at = "2026-01-01T00:00:00Z".into();
        assert_eq!(
            sort_at(&skewed),
            plait_common::parse_rfc3339("2026-01-01T00:00:00Z").unwrap()
        );

        let mut pre_epoch = op(2, LabelOperation::Add, "k", "a");
        pre_epoch.performed_at = Some("1969-12-31T23:59:59Z".into());
        assert_eq!(sort_at(&pre_epoch), DateTime::<Utc>::MIN_UTC);
    }
}

//! The decoded shape of one remote-log event.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOp {
    Create,
    Update,
    Delete,
}

/// One committed record operation from the firehose or a knot stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    /// Authoring identity; with `collection` and `rkey` it names the
    /// record's canonical URI.
    pub did: String,
    pub collection: String,
    pub rkey: String,
    pub op: RecordOp,
    /// Decoded record body; absent on deletes.
    pub record: Option<serde_json::Value>,
    /// Event time in microseconds; `time_us + 1` becomes the resume
    /// cursor once the event is handled.
    pub time_us: i64,
}

impl IngestEvent {
    pub fn at_uri(&self) -> String {
        plait_common::at_uri(&self.did, &self.collection, &self.rkey)
    }
}

//! Event demultiplexer and worker pool.
//!
//! Events are routed to a worker by authoring DID, so per-source order is
//! preserved while sources proceed in parallel. Handler failures are
//! logged and the cursor still advances: every write is idempotent on its
//! natural key, so re-delivery is safe and loss is not.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use plait_common::{nsid, AppError};
use plait_db::Db;
use plait_pds::Authorizer;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::event::IngestEvent;
use crate::validate::Validator;
use crate::verify::Verifier;

pub struct Dispatcher {
    pub(crate) db: Db,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) verifier: Verifier,
    pub(crate) validator: Validator,
}

impl Dispatcher {
    pub fn new(db: Db, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            validator: Validator::new(db.clone()),
            verifier: Verifier::new(),
            db,
            authorizer,
        }
    }

    /// Handle one event end to end. The cursor write is the last step, so
    /// a crash re-delivers at most the in-flight event.
    pub async fn ingest(&self, event: IngestEvent) {
        if let Err(err) = self.dispatch(&event).await {
            warn!(
                did = %event.did,
                nsid = %event.collection,
                rkey = %event.rkey,
                %err,
                "handler failed; stream continues"
            );
        }
        if let Err(err) = self.db.set_cursor(event.time_us + 1).await {
            error!(%err, "cursor write failed");
        }
    }

    /// Route to the per-collection handler. Unknown collections are not
    /// an error; the log carries plenty we don't index.
    pub async fn dispatch(&self, event: &IngestEvent) -> Result<(), AppError> {
        match event.collection.as_str() {
            nsid::FOLLOW => self.handle_follow(event).await,
            nsid::STAR => self.handle_star(event).await,
            nsid::PUBLIC_KEY => self.handle_public_key(event).await,
            nsid::ARTIFACT => self.handle_artifact(event).await,
            nsid::PROFILE => self.handle_profile(event).await,
            nsid::SPINDLE => self.handle_spindle(event).await,
            nsid::SPINDLE_MEMBER => self.handle_spindle_member(event).await,
            nsid::KNOT => self.handle_knot(event).await,
            nsid::KNOT_MEMBER => self.handle_knot_member(event).await,
            nsid::STRING => self.handle_string(event).await,
            nsid::ISSUE => self.handle_issue(event).await,
            nsid::ISSUE_COMMENT => self.handle_issue_comment(event).await,
            nsid::LABEL_DEFINITION => self.handle_label_definition(event).await,
            other => {
                debug!(nsid = other, "ignoring unindexed collection");
                Ok(())
            }
        }
    }
}

/// Fixed-width worker pool over bounded queues.
pub struct IngestPool {
    senders: Vec<mpsc::Sender<IngestEvent>>,
    handles: Vec<JoinHandle<()>>,
}

impl IngestPool {
    pub fn spawn(dispatcher: Arc<Dispatcher>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, mut rx) = mpsc::channel::<IngestEvent>(queue_depth.max(1));
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    dispatcher.ingest(event).await;
                }
                debug!(worker, "ingest worker drained");
            }));
            senders.push(tx);
        }
        Self { senders, handles }
    }

    /// Enqueue an event, backpressuring when the worker's queue is full.
    /// Events from one DID always land on the same worker.
    pub async fn submit(&self, event: IngestEvent) -> Result<(), AppError> {
        let mut hasher = DefaultHasher::new();
        event.did.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.senders.len();
        self.senders[idx]
            .send(event)
            .await
            .map_err(|_| AppError::Cancelled)
    }

    /// Close the queues and wait for in-flight events to finish.
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

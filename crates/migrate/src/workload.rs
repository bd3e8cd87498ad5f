//! Workload generator: ordinary create/update/delete traffic against the
//! source while a migration runs.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use reindex_core::{DocId, Payload, StoreError, Version};
use reindex_store::DocumentStore;

#[derive(Debug, Clone)]
pub enum WorkloadOp {
    Create { id: DocId, payload: Payload },
    Update { id: DocId, payload: Payload },
    Delete { id: DocId },
}

impl WorkloadOp {
    pub fn id(&self) -> &str {
        match self {
            WorkloadOp::Create { id, .. } | WorkloadOp::Update { id, .. } | WorkloadOp::Delete { id } => id,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            WorkloadOp::Create { .. } => "create",
            WorkloadOp::Update { .. } => "update",
            WorkloadOp::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug)]
pub struct WorkloadOutcome {
    pub verb: &'static str,
    pub id: DocId,
    /// New version for writes, `None` for deletes.
    pub result: Result<Option<Version>, StoreError>,
}

impl fmt::Display for WorkloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(Some(v)) => write!(f, "{} {}: ok (version {v})", self.verb, self.id),
            Ok(None) => write!(f, "{} {}: ok", self.verb, self.id),
            Err(e) => write!(f, "{} {}: ERROR {e}", self.verb, self.id),
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkloadReport {
    pub outcomes: Vec<WorkloadOutcome>,
}

impl WorkloadReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &WorkloadOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

pub struct WorkloadGenerator {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl WorkloadGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    pub async fn create_document(&self, id: &str, payload: Payload) -> Result<Version, StoreError> {
        self.store.index(&self.collection, id, payload).await
    }

    /// Overwrite an existing document. Missing ids yield `NotFound`.
    pub async fn update_document(&self, id: &str, payload: Payload) -> Result<Version, StoreError> {
        if self.store.get(&self.collection, id).await?.is_none() {
            return Err(StoreError::NotFound {
                collection: self.collection.clone(),
                id: id.to_string(),
            });
        }
        self.store.index(&self.collection, id, payload).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.collection, id).await
    }

    async fn apply(&self, op: WorkloadOp) -> WorkloadOutcome {
        let verb = op.verb();
        let id = op.id().to_string();
        let result = match op {
            WorkloadOp::Create { id, payload } => self.create_document(&id, payload).await.map(Some),
            WorkloadOp::Update { id, payload } => self.update_document(&id, payload).await.map(Some),
            WorkloadOp::Delete { id } => self.delete_document(&id).await.map(|_| None),
        };
        WorkloadOutcome { verb, id, result }
    }

    /// Issue all operations concurrently. A failing operation does not
    /// cancel the others.
    pub async fn run(&self, ops: Vec<WorkloadOp>) -> WorkloadReport {
        info!(collection = %self.collection, operations = ops.len(), "running concurrent workload");
        let outcomes = join_all(ops.into_iter().map(|op| self.apply(op))).await;
        for outcome in outcomes.iter().filter(|o| o.result.is_err()) {
            warn!(collection = %self.collection, "{outcome}");
        }
        WorkloadReport { outcomes }
    }
}

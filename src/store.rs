//! # Store Module
//!
//! The two capabilities a run needs from the storage layer: executing writes on the
//! primary and issuing lookups against a replica. Connection setup, pooling and the
//! SQL dialect all live behind these traits.

use crate::error::StoreError;
use crate::model::RecordId;
use crate::statement::Statement;
use async_trait::async_trait;

/// Rows returned by a replica lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rows {
    ids: Vec<RecordId>,
}

impl Rows {
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self { ids }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }
}

/// Write path. Executes a non-query statement and returns the affected row count.
#[async_trait]
pub trait PrimaryExecutor: Send + Sync {
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError>;

    /// Cheap reachability check performed once before a run starts.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read path. Executes a lookup and returns the matching rows, possibly none.
///
/// An `Ok` with no rows means the statement ran and found nothing; an `Err` means the
/// statement could not be executed. Callers treat the two differently.
#[async_trait]
pub trait ReplicaQuery: Send + Sync {
    async fn query(&self, statement: &Statement) -> Result<Rows, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

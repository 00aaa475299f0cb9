//! Persistence seams for graph definitions and run records.

use crate::graph::GraphDef;
use crate::name::{GraphId, RunId};
use crate::run::RunRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a store implementation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend cannot be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// `update` was called for a run that was never saved.
    #[error("run record not found in store: {0}")]
    MissingRun(RunId),

    /// A record could not be encoded or decoded.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for graph definitions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Inserts or replaces a graph.
    async fn save(&self, id: &GraphId, graph: &GraphDef) -> Result<(), StoreError>;

    /// Loads a graph.
    async fn get(&self, id: &GraphId) -> Result<Option<GraphDef>, StoreError>;

    /// Lists every stored graph id.
    async fn list_ids(&self) -> Result<Vec<GraphId>, StoreError>;
}

/// Durable storage for run records.
///
/// Writes for a single run id are issued sequentially by its interpreter.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts or replaces a run.
    async fn save(&self, id: &RunId, run: &RunRecord) -> Result<(), StoreError>;

    /// Replaces an existing run; fails with [`StoreError::MissingRun`] otherwise.
    async fn update(&self, id: &RunId, run: &RunRecord) -> Result<(), StoreError>;

    /// Loads a run.
    async fn get(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Loads every run keyed by id.
    async fn list_all(&self) -> Result<HashMap<RunId, RunRecord>, StoreError>;

    /// Deletes a run, returning whether it existed.
    async fn delete(&self, id: &RunId) -> Result<bool, StoreError>;
}

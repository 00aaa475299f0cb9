//! In-process store for graphs and runs.

use async_trait::async_trait;
use keiro_core::{GraphDef, GraphId, GraphStore, RunId, RunRecord, RunStore, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A [`GraphStore`] and [`RunStore`] kept in memory.
///
/// Locks are held only for the duration of a single read or write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: RwLock<HashMap<GraphId, GraphDef>>,
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored graphs.
    pub async fn graph_count(&self) -> usize {
        self.graphs.read().await.len()
    }

    /// Returns the number of stored runs.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn save(&self, id: &GraphId, graph: &GraphDef) -> Result<(), StoreError> {
        self.graphs.write().await.insert(id.clone(), graph.clone());
        Ok(())
    }

    async fn get(&self, id: &GraphId) -> Result<Option<GraphDef>, StoreError> {
        Ok(self.graphs.read().await.get(id).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<GraphId>, StoreError> {
        let mut ids: Vec<GraphId> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save(&self, id: &RunId, run: &RunRecord) -> Result<(), StoreError> {
        self.runs.write().await.insert(id.clone(), run.clone());
        Ok(())
    }

    async fn update(&self, id: &RunId, run: &RunRecord) -> Result<(), StoreError> {
        match self.runs.write().await.get_mut(id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRun(id.clone())),
        }
    }

    async fn get(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn list_all(&self) -> Result<HashMap<RunId, RunRecord>, StoreError> {
        Ok(self.runs.read().await.clone())
    }

    async fn delete(&self, id: &RunId) -> Result<bool, StoreError> {
        Ok(self.runs.write().await.remove(id).is_some())
    }
}

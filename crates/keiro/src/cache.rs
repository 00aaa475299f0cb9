//! Read-through cache of graph definitions.

use keiro_core::{GraphDef, GraphId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-lifetime cache of loaded graphs.
///
/// Entries are never invalidated. If a graph id is overwritten in the store
/// by someone else, this cache keeps serving the copy it loaded first.
/// Interpreters that share a store but not a cache can therefore disagree
/// about a graph after it is replaced.
#[derive(Debug, Default)]
pub(crate) struct GraphCache {
    graphs: RwLock<HashMap<GraphId, Arc<GraphDef>>>,
}

impl GraphCache {
    /// Creates an empty cache.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the cached graph, if any.
    pub(crate) async fn get(&self, id: &GraphId) -> Option<Arc<GraphDef>> {
        self.graphs.read().await.get(id).cloned()
    }

    /// Caches a graph and returns the shared copy.
    pub(crate) async fn insert(&self, id: GraphId, graph: GraphDef) -> Arc<GraphDef> {
        let graph = Arc::new(graph);
        self.graphs.write().await.insert(id, Arc::clone(&graph));
        graph
    }

}

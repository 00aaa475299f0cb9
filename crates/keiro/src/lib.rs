//! A lightweight graph interpreter for data-driven workflows.
//!
//! A graph is a set of named nodes, each bound to a step function, plus one
//! outgoing edge per node. Edges are either fixed or choose between two
//! nodes by comparing a state value with a threshold. The interpreter walks
//! the graph against a JSON run state, merging each step's output into the
//! state and checkpointing the run record after every step.
//!
//! # Example
//!
//! ```rust
//! use keiro::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), EngineError> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = Interpreter::builder(store.clone(), store)
//!     .register_fn("bump", |state, _params| {
//!         let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(Some([("n", json!(n + 1))].into_iter().collect()))
//!     })
//!     .build();
//!
//! let graph = GraphDef::builder()
//!     .node(NodeDef::new("bump", "bump"))
//!     .node(NodeDef::new("done", "bump"))
//!     .conditional("bump", Condition::new("n", Operator::Lt, 3.0, "bump", "done"))
//!     .start_with("bump")
//!     .build()?;
//! let graph_id = engine.create_graph(graph).await?;
//!
//! let run = engine.start_run(&graph_id, State::new()).await?;
//! assert_eq!(run.status, RunStatus::Completed);
//! assert_eq!(run.state.get("n"), Some(&json!(4)));
//! # Ok(())
//! # }
//! ```

mod blocking;
mod cache;
mod config;
mod follow;
mod interpreter;
mod memory;

// Re-export core types
pub use keiro_core::*;

pub use blocking::BlockingTransform;
pub use config::{InterpreterConfig, RunOptions, DEFAULT_MAX_STEPS};
pub use follow::{follow_run, RunEvent};
pub use interpreter::{Interpreter, InterpreterBuilder};
pub use memory::MemoryStore;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CapabilityRegistry, Condition, Edge, EngineError, GraphDef, GraphId, GraphStore,
        Interpreter, InterpreterBuilder, InterpreterConfig, MemoryStore, NodeDef, NodeName,
        Operator, Params, RunId, RunOptions, RunRecord, RunStatus, RunStore, State,
        StateTransform, StepError,
    };
}

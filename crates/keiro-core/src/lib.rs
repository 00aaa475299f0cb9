//! Core types and traits for the keiro graph interpreter.
//!
//! This crate has no async runtime dependency. Depend on it to implement
//! step functions or storage backends.
//!
//! # Core Types
//!
//! - [`GraphDef`] / [`NodeDef`] / [`Edge`] - Validated graph definitions
//! - [`Condition`] - Data-dependent branching on a numeric state value
//! - [`State`] - The JSON key/value payload a run evolves
//! - [`RunRecord`] - The persisted record of one run
//! - [`StateTransform`] / [`CapabilityRegistry`] - Named step functions
//! - [`GraphStore`] / [`RunStore`] - Persistence seams
//! - [`EngineError`] / [`RunFailure`] - Request-level and in-run errors

mod capability;
mod condition;
mod error;
mod graph;
mod name;
mod run;
mod state;
mod store;

pub use capability::{CapabilityRegistry, FnTransform, StateTransform, StepError};
pub use condition::{Condition, ConditionError, Operator, CONDITION_PREFIX};
pub use error::{EngineError, RunFailure};
pub use graph::{Edge, GraphBuilder, GraphDef, GraphError, NodeDef};
pub use name::{GraphId, NodeName, RunId};
pub use run::{RunRecord, RunStatus};
pub use state::{Params, State};
pub use store::{GraphStore, RunStore, StoreError};

//! Interpreter error types.

use crate::condition::ConditionError;
use crate::graph::GraphError;
use crate::name::{GraphId, NodeName, RunId};
use crate::store::StoreError;
use thiserror::Error;

/// Errors reported to the caller of an interpreter operation.
///
/// Only problems that prevent a run record from existing, or that make
/// checkpointing impossible, surface here. Everything that goes wrong inside
/// a run is recorded in that run as a [`RunFailure`].
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use keiro_core::EngineError;
///
/// fn status_code(error: &EngineError) -> u16 {
///     match error {
///         EngineError::GraphNotFound(_) | EngineError::RunNotFound(_) => 404,
///         EngineError::InvalidGraph(_) => 422,
///         _ => 500,
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// No graph is stored under the id.
    #[error("graph not found: {0}")]
    GraphNotFound(GraphId),

    /// No run is stored under the id.
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// The graph definition violates a structural invariant.
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    /// The store failed; the run cannot be checkpointed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a run ended in the `failed` status.
///
/// The display form is the log entry appended to the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RunFailure {
    /// The node's function is not registered.
    #[error("missing node function: {func}")]
    MissingNodeFunction {
        /// The node being executed.
        node: NodeName,
        /// The unregistered function name.
        func: String,
    },

    /// The node's conditional edge could not be evaluated.
    #[error("condition error at '{node}': {source}")]
    MalformedCondition {
        /// The node owning the edge.
        node: NodeName,
        /// The evaluation error.
        #[source]
        source: ConditionError,
    },

    /// The step ceiling was reached.
    #[error("loop limit exceeded ({limit} steps)")]
    LoopGuardExceeded {
        /// The configured ceiling.
        limit: u32,
    },

    /// The step function returned an error.
    #[error("step '{node}' failed: {details}")]
    StepInvocation {
        /// The node being executed.
        node: NodeName,
        /// The error message.
        details: String,
    },

    /// The step function panicked.
    #[error("step '{node}' panicked: {details}")]
    StepPanicked {
        /// The node being executed.
        node: NodeName,
        /// The panic message, when it was a string.
        details: String,
    },

    /// The step function exceeded the configured deadline.
    #[error("step '{node}' timed out after {millis}ms")]
    StepTimeout {
        /// The node being executed.
        node: NodeName,
        /// The deadline in milliseconds.
        millis: u128,
    },
}

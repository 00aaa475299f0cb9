//! Interpreter configuration.

use std::time::Duration;

/// Default ceiling on the number of steps a run may take.
pub const DEFAULT_MAX_STEPS: u32 = 200;

/// Configuration shared by every run an [`Interpreter`](crate::Interpreter) executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// A run fails once its step counter exceeds this value.
    pub max_steps: u32,
    /// Deadline for a single step function call. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout: None,
        }
    }
}

/// Per-run overrides of [`InterpreterConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Overrides [`InterpreterConfig::max_steps`] for this run.
    pub max_steps: Option<u32>,
}

impl RunOptions {
    /// Creates options that inherit everything from the interpreter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step ceiling for this run.
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

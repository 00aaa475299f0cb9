//! Step functions that block the calling thread.

use async_trait::async_trait;
use keiro_core::{Params, State, StateTransform, StepError};
use std::fmt;
use std::sync::Arc;

/// Runs a synchronous, blocking closure on tokio's blocking thread pool.
///
/// Use this for step functions doing file or CPU-heavy work so other runs
/// keep making progress while the step executes.
pub struct BlockingTransform<F> {
    name: String,
    func: Arc<F>,
}

impl<F> BlockingTransform<F>
where
    F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync + 'static,
{
    /// Wraps `func`; `name` is only used for debugging output.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl<F> fmt::Debug for BlockingTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransform")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> StateTransform for BlockingTransform<F>
where
    F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync + 'static,
{
    async fn apply(&self, state: &State, params: &Params) -> Result<Option<State>, StepError> {
        let func = Arc::clone(&self.func);
        let state = state.clone();
        let params = params.clone();

        tokio::task::spawn_blocking(move || func(&state, &params))
            .await
            .map_err(|e| StepError::new(format!("blocking step '{}' aborted: {}", self.name, e)))?
    }
}

//! Step functions and the registry that names them.

use crate::state::{Params, State};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a step function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(String);

impl StepError {
    /// Creates a step error from any message.
    pub fn new(details: impl fmt::Display) -> Self {
        Self(details.to_string())
    }

    /// Returns the error message.
    pub fn details(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e)
    }
}

/// A named transform applied to the run state at a node.
///
/// Returning `Ok(Some(update))` merges `update` into the run state;
/// `Ok(None)` leaves it untouched.
///
/// # Examples
///
/// ```
/// use keiro_core::{Params, State, StateTransform, StepError};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// #[derive(Debug)]
/// struct Increment;
///
/// #[async_trait]
/// impl StateTransform for Increment {
///     async fn apply(&self, state: &State, params: &Params) -> Result<Option<State>, StepError> {
///         let by = params.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
///         let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
///         Ok(Some([("n", json!(n + by))].into_iter().collect()))
///     }
/// }
/// ```
#[async_trait]
pub trait StateTransform: Send + Sync + fmt::Debug {
    /// Computes a partial state update.
    async fn apply(&self, state: &State, params: &Params) -> Result<Option<State>, StepError>;
}

/// Adapter turning a synchronous closure into a [`StateTransform`].
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync,
{
    /// Wraps `func`; `name` is only used for debugging output.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StateTransform for FnTransform<F>
where
    F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync,
{
    async fn apply(&self, state: &State, params: &Params) -> Result<Option<State>, StepError> {
        (self.func)(state, params)
    }
}

/// Maps step-function names to their implementations.
///
/// Registering a name twice keeps the last registration.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<dyn StateTransform>>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("CapabilityRegistry")
            .field("names", &names)
            .finish()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transform under `name`.
    pub fn register<T: StateTransform + 'static>(
        &mut self,
        name: impl Into<String>,
        transform: T,
    ) -> &mut Self {
        self.entries.insert(name.into(), Arc::new(transform));
        self
    }

    /// Registers a synchronous closure under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync + 'static,
    {
        let name = name.into();
        let transform = FnTransform::new(name.clone(), func);
        self.entries.insert(name, Arc::new(transform));
        self
    }

    /// Looks up a transform.
    pub fn get(&self, name: &str) -> Option<Arc<dyn StateTransform>> {
        self.entries.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of registered transforms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_fn() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("set_flag", |_state, _params| {
            Ok(Some([("flag", json!(true))].into_iter().collect()))
        });

        let transform = registry.get("set_flag").expect("registered");
        let update = transform
            .apply(&State::new(), &Params::new())
            .await
            .expect("step succeeds");
        assert_eq!(update.and_then(|s| s.get("flag").cloned()), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_fn("f", |_, _| Ok(Some([("v", json!(1))].into_iter().collect())))
            .register_fn("f", |_, _| Ok(Some([("v", json!(2))].into_iter().collect())));

        assert_eq!(registry.len(), 1);
        let update = registry
            .get("f")
            .expect("registered")
            .apply(&State::new(), &Params::new())
            .await
            .expect("step succeeds");
        assert_eq!(update.and_then(|s| s.get("v").cloned()), Some(json!(2)));
    }

    #[test]
    fn test_missing_name() {
        let registry = CapabilityRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_step_error_display() {
        let error = StepError::new("bad input");
        assert_eq!(error.to_string(), "bad input");
        assert_eq!(error.details(), "bad input");
    }
}

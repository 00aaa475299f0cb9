//! Run state storage shared between nodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Static configuration handed to a step function alongside the run state.
pub type Params = BTreeMap<String, Value>;

/// The evolving key/value payload of a run.
///
/// Values are arbitrary JSON so a run record can be persisted and inspected
/// by other processes without knowing the step functions that produced it.
///
/// # Examples
///
/// ```
/// use keiro_core::State;
/// use serde_json::json;
///
/// let mut state = State::new();
/// state.insert("a", json!(0));
/// state.insert("b", json!(2));
///
/// let update: State = [("a", json!(1))].into_iter().collect();
/// state.merge(update);
///
/// assert_eq!(state.get("a"), Some(&json!(1)));
/// assert_eq!(state.get("b"), Some(&json!(2)));
/// ```
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, Value>);

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl State {
    /// Creates a new empty state.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a value with the given key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a reference to the value for the given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Removes a value by key and returns it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if the state contains a value for the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns an iterator over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Returns an iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the state contains no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies a partial update.
    ///
    /// Every key in `update` overwrites the existing value; keys not present
    /// in `update` are left untouched. Nested values are replaced wholesale.
    pub fn merge(&mut self, update: State) {
        self.0.extend(update.0);
    }
}

impl From<BTreeMap<String, Value>> for State {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<serde_json::Map<String, Value>> for State {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for State {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

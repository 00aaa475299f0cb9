//! Data-dependent edge conditions.

use crate::name::NodeName;
use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of the compact string form of a conditional edge.
pub const CONDITION_PREFIX: &str = "cond:";

/// Errors produced while parsing or evaluating a [`Condition`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    /// The compact expression does not have the expected shape.
    #[error("malformed condition '{expr}': {reason}")]
    Malformed {
        /// The offending expression.
        expr: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The operator is not supported.
    #[error("unknown condition operator: {0}")]
    UnknownOperator(String),

    /// The threshold is not a finite number.
    #[error("invalid condition threshold: {0}")]
    InvalidThreshold(String),

    /// The state value under `key` cannot be read as a number.
    #[error("state value for '{key}' is not numeric: {value}")]
    NotNumeric {
        /// The state key read by the condition.
        key: String,
        /// The value found there.
        value: Value,
    },
}

/// Comparison applied between a state value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// `value >= threshold`
    Gte,
    /// `value > threshold`
    Gt,
    /// `value < threshold`
    Lt,
    /// `value <= threshold`
    Lte,
    /// `value == threshold`
    Eq,
    /// `value != threshold`
    Ne,
}

impl Operator {
    /// Returns the operator keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gte => "gte",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
        }
    }

    /// Applies the comparison.
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gte => value >= threshold,
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Lte => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Ne => value != threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gte" => Ok(Operator::Gte),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            other => Err(ConditionError::UnknownOperator(other.to_string())),
        }
    }
}

/// A two-way branch chosen by comparing one state value with a threshold.
///
/// # Examples
///
/// ```
/// use keiro_core::{Condition, Operator, State};
/// use serde_json::json;
///
/// let cond = Condition::new("score", Operator::Gte, 50.0, "A", "B");
///
/// let state: State = [("score", json!(60))].into_iter().collect();
/// assert_eq!(cond.evaluate(&state).map(|n| n.as_str()), Ok("A"));
///
/// // Missing keys read as 0
/// assert_eq!(cond.evaluate(&State::new()).map(|n| n.as_str()), Ok("B"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// State key to read.
    pub key: String,
    /// Comparison to apply.
    pub op: Operator,
    /// Right-hand side of the comparison.
    pub threshold: f64,
    /// Next node when the comparison holds.
    pub if_true: NodeName,
    /// Next node otherwise.
    pub if_false: NodeName,
}

impl Condition {
    /// Creates a condition.
    pub fn new(
        key: impl Into<String>,
        op: Operator,
        threshold: f64,
        if_true: impl Into<NodeName>,
        if_false: impl Into<NodeName>,
    ) -> Self {
        Self {
            key: key.into(),
            op,
            threshold,
            if_true: if_true.into(),
            if_false: if_false.into(),
        }
    }

    /// Parses the compact form `cond:<key>:<op>:<threshold>:<true>:<false>`.
    pub fn parse(expr: &str) -> Result<Self, ConditionError> {
        let malformed = |reason| ConditionError::Malformed {
            expr: expr.to_string(),
            reason,
        };

        let body = expr
            .strip_prefix(CONDITION_PREFIX)
            .ok_or_else(|| malformed("missing 'cond:' prefix"))?;
        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() != 5 {
            return Err(malformed("expected five ':'-separated fields"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(malformed("empty field"));
        }

        let op = parts[1].parse::<Operator>()?;
        let threshold = parts[2]
            .parse::<f64>()
            .map_err(|_| ConditionError::InvalidThreshold(parts[2].to_string()))?;

        let cond = Condition::new(parts[0], op, threshold, parts[3], parts[4]);
        cond.check()?;
        Ok(cond)
    }

    /// Checks the parts that can be validated without a graph.
    pub fn check(&self) -> Result<(), ConditionError> {
        if self.key.is_empty() {
            return Err(ConditionError::Malformed {
                expr: self.to_string(),
                reason: "empty key",
            });
        }
        if !self.threshold.is_finite() {
            return Err(ConditionError::InvalidThreshold(self.threshold.to_string()));
        }
        Ok(())
    }

    /// Returns both branch targets.
    pub fn targets(&self) -> [&NodeName; 2] {
        [&self.if_true, &self.if_false]
    }

    /// Picks the next node for the given state.
    ///
    /// An absent or `null` value reads as `0`. Booleans read as `1`/`0` and
    /// numeric strings are parsed; any other value is an error.
    pub fn evaluate(&self, state: &State) -> Result<&NodeName, ConditionError> {
        let value = match state.get(&self.key) {
            None | Some(Value::Null) => 0.0,
            Some(v) => coerce_number(v).ok_or_else(|| ConditionError::NotNumeric {
                key: self.key.clone(),
                value: v.clone(),
            })?,
        };

        if self.op.compare(value, self.threshold) {
            Ok(&self.if_true)
        } else {
            Ok(&self.if_false)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}:{}:{}:{}",
            CONDITION_PREFIX, self.key, self.op, self.threshold, self.if_true, self.if_false
        )
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

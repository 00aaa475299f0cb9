//! Graph definitions: nodes, edges and the start pointer.

use crate::condition::{Condition, ConditionError, CONDITION_PREFIX};
use crate::name::{GraphId, NodeName};
use crate::state::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a graph definition is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphError {
    /// The graph has no nodes.
    #[error("graph has no nodes")]
    Empty,

    /// Two nodes share a name.
    #[error("duplicate node name: {0}")]
    DuplicateNode(NodeName),

    /// A node name collides with the compact condition syntax.
    #[error("node name may not start with 'cond:': {0}")]
    ReservedName(NodeName),

    /// No start node was given.
    #[error("start node must be specified")]
    MissingStart,

    /// The start pointer names no node.
    #[error("start node not found: {0}")]
    UnknownStart(NodeName),

    /// An edge is registered for a node that does not exist.
    #[error("edge registered for unknown node: {0}")]
    UnknownSource(NodeName),

    /// An edge points at a node that does not exist.
    #[error("edge from '{from}' targets unknown node '{target}'")]
    UnknownTarget {
        /// The node owning the edge.
        from: NodeName,
        /// The missing target.
        target: NodeName,
    },

    /// A conditional edge is malformed.
    #[error("invalid condition on edge from '{from}': {source}")]
    Condition {
        /// The node owning the edge.
        from: NodeName,
        /// What is wrong with the condition.
        #[source]
        source: ConditionError,
    },
}

/// A named step bound to a step function and its static parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique name within the graph.
    pub name: NodeName,
    /// Name looked up in the capability registry.
    pub func: String,
    /// Configuration passed to the step function.
    #[serde(default)]
    pub params: Params,
}

impl NodeDef {
    /// Creates a node without parameters.
    pub fn new(name: impl Into<NodeName>, func: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            func: func.into(),
            params: Params::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// The outgoing transition of a node.
///
/// Serialized as a plain string for [`Edge::Direct`] and as an object for
/// [`Edge::Conditional`]. The compact string `cond:<key>:<op>:<threshold>:<true>:<false>`
/// is also accepted when reading.
///
/// # Examples
///
/// ```
/// use keiro_core::{Edge, Operator};
///
/// let edge: Edge = "next".parse().unwrap();
/// assert_eq!(edge, Edge::to("next"));
///
/// let edge: Edge = "cond:score:gte:50:pass:fail".parse().unwrap();
/// assert!(matches!(edge, Edge::Conditional(c) if c.op == Operator::Gte));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEdge", into = "RawEdge")]
pub enum Edge {
    /// Always continue to the named node.
    Direct(NodeName),
    /// Choose between two nodes based on the run state.
    Conditional(Condition),
}

impl Edge {
    /// Creates a direct edge.
    pub fn to(target: impl Into<NodeName>) -> Self {
        Edge::Direct(target.into())
    }

    /// Returns every node this edge may lead to.
    pub fn targets(&self) -> Vec<&NodeName> {
        match self {
            Edge::Direct(target) => vec![target],
            Edge::Conditional(cond) => cond.targets().to_vec(),
        }
    }
}

impl From<Condition> for Edge {
    fn from(cond: Condition) -> Self {
        Edge::Conditional(cond)
    }
}

impl FromStr for Edge {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(CONDITION_PREFIX) {
            Condition::parse(s).map(Edge::Conditional)
        } else {
            Ok(Edge::Direct(NodeName::new(s)))
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(target) => write!(f, "{}", target),
            Edge::Conditional(cond) => write!(f, "{}", cond),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEdge {
    Text(String),
    Conditional(Condition),
}

impl TryFrom<RawEdge> for Edge {
    type Error = ConditionError;

    fn try_from(raw: RawEdge) -> Result<Self, Self::Error> {
        match raw {
            RawEdge::Text(s) => s.parse(),
            RawEdge::Conditional(cond) => {
                cond.check()?;
                Ok(Edge::Conditional(cond))
            }
        }
    }
}

impl From<Edge> for RawEdge {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Direct(target) => RawEdge::Text(target.as_str().to_string()),
            Edge::Conditional(cond) => RawEdge::Conditional(cond),
        }
    }
}

/// An immutable set of nodes and edges describing possible execution paths.
///
/// Build one with [`GraphDef::builder`], which validates the definition.
/// Records read back from a store are trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    /// Identifier, assigned on creation when absent.
    #[serde(default)]
    pub id: Option<GraphId>,
    /// Nodes in declaration order.
    pub nodes: Vec<NodeDef>,
    /// Outgoing edge per node name.
    #[serde(default)]
    pub edges: BTreeMap<NodeName, Edge>,
    /// Entry node.
    pub start: NodeName,
}

impl GraphDef {
    /// Creates a new graph builder.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Returns the node with the given name.
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name.as_str() == name)
    }

    /// Returns the outgoing edge of the given node.
    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.edges.get(name)
    }

    /// Checks every structural invariant of the graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.as_str().starts_with(CONDITION_PREFIX) {
                return Err(GraphError::ReservedName(node.name.clone()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
        }

        if !names.contains(self.start.as_str()) {
            return Err(GraphError::UnknownStart(self.start.clone()));
        }

        for (from, edge) in &self.edges {
            if !names.contains(from.as_str()) {
                return Err(GraphError::UnknownSource(from.clone()));
            }
            if let Edge::Conditional(cond) = edge {
                cond.check().map_err(|source| GraphError::Condition {
                    from: from.clone(),
                    source,
                })?;
            }
            for target in edge.targets() {
                if !names.contains(target.as_str()) {
                    return Err(GraphError::UnknownTarget {
                        from: from.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Builder for constructing validated [`GraphDef`] instances.
///
/// # Examples
///
/// ```
/// use keiro_core::{Condition, GraphDef, NodeDef, Operator};
///
/// let graph = GraphDef::builder()
///     .node(NodeDef::new("score", "compute_score"))
///     .node(NodeDef::new("pass", "notify"))
///     .node(NodeDef::new("retry", "improve"))
///     .conditional("score", Condition::new("score", Operator::Gte, 50.0, "pass", "retry"))
///     .edge("retry", "score")
///     .start_with("score")
///     .build()
///     .expect("valid graph");
///
/// assert_eq!(graph.nodes.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    id: Option<GraphId>,
    nodes: Vec<NodeDef>,
    edges: BTreeMap<NodeName, Edge>,
    start: Option<NodeName>,
}

impl GraphBuilder {
    /// Creates a new empty graph builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit graph id.
    pub fn id(mut self, id: impl Into<GraphId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Appends a node.
    pub fn node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Registers a direct edge, replacing any edge already set for `from`.
    pub fn edge(mut self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Registers a conditional edge, replacing any edge already set for `from`.
    pub fn conditional(mut self, from: impl Into<NodeName>, condition: Condition) -> Self {
        self.edges.insert(from.into(), Edge::Conditional(condition));
        self
    }

    /// Sets the start node by name.
    pub fn start_with(mut self, name: impl Into<NodeName>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// Builds and validates the graph.
    pub fn build(self) -> Result<GraphDef, GraphError> {
        let start = self.start.ok_or(GraphError::MissingStart)?;
        let graph = GraphDef {
            id: self.id,
            nodes: self.nodes,
            edges: self.edges,
            start,
        };
        graph.validate()?;
        Ok(graph)
    }
}

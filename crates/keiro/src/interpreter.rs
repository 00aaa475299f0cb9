//! Graph interpreter: drives runs from the start node to a terminal status.

use crate::blocking::BlockingTransform;
use crate::cache::GraphCache;
use crate::config::{InterpreterConfig, RunOptions};
use futures::FutureExt;
use keiro_core::{
    CapabilityRegistry, Edge, EngineError, GraphDef, GraphId, GraphStore, NodeDef, Params,
    RunFailure, RunId, RunRecord, RunStore, State, StateTransform, StepError,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Executes graphs against a run state, checkpointing after every step.
///
/// An interpreter is cheap to share behind an [`Arc`]; each call to
/// [`start_run`](Self::start_run) owns its run exclusively, so many runs can
/// execute concurrently.
pub struct Interpreter {
    graphs: Arc<dyn GraphStore>,
    runs: Arc<dyn RunStore>,
    registry: CapabilityRegistry,
    cache: GraphCache,
    config: InterpreterConfig,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl Interpreter {
    /// Creates a new interpreter builder over the given stores.
    pub fn builder(graphs: Arc<dyn GraphStore>, runs: Arc<dyn RunStore>) -> InterpreterBuilder {
        InterpreterBuilder::new(graphs, runs)
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Returns the registered step functions.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Validates and stores a graph, assigning an id when it has none.
    pub async fn create_graph(&self, mut graph: GraphDef) -> Result<GraphId, EngineError> {
        graph.validate()?;
        let id = graph.id.get_or_insert_with(GraphId::generate).clone();

        self.graphs.save(&id, &graph).await?;
        self.cache.insert(id.clone(), graph).await;
        info!(graph_id = %id, "Graph created");
        Ok(id)
    }

    /// Loads a graph through the cache.
    ///
    /// Records read from the store are not re-validated.
    pub async fn load_graph(&self, id: &GraphId) -> Result<Arc<GraphDef>, EngineError> {
        if let Some(graph) = self.cache.get(id).await {
            return Ok(graph);
        }

        let mut graph = self
            .graphs
            .get(id)
            .await?
            .ok_or_else(|| EngineError::GraphNotFound(id.clone()))?;
        graph.id.get_or_insert_with(|| id.clone());
        debug!(graph_id = %id, "Graph loaded from store");
        Ok(self.cache.insert(id.clone(), graph).await)
    }

    /// Lists the ids of all stored graphs.
    pub async fn list_graph_ids(&self) -> Result<Vec<GraphId>, EngineError> {
        Ok(self.graphs.list_ids().await?)
    }

    /// Loads every stored graph directly from the store.
    pub async fn list_graphs(&self) -> Result<Vec<GraphDef>, EngineError> {
        let mut graphs = Vec::new();
        for id in self.graphs.list_ids().await? {
            if let Some(graph) = self.graphs.get(&id).await? {
                graphs.push(graph);
            }
        }
        Ok(graphs)
    }

    /// Returns the persisted record of a run.
    pub async fn get_run(&self, run_id: &RunId) -> Result<RunRecord, EngineError> {
        self.runs
            .get(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.clone()))
    }

    /// Returns every persisted run keyed by id.
    pub async fn list_runs(&self) -> Result<HashMap<RunId, RunRecord>, EngineError> {
        Ok(self.runs.list_all().await?)
    }

    /// Deletes a run record.
    pub async fn delete_run(&self, run_id: &RunId) -> Result<(), EngineError> {
        if self.runs.delete(run_id).await? {
            info!(run_id = %run_id, "Run deleted");
            Ok(())
        } else {
            Err(EngineError::RunNotFound(run_id.clone()))
        }
    }

    /// Starts a run and drives it to a terminal status.
    ///
    /// Fails only when the graph is unknown or the run store fails; anything
    /// that goes wrong inside the run is recorded in the returned record.
    pub async fn start_run(
        &self,
        graph_id: &GraphId,
        initial_state: State,
    ) -> Result<RunRecord, EngineError> {
        self.start_run_with(graph_id, initial_state, RunOptions::default())
            .await
    }

    /// Like [`start_run`](Self::start_run) with per-run overrides.
    pub async fn start_run_with(
        &self,
        graph_id: &GraphId,
        initial_state: State,
        options: RunOptions,
    ) -> Result<RunRecord, EngineError> {
        let graph = self.load_graph(graph_id).await?;
        let max_steps = options.max_steps.unwrap_or(self.config.max_steps);

        let mut run = RunRecord::new(RunId::generate(), graph_id.clone(), initial_state);
        self.runs.save(&run.run_id, &run).await?;
        info!(run_id = %run.run_id, graph_id = %graph_id, "Run started");

        self.drive(&graph, &mut run, max_steps).await?;

        info!(
            run_id = %run.run_id,
            status = %run.status,
            "Run finished after {} log entries",
            run.log.len()
        );
        Ok(run)
    }

    async fn drive(
        &self,
        graph: &GraphDef,
        run: &mut RunRecord,
        max_steps: u32,
    ) -> Result<(), EngineError> {
        let mut current = graph.start.clone();
        let mut steps: u32 = 0;

        loop {
            let node = match graph.node(current.as_str()) {
                Some(node) => node,
                None => {
                    debug!(run_id = %run.run_id, "Node '{}' not in graph, closing path", current);
                    run.complete();
                    return self.checkpoint(run).await;
                }
            };

            run.push_log(format!("running: {}", node.name));
            info!(run_id = %run.run_id, "Running node '{}'", node.name);

            let transform = match self.registry.get(&node.func) {
                Some(transform) => transform,
                None => {
                    let failure = RunFailure::MissingNodeFunction {
                        node: node.name.clone(),
                        func: node.func.clone(),
                    };
                    return self.fail(run, failure).await;
                }
            };

            let outcome = self.invoke(node, transform.as_ref(), &run.state).await;
            match outcome {
                Ok(Some(update)) => run.state.merge(update),
                Ok(None) => {}
                Err(failure) => return self.fail(run, failure).await,
            }
            self.checkpoint(run).await?;

            current = match graph.edge(node.name.as_str()) {
                None => {
                    run.complete();
                    return self.checkpoint(run).await;
                }
                Some(Edge::Direct(target)) => target.clone(),
                Some(Edge::Conditional(condition)) => match condition.evaluate(&run.state) {
                    Ok(next) => next.clone(),
                    Err(source) => {
                        let failure = RunFailure::MalformedCondition {
                            node: node.name.clone(),
                            source,
                        };
                        return self.fail(run, failure).await;
                    }
                },
            };

            steps += 1;
            if steps > max_steps {
                return self
                    .fail(run, RunFailure::LoopGuardExceeded { limit: max_steps })
                    .await;
            }
        }
    }

    async fn invoke(
        &self,
        node: &NodeDef,
        transform: &dyn StateTransform,
        state: &State,
    ) -> Result<Option<State>, RunFailure> {
        let call = AssertUnwindSafe(transform.apply(state, &node.params)).catch_unwind();

        let outcome = match self.config.step_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(RunFailure::StepTimeout {
                        node: node.name.clone(),
                        millis: limit.as_millis(),
                    })
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(update)) => Ok(update),
            Ok(Err(e)) => Err(RunFailure::StepInvocation {
                node: node.name.clone(),
                details: e.to_string(),
            }),
            Err(payload) => Err(RunFailure::StepPanicked {
                node: node.name.clone(),
                details: panic_message(payload.as_ref()),
            }),
        }
    }

    async fn checkpoint(&self, run: &RunRecord) -> Result<(), EngineError> {
        self.runs.update(&run.run_id, run).await?;
        debug!(run_id = %run.run_id, status = %run.status, "Checkpoint written");
        Ok(())
    }

    async fn fail(&self, run: &mut RunRecord, failure: RunFailure) -> Result<(), EngineError> {
        warn!(run_id = %run.run_id, "Run failed: {}", failure);
        run.fail(&failure);
        self.checkpoint(run).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for constructing [`Interpreter`] instances.
pub struct InterpreterBuilder {
    graphs: Arc<dyn GraphStore>,
    runs: Arc<dyn RunStore>,
    registry: CapabilityRegistry,
    config: InterpreterConfig,
}

impl InterpreterBuilder {
    /// Creates a builder with an empty registry and default configuration.
    pub fn new(graphs: Arc<dyn GraphStore>, runs: Arc<dyn RunStore>) -> Self {
        Self {
            graphs,
            runs,
            registry: CapabilityRegistry::new(),
            config: InterpreterConfig::default(),
        }
    }

    /// Replaces the capability registry.
    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a step function.
    pub fn register<T: StateTransform + 'static>(
        mut self,
        name: impl Into<String>,
        transform: T,
    ) -> Self {
        self.registry.register(name, transform);
        self
    }

    /// Registers a synchronous closure as a step function.
    pub fn register_fn<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync + 'static,
    {
        self.registry.register_fn(name, func);
        self
    }

    /// Registers a blocking closure, run on the blocking thread pool.
    pub fn register_blocking<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&State, &Params) -> Result<Option<State>, StepError> + Send + Sync + 'static,
    {
        let name = name.into();
        let transform = BlockingTransform::new(name.clone(), func);
        self.registry.register(name, transform);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the step ceiling.
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    /// Sets a deadline for each step function call.
    pub fn step_timeout(mut self, limit: Duration) -> Self {
        self.config.step_timeout = Some(limit);
        self
    }

    /// Builds the interpreter.
    pub fn build(self) -> Interpreter {
        Interpreter {
            graphs: self.graphs,
            runs: self.runs,
            registry: self.registry,
            cache: GraphCache::new(),
            config: self.config,
        }
    }
}

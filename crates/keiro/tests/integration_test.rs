use async_trait::async_trait;
use keiro::prelude::*;
use keiro::{follow_run, RunEvent};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn state(entries: &[(&str, Value)]) -> State {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn noop(_: &State, _: &Params) -> Result<Option<State>, StepError> {
    Ok(None)
}

#[derive(Debug, Default)]
struct Counting {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl StateTransform for Counting {
    async fn apply(&self, _state: &State, _params: &Params) -> Result<Option<State>, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn test_single_node_without_edge_completes() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store.clone())
        .register_fn("noop", noop)
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("lonely", "noop"))
        .start_with("lonely")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, state(&[("anything", json!([1, 2, 3]))]))
        .await
        .expect("run executes");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.log.len(), 1);
    assert!(run.log[0].contains("lonely"));
}

async fn branch_for(initial: State) -> RunRecord {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_fn("noop", noop)
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("check", "noop"))
        .node(NodeDef::new("A", "noop"))
        .node(NodeDef::new("B", "noop"))
        .conditional("check", Condition::new("score", Operator::Gte, 50.0, "A", "B"))
        .start_with("check")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");
    engine
        .start_run(&graph_id, initial)
        .await
        .expect("run executes")
}

#[tokio::test]
async fn test_conditional_edge_branches_on_score() {
    let high = branch_for(state(&[("score", json!(60))])).await;
    assert_eq!(high.log, vec!["running: check", "running: A"]);
    assert_eq!(high.status, RunStatus::Completed);

    let low = branch_for(state(&[("score", json!(40))])).await;
    assert_eq!(low.log, vec!["running: check", "running: B"]);

    let absent = branch_for(State::new()).await;
    assert_eq!(absent.log, vec!["running: check", "running: B"]);
}

#[tokio::test]
async fn test_self_loop_hits_loop_guard() {
    let store = Arc::new(MemoryStore::new());
    let calls = Arc::new(AtomicU32::new(0));
    let engine = Interpreter::builder(store.clone(), store.clone())
        .register(
            "spin",
            Counting {
                calls: calls.clone(),
            },
        )
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("spin", "spin"))
        .edge("spin", "spin")
        .start_with("spin")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");

    assert_eq!(calls.load(Ordering::SeqCst), 201);
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.log.len(), 202);
    assert!(run
        .log
        .last()
        .is_some_and(|entry| entry.contains("loop limit exceeded")));
}

#[tokio::test]
async fn test_loop_guard_is_configurable() {
    let store = Arc::new(MemoryStore::new());
    let calls = Arc::new(AtomicU32::new(0));
    let engine = Interpreter::builder(store.clone(), store)
        .register(
            "spin",
            Counting {
                calls: calls.clone(),
            },
        )
        .max_steps(10)
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("spin", "spin"))
        .edge("spin", "spin")
        .start_with("spin")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 11);

    let run = engine
        .start_run_with(&graph_id, State::new(), RunOptions::new().max_steps(2))
        .await
        .expect("run executes");
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 14);
}

#[tokio::test]
async fn test_missing_function_fails_run() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store).build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("start", "not_registered"))
        .start_with("start")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .log
        .last()
        .is_some_and(|entry| entry.contains("not_registered")));
}

#[tokio::test]
async fn test_step_output_merges_into_state() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_fn("set_a", |_, _| Ok(Some(state(&[("a", json!(1))]))))
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("set", "set_a"))
        .start_with("set")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, state(&[("a", json!(0)), ("b", json!(2))]))
        .await
        .expect("run executes");

    assert_eq!(run.state, state(&[("a", json!(1)), ("b", json!(2))]));
}

#[tokio::test]
async fn test_params_reach_step_function() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_fn("greet", |_, params| {
            let who = params
                .get("who")
                .and_then(|v| v.as_str())
                .ok_or_else(|| StepError::new("missing 'who' param"))?;
            Ok(Some(state(&[("greeting", json!(format!("hello {}", who)))])))
        })
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("greet", "greet").with_param("who", "keiro"))
        .start_with("greet")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");
    assert_eq!(run.state.get("greeting"), Some(&json!("hello keiro")));
    assert!(!run.state.contains_key("who"));
}

#[tokio::test]
async fn test_run_inspection_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_fn("noop", noop)
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("a", "noop"))
        .node(NodeDef::new("b", "noop"))
        .edge("a", "b")
        .start_with("a")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");
    let run = engine
        .start_run(&graph_id, state(&[("k", json!("v"))]))
        .await
        .expect("run executes");

    let first = engine.get_run(&run.run_id).await.expect("stored");
    let second = engine.get_run(&run.run_id).await.expect("stored");
    assert_eq!(first, second);
    assert_eq!(first, run);
}

#[tokio::test]
async fn test_unknown_graph_creates_no_run() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store.clone()).build();

    let result = engine
        .start_run(&GraphId::new("does-not-exist"), State::new())
        .await;

    assert!(matches!(result, Err(EngineError::GraphNotFound(id)) if id.as_str() == "does-not-exist"));
    assert_eq!(store.run_count().await, 0);
}

#[tokio::test]
async fn test_run_management() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_fn("noop", noop)
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("a", "noop"))
        .start_with("a")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph.clone()).await.expect("created");

    assert_eq!(engine.list_graph_ids().await.expect("listed"), vec![graph_id.clone()]);
    let listed = engine.list_graphs().await.expect("listed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_ref(), Some(&graph_id));

    let first = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");
    let second = engine
        .start_run(&graph_id, State::new())
        .await
        .expect("run executes");
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(engine.list_runs().await.expect("listed").len(), 2);

    engine.delete_run(&first.run_id).await.expect("deleted");
    assert!(matches!(
        engine.get_run(&first.run_id).await,
        Err(EngineError::RunNotFound(_))
    ));
    assert!(matches!(
        engine.delete_run(&first.run_id).await,
        Err(EngineError::RunNotFound(_))
    ));
    assert_eq!(engine.list_runs().await.expect("listed").len(), 1);
}

#[derive(Debug)]
struct Gate {
    release: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl StateTransform for Gate {
    async fn apply(&self, _state: &State, _params: &Params) -> Result<Option<State>, StepError> {
        self.release.notified().await;
        Ok(Some(state(&[("opened", json!(true))])))
    }
}

#[tokio::test]
async fn test_checkpoints_are_visible_while_running() {
    let store = Arc::new(MemoryStore::new());
    let release = Arc::new(tokio::sync::Notify::new());
    let engine = Arc::new(
        Interpreter::builder(store.clone(), store.clone())
            .register_fn("noop", noop)
            .register(
                "gate",
                Gate {
                    release: release.clone(),
                },
            )
            .build(),
    );
    let graph = GraphDef::builder()
        .node(NodeDef::new("first", "noop"))
        .node(NodeDef::new("wait", "gate"))
        .edge("first", "wait")
        .start_with("first")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let handle = {
        let engine = engine.clone();
        let graph_id = graph_id.clone();
        tokio::spawn(async move { engine.start_run(&graph_id, State::new()).await })
    };

    let run_id = loop {
        let runs = engine.list_runs().await.expect("listed");
        if let Some(run) = runs.values().find(|r| r.log.len() == 1) {
            break run.run_id.clone();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    let mid_run = engine.get_run(&run_id).await.expect("stored");
    assert_eq!(mid_run.status, RunStatus::Running);
    assert_eq!(mid_run.log, vec!["running: first"]);

    let mut events = follow_run(store.clone(), run_id.clone(), Duration::from_millis(5));
    assert_eq!(
        events.recv().await,
        Some(RunEvent::Log("running: first".to_string()))
    );

    release.notify_one();
    let finished = handle
        .await
        .expect("task joins")
        .expect("run executes");
    assert_eq!(finished.status, RunStatus::Completed);

    assert_eq!(
        events.recv().await,
        Some(RunEvent::Log("running: wait".to_string()))
    );
    assert_eq!(
        events.recv().await,
        Some(RunEvent::Finished {
            status: RunStatus::Completed,
            state: state(&[("opened", json!(true))]),
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(
        Interpreter::builder(store.clone(), store)
            .register_fn("inc", |state, params| {
                let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                let by = params.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
                Ok(Some([("n", json!(n + by))].into_iter().collect()))
            })
            .build(),
    );
    let graph = GraphDef::builder()
        .node(NodeDef::new("inc", "inc").with_param("by", 2))
        .node(NodeDef::new("done", "inc").with_param("by", 0))
        .conditional("inc", Condition::new("n", Operator::Lt, 20.0, "inc", "done"))
        .start_with("inc")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            let graph_id = graph_id.clone();
            tokio::spawn(async move {
                engine
                    .start_run(&graph_id, state(&[("n", json!(i))]))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let run = handle.await.expect("task joins").expect("run executes");
        assert_eq!(run.status, RunStatus::Completed);
        let start = i as i64;
        let expected = if start % 2 == 0 { 20 } else { 21 };
        assert_eq!(run.state.get("n"), Some(&json!(expected)));
    }
}

#[tokio::test]
async fn test_blocking_step_function() {
    let store = Arc::new(MemoryStore::new());
    let engine = Interpreter::builder(store.clone(), store)
        .register_blocking("count_lines", |state, _| {
            let text = state.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(Some([("lines", json!(text.lines().count()))].into_iter().collect()))
        })
        .build();
    let graph = GraphDef::builder()
        .node(NodeDef::new("count", "count_lines"))
        .start_with("count")
        .build()
        .expect("valid graph");
    let graph_id = engine.create_graph(graph).await.expect("created");

    let run = engine
        .start_run(&graph_id, state(&[("text", json!("a\nb\nc"))]))
        .await
        .expect("run executes");
    assert_eq!(run.state.get("lines"), Some(&json!(3)));
}

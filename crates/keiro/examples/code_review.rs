//! Code review graph that loops on a quality threshold.
//!
//! Demonstrates:
//! - Step functions as closures and as a `StateTransform` type
//! - Node parameters
//! - A conditional edge that loops back until the score is high enough
//! - Replaying a finished run's log from the store with `follow_run`

use async_trait::async_trait;
use keiro::prelude::*;
use keiro::{follow_run, RunEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE: &str = r#"def load(path):
    # TODO: handle missing files
    return open(path).read()

def parse(text):
    rows = []
    for line in text.splitlines():
        rows.append(line.split(","))
    # FIXME: this is a very long comment that keeps going well past the point where anyone would want to read it
    return rows
"#;

fn code(state: &State) -> &str {
    state.get("code").and_then(Value::as_str).unwrap_or("")
}

fn function_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("def ")
        .and_then(|rest| rest.split('(').next())
        .map(str::trim)
}

fn extract_functions(state: &State, _: &Params) -> Result<Option<State>, StepError> {
    let functions: Vec<&str> = code(state).lines().filter_map(function_name).collect();
    Ok(Some([("functions", json!(functions))].into_iter().collect()))
}

fn check_complexity(state: &State, _: &Params) -> Result<Option<State>, StepError> {
    let mut per_function: Vec<(String, u64)> = Vec::new();
    for line in code(state).lines() {
        match function_name(line) {
            Some(name) => per_function.push((name.to_string(), 0)),
            None => {
                if let Some((_, lines)) = per_function.last_mut() {
                    *lines += 1;
                }
            }
        }
    }

    let scores: serde_json::Map<String, Value> = per_function
        .into_iter()
        .map(|(name, lines)| (name, json!((lines / 5 + 1).max(1))))
        .collect();
    Ok(Some([("complexity", Value::Object(scores))].into_iter().collect()))
}

fn detect_issues(state: &State, params: &Params) -> Result<Option<State>, StepError> {
    let max_len = params
        .get("max_line_length")
        .and_then(Value::as_u64)
        .unwrap_or(120) as usize;

    let mut issues = Vec::new();
    for (i, line) in code(state).lines().enumerate() {
        if line.len() > max_len {
            issues.push(json!({"line": i + 1, "issue": "long_line"}));
        }
        if line.contains("TODO") || line.contains("FIXME") {
            issues.push(json!({"line": i + 1, "issue": "todo_found"}));
        }
    }

    let count = issues.len();
    Ok(Some(
        [("issues", json!(issues)), ("issues_count", json!(count))]
            .into_iter()
            .collect(),
    ))
}

fn compute_quality(state: &State, _: &Params) -> Result<Option<State>, StepError> {
    let issues = state
        .get("issues_count")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let average = state
        .get("complexity")
        .and_then(Value::as_object)
        .filter(|c| !c.is_empty())
        .map(|c| c.values().filter_map(Value::as_f64).sum::<f64>() / c.len() as f64)
        .unwrap_or(0.0);

    let score = (100 - issues * 5 - average as i64 * 5).max(0);
    Ok(Some([("quality_score", json!(score))].into_iter().collect()))
}

#[derive(Debug)]
struct RefactorStep;

#[async_trait]
impl StateTransform for RefactorStep {
    async fn apply(&self, state: &State, _params: &Params) -> Result<Option<State>, StepError> {
        let cleaned = code(state)
            .replace("FIXME", "")
            .replace("TODO", "")
            .replace(
                "this is a very long comment that keeps going well past the point where anyone would want to read it",
                "short comment",
            );

        let passes = state.get("refactor_passes").and_then(Value::as_i64).unwrap_or(0);
        Ok(Some(
            [
                ("code", json!(cleaned.trim())),
                ("refactor_passes", json!(passes + 1)),
            ]
            .into_iter()
            .collect(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(
        Interpreter::builder(store.clone(), store.clone())
            .register_fn("extract_functions", extract_functions)
            .register_fn("check_complexity", check_complexity)
            .register_fn("detect_issues", detect_issues)
            .register_fn("compute_quality", compute_quality)
            .register("refactor_code", RefactorStep)
            .register_fn("report", |_, _| Ok(None))
            .max_steps(50)
            .build(),
    );

    let graph = GraphDef::builder()
        .node(NodeDef::new("extract", "extract_functions"))
        .node(NodeDef::new("complexity", "check_complexity"))
        .node(NodeDef::new("issues", "detect_issues").with_param("max_line_length", 100))
        .node(NodeDef::new("quality", "compute_quality"))
        .node(NodeDef::new("refactor", "refactor_code"))
        .node(NodeDef::new("report", "report"))
        .edge("extract", "complexity")
        .edge("complexity", "issues")
        .edge("issues", "quality")
        .conditional(
            "quality",
            Condition::new("quality_score", Operator::Gte, 90.0, "report", "refactor"),
        )
        .edge("refactor", "extract")
        .start_with("extract")
        .build()?;
    let graph_id = engine.create_graph(graph).await?;

    let initial: State = [("code", json!(SAMPLE))].into_iter().collect();
    let handle = {
        let engine = Arc::clone(&engine);
        let graph_id = graph_id.clone();
        tokio::spawn(async move { engine.start_run(&graph_id, initial).await })
    };

    let run = handle.await??;
    println!("Run {} finished: {}", run.run_id, run.status);

    let mut events = follow_run(store, run.run_id.clone(), Duration::from_millis(50));
    while let Some(event) = events.recv().await {
        match event {
            RunEvent::Log(entry) => println!("  {}", entry),
            RunEvent::NotFound => println!("  (run not found)"),
            RunEvent::Finished { status, state } => {
                println!("Status: {}", status);
                println!("Quality: {}", state.get("quality_score").unwrap_or(&Value::Null));
                println!("Refactor passes: {}", state.get("refactor_passes").unwrap_or(&json!(0)));
            }
        }
    }

    Ok(())
}

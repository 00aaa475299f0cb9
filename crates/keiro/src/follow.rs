//! Live view of a run's log, built by polling the run store.

use keiro_core::{RunId, RunStatus, RunStore, State};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Something observed while following a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A log entry appended since the previous poll.
    Log(String),
    /// The run id is not (yet) in the store.
    NotFound,
    /// The run left `running`. No further events follow.
    Finished {
        /// The terminal status.
        status: RunStatus,
        /// The final state.
        state: State,
    },
}

/// Follows a run until it finishes.
///
/// Spawns a task on the current tokio runtime that polls `runs` every
/// `poll_interval`, emitting each new log line in order and a final
/// [`RunEvent::Finished`]. `NotFound` is emitted once each time the run is
/// observed missing. Polling stops when the receiver is dropped.
pub fn follow_run(
    runs: Arc<dyn RunStore>,
    run_id: RunId,
    poll_interval: Duration,
) -> mpsc::Receiver<RunEvent> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut seen = 0usize;
        let mut reported_missing = false;

        loop {
            match runs.get(&run_id).await {
                Ok(Some(run)) => {
                    reported_missing = false;
                    for entry in run.log.iter().skip(seen) {
                        if tx.send(RunEvent::Log(entry.clone())).await.is_err() {
                            return;
                        }
                    }
                    seen = seen.max(run.log.len());

                    if run.status.is_terminal() {
                        let finished = RunEvent::Finished {
                            status: run.status,
                            state: run.state,
                        };
                        let _ = tx.send(finished).await;
                        debug!(run_id = %run_id, "Stopped following finished run");
                        return;
                    }
                }
                Ok(None) => {
                    if !reported_missing {
                        reported_missing = true;
                        if tx.send(RunEvent::NotFound).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(run_id = %run_id, "Polling run failed: {}", e);
                }
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    rx
}

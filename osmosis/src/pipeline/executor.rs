//! Thread-per-stage pipeline execution.

use super::TaskManager;
use crate::config::PipelineConfig;
use crate::errors::{OsmosisError, OsmosisResult};
use crate::observability::{LoggingStageObserver, SpanTimer, StageObserver};
use crate::task::RunnableTask;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// A connected pipeline, ready to run once.
pub struct Pipeline {
    managers: Vec<TaskManager>,
    config: PipelineConfig,
}

impl Pipeline {
    pub(crate) fn new(managers: Vec<TaskManager>, config: PipelineConfig) -> Self {
        Self { managers, config }
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.managers.len()
    }

    /// Returns the number of tasks owning a thread.
    #[must_use]
    pub fn runnable_count(&self) -> usize {
        self.managers.iter().filter(|manager| manager.is_runnable()).count()
    }

    /// Returns the task ids in declaration order.
    #[must_use]
    pub fn task_ids(&self) -> Vec<&str> {
        self.managers.iter().map(TaskManager::task_id).collect()
    }

    /// Returns the configuration the pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline with a logging observer.
    pub fn execute(self) -> OsmosisResult<ExecutionReport> {
        PipelineExecutor::new(self.config.clone()).run(self)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("tasks", &self.task_ids())
            .field("runnable", &self.runnable_count())
            .finish()
    }
}

/// Timing of one stage thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// The task id.
    pub task_id: String,
    /// Wall time of the stage's `run`.
    pub duration_ms: f64,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Id of the run, as logged with every stage event.
    pub run_id: Uuid,
    /// Wall time of the whole run.
    pub duration_ms: f64,
    /// Stage timings in order of completion.
    pub stages: Vec<StageReport>,
}

struct StageOutcome {
    task_id: String,
    duration_ms: f64,
    result: OsmosisResult<()>,
}

/// Runs every runnable stage of a pipeline on its own thread.
pub struct PipelineExecutor {
    config: PipelineConfig,
    observer: Arc<dyn StageObserver>,
}

impl PipelineExecutor {
    /// Creates an executor logging stage events through `tracing`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            observer: Arc::new(LoggingStageObserver),
        }
    }

    /// Replaces the stage observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the pipeline and waits for every stage thread.
    ///
    /// Succeeds only if every stage completed. Otherwise returns the root
    /// failure as [`OsmosisError::StageFailed`]: the first stage to fail on
    /// its own account, or the first failure at all if every stage only saw
    /// a failure elsewhere.
    pub fn run(&self, mut pipeline: Pipeline) -> OsmosisResult<ExecutionReport> {
        let run_id = Uuid::new_v4();
        let timer = SpanTimer::start("pipeline.run");

        let stages: Vec<(String, Box<dyn RunnableTask>)> = pipeline
            .managers
            .iter_mut()
            .filter_map(|manager| {
                let task_id = manager.task_id().to_string();
                manager.take_runnable().map(|runnable| (task_id, runnable))
            })
            .collect();
        tracing::info!(%run_id, stages = stages.len(), "Starting pipeline");

        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(stages.len());
        let mut spawn_failure = None;
        let mut pending = stages.into_iter();
        for (task_id, runnable) in pending.by_ref() {
            match self.spawn_stage(run_id, task_id.clone(), runnable, outcomes_tx.clone()) {
                Ok(handle) => handles.push((task_id, handle)),
                Err(err) => {
                    tracing::error!(%run_id, task_id = %task_id, error = %err, "Failed to start stage thread");
                    spawn_failure = Some((task_id, err));
                    break;
                }
            }
        }
        // Unstarted stages release their postbox endpoints when dropped.
        drop(pending);
        drop(outcomes_tx);

        let mut outcomes: Vec<StageOutcome> = outcomes_rx.iter().collect();
        for (task_id, handle) in handles {
            if handle.join().is_err() && !outcomes.iter().any(|outcome| outcome.task_id == task_id) {
                tracing::error!(%run_id, task_id = %task_id, "Stage thread died without reporting");
                outcomes.push(StageOutcome {
                    task_id,
                    duration_ms: 0.0,
                    result: Err(OsmosisError::Panicked("stage thread died without reporting".to_string())),
                });
            }
        }
        drop(pipeline);

        let duration_ms = timer.finish();
        if let Some((task_id, err)) = spawn_failure {
            return Err(OsmosisError::StageFailed {
                task_id,
                source: Box::new(err.into()),
            });
        }
        let (failed, succeeded): (Vec<StageOutcome>, Vec<StageOutcome>) =
            outcomes.into_iter().partition(|outcome| outcome.result.is_err());
        let mut failures: Vec<(String, OsmosisError)> = failed
            .into_iter()
            .filter_map(|outcome| outcome.result.err().map(|err| (outcome.task_id, err)))
            .collect();
        if let Some(index) = root_failure(&failures) {
            let (task_id, source) = failures.swap_remove(index);
            tracing::error!(%run_id, task_id = %task_id, duration_ms, error = %source, "Pipeline failed");
            return Err(OsmosisError::StageFailed {
                task_id,
                source: Box::new(source),
            });
        }

        tracing::info!(%run_id, duration_ms, "Pipeline completed");
        Ok(ExecutionReport {
            run_id,
            duration_ms,
            stages: succeeded
                .into_iter()
                .map(|outcome| StageReport {
                    task_id: outcome.task_id,
                    duration_ms: outcome.duration_ms,
                })
                .collect(),
        })
    }

    fn spawn_stage(
        &self,
        run_id: Uuid,
        task_id: String,
        mut runnable: Box<dyn RunnableTask>,
        outcomes: mpsc::Sender<StageOutcome>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(format!("{}{}", self.config.thread_name_prefix, task_id));
        if let Some(stack_size) = self.config.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }
        let observer = Arc::clone(&self.observer);

        builder.spawn(move || {
            let timer = SpanTimer::start(task_id.clone());
            let mut result = panic::catch_unwind(AssertUnwindSafe(|| {
                observer.stage_started(run_id, &task_id);
                let result = runnable.run();
                drop(runnable);
                result
            }))
            .unwrap_or_else(|payload| Err(OsmosisError::Panicked(panic_message(payload.as_ref()))));
            let duration_ms = timer.finish();

            let notified = panic::catch_unwind(AssertUnwindSafe(|| match &result {
                Ok(()) => observer.stage_finished(run_id, &task_id, duration_ms),
                Err(err) => observer.stage_failed(run_id, &task_id, duration_ms, err),
            }));
            if let Err(payload) = notified {
                if result.is_ok() {
                    result = Err(OsmosisError::Panicked(panic_message(payload.as_ref())));
                }
            }
            // The receiver lives until every stage has reported.
            let _ = outcomes.send(StageOutcome {
                task_id,
                duration_ms,
                result,
            });
        })
    }
}

impl fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Picks the failure to report among failures in completion order.
fn root_failure(failures: &[(String, OsmosisError)]) -> Option<usize> {
    if failures.is_empty() {
        return None;
    }
    Some(
        failures
            .iter()
            .position(|(_, err)| !err.is_propagated())
            .unwrap_or(0),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PostboxError;
    use pretty_assertions::assert_eq;

    fn failure(task_id: &str, err: OsmosisError) -> (String, OsmosisError) {
        (task_id.to_string(), err)
    }

    #[test]
    fn test_root_failure_prefers_own_error() {
        let failures = vec![
            failure("write", PostboxError::UpstreamFailed.into()),
            failure("filter", OsmosisError::task("bad data")),
            failure("read", OsmosisError::task("later")),
        ];
        assert_eq!(root_failure(&failures), Some(1));
    }

    #[test]
    fn test_root_failure_falls_back_to_first_echo() {
        let failures = vec![
            failure("read", PostboxError::OutputReleased.into()),
            failure("write", PostboxError::UpstreamFailed.into()),
        ];
        assert_eq!(root_failure(&failures), Some(0));
        assert_eq!(root_failure(&[]), None);
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("stage exploded")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "stage exploded");

        let payload = panic::catch_unwind(|| panic!("{} items", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "3 items");
    }
}

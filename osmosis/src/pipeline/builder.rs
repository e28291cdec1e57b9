//! Pipeline builder: resolves task configurations into a connected graph.

use super::{PipeRef, PipeTasks, Pipeline, PipelineSpec, TaskConfiguration, TaskManager};
use crate::config::PipelineConfig;
use crate::errors::{OsmosisError, OsmosisResult, PipelineConfigError};
use crate::observability::SpanTimer;
use crate::registry::{TaskContext, TaskRegistry};
use crate::task::AnySink;
use std::collections::{HashMap, HashSet};

/// Builder for creating connected pipelines.
///
/// Building runs entirely on the calling thread. All tasks are created
/// first, then connected in declaration order, then assembled. Every task
/// created before a build error is released before the error is returned.
#[derive(Debug)]
pub struct PipelineBuilder<'r> {
    registry: &'r TaskRegistry,
    config: PipelineConfig,
    tasks: Vec<TaskConfiguration>,
}

impl<'r> PipelineBuilder<'r> {
    /// Creates a builder resolving task types through `registry`.
    #[must_use]
    pub fn new(registry: &'r TaskRegistry) -> Self {
        Self {
            registry,
            config: PipelineConfig::default(),
            tasks: Vec::new(),
        }
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a task.
    #[must_use]
    pub fn task(mut self, task: TaskConfiguration) -> Self {
        self.tasks.push(task);
        self
    }

    /// Appends several tasks in order.
    #[must_use]
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = TaskConfiguration>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Appends every task of a specification.
    #[must_use]
    pub fn spec(self, spec: PipelineSpec) -> Self {
        self.tasks(spec.tasks)
    }

    /// Returns the number of tasks added so far.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the task list is empty, a task id is
    /// repeated, a task type or argument is rejected, a pipe cannot be
    /// resolved or is left dangling, or no task owns a thread.
    pub fn build(self) -> OsmosisResult<Pipeline> {
        let timer = SpanTimer::start("pipeline.build");
        self.config.validate()?;
        self.validate_task_ids()?;

        let mut managers = self
            .tasks
            .iter()
            .map(|task| self.create_manager(task))
            .collect::<OsmosisResult<Vec<_>>>()?;
        if !managers.iter().any(TaskManager::is_runnable) {
            return Err(PipelineConfigError::no_runnable_stage().into());
        }

        let mut pipes = PipeTasks::new(self.tasks.iter().map(|task| task.id.clone()));
        for manager in &mut managers {
            manager.connect(&mut pipes)?;
        }
        pipes.verify_all_consumed()?;

        assemble(&mut managers)?;

        tracing::info!(
            tasks = managers.len(),
            runnable = managers.iter().filter(|manager| manager.is_runnable()).count(),
            duration_ms = timer.finish(),
            "Built pipeline"
        );
        Ok(Pipeline::new(managers, self.config))
    }

    fn validate_task_ids(&self) -> Result<(), PipelineConfigError> {
        if self.tasks.is_empty() {
            return Err(PipelineConfigError::empty_pipeline());
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(PipelineConfigError::duplicate_task_id(&task.id));
            }
        }
        Ok(())
    }

    fn create_manager(&self, task: &TaskConfiguration) -> OsmosisResult<TaskManager> {
        let mut context = TaskContext::new(task, &self.config);
        let manager = self.registry.create_task_manager(&mut context)?;
        if manager.task_id() != task.id {
            return Err(OsmosisError::illegal_state(format!(
                "Factory for '{}' returned a manager for task '{}'",
                task.task_type,
                manager.task_id()
            )));
        }
        context.verify_arguments()?;
        tracing::debug!(task_id = %task.id, task_type = %task.task_type, "Created task");
        Ok(manager)
    }
}

/// Attaches every task to its downstream sinks.
///
/// Runs in reverse declaration order so that each consumer's input sinks
/// exist before the producer feeding them is assembled.
fn assemble(managers: &mut [TaskManager]) -> OsmosisResult<()> {
    let mut sinks: HashMap<PipeRef, AnySink> = HashMap::new();
    let result = managers
        .iter_mut()
        .rev()
        .try_for_each(|manager| manager.assemble(&mut sinks));

    let leftover = sinks.len();
    for (_, mut sink) in sinks.drain() {
        sink.release();
    }
    result?;
    if leftover > 0 {
        return Err(OsmosisError::illegal_state(format!(
            "{leftover} input sinks were not attached to a producer"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::test_registry;
    use pretty_assertions::assert_eq;

    fn build(registry: &TaskRegistry, tasks: Vec<TaskConfiguration>) -> OsmosisResult<Pipeline> {
        PipelineBuilder::new(registry).tasks(tasks).build()
    }

    fn code(result: OsmosisResult<Pipeline>) -> String {
        match result {
            Err(err) => err.config_code().unwrap_or_default().to_string(),
            Ok(pipeline) => panic!("expected configuration error, built {pipeline:?}"),
        }
    }

    #[test]
    fn test_compatible_graph_builds() {
        let (registry, _probe) = test_registry();
        let pipeline = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake").with_arg("count", "3"),
                TaskConfiguration::new("buf", "buffer").with_arg("bufferCapacity", "2"),
                TaskConfiguration::new("tee", "tee"),
                TaskConfiguration::new("write-a", "write-collect"),
                TaskConfiguration::new("write-b", "write-null"),
            ],
        )
        .unwrap();

        assert_eq!(pipeline.stage_count(), 5);
        assert_eq!(pipeline.runnable_count(), 2);
        assert_eq!(pipeline.task_ids(), vec!["read", "buf", "tee", "write-a", "write-b"]);
    }

    #[test]
    fn test_empty_and_duplicate_rejected() {
        let (registry, _probe) = test_registry();
        assert_eq!(code(build(&registry, Vec::new())), "PIPE-011-EMPTY");

        let duplicate = vec![
            TaskConfiguration::new("read", "read-fake"),
            TaskConfiguration::new("read", "write-null"),
        ];
        assert_eq!(code(build(&registry, duplicate)), "PIPE-002-DUPLICATE_ID");
    }

    #[test]
    fn test_unknown_type_and_argument() {
        let (registry, _probe) = test_registry();
        let unknown = vec![TaskConfiguration::new("read", "read-xml")];
        assert_eq!(code(build(&registry, unknown)), "PIPE-001-UNKNOWN_TYPE");

        let bad_arg = vec![
            TaskConfiguration::new("read", "read-fake"),
            TaskConfiguration::new("write", "write-null").with_arg("file", "out.osm"),
        ];
        assert_eq!(code(build(&registry, bad_arg)), "PIPE-003-ARGUMENT");
    }

    #[test]
    fn test_capability_mismatch_names_consumer() {
        let (registry, _probe) = test_registry();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake"),
                TaskConfiguration::new("write", "write-null-change"),
            ],
        );

        let Err(OsmosisError::Configuration(err)) = result else {
            panic!("expected capability mismatch");
        };
        assert_eq!(err.code(), Some("PIPE-007-CAPABILITY"));
        assert_eq!(err.tasks[0], "write");
    }

    #[test]
    fn test_dangling_output_rejected() {
        let (registry, probe) = test_registry();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake"),
                TaskConfiguration::new("tee", "tee"),
                TaskConfiguration::new("write", "write-collect"),
            ],
        );

        assert_eq!(code(result), "PIPE-010-DANGLING");
        assert_eq!(probe.releases(), 1);
    }

    #[test]
    fn test_missing_input_rejected() {
        let (registry, _probe) = test_registry();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("write", "write-null"),
                TaskConfiguration::new("read", "read-fake"),
            ],
        );
        assert_eq!(code(result), "PIPE-006-MISSING_INPUT");
    }

    #[test]
    fn test_no_runnable_stage() {
        let registry = TaskRegistry::with_builtins().unwrap();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("null", "write-null"),
                TaskConfiguration::new("tee", "tee"),
            ],
        );
        assert_eq!(code(result), "PIPE-012-NO_SOURCE");
    }

    #[test]
    fn test_explicit_pipes_route_tee_outputs() {
        let (registry, _probe) = test_registry();
        let pipeline = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake"),
                TaskConfiguration::new("tee", "tee")
                    .with_pipe_out("write-b", 0)
                    .with_pipe_out("write-a", 0),
                TaskConfiguration::new("write-a", "write-collect"),
                TaskConfiguration::new("write-b", "write-null").with_pipe_in("tee", 0),
            ],
        );
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_forward_pipe_in_rejected() {
        let (registry, _probe) = test_registry();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake"),
                TaskConfiguration::new("write", "write-null").with_pipe_in("later", 0),
                TaskConfiguration::new("later", "write-null"),
            ],
        );
        assert_eq!(code(result), "PIPE-004-UNKNOWN_PIPE");
    }

    #[test]
    fn test_backward_pipe_out_rejected() {
        let (registry, _probe) = test_registry();
        let result = build(
            &registry,
            vec![
                TaskConfiguration::new("read", "read-fake"),
                TaskConfiguration::new("pass", "pass-fake").with_pipe_out("read", 0),
            ],
        );
        assert_eq!(code(result), "PIPE-009-CYCLE");
    }
}

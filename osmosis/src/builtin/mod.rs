//! Built-in tasks available in every registry.
//!
//! | Task type             | Alias | Kind                                   |
//! |-----------------------|-------|----------------------------------------|
//! | `buffer`              | `b`   | entity sink, runnable entity source    |
//! | `buffer-change`       | `bc`  | change sink, runnable change source    |
//! | `tee`                 | `t`   | entity sink, multiple entity sources   |
//! | `tee-change`          | `tc`  | change sink, multiple change sources   |
//! | `write-null`          | `wn`  | entity sink                            |
//! | `write-null-change`   | `wnc` | change sink                            |
//! | `log-progress`        | `lp`  | entity sink and source                 |
//! | `log-progress-change` | `lpc` | change sink and source                 |

mod buffer;
mod null;
mod progress;
mod tee;

pub use buffer::Buffer;
pub use null::NullSink;
pub use progress::ProgressLogger;
pub use tee::Tee;

use crate::errors::{OsmosisResult, PipelineConfigError};
use crate::pipeline::TaskManager;
use crate::registry::{TaskContext, TaskRegistry};
use crate::task::TaskKind;
use std::time::Duration;

const DEFAULT_OUTPUT_COUNT: usize = 2;

/// Registers the built-in task types and their aliases.
pub fn register_builtin_tasks(registry: &TaskRegistry) -> OsmosisResult<()> {
    registry.register("buffer", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let capacity = buffer_capacity(context)?;
        Ok(context.manager(TaskKind::SinkRunnableSource(Box::new(Buffer::new(capacity)?))))
    })?;
    registry.register("buffer-change", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let capacity = buffer_capacity(context)?;
        Ok(context.manager(TaskKind::ChangeSinkRunnableChangeSource(Box::new(Buffer::new(capacity)?))))
    })?;
    registry.register("tee", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let outputs = output_count(context)?;
        Ok(context.manager(TaskKind::SinkMultiSource(Box::new(Tee::new(outputs)))))
    })?;
    registry.register("tee-change", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let outputs = output_count(context)?;
        Ok(context.manager(TaskKind::ChangeSinkMultiChangeSource(Box::new(Tee::new(outputs)))))
    })?;
    registry.register("write-null", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        Ok(context.manager(TaskKind::Sink(Box::new(NullSink::new()))))
    })?;
    registry.register("write-null-change", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        Ok(context.manager(TaskKind::ChangeSink(Box::new(NullSink::new()))))
    })?;
    registry.register("log-progress", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let interval = progress_interval(context)?;
        let logger = ProgressLogger::new(context.task_id(), interval);
        Ok(context.manager(TaskKind::SinkSource(Box::new(logger))))
    })?;
    registry.register("log-progress-change", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
        let interval = progress_interval(context)?;
        let logger = ProgressLogger::new(context.task_id(), interval);
        Ok(context.manager(TaskKind::ChangeSinkChangeSource(Box::new(logger))))
    })?;

    for (alias, task_type) in [
        ("b", "buffer"),
        ("bc", "buffer-change"),
        ("t", "tee"),
        ("tc", "tee-change"),
        ("wn", "write-null"),
        ("wnc", "write-null-change"),
        ("lp", "log-progress"),
        ("lpc", "log-progress-change"),
    ] {
        registry.register_alias(alias, task_type)?;
    }
    Ok(())
}

fn buffer_capacity(context: &mut TaskContext<'_>) -> OsmosisResult<usize> {
    let default = context.settings().default_buffer_capacity;
    let capacity = context.usize_argument_or("bufferCapacity", default)?;
    if capacity == 0 {
        return Err(PipelineConfigError::argument(context.task_id(), "argument 'bufferCapacity' must be at least 1").into());
    }
    Ok(capacity)
}

fn output_count(context: &mut TaskContext<'_>) -> OsmosisResult<usize> {
    let count = context.usize_argument_or("outputCount", DEFAULT_OUTPUT_COUNT)?;
    if count == 0 {
        return Err(PipelineConfigError::argument(context.task_id(), "argument 'outputCount' must be at least 1").into());
    }
    Ok(count)
}

fn progress_interval(context: &mut TaskContext<'_>) -> OsmosisResult<Duration> {
    let default = i64::try_from(context.settings().progress_interval_secs).unwrap_or(i64::MAX);
    let secs = context.integer_argument_or("interval", default)?;
    match u64::try_from(secs) {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(PipelineConfigError::argument(context.task_id(), "argument 'interval' must be positive").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::TaskConfiguration;
    use crate::task::PortKind;
    use pretty_assertions::assert_eq;

    fn create(registry: &TaskRegistry, config: &TaskConfiguration) -> OsmosisResult<TaskManager> {
        let settings = PipelineConfig::default().with_default_buffer_capacity(7);
        let mut context = TaskContext::new(config, &settings);
        let manager = registry.create_task_manager(&mut context)?;
        context.verify_arguments()?;
        Ok(manager)
    }

    #[test]
    fn test_builtin_ports() {
        let registry = TaskRegistry::with_builtins().unwrap();

        let tee = create(&registry, &TaskConfiguration::new("t1", "t").with_arg("outputCount", "3")).unwrap();
        assert_eq!(tee.input_ports().to_vec(), vec![PortKind::Entity]);
        assert_eq!(tee.output_ports().to_vec(), vec![PortKind::Entity; 3]);

        let buffer = create(&registry, &TaskConfiguration::new("b1", "bc")).unwrap();
        assert!(buffer.is_runnable());
        assert_eq!(buffer.input_ports().to_vec(), vec![PortKind::Change]);

        let null = create(&registry, &TaskConfiguration::new("n1", "write-null")).unwrap();
        assert!(null.output_ports().is_empty());

        let progress = create(&registry, &TaskConfiguration::new("p1", "lp").with_arg("interval", "1")).unwrap();
        assert!(!progress.is_runnable());
        assert_eq!(progress.output_ports().to_vec(), vec![PortKind::Entity]);
    }

    #[test]
    fn test_invalid_builtin_arguments() {
        let registry = TaskRegistry::with_builtins().unwrap();
        for config in [
            TaskConfiguration::new("b1", "buffer").with_arg("bufferCapacity", "0"),
            TaskConfiguration::new("t1", "tee").with_arg("outputCount", "0"),
            TaskConfiguration::new("p1", "log-progress").with_arg("interval", "0"),
            TaskConfiguration::new("n1", "write-null").with_arg("file", "out.osm"),
        ] {
            let err = create(&registry, &config).unwrap_err();
            assert_eq!(err.config_code(), Some("PIPE-003-ARGUMENT"), "{}", config.id);
        }
    }
}

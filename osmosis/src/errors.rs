//! Error types for the osmosis pipeline engine.
//!
//! Configuration problems are detected while the pipeline is built and carry
//! a stable error code; runtime failures are raised by task logic or by the
//! postbox when a peer thread has gone away.

use crate::pipeline::PipeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type OsmosisResult<T> = Result<T, OsmosisError>;

/// The main error type for osmosis operations.
#[derive(Debug, Error)]
pub enum OsmosisError {
    /// The pipeline configuration is invalid.
    #[error("{0}")]
    Configuration(#[from] PipelineConfigError),

    /// A postbox operation failed.
    #[error("{0}")]
    Postbox(#[from] PostboxError),

    /// A pipeline stage failed while running on its own thread.
    #[error("Task '{task_id}' failed: {source}")]
    StageFailed {
        /// Id of the failing task.
        task_id: String,
        /// The underlying failure.
        #[source]
        source: Box<OsmosisError>,
    },

    /// A stage thread panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// Task logic reported a failure.
    #[error("Task error: {0}")]
    Task(String),

    /// A lifecycle method was called out of order.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error raised by a concrete task.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OsmosisError {
    /// Creates a task logic error.
    #[must_use]
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }

    /// Creates an illegal state error.
    #[must_use]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Returns true if this error only echoes a failure that happened on
    /// another thread (the peer of a postbox failed or went away).
    #[must_use]
    pub fn is_propagated(&self) -> bool {
        match self {
            Self::Postbox(PostboxError::UpstreamFailed | PostboxError::OutputReleased) => true,
            Self::StageFailed { source, .. } => source.is_propagated(),
            _ => false,
        }
    }

    /// Returns the configuration error code, if this is a configuration error.
    #[must_use]
    pub fn config_code(&self) -> Option<&str> {
        match self {
            Self::Configuration(err) => err.code(),
            _ => None,
        }
    }
}

/// Failure modes of the bounded postbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostboxError {
    /// The postbox was created with a capacity of zero.
    #[error("Postbox capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// Data was put before the producer called initialize.
    #[error("Postbox has not been initialized")]
    NotInitialized,

    /// Initialize was called twice on the same side.
    #[error("Postbox has already been initialized")]
    AlreadyInitialized,

    /// The producer side was already completed, failed or released.
    #[error("Postbox input is closed")]
    InputClosed,

    /// The producer failed or exited without completing.
    #[error("Upstream stage failed before completing its output")]
    UpstreamFailed,

    /// The consumer released its side; no further data will be read.
    #[error("Downstream stage released the postbox")]
    OutputReleased,

    /// The consumer asked for an element after the end of the stream.
    #[error("No more elements in postbox")]
    EndOfStream,
}

/// Diagnostic metadata attached to a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (e.g., "PIPE-007-CAPABILITY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when the pipeline cannot be built from its task configurations.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineConfigError {
    /// The error message.
    pub message: String,
    /// The task ids involved in the error.
    pub tasks: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl PipelineConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the task ids involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// No factory is registered under the task type.
    #[must_use]
    pub fn unknown_task_type(task_id: &str, task_type: &str) -> Self {
        Self::new(format!(
            "Task '{task_id}' has unknown task type '{task_type}'"
        ))
        .with_tasks(vec![task_id.to_string()])
        .with_error_info(
            ErrorInfo::new("PIPE-001-UNKNOWN_TYPE", format!("No factory for '{task_type}'"))
                .with_fix_hint("Check the task name for typos or load the plugin providing it."),
        )
    }

    /// Two task configurations share an id.
    #[must_use]
    pub fn duplicate_task_id(task_id: &str) -> Self {
        Self::new(format!("Task id '{task_id}' is used more than once"))
            .with_tasks(vec![task_id.to_string()])
            .with_error_info(ErrorInfo::new(
                "PIPE-002-DUPLICATE_ID",
                "Task ids must be unique",
            ))
    }

    /// A task argument is missing, malformed or not recognised.
    #[must_use]
    pub fn argument(task_id: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(format!("Task '{task_id}': {message}"))
            .with_tasks(vec![task_id.to_string()])
            .with_error_info(ErrorInfo::new("PIPE-003-ARGUMENT", message))
    }

    /// An input references a task that is unknown or declared later.
    #[must_use]
    pub fn unknown_pipe(consumer: &PipeRef, producer: &PipeRef, reason: &str) -> Self {
        Self::new(format!(
            "Task '{}' input {} references pipe {producer}: {reason}",
            consumer.task_id, consumer.slot
        ))
        .with_tasks(vec![consumer.task_id.clone(), producer.task_id.clone()])
        .with_error_info(
            ErrorInfo::new("PIPE-004-UNKNOWN_PIPE", format!("Pipe {producer} cannot be resolved"))
                .with_fix_hint("Inputs may only reference output slots of tasks declared earlier."),
        )
    }

    /// An output names a target task that is not declared.
    #[must_use]
    pub fn unknown_pipe_target(producer: &PipeRef, target: &PipeRef) -> Self {
        Self::new(format!(
            "Task '{}' output {} targets input {target}: no task with this id is declared",
            producer.task_id, producer.slot
        ))
        .with_tasks(vec![producer.task_id.clone()])
        .with_error_info(
            ErrorInfo::new("PIPE-004-UNKNOWN_PIPE", format!("Target {target} cannot be resolved"))
                .with_fix_hint("Outputs may only target tasks declared later in the pipeline."),
        )
    }

    /// A pipe was already consumed or is reserved for another consumer.
    #[must_use]
    pub fn pipe_conflict(consumer: &PipeRef, producer: &PipeRef, reason: &str) -> Self {
        Self::new(format!(
            "Task '{}' input {} cannot use pipe {producer}: {reason}",
            consumer.task_id, consumer.slot
        ))
        .with_tasks(vec![consumer.task_id.clone(), producer.task_id.clone()])
        .with_error_info(ErrorInfo::new(
            "PIPE-005-PIPE_CONFLICT",
            format!("Pipe {producer} is not available"),
        ))
    }

    /// No pipe is available for an input slot.
    #[must_use]
    pub fn missing_input(consumer: &PipeRef) -> Self {
        Self::new(format!(
            "Task '{}' input {} has no pipe available to connect to",
            consumer.task_id, consumer.slot
        ))
        .with_tasks(vec![consumer.task_id.clone()])
        .with_error_info(
            ErrorInfo::new("PIPE-006-MISSING_INPUT", "Input slot is not connected")
                .with_fix_hint("Declare an upstream task before this one or add an explicit pipe."),
        )
    }

    /// The producer's output kind does not match the consumer's input kind.
    #[must_use]
    pub fn capability_mismatch(
        consumer: &PipeRef,
        producer: &PipeRef,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        Self::new(format!(
            "Task '{}' input {} expects a {expected} source but pipe {producer} provides {found}",
            consumer.task_id, consumer.slot
        ))
        .with_tasks(vec![consumer.task_id.clone(), producer.task_id.clone()])
        .with_error_info(ErrorInfo::new(
            "PIPE-007-CAPABILITY",
            format!("Expected {expected}, found {found}"),
        ))
    }

    /// More pipes were declared than the task has slots.
    #[must_use]
    pub fn arity(task_id: &str, direction: &str, declared: usize, available: usize) -> Self {
        Self::new(format!(
            "Task '{task_id}' declares {declared} {direction} pipes but has only {available} {direction} slots"
        ))
        .with_tasks(vec![task_id.to_string()])
        .with_error_info(ErrorInfo::new(
            "PIPE-008-ARITY",
            format!("Too many {direction} pipes"),
        ))
    }

    /// An output targets the task itself or a task declared before it.
    #[must_use]
    pub fn cyclic_pipe(producer: &PipeRef, target: &PipeRef) -> Self {
        Self::new(format!(
            "Pipe {producer} targets {target}, which is not declared after '{}'",
            producer.task_id
        ))
        .with_tasks(vec![producer.task_id.clone(), target.task_id.clone()])
        .with_error_info(
            ErrorInfo::new("PIPE-009-CYCLE", "Pipes must flow to later tasks")
                .with_fix_hint("Reorder the tasks so that every consumer follows its producers."),
        )
    }

    /// Some output pipes were never consumed.
    #[must_use]
    pub fn dangling(pipes: &[PipeRef]) -> Self {
        let names: Vec<String> = pipes.iter().map(ToString::to_string).collect();
        let mut tasks: Vec<String> = pipes.iter().map(|p| p.task_id.clone()).collect();
        tasks.dedup();
        Self::new(format!(
            "The following pipes are not connected to any consumer: {}",
            names.join(", ")
        ))
        .with_tasks(tasks)
        .with_error_info(
            ErrorInfo::new("PIPE-010-DANGLING", "Unconsumed output pipes")
                .with_fix_hint("Terminate every output with a sink task such as write-null."),
        )
    }

    /// The pipeline contains no tasks.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("Pipeline has no tasks").with_error_info(ErrorInfo::new(
            "PIPE-011-EMPTY",
            "Cannot build an empty pipeline",
        ))
    }

    /// The pipeline contains no stage that owns a thread.
    #[must_use]
    pub fn no_runnable_stage() -> Self {
        Self::new("Pipeline has no runnable source stage").with_error_info(ErrorInfo::new(
            "PIPE-012-NO_SOURCE",
            "At least one task must drive the pipeline",
        ))
    }
}

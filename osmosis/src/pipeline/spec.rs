//! Task configurations and pipe references.

use crate::errors::OsmosisResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One end of a pipe: a task id plus an input or output slot index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipeRef {
    /// The task id.
    pub task_id: String,
    /// The slot index on that task.
    #[serde(default)]
    pub slot: usize,
}

impl PipeRef {
    /// Creates a new pipe reference.
    #[must_use]
    pub fn new(task_id: impl Into<String>, slot: usize) -> Self {
        Self {
            task_id: task_id.into(),
            slot,
        }
    }
}

impl fmt::Display for PipeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task_id, self.slot)
    }
}

/// The immutable description of one task instance in a pipeline.
///
/// `pipe_in[i]` names the producer pipe feeding input slot `i`;
/// `pipe_out[j]` names the consumer input that output slot `j` is reserved
/// for. Slots without an entry are connected through the default pipe stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfiguration {
    /// Unique task id.
    pub id: String,
    /// Registered task type name, such as `buffer` or `tee`.
    pub task_type: String,
    /// Named arguments in declaration order.
    #[serde(default)]
    pub args: Vec<(String, String)>,
    /// Explicit producers of the input slots.
    #[serde(default)]
    pub pipe_in: Vec<PipeRef>,
    /// Explicit consumers of the output slots.
    #[serde(default)]
    pub pipe_out: Vec<PipeRef>,
}

impl TaskConfiguration {
    /// Creates a configuration without arguments or explicit pipes.
    #[must_use]
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            args: Vec::new(),
            pipe_in: Vec::new(),
            pipe_out: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// Appends an explicit input pipe reading output `slot` of `task_id`.
    #[must_use]
    pub fn with_pipe_in(mut self, task_id: impl Into<String>, slot: usize) -> Self {
        self.pipe_in.push(PipeRef::new(task_id, slot));
        self
    }

    /// Appends an explicit output pipe feeding input `slot` of `task_id`.
    #[must_use]
    pub fn with_pipe_out(mut self, task_id: impl Into<String>, slot: usize) -> Self {
        self.pipe_out.push(PipeRef::new(task_id, slot));
        self
    }

    /// Returns the last value given for an argument.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A whole pipeline as an ordered list of task configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<TaskConfiguration>,
}

impl PipelineSpec {
    /// Creates a specification from tasks.
    #[must_use]
    pub fn new(tasks: Vec<TaskConfiguration>) -> Self {
        Self { tasks }
    }

    /// Parses a specification from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> OsmosisResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pipe_ref_display() {
        assert_eq!(PipeRef::new("tee", 1).to_string(), "tee.1");
    }

    #[test]
    fn test_last_argument_wins() {
        let config = TaskConfiguration::new("buf", "buffer")
            .with_arg("bufferCapacity", "10")
            .with_arg("bufferCapacity", "20");

        assert_eq!(config.arg("bufferCapacity"), Some("20"));
        assert_eq!(config.arg("missing"), None);
    }

    #[test]
    fn test_pipeline_spec_from_json() {
        let spec = PipelineSpec::from_json_str(
            r#"{
                "tasks": [
                    {"id": "read", "task_type": "read-fake", "pipe_out": [{"task_id": "buf"}]},
                    {"id": "buf", "task_type": "buffer", "args": [["bufferCapacity", "2"]]},
                    {"id": "write", "task_type": "write-null", "pipe_in": [{"task_id": "buf", "slot": 0}]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(spec.len(), 3);
        assert_eq!(spec.tasks[0].pipe_out, vec![PipeRef::new("buf", 0)]);
        assert_eq!(spec.tasks[1].arg("bufferCapacity"), Some("2"));
        assert_eq!(spec.tasks[2].pipe_in, vec![PipeRef::new("buf", 0)]);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(PipelineSpec::from_json_str("{\"tasks\": 3}").is_err());
    }
}

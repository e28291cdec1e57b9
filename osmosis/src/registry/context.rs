//! Argument access for task factories.

use crate::config::PipelineConfig;
use crate::errors::{OsmosisResult, PipelineConfigError};
use crate::pipeline::{TaskConfiguration, TaskManager};
use crate::task::TaskKind;
use std::collections::HashSet;
use std::str::FromStr;

/// What a factory sees of the task it creates.
///
/// Every argument read through the context is recorded, so that arguments
/// the factory never asked for can be reported as unrecognised.
#[derive(Debug)]
pub struct TaskContext<'a> {
    config: &'a TaskConfiguration,
    settings: &'a PipelineConfig,
    accessed: HashSet<String>,
}

impl<'a> TaskContext<'a> {
    /// Creates a context for one task configuration.
    #[must_use]
    pub fn new(config: &'a TaskConfiguration, settings: &'a PipelineConfig) -> Self {
        Self {
            config,
            settings,
            accessed: HashSet::new(),
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn task_id(&self) -> &'a str {
        &self.config.id
    }

    /// Returns the task type name as written in the configuration.
    #[must_use]
    pub fn task_type(&self) -> &'a str {
        &self.config.task_type
    }

    /// Returns the pipeline settings.
    #[must_use]
    pub fn settings(&self) -> &'a PipelineConfig {
        self.settings
    }

    /// Returns the raw task configuration.
    #[must_use]
    pub fn configuration(&self) -> &'a TaskConfiguration {
        self.config
    }

    /// Wraps a task instance in a manager carrying this task's pipes.
    #[must_use]
    pub fn manager(&self, kind: TaskKind) -> TaskManager {
        TaskManager::from_config(self.config, kind)
    }

    /// Returns true if the argument was given.
    pub fn has_argument(&mut self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns a required string argument.
    pub fn string_argument(&mut self, name: &str) -> OsmosisResult<String> {
        self.lookup(name).map(ToString::to_string).ok_or_else(|| {
            PipelineConfigError::argument(self.task_id(), format!("argument '{name}' is required")).into()
        })
    }

    /// Returns a string argument or its default.
    pub fn string_argument_or(&mut self, name: &str, default: &str) -> String {
        self.lookup(name).unwrap_or(default).to_string()
    }

    /// Returns an integer argument or its default.
    pub fn integer_argument_or(&mut self, name: &str, default: i64) -> OsmosisResult<i64> {
        self.parsed_argument_or(name, default, "an integer")
    }

    /// Returns a non-negative integer argument or its default.
    pub fn usize_argument_or(&mut self, name: &str, default: usize) -> OsmosisResult<usize> {
        self.parsed_argument_or(name, default, "a non-negative integer")
    }

    /// Returns a floating point argument or its default.
    pub fn double_argument_or(&mut self, name: &str, default: f64) -> OsmosisResult<f64> {
        self.parsed_argument_or(name, default, "a number")
    }

    /// Returns a boolean argument or its default. Accepts `yes`, `no`,
    /// `true` and `false` in any case.
    pub fn boolean_argument_or(&mut self, name: &str, default: bool) -> OsmosisResult<bool> {
        let Some(raw) = self.lookup(name) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "yes" | "true" => Ok(true),
            "no" | "false" => Ok(false),
            _ => Err(PipelineConfigError::argument(
                self.task_id(),
                format!("argument '{name}' must be yes/no/true/false, got '{raw}'"),
            )
            .into()),
        }
    }

    /// Fails if an argument was given that no accessor asked for.
    pub fn verify_arguments(&self) -> Result<(), PipelineConfigError> {
        let unrecognised: Vec<&str> = self
            .config
            .args
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| !self.accessed.contains(*name))
            .collect();
        match unrecognised.as_slice() {
            [] => Ok(()),
            names => Err(PipelineConfigError::argument(
                self.task_id(),
                format!("argument(s) not recognised: {}", names.join(", ")),
            )),
        }
    }

    fn lookup(&mut self, name: &str) -> Option<&'a str> {
        self.accessed.insert(name.to_string());
        let config: &'a TaskConfiguration = self.config;
        config.arg(name)
    }

    fn parsed_argument_or<T: FromStr>(&mut self, name: &str, default: T, expected: &str) -> OsmosisResult<T> {
        let Some(raw) = self.lookup(name) else {
            return Ok(default);
        };
        raw.trim().parse().map_err(|_| {
            PipelineConfigError::argument(
                self.task_id(),
                format!("argument '{name}' must be {expected}, got '{raw}'"),
            )
            .into()
        })
    }
}

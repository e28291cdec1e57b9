//! Task managers: one configured task plus its pipe wiring.

use super::{PipeRef, PipeTasks, TaskConfiguration};
use crate::errors::{OsmosisError, OsmosisResult, PipelineConfigError};
use crate::task::{AnySink, PortKind, RunnableTask, TaskKind};
use std::collections::HashMap;
use std::fmt;

/// Wraps one task instance and connects it to its neighbours.
///
/// A manager goes through `connect` (declaration order, fixes the wiring)
/// and `assemble` (reverse declaration order, attaches downstream sinks)
/// before its thread body, if any, is handed to the executor.
pub struct TaskManager {
    task_id: String,
    pipe_in: Vec<PipeRef>,
    pipe_out: Vec<PipeRef>,
    kind: Option<TaskKind>,
    input_ports: Vec<PortKind>,
    output_ports: Vec<PortKind>,
    runnable_stage: bool,
    resolved_inputs: Vec<PipeRef>,
    runnable: Option<Box<dyn RunnableTask>>,
    connected: bool,
    released: bool,
}

impl TaskManager {
    /// Creates a manager without explicit pipes.
    #[must_use]
    pub fn new(task_id: impl Into<String>, kind: TaskKind) -> Self {
        let input_ports = kind.input_ports();
        let output_ports = kind.output_ports();
        let runnable_stage = kind.is_runnable();
        Self {
            task_id: task_id.into(),
            pipe_in: Vec::new(),
            pipe_out: Vec::new(),
            kind: Some(kind),
            input_ports,
            output_ports,
            runnable_stage,
            resolved_inputs: Vec::new(),
            runnable: None,
            connected: false,
            released: false,
        }
    }

    /// Creates a manager for a configured task.
    #[must_use]
    pub fn from_config(config: &TaskConfiguration, kind: TaskKind) -> Self {
        Self::new(config.id.clone(), kind).with_pipes(config.pipe_in.clone(), config.pipe_out.clone())
    }

    /// Sets the explicit pipe references.
    #[must_use]
    pub fn with_pipes(mut self, pipe_in: Vec<PipeRef>, pipe_out: Vec<PipeRef>) -> Self {
        self.pipe_in = pipe_in;
        self.pipe_out = pipe_out;
        self
    }

    /// Returns the task id.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns the expected kind of every input slot.
    #[must_use]
    pub fn input_ports(&self) -> &[PortKind] {
        &self.input_ports
    }

    /// Returns the kind of every output slot.
    #[must_use]
    pub fn output_ports(&self) -> &[PortKind] {
        &self.output_ports
    }

    /// Returns true if the task owns a thread of execution.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.runnable_stage
    }

    /// Returns true once `connect` succeeded.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the producer pipes feeding each input slot, once connected.
    #[must_use]
    pub fn resolved_inputs(&self) -> &[PipeRef] {
        &self.resolved_inputs
    }

    /// Resolves every input against the pipes registered by earlier tasks
    /// and registers every output for later tasks.
    pub fn connect(&mut self, pipes: &mut PipeTasks) -> OsmosisResult<()> {
        if self.connected || self.released {
            return Err(OsmosisError::illegal_state(format!(
                "Task '{}' cannot be connected twice or after release",
                self.task_id
            )));
        }
        if self.pipe_in.len() > self.input_ports.len() {
            return Err(PipelineConfigError::arity(
                &self.task_id,
                "input",
                self.pipe_in.len(),
                self.input_ports.len(),
            )
            .into());
        }
        if self.pipe_out.len() > self.output_ports.len() {
            return Err(PipelineConfigError::arity(
                &self.task_id,
                "output",
                self.pipe_out.len(),
                self.output_ports.len(),
            )
            .into());
        }

        for (slot, expected) in self.input_ports.iter().enumerate() {
            let consumer = PipeRef::new(self.task_id.clone(), slot);
            let producer = pipes.take_input(&consumer, self.pipe_in.get(slot), *expected)?;
            self.resolved_inputs.push(producer);
        }
        for (slot, kind) in self.output_ports.iter().enumerate() {
            let producer = PipeRef::new(self.task_id.clone(), slot);
            pipes.register_output(producer, *kind, self.pipe_out.get(slot))?;
        }
        pipes.mark_connected(&self.task_id);
        self.connected = true;

        tracing::debug!(
            task_id = %self.task_id,
            inputs = self.input_ports.len(),
            outputs = self.output_ports.len(),
            runnable = self.runnable_stage,
            "Connected task"
        );
        Ok(())
    }

    /// Takes the downstream sinks of every output slot from `sinks` and
    /// publishes this task's input sinks under the producer pipes they were
    /// connected to.
    pub(crate) fn assemble(&mut self, sinks: &mut HashMap<PipeRef, AnySink>) -> OsmosisResult<()> {
        if !self.connected {
            return Err(OsmosisError::illegal_state(format!(
                "Task '{}' must be connected before it is assembled",
                self.task_id
            )));
        }
        let Some(kind) = self.kind.take() else {
            return Err(OsmosisError::illegal_state(format!(
                "Task '{}' was already assembled or released",
                self.task_id
            )));
        };

        let outputs: Vec<AnySink> = (0..self.output_ports.len())
            .filter_map(|slot| sinks.remove(&PipeRef::new(self.task_id.clone(), slot)))
            .collect();
        let assembled = kind.assemble(&self.task_id, outputs)?;

        if assembled.inputs.len() != self.resolved_inputs.len() {
            let found = assembled.inputs.len();
            for mut input in assembled.inputs {
                input.release();
            }
            return Err(OsmosisError::illegal_state(format!(
                "Task '{}' provided {found} input sinks for {} connected inputs",
                self.task_id,
                self.resolved_inputs.len()
            )));
        }
        for (producer, input) in self.resolved_inputs.iter().zip(assembled.inputs) {
            sinks.insert(producer.clone(), input);
        }
        self.runnable = assembled.runnable;
        Ok(())
    }

    /// Hands out the thread body of an assembled runnable task.
    pub fn take_runnable(&mut self) -> Option<Box<dyn RunnableTask>> {
        self.runnable.take()
    }

    /// Releases a task that was never assembled. Safe to call repeatedly.
    ///
    /// Once assembled, a sink task is released by its upstream stage and a
    /// runnable task releases its downstream sinks from `run`.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(mut kind) = self.kind.take() {
            tracing::debug!(task_id = %self.task_id, "Releasing unassembled task");
            kind.release();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("task_id", &self.task_id)
            .field("inputs", &self.input_ports)
            .field("outputs", &self.output_ports)
            .field("runnable", &self.runnable_stage)
            .field("connected", &self.connected)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityContainer;
    use crate::testing::mocks::{CollectingSink, LifecycleProbe, PassthroughTask, VecSource};
    use pretty_assertions::assert_eq;

    fn source() -> TaskKind {
        TaskKind::RunnableSource(Box::new(VecSource::new(Vec::new(), LifecycleProbe::new())))
    }

    #[test]
    fn test_connect_resolves_default_pipe() {
        let mut pipes = PipeTasks::new(["read", "pass"]);
        let mut read = TaskManager::new("read", source());
        let mut pass = TaskManager::new(
            "pass",
            TaskKind::SinkSource(Box::new(PassthroughTask::new(LifecycleProbe::new()))),
        );

        read.connect(&mut pipes).unwrap();
        pass.connect(&mut pipes).unwrap();

        assert_eq!(pass.resolved_inputs(), &[PipeRef::new("read", 0)]);
        assert!(read.is_runnable());
        assert!(!pass.is_runnable());
        assert!(pipes.verify_all_consumed().is_err());
    }

    #[test]
    fn test_too_many_pipe_in_entries() {
        let mut pipes = PipeTasks::new(["read"]);
        let mut read = TaskManager::new("read", source()).with_pipes(vec![PipeRef::new("x", 0)], Vec::new());

        let err = read.connect(&mut pipes).unwrap_err();
        assert_eq!(err.config_code(), Some("PIPE-008-ARITY"));
    }

    #[test]
    fn test_connect_twice_rejected() {
        let mut pipes = PipeTasks::new(["read"]);
        let mut read = TaskManager::new("read", source());
        read.connect(&mut pipes).unwrap();

        assert!(matches!(read.connect(&mut pipes), Err(OsmosisError::IllegalState(_))));
    }

    #[test]
    fn test_release_is_idempotent() {
        let probe = LifecycleProbe::new();
        let (sink, _items) = CollectingSink::<EntityContainer>::new(probe.clone());
        let mut manager = TaskManager::new("write", TaskKind::Sink(Box::new(sink)));

        manager.release();
        manager.release();
        drop(manager);

        assert_eq!(probe.releases(), 1);
    }
}

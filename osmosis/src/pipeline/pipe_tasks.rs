//! Build-time registry of output pipes.
//!
//! Task managers connect in declaration order. Each one takes its inputs
//! from pipes registered by earlier tasks and registers its own outputs for
//! later tasks. An output without an explicit target goes on the default
//! pipe stack, and an input without an explicit source takes the pipe
//! reserved for it or else the most recently registered unreserved pipe.

use super::PipeRef;
use crate::errors::{OsmosisResult, PipelineConfigError};
use crate::task::PortKind;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct PipeEntry {
    kind: PortKind,
    reserved_for: Option<PipeRef>,
    consumer: Option<PipeRef>,
}

/// Pipes registered so far, keyed by producer.
#[derive(Debug, Default)]
pub struct PipeTasks {
    known: HashSet<String>,
    connected: HashSet<String>,
    pipes: HashMap<PipeRef, PipeEntry>,
    registration_order: Vec<PipeRef>,
    default_stack: Vec<PipeRef>,
    reservations: HashMap<PipeRef, PipeRef>,
}

impl PipeTasks {
    /// Creates an empty registry for a pipeline with the given task ids.
    #[must_use]
    pub fn new<I, S>(task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: task_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Records that a task finished connecting. Later tasks may read from it,
    /// and it can no longer be the target of an output pipe.
    pub fn mark_connected(&mut self, task_id: &str) {
        self.connected.insert(task_id.to_string());
    }

    /// Returns true if the task has already connected.
    #[must_use]
    pub fn is_connected(&self, task_id: &str) -> bool {
        self.connected.contains(task_id)
    }

    /// Resolves the producer pipe feeding `consumer`.
    ///
    /// `explicit` is the consumer's declared pipe-in for this slot, if any.
    pub fn take_input(
        &mut self,
        consumer: &PipeRef,
        explicit: Option<&PipeRef>,
        expected: PortKind,
    ) -> OsmosisResult<PipeRef> {
        let producer = match explicit {
            Some(producer) => self.claim_explicit(consumer, producer)?,
            None => self.claim_default(consumer)?,
        };

        let Some(entry) = self.pipes.get_mut(&producer) else {
            return Err(PipelineConfigError::unknown_pipe(consumer, &producer, "no such output slot").into());
        };
        if entry.kind != expected {
            return Err(PipelineConfigError::capability_mismatch(consumer, &producer, expected, entry.kind).into());
        }
        entry.consumer = Some(consumer.clone());
        tracing::trace!(pipe = %producer, consumer = %consumer, "Connected pipe");
        Ok(producer)
    }

    fn claim_explicit(&mut self, consumer: &PipeRef, producer: &PipeRef) -> OsmosisResult<PipeRef> {
        if !self.known.contains(&producer.task_id) {
            return Err(PipelineConfigError::unknown_pipe(consumer, producer, "no task with this id is declared").into());
        }
        if !self.connected.contains(&producer.task_id) {
            return Err(PipelineConfigError::unknown_pipe(
                consumer,
                producer,
                "inputs may only reference tasks declared earlier",
            )
            .into());
        }
        let Some(entry) = self.pipes.get(producer) else {
            return Err(PipelineConfigError::unknown_pipe(consumer, producer, "no such output slot").into());
        };
        if let Some(existing) = &entry.consumer {
            return Err(PipelineConfigError::pipe_conflict(
                consumer,
                producer,
                &format!("already consumed by {existing}"),
            )
            .into());
        }
        match &entry.reserved_for {
            Some(target) if target != consumer => {
                return Err(PipelineConfigError::pipe_conflict(
                    consumer,
                    producer,
                    &format!("reserved for {target}"),
                )
                .into());
            }
            Some(_) => {
                self.reservations.remove(consumer);
            }
            None => self.default_stack.retain(|pipe| pipe != producer),
        }
        Ok(producer.clone())
    }

    fn claim_default(&mut self, consumer: &PipeRef) -> OsmosisResult<PipeRef> {
        if let Some(producer) = self.reservations.remove(consumer) {
            return Ok(producer);
        }
        self.default_stack
            .pop()
            .ok_or_else(|| PipelineConfigError::missing_input(consumer).into())
    }

    /// Registers output slot `producer` of the connecting task.
    ///
    /// `target` is the task's declared pipe-out for this slot, if any.
    pub fn register_output(
        &mut self,
        producer: PipeRef,
        kind: PortKind,
        target: Option<&PipeRef>,
    ) -> OsmosisResult<()> {
        if let Some(target) = target {
            if !self.known.contains(&target.task_id) {
                return Err(PipelineConfigError::unknown_pipe_target(&producer, target).into());
            }
            if target.task_id == producer.task_id || self.connected.contains(&target.task_id) {
                return Err(PipelineConfigError::cyclic_pipe(&producer, target).into());
            }
            if let Some(existing) = self.reservations.get(target) {
                return Err(PipelineConfigError::pipe_conflict(
                    target,
                    &producer,
                    &format!("input is already reserved for {existing}"),
                )
                .into());
            }
            self.reservations.insert(target.clone(), producer.clone());
        } else {
            self.default_stack.push(producer.clone());
        }

        self.pipes.insert(
            producer.clone(),
            PipeEntry {
                kind,
                reserved_for: target.cloned(),
                consumer: None,
            },
        );
        self.registration_order.push(producer);
        Ok(())
    }

    /// Fails if any registered pipe was never consumed.
    pub fn verify_all_consumed(&self) -> OsmosisResult<()> {
        let dangling: Vec<PipeRef> = self
            .registration_order
            .iter()
            .filter(|pipe| self.pipes.get(*pipe).is_some_and(|entry| entry.consumer.is_none()))
            .cloned()
            .collect();
        if dangling.is_empty() {
            Ok(())
        } else {
            Err(PipelineConfigError::dangling(&dangling).into())
        }
    }

    /// Returns the consumer of a pipe, if connected.
    #[must_use]
    pub fn consumer_of(&self, producer: &PipeRef) -> Option<&PipeRef> {
        self.pipes.get(producer).and_then(|entry| entry.consumer.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OsmosisError;
    use pretty_assertions::assert_eq;

    fn code(result: OsmosisResult<impl std::fmt::Debug>) -> String {
        match result {
            Err(err) => err.config_code().unwrap_or_default().to_string(),
            Ok(value) => panic!("expected configuration error, got {value:?}"),
        }
    }

    fn registry() -> PipeTasks {
        PipeTasks::new(["a", "b", "c", "d"])
    }

    #[test]
    fn test_default_pipes_are_a_stack() {
        let mut pipes = registry();
        pipes.register_output(PipeRef::new("a", 0), PortKind::Entity, None).unwrap();
        pipes.mark_connected("a");
        pipes.register_output(PipeRef::new("b", 0), PortKind::Entity, None).unwrap();
        pipes.mark_connected("b");

        let first = pipes.take_input(&PipeRef::new("c", 0), None, PortKind::Entity).unwrap();
        let second = pipes.take_input(&PipeRef::new("c", 1), None, PortKind::Entity).unwrap();

        assert_eq!(first, PipeRef::new("b", 0));
        assert_eq!(second, PipeRef::new("a", 0));
        assert!(pipes.verify_all_consumed().is_ok());
    }

    #[test]
    fn test_reserved_pipe_skips_stack() {
        let mut pipes = registry();
        pipes
            .register_output(PipeRef::new("a", 0), PortKind::Entity, Some(&PipeRef::new("c", 0)))
            .unwrap();
        pipes.register_output(PipeRef::new("a", 1), PortKind::Entity, None).unwrap();
        pipes.mark_connected("a");

        let reserved = pipes.take_input(&PipeRef::new("c", 0), None, PortKind::Entity).unwrap();
        assert_eq!(reserved, PipeRef::new("a", 0));

        let result = pipes.take_input(&PipeRef::new("b", 0), Some(&PipeRef::new("a", 0)), PortKind::Entity);
        assert_eq!(code(result), "PIPE-005-PIPE_CONFLICT");
    }

    #[test]
    fn test_explicit_pipe_in() {
        let mut pipes = registry();
        pipes.register_output(PipeRef::new("a", 0), PortKind::Entity, None).unwrap();
        pipes.register_output(PipeRef::new("a", 1), PortKind::Entity, None).unwrap();
        pipes.mark_connected("a");

        let explicit = PipeRef::new("a", 0);
        let taken = pipes
            .take_input(&PipeRef::new("b", 0), Some(&explicit), PortKind::Entity)
            .unwrap();
        assert_eq!(taken, explicit);
        assert_eq!(pipes.consumer_of(&explicit), Some(&PipeRef::new("b", 0)));

        let next = pipes.take_input(&PipeRef::new("c", 0), None, PortKind::Entity).unwrap();
        assert_eq!(next, PipeRef::new("a", 1));
    }

    #[test]
    fn test_forward_and_unknown_references() {
        let mut pipes = registry();
        let forward = pipes.take_input(&PipeRef::new("a", 0), Some(&PipeRef::new("b", 0)), PortKind::Entity);
        assert_eq!(code(forward), "PIPE-004-UNKNOWN_PIPE");

        let unknown = pipes.take_input(&PipeRef::new("a", 0), Some(&PipeRef::new("zz", 0)), PortKind::Entity);
        assert_eq!(code(unknown), "PIPE-004-UNKNOWN_PIPE");

        let missing = pipes.take_input(&PipeRef::new("a", 0), None, PortKind::Entity);
        assert_eq!(code(missing), "PIPE-006-MISSING_INPUT");
    }

    #[test]
    fn test_kind_mismatch() {
        let mut pipes = registry();
        pipes.register_output(PipeRef::new("a", 0), PortKind::Entity, None).unwrap();
        pipes.mark_connected("a");

        let result = pipes.take_input(&PipeRef::new("b", 0), None, PortKind::Change);
        let Err(OsmosisError::Configuration(err)) = result else {
            panic!("expected capability mismatch");
        };
        assert_eq!(err.code(), Some("PIPE-007-CAPABILITY"));
        assert_eq!(err.tasks, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_backward_pipe_out_is_a_cycle() {
        let mut pipes = registry();
        pipes.mark_connected("a");

        let backwards = pipes.register_output(PipeRef::new("b", 0), PortKind::Entity, Some(&PipeRef::new("a", 0)));
        assert_eq!(code(backwards), "PIPE-009-CYCLE");

        let to_self = pipes.register_output(PipeRef::new("b", 0), PortKind::Entity, Some(&PipeRef::new("b", 0)));
        assert_eq!(code(to_self), "PIPE-009-CYCLE");
    }

    #[test]
    fn test_unknown_pipe_out_target_names_producer() {
        let mut pipes = registry();
        let result = pipes.register_output(PipeRef::new("a", 0), PortKind::Entity, Some(&PipeRef::new("zz", 1)));

        let Err(OsmosisError::Configuration(err)) = result else {
            panic!("expected unknown target");
        };
        assert_eq!(err.code(), Some("PIPE-004-UNKNOWN_PIPE"));
        assert_eq!(err.tasks, vec!["a".to_string()]);
        assert!(err.message.starts_with("Task 'a' output 0 targets input zz.1"), "{}", err.message);
    }

    #[test]
    fn test_dangling_pipes_reported() {
        let mut pipes = registry();
        pipes.register_output(PipeRef::new("a", 0), PortKind::Entity, None).unwrap();
        pipes
            .register_output(PipeRef::new("a", 1), PortKind::Entity, Some(&PipeRef::new("d", 0)))
            .unwrap();

        let Err(OsmosisError::Configuration(err)) = pipes.verify_all_consumed() else {
            panic!("expected dangling pipes");
        };
        assert_eq!(err.code(), Some("PIPE-010-DANGLING"));
        assert!(err.message.contains("a.0, a.1"));
    }
}

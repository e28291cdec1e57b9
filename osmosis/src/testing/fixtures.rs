//! Entity fixtures and a registry of fake task types.

use super::mocks::{
    ChangeVecSource, CollectingSink, ConcatMerge, FailingSink, FailingSource, LifecycleProbe,
    PanickingSource, PassthroughTask, VecSource,
};
use crate::core::{ChangeAction, ChangeContainer, CommonEntityData, EntityContainer, Node};
use crate::errors::OsmosisResult;
use crate::pipeline::TaskManager;
use crate::registry::{TaskContext, TaskRegistry};
use crate::task::TaskKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Returns `count` nodes with ids `1..=count`.
#[must_use]
pub fn nodes(count: usize) -> Vec<EntityContainer> {
    (1..=count)
        .map(|id| {
            let id = i64::try_from(id).unwrap_or(i64::MAX);
            Node::new(CommonEntityData::new(id, 1), 51.5, -0.1).into()
        })
        .collect()
}

/// Returns one `create` change per node of [`nodes`].
#[must_use]
pub fn changes(count: usize) -> Vec<ChangeContainer> {
    nodes(count)
        .into_iter()
        .map(|entity| ChangeContainer::new(entity, ChangeAction::Create))
        .collect()
}

/// Everything the collecting sinks of a [`FakeRegistry`] received.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Entities received by `write-collect` tasks.
    pub entities: Arc<Mutex<Vec<EntityContainer>>>,
    /// Changes received by `write-collect-change` tasks.
    pub changes: Arc<Mutex<Vec<ChangeContainer>>>,
}

/// A registry with the built-ins plus fake task types.
///
/// | Task type              | Arguments    | Behaviour                           |
/// |------------------------|--------------|-------------------------------------|
/// | `read-fake`            | `count` (3)  | emits `count` nodes                 |
/// | `read-fake-change`     | `count` (3)  | emits `count` create changes        |
/// | `read-fail`            | `count` (1)  | emits `count` nodes, then fails     |
/// | `read-panic`           |              | panics after initialising           |
/// | `pass-fake`            |              | forwards entities inline            |
/// | `merge-fake`           | `inputs` (2) | concatenates its inputs             |
/// | `write-collect`        |              | collects entities                   |
/// | `write-collect-change` |              | collects changes                    |
/// | `write-fail`           | `accept` (0) | accepts `accept` entities, then fails |
///
/// Every fake sink records into the shared probe.
#[derive(Debug)]
pub struct FakeRegistry {
    /// The registry.
    pub registry: TaskRegistry,
    /// Probe shared by every fake sink.
    pub probe: LifecycleProbe,
    /// What the collecting sinks received.
    pub collected: Collected,
}

impl FakeRegistry {
    /// Creates the registry.
    pub fn new() -> OsmosisResult<Self> {
        let registry = TaskRegistry::with_builtins()?;
        let probe = LifecycleProbe::new();
        let collected = Collected::default();

        registry.register("read-fake", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let count = context.usize_argument_or("count", 3)?;
            let source = VecSource::new(nodes(count), LifecycleProbe::new());
            Ok(context.manager(TaskKind::RunnableSource(Box::new(source))))
        })?;
        registry.register("read-fake-change", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let count = context.usize_argument_or("count", 3)?;
            let source = ChangeVecSource::new(changes(count));
            Ok(context.manager(TaskKind::RunnableChangeSource(Box::new(source))))
        })?;
        registry.register("read-fail", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let count = context.usize_argument_or("count", 1)?;
            Ok(context.manager(TaskKind::RunnableSource(Box::new(FailingSource::new(nodes(count))))))
        })?;
        registry.register("read-panic", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            Ok(context.manager(TaskKind::RunnableSource(Box::new(PanickingSource::new()))))
        })?;
        registry.register("merge-fake", |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let inputs = context.usize_argument_or("inputs", 2)?;
            Ok(context.manager(TaskKind::MultiSinkRunnableSource(Box::new(ConcatMerge::new(inputs)?))))
        })?;

        let pass_probe = probe.clone();
        registry.register("pass-fake", move |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let task = PassthroughTask::new(pass_probe.clone());
            Ok(context.manager(TaskKind::SinkSource(Box::new(task))))
        })?;
        let (collect_probe, entities) = (probe.clone(), Arc::clone(&collected.entities));
        registry.register("write-collect", move |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let sink = CollectingSink::with_store(Arc::clone(&entities), collect_probe.clone());
            Ok(context.manager(TaskKind::Sink(Box::new(sink))))
        })?;
        let (collect_probe, changes) = (probe.clone(), Arc::clone(&collected.changes));
        registry.register(
            "write-collect-change",
            move |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
                let sink = CollectingSink::with_store(Arc::clone(&changes), collect_probe.clone());
                Ok(context.manager(TaskKind::ChangeSink(Box::new(sink))))
            },
        )?;
        let fail_probe = probe.clone();
        registry.register("write-fail", move |context: &mut TaskContext<'_>| -> OsmosisResult<TaskManager> {
            let accept = context.usize_argument_or("accept", 0)?;
            let sink = FailingSink::<EntityContainer>::after(accept, fail_probe.clone());
            Ok(context.manager(TaskKind::Sink(Box::new(sink))))
        })?;

        Ok(Self {
            registry,
            probe,
            collected,
        })
    }
}

/// Returns a [`FakeRegistry`]'s registry and probe.
///
/// # Panics
///
/// Panics if a fake task type clashes with a built-in.
#[must_use]
pub fn test_registry() -> (TaskRegistry, LifecycleProbe) {
    let fake = FakeRegistry::new().expect("fake task types register cleanly");
    (fake.registry, fake.probe)
}

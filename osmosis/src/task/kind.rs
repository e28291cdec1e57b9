//! The explicit catalogue of task shapes the builder can wire.

use super::{
    AnySink, MultiSinkRunnableSource, Payload, PortKind, RunnableSource, RunnableTask, Sink,
    SinkMultiSource, SinkRunnableSource, SinkSource,
};
use crate::core::{ChangeContainer, EntityContainer};
use crate::errors::{OsmosisError, OsmosisResult};
use std::fmt;

type E = EntityContainer;
type C = ChangeContainer;

/// A task instance tagged with the shape it registers as.
///
/// The builder dispatches on the variant to learn the pipe arity and kinds
/// of a task and to attach its neighbours, so no runtime downcasting is
/// needed.
pub enum TaskKind {
    /// Reads entities on its own thread.
    RunnableSource(Box<dyn RunnableSource<E>>),
    /// Reads changes on its own thread.
    RunnableChangeSource(Box<dyn RunnableSource<C>>),
    /// Consumes entities.
    Sink(Box<dyn Sink<E>>),
    /// Consumes changes.
    ChangeSink(Box<dyn Sink<C>>),
    /// Transforms entities inline.
    SinkSource(Box<dyn SinkSource<E, E>>),
    /// Transforms changes inline.
    ChangeSinkChangeSource(Box<dyn SinkSource<C, C>>),
    /// Fans entities out to several outputs.
    SinkMultiSource(Box<dyn SinkMultiSource<E>>),
    /// Fans changes out to several outputs.
    ChangeSinkMultiChangeSource(Box<dyn SinkMultiSource<C>>),
    /// Decouples an entity stream across a thread boundary.
    SinkRunnableSource(Box<dyn SinkRunnableSource<E>>),
    /// Decouples a change stream across a thread boundary.
    ChangeSinkRunnableChangeSource(Box<dyn SinkRunnableSource<C>>),
    /// Merges several entity streams on its own thread.
    MultiSinkRunnableSource(Box<dyn MultiSinkRunnableSource<E, E>>),
    /// Merges several change streams on its own thread.
    MultiChangeSinkRunnableChangeSource(Box<dyn MultiSinkRunnableSource<C, C>>),
    /// Derives a change stream from several entity streams on its own thread.
    MultiSinkRunnableChangeSource(Box<dyn MultiSinkRunnableSource<E, C>>),
}

/// The objects a task contributes once its outputs are attached.
pub struct AssembledTask {
    /// The sinks upstream tasks must write into, one per input slot.
    pub inputs: Vec<AnySink>,
    /// The thread body, for tasks that own a thread.
    pub runnable: Option<Box<dyn RunnableTask>>,
}

impl TaskKind {
    /// Returns the shape name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunnableSource(_) => "RunnableSource",
            Self::RunnableChangeSource(_) => "RunnableChangeSource",
            Self::Sink(_) => "Sink",
            Self::ChangeSink(_) => "ChangeSink",
            Self::SinkSource(_) => "SinkSource",
            Self::ChangeSinkChangeSource(_) => "ChangeSinkChangeSource",
            Self::SinkMultiSource(_) => "SinkMultiSource",
            Self::ChangeSinkMultiChangeSource(_) => "ChangeSinkMultiChangeSource",
            Self::SinkRunnableSource(_) => "SinkRunnableSource",
            Self::ChangeSinkRunnableChangeSource(_) => "ChangeSinkRunnableChangeSource",
            Self::MultiSinkRunnableSource(_) => "MultiSinkRunnableSource",
            Self::MultiChangeSinkRunnableChangeSource(_) => "MultiChangeSinkRunnableChangeSource",
            Self::MultiSinkRunnableChangeSource(_) => "MultiSinkRunnableChangeSource",
        }
    }

    /// Returns the expected payload kind of every input slot.
    #[must_use]
    pub fn input_ports(&self) -> Vec<PortKind> {
        match self {
            Self::RunnableSource(_) | Self::RunnableChangeSource(_) => Vec::new(),
            Self::Sink(_)
            | Self::SinkSource(_)
            | Self::SinkMultiSource(_)
            | Self::SinkRunnableSource(_) => vec![PortKind::Entity],
            Self::ChangeSink(_)
            | Self::ChangeSinkChangeSource(_)
            | Self::ChangeSinkMultiChangeSource(_)
            | Self::ChangeSinkRunnableChangeSource(_) => vec![PortKind::Change],
            Self::MultiSinkRunnableSource(task) => vec![PortKind::Entity; task.sink_count()],
            Self::MultiChangeSinkRunnableChangeSource(task) => {
                vec![PortKind::Change; task.sink_count()]
            }
            Self::MultiSinkRunnableChangeSource(task) => vec![PortKind::Entity; task.sink_count()],
        }
    }

    /// Returns the payload kind of every output slot.
    #[must_use]
    pub fn output_ports(&self) -> Vec<PortKind> {
        match self {
            Self::Sink(_) | Self::ChangeSink(_) => Vec::new(),
            Self::RunnableSource(_)
            | Self::SinkSource(_)
            | Self::SinkRunnableSource(_)
            | Self::MultiSinkRunnableSource(_) => vec![PortKind::Entity],
            Self::RunnableChangeSource(_)
            | Self::ChangeSinkChangeSource(_)
            | Self::ChangeSinkRunnableChangeSource(_)
            | Self::MultiChangeSinkRunnableChangeSource(_)
            | Self::MultiSinkRunnableChangeSource(_) => vec![PortKind::Change],
            Self::SinkMultiSource(task) => vec![PortKind::Entity; task.source_count()],
            Self::ChangeSinkMultiChangeSource(task) => vec![PortKind::Change; task.source_count()],
        }
    }

    /// Returns true if the task owns a thread of execution.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            Self::RunnableSource(_)
                | Self::RunnableChangeSource(_)
                | Self::SinkRunnableSource(_)
                | Self::ChangeSinkRunnableChangeSource(_)
                | Self::MultiSinkRunnableSource(_)
                | Self::MultiChangeSinkRunnableChangeSource(_)
                | Self::MultiSinkRunnableChangeSource(_)
        )
    }

    /// Attaches the downstream sinks, one per output slot in slot order, and
    /// hands back the task's input sinks and thread body.
    ///
    /// On failure every sink passed in has been released.
    pub fn assemble(self, task_id: &str, outputs: Vec<AnySink>) -> OsmosisResult<AssembledTask> {
        match self {
            Self::RunnableSource(task) => runnable_source(task_id, task, outputs),
            Self::RunnableChangeSource(task) => runnable_source(task_id, task, outputs),
            Self::Sink(task) => sink(task_id, task, outputs),
            Self::ChangeSink(task) => sink(task_id, task, outputs),
            Self::SinkSource(task) => sink_source(task_id, task, outputs),
            Self::ChangeSinkChangeSource(task) => sink_source(task_id, task, outputs),
            Self::SinkMultiSource(task) => sink_multi_source(task_id, task, outputs),
            Self::ChangeSinkMultiChangeSource(task) => sink_multi_source(task_id, task, outputs),
            Self::SinkRunnableSource(task) => sink_runnable_source(task_id, task, outputs),
            Self::ChangeSinkRunnableChangeSource(task) => {
                sink_runnable_source(task_id, task, outputs)
            }
            Self::MultiSinkRunnableSource(task) => multi_sink_runnable_source(task_id, task, outputs),
            Self::MultiChangeSinkRunnableChangeSource(task) => {
                multi_sink_runnable_source(task_id, task, outputs)
            }
            Self::MultiSinkRunnableChangeSource(task) => {
                multi_sink_runnable_source(task_id, task, outputs)
            }
        }
    }

    /// Releases a task that will never be assembled.
    ///
    /// Only sink-capable tasks hold releasable state before assembly; runnable
    /// tasks let their postbox endpoints release on drop.
    pub fn release(&mut self) {
        match self {
            Self::Sink(task) => task.release(),
            Self::ChangeSink(task) => task.release(),
            Self::SinkSource(task) => task.release(),
            Self::ChangeSinkChangeSource(task) => task.release(),
            Self::SinkMultiSource(task) => task.release(),
            Self::ChangeSinkMultiChangeSource(task) => task.release(),
            Self::RunnableSource(_)
            | Self::RunnableChangeSource(_)
            | Self::SinkRunnableSource(_)
            | Self::ChangeSinkRunnableChangeSource(_)
            | Self::MultiSinkRunnableSource(_)
            | Self::MultiChangeSinkRunnableChangeSource(_)
            | Self::MultiSinkRunnableChangeSource(_) => {}
        }
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskKind")
            .field("shape", &self.name())
            .field("inputs", &self.input_ports())
            .field("outputs", &self.output_ports())
            .finish()
    }
}

fn release_all(outputs: impl IntoIterator<Item = AnySink>) {
    for mut sink in outputs {
        sink.release();
    }
}

fn expect_outputs(task_id: &str, outputs: Vec<AnySink>, expected: usize) -> OsmosisResult<Vec<AnySink>> {
    if outputs.len() == expected {
        return Ok(outputs);
    }
    let found = outputs.len();
    release_all(outputs);
    Err(OsmosisError::illegal_state(format!(
        "Task '{task_id}' has {expected} output slots but {found} sinks were attached"
    )))
}

fn downstream<T: Payload>(task_id: &str, slot: usize, sink: AnySink) -> OsmosisResult<Box<dyn Sink<T>>> {
    T::unwrap_sink(sink).map_err(|mut other| {
        other.release();
        OsmosisError::illegal_state(format!(
            "Task '{task_id}' output {slot} produces {} but a {} sink was attached",
            T::KIND,
            other.kind()
        ))
    })
}

fn single_downstream<T: Payload>(task_id: &str, outputs: Vec<AnySink>) -> OsmosisResult<Box<dyn Sink<T>>> {
    let mut outputs = expect_outputs(task_id, outputs, 1)?;
    match outputs.pop() {
        Some(sink) => downstream(task_id, 0, sink),
        None => Err(OsmosisError::illegal_state(format!(
            "Task '{task_id}' has no downstream sink"
        ))),
    }
}

fn runnable_source<O: Payload>(
    task_id: &str,
    mut task: Box<dyn RunnableSource<O>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    task.set_sink(single_downstream(task_id, outputs)?);
    let runnable: Box<dyn RunnableTask> = task;
    Ok(AssembledTask {
        inputs: Vec::new(),
        runnable: Some(runnable),
    })
}

fn sink<I: Payload>(
    task_id: &str,
    task: Box<dyn Sink<I>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    expect_outputs(task_id, outputs, 0)?;
    Ok(AssembledTask {
        inputs: vec![I::wrap_sink(task)],
        runnable: None,
    })
}

fn sink_source<I: Payload, O: Payload>(
    task_id: &str,
    mut task: Box<dyn SinkSource<I, O>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    task.set_sink(single_downstream(task_id, outputs)?);
    let input: Box<dyn Sink<I>> = task;
    Ok(AssembledTask {
        inputs: vec![I::wrap_sink(input)],
        runnable: None,
    })
}

fn sink_multi_source<T: Payload>(
    task_id: &str,
    mut task: Box<dyn SinkMultiSource<T>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    let outputs = expect_outputs(task_id, outputs, task.source_count())?;
    let mut outputs = outputs.into_iter().enumerate();
    while let Some((slot, output)) = outputs.next() {
        let attached = downstream::<T>(task_id, slot, output).and_then(|s| task.attach_sink(slot, s));
        if let Err(err) = attached {
            task.release();
            release_all(outputs.map(|(_, sink)| sink));
            return Err(err);
        }
    }
    let input: Box<dyn Sink<T>> = task;
    Ok(AssembledTask {
        inputs: vec![T::wrap_sink(input)],
        runnable: None,
    })
}

fn sink_runnable_source<T: Payload>(
    task_id: &str,
    mut task: Box<dyn SinkRunnableSource<T>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    let mut output = single_downstream::<T>(task_id, outputs)?;
    let input = match task.input_sink() {
        Ok(input) => input,
        Err(err) => {
            output.release();
            return Err(err);
        }
    };
    task.set_sink(output);
    let runnable: Box<dyn RunnableTask> = task;
    Ok(AssembledTask {
        inputs: vec![T::wrap_sink(input)],
        runnable: Some(runnable),
    })
}

fn multi_sink_runnable_source<I: Payload, O: Payload>(
    task_id: &str,
    mut task: Box<dyn MultiSinkRunnableSource<I, O>>,
    outputs: Vec<AnySink>,
) -> OsmosisResult<AssembledTask> {
    let mut output = single_downstream::<O>(task_id, outputs)?;
    let inputs: OsmosisResult<Vec<AnySink>> = (0..task.sink_count())
        .map(|slot| task.take_sink(slot).map(I::wrap_sink))
        .collect();
    let inputs = match inputs {
        Ok(inputs) => inputs,
        Err(err) => {
            output.release();
            return Err(err);
        }
    };
    task.set_sink(output);
    let runnable: Box<dyn RunnableTask> = task;
    Ok(AssembledTask {
        inputs,
        runnable: Some(runnable),
    })
}

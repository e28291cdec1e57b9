//! Task capability traits.
//!
//! Tasks are the units of pipeline processing. A task participates in graph
//! wiring through the capabilities it implements:
//!
//! - [`Sink`] consumes a stream (`initialize → process* → complete`, then
//!   `release` on every path).
//! - [`Source`] exposes a single downstream attachment point.
//! - [`MultiSink`] / [`MultiSource`] expose indexed inputs / outputs.
//! - [`RunnableTask`] owns a thread of execution.
//!
//! The capabilities are generic over the payload; `Sink<EntityContainer>` is
//! the entity sink and `Sink<ChangeContainer>` the change sink. The shape a
//! task registers with is declared up front through [`TaskKind`].

mod guard;
mod kind;
mod port;

pub use guard::{drive_sink, SinkGuard};
pub use kind::{AssembledTask, TaskKind};
pub use port::{AnySink, Payload, PortKind};

use crate::core::Metadata;
use crate::errors::OsmosisResult;

/// Consumes a stream of elements.
///
/// Callers invoke `initialize` once, then `process` for each element, then
/// `complete` once if no error occurred. `release` is always invoked last,
/// also after failures, and must tolerate repeated calls.
pub trait Sink<T>: Send {
    /// Receives the stream metadata before the first element.
    fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()>;

    /// Processes one element.
    fn process(&mut self, item: T) -> OsmosisResult<()>;

    /// Signals that all elements were delivered successfully.
    fn complete(&mut self) -> OsmosisResult<()>;

    /// Releases all resources. Never fails; problems are logged.
    fn release(&mut self);
}

/// Produces a stream into a single downstream sink.
pub trait Source<T> {
    /// Attaches the downstream sink.
    fn set_sink(&mut self, sink: Box<dyn Sink<T>>);
}

/// Produces streams into several independent downstream sinks.
pub trait MultiSource<T> {
    /// Returns the number of output slots.
    fn source_count(&self) -> usize;

    /// Attaches the downstream sink of output slot `index`.
    fn attach_sink(&mut self, index: usize, sink: Box<dyn Sink<T>>) -> OsmosisResult<()>;
}

/// Consumes several independent input streams.
pub trait MultiSink<T> {
    /// Returns the number of input slots.
    fn sink_count(&self) -> usize;

    /// Hands out the sink for input slot `index`. Each slot can be taken once.
    fn take_sink(&mut self, index: usize) -> OsmosisResult<Box<dyn Sink<T>>>;
}

/// A task that runs on its own thread.
///
/// `run` drives `initialize → process* → complete` on its downstream sinks and
/// must release them on every exit path (see [`SinkGuard`]).
pub trait RunnableTask: Send {
    /// Runs the task to completion.
    fn run(&mut self) -> OsmosisResult<()>;
}

/// A source that owns a thread, such as a file reader.
pub trait RunnableSource<T>: Source<T> + RunnableTask {}

impl<T, S> RunnableSource<T> for S where S: Source<T> + RunnableTask {}

/// A task running inline on its upstream's thread and forwarding downstream.
pub trait SinkSource<I, O>: Sink<I> + Source<O> {}

impl<I, O, S> SinkSource<I, O> for S where S: Sink<I> + Source<O> {}

/// A task running inline and fanning out to several outputs.
pub trait SinkMultiSource<T>: Sink<T> + MultiSource<T> {}

impl<T, S> SinkMultiSource<T> for S where S: Sink<T> + MultiSource<T> {}

/// A task whose input is decoupled from its output by a thread boundary.
pub trait SinkRunnableSource<T>: Source<T> + RunnableTask {
    /// Hands out the input sink. Can be taken once.
    fn input_sink(&mut self) -> OsmosisResult<Box<dyn Sink<T>>>;
}

/// A task combining several inputs into one output on its own thread.
pub trait MultiSinkRunnableSource<I, O>: MultiSink<I> + Source<O> + RunnableTask {}

impl<I, O, S> MultiSinkRunnableSource<I, O> for S where
    S: MultiSink<I> + Source<O> + RunnableTask
{
}

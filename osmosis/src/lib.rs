//! # Osmosis
//!
//! The pipeline engine of an OpenStreetMap data processor.
//!
//! A pipeline is an ordered list of task configurations. Tasks stream OSM
//! entities or changes to each other through typed pipes:
//!
//! - **Capability traits**: tasks declare what they consume and produce
//!   through [`task::Sink`], [`task::Source`] and friends
//! - **Graph building**: task configurations are resolved against a
//!   [`registry::TaskRegistry`] and connected by the [`pipeline::PipelineBuilder`]
//! - **Threaded execution**: every runnable task gets its own thread; a
//!   bounded [`postbox::Postbox`] carries data across thread boundaries
//! - **All-or-nothing runs**: a failure anywhere fails the whole run, and
//!   every sink is released exactly once on every path
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use osmosis::prelude::*;
//!
//! let registry = TaskRegistry::with_builtins()?;
//! registry.load_plugin(&MyReaders)?;
//!
//! let pipeline = PipelineBuilder::new(&registry)
//!     .task(TaskConfiguration::new("read", "read-xml").with_arg("file", "in.osm"))
//!     .task(TaskConfiguration::new("buf", "buffer").with_arg("bufferCapacity", "1000"))
//!     .task(TaskConfiguration::new("write", "write-null"))
//!     .build()?;
//!
//! let report = pipeline.execute()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod builtin;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod postbox;
pub mod registry;
pub mod task;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builtin::{Buffer, NullSink, ProgressLogger, Tee};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        ChangeAction, ChangeContainer, EntityContainer, EntityType, Metadata,
    };
    pub use crate::errors::{
        ErrorInfo, OsmosisError, OsmosisResult, PipelineConfigError, PostboxError,
    };
    pub use crate::observability::{
        init_tracing, LogFormat, LoggingStageObserver, NoOpStageObserver, StageObserver,
    };
    pub use crate::pipeline::{
        ExecutionReport, PipeRef, Pipeline, PipelineBuilder, PipelineExecutor, PipelineSpec,
        TaskConfiguration, TaskManager,
    };
    pub use crate::postbox::Postbox;
    pub use crate::registry::{TaskContext, TaskManagerFactory, TaskPlugin, TaskRegistry};
    pub use crate::task::{
        MultiSink, MultiSinkRunnableSource, MultiSource, RunnableSource, RunnableTask, Sink,
        SinkGuard, SinkMultiSource, SinkRunnableSource, SinkSource, Source, TaskKind,
    };
}

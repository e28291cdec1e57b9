//! Pipeline building and execution.
//!
//! This module provides:
//! - Task configurations as parsed from the command line or JSON
//! - Task managers wrapping one task instance each
//! - Pipe bookkeeping while tasks are connected
//! - The pipeline builder with validation
//! - The thread-per-stage executor
//!
//! A pipeline is built in phases. Every task manager is created first, in
//! declaration order. Then each manager claims its input pipes and publishes
//! its output pipes, again in declaration order, so a task can only consume
//! what an earlier task produced. Finally the task instances are wired
//! together from the last task to the first, because a producer owns the
//! sinks of its consumers.

mod builder;
mod executor;
mod manager;
mod pipe_tasks;
mod spec;

pub use builder::PipelineBuilder;
pub use executor::{ExecutionReport, Pipeline, PipelineExecutor, StageReport};
pub use manager::TaskManager;
pub use pipe_tasks::PipeTasks;
pub use spec::{PipeRef, PipelineSpec, TaskConfiguration};

//! Testing utilities for osmosis pipelines.
//!
//! This module provides:
//! - Fake sources, sinks and inline tasks recording their lifecycle
//! - Entity fixtures
//! - A registry preloaded with fake task types

pub mod fixtures;
pub mod mocks;

pub use fixtures::{nodes, test_registry, Collected, FakeRegistry};
pub use mocks::{CollectingSink, FailingSink, LifecycleProbe, PassthroughTask, VecSource};

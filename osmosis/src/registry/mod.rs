//! Task registry mapping task type names to task manager factories.
//!
//! The registry is an ordinary value handed to the
//! [`PipelineBuilder`](crate::pipeline::PipelineBuilder); there is no
//! process-wide instance.

mod context;

pub use context::TaskContext;

use crate::builtin::register_builtin_tasks;
use crate::errors::{OsmosisError, OsmosisResult, PipelineConfigError};
use crate::pipeline::TaskManager;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Creates task managers from task configurations.
pub trait TaskManagerFactory: Send + Sync {
    /// Creates the manager for the task described by `context`.
    ///
    /// Every argument the task understands must be read through `context`;
    /// arguments left unread fail the build.
    fn create_task_manager(&self, context: &mut TaskContext<'_>) -> OsmosisResult<TaskManager>;
}

impl<F> TaskManagerFactory for F
where
    F: Fn(&mut TaskContext<'_>) -> OsmosisResult<TaskManager> + Send + Sync,
{
    fn create_task_manager(&self, context: &mut TaskContext<'_>) -> OsmosisResult<TaskManager> {
        self(context)
    }
}

/// A bundle of task factories registered together.
pub trait TaskPlugin {
    /// Returns the plugin name, used in log output.
    fn name(&self) -> &str;

    /// Registers the plugin's factories.
    fn register(&self, registry: &TaskRegistry) -> OsmosisResult<()>;
}

#[derive(Default)]
struct Entries {
    factories: HashMap<String, Arc<dyn TaskManagerFactory>>,
    aliases: HashMap<String, String>,
}

impl Entries {
    fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name) || self.aliases.contains_key(name)
    }
}

/// Registry of task manager factories.
///
/// Task types and aliases share one lock, so a name check and the insert
/// that follows it are atomic.
#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<Entries>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in tasks.
    pub fn with_builtins() -> OsmosisResult<Self> {
        let registry = Self::new();
        register_builtin_tasks(&registry)?;
        Ok(registry)
    }

    /// Registers a factory under a task type name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken by a task type or alias.
    pub fn register(
        &self,
        task_type: impl Into<String>,
        factory: impl TaskManagerFactory + 'static,
    ) -> OsmosisResult<()> {
        let task_type = task_type.into();
        let mut entries = self.entries.write();
        if entries.contains(&task_type) {
            return Err(OsmosisError::illegal_state(format!(
                "Task type '{task_type}' is already registered"
            )));
        }
        tracing::trace!(task_type = %task_type, "Registered task type");
        entries.factories.insert(task_type, Arc::new(factory));
        Ok(())
    }

    /// Registers a short name for an existing task type.
    pub fn register_alias(&self, alias: impl Into<String>, task_type: &str) -> OsmosisResult<()> {
        let alias = alias.into();
        let mut entries = self.entries.write();
        if !entries.factories.contains_key(task_type) {
            return Err(OsmosisError::illegal_state(format!(
                "Cannot alias '{alias}' to unregistered task type '{task_type}'"
            )));
        }
        if entries.contains(&alias) {
            return Err(OsmosisError::illegal_state(format!(
                "Task type '{alias}' is already registered"
            )));
        }
        entries.aliases.insert(alias, task_type.to_string());
        Ok(())
    }

    /// Registers every factory of a plugin.
    pub fn load_plugin(&self, plugin: &dyn TaskPlugin) -> OsmosisResult<()> {
        let before = self.entries.read().factories.len();
        plugin.register(self)?;
        let after = self.entries.read().factories.len();
        tracing::info!(
            plugin = plugin.name(),
            task_types = after.saturating_sub(before),
            "Loaded task plugin"
        );
        Ok(())
    }

    /// Looks up the factory of a task type or alias.
    #[must_use]
    pub fn factory(&self, task_type: &str) -> Option<Arc<dyn TaskManagerFactory>> {
        let entries = self.entries.read();
        let name = entries.aliases.get(task_type).map_or(task_type, String::as_str);
        entries.factories.get(name).cloned()
    }

    /// Creates the task manager for the task described by `context`.
    ///
    /// # Errors
    ///
    /// Returns `PIPE-001-UNKNOWN_TYPE` if no factory is registered for the
    /// task type, or whatever the factory reports.
    pub fn create_task_manager(&self, context: &mut TaskContext<'_>) -> OsmosisResult<TaskManager> {
        let Some(factory) = self.factory(context.task_type()) else {
            return Err(
                PipelineConfigError::unknown_task_type(context.task_id(), context.task_type()).into(),
            );
        };
        factory.create_task_manager(context)
    }

    /// Returns true if the name is a registered task type or alias.
    #[must_use]
    pub fn contains(&self, task_type: &str) -> bool {
        self.entries.read().contains(task_type)
    }

    /// Returns the registered task type names, sorted, without aliases.
    #[must_use]
    pub fn task_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("TaskRegistry")
            .field("factory_count", &entries.factories.len())
            .field("alias_count", &entries.aliases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::core::EntityContainer;
    use crate::pipeline::TaskConfiguration;
    use crate::task::TaskKind;
    use crate::testing::mocks::{CollectingSink, LifecycleProbe};
    use pretty_assertions::assert_eq;

    fn collecting_factory(context: &mut TaskContext<'_>) -> OsmosisResult<TaskManager> {
        let (sink, _items) = CollectingSink::<EntityContainer>::new(LifecycleProbe::new());
        Ok(context.manager(TaskKind::Sink(Box::new(sink))))
    }

    struct FakePlugin;

    impl TaskPlugin for FakePlugin {
        fn name(&self) -> &str {
            "fake"
        }

        fn register(&self, registry: &TaskRegistry) -> OsmosisResult<()> {
            registry.register("write-collect", collecting_factory)?;
            registry.register_alias("wc", "write-collect")
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TaskRegistry::new();
        registry.register("write-collect", collecting_factory).unwrap();
        registry.register_alias("wc", "write-collect").unwrap();

        assert!(registry.contains("write-collect"));
        assert!(registry.contains("wc"));
        assert!(registry.factory("wc").is_some());
        assert!(registry.factory("missing").is_none());
        assert_eq!(registry.task_types(), vec!["write-collect".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = TaskRegistry::new();
        registry.register("write-collect", collecting_factory).unwrap();

        assert!(registry.register("write-collect", collecting_factory).is_err());
        assert!(registry.register_alias("write-collect", "write-collect").is_err());
        assert!(registry.register_alias("x", "unknown").is_err());
    }

    #[test]
    fn test_unknown_task_type() {
        let registry = TaskRegistry::new();
        let config = TaskConfiguration::new("w", "write-collect");
        let settings = PipelineConfig::default();
        let mut context = TaskContext::new(&config, &settings);

        let err = registry.create_task_manager(&mut context).unwrap_err();
        assert_eq!(err.config_code(), Some("PIPE-001-UNKNOWN_TYPE"));
    }

    #[test]
    fn test_load_plugin() {
        let registry = TaskRegistry::new();
        registry.load_plugin(&FakePlugin).unwrap();

        let config = TaskConfiguration::new("w", "wc");
        let settings = PipelineConfig::default();
        let mut context = TaskContext::new(&config, &settings);
        let manager = registry.create_task_manager(&mut context).unwrap();
        assert_eq!(manager.task_id(), "w");
    }

    #[test]
    fn test_concurrent_registration_of_one_name() {
        let registry = TaskRegistry::new();
        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let registered = registry.register("write-collect", collecting_factory).is_ok();
                        assert!(registry.contains("write-collect"));
                        assert!(registry.factory("write-collect").is_some());
                        usize::from(registered)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).sum()
        });

        assert_eq!(accepted, 1);
        assert_eq!(registry.task_types(), vec!["write-collect".to_string()]);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TaskRegistry::with_builtins().unwrap();
        for name in ["buffer", "b", "tee", "tc", "write-null", "wnc", "log-progress", "lpc"] {
            assert!(registry.contains(name), "{name} should be registered");
        }
    }
}

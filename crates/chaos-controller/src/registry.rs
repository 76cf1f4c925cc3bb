//! In-process registry of running actions
//!
//! Maps an experiment key to the action instance that started it and the
//! experiment snapshot it was started from. Workers touch different keys
//! concurrently; per-key access is serialized by the work queue.

use std::sync::Arc;

use chaos_actions::ChaosAction;
use chaos_common::crd::{ChaosExperiment, ObjectKey};
use dashmap::DashMap;

/// A started action and the experiment it acts for
#[derive(Clone)]
pub struct ActiveAction {
    /// Live action instance
    pub action: Arc<dyn ChaosAction>,
    /// Experiment as it was when Start succeeded
    pub experiment: ChaosExperiment,
}

/// Concurrency-safe map of active actions
#[derive(Clone, Default)]
pub struct ActiveActions {
    entries: Arc<DashMap<ObjectKey, ActiveAction>>,
}

impl ActiveActions {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a started action
    pub fn register(&self, key: ObjectKey, action: Arc<dyn ChaosAction>, experiment: ChaosExperiment) {
        self.entries.insert(key, ActiveAction { action, experiment });
    }

    /// Look up the action for `key`
    pub fn get(&self, key: &ObjectKey) -> Option<ActiveAction> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Remove and return the action for `key`
    pub fn remove(&self, key: &ObjectKey) -> Option<ActiveAction> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// True when `key` has an active action
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys of every active action
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of active actions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is active
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

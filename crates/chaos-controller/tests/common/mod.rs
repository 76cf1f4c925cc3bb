//! In-memory cluster and recording actions for controller integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chaos_actions::{ActionError, ActionFactory, ChaosAction, ExperimentType};
use chaos_common::crd::{
    ChaosExperiment, ChaosExperimentSpec, ChaosExperimentStatus, ExperimentPhase, ObjectKey,
    TargetRef,
};
use chaos_common::Error;
use chaos_controller::{ExperimentCache, ExperimentStore, ManualClock, Reconciler};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Cache and status store over one map, with resourceVersion checks
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<ObjectKey, ChaosExperiment>>,
    next_rv: AtomicU64,
    status_writes: Mutex<Vec<ChaosExperimentStatus>>,
    cache_reads: AtomicUsize,
    pending_conflicts: AtomicU32,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bump_rv(&self) -> String {
        (self.next_rv.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Create a Pending experiment in namespace "chaos"
    pub fn create(&self, name: &str, experiment_type: &str, duration: &str) -> ObjectKey {
        let mut exp = ChaosExperiment::new(
            name,
            ChaosExperimentSpec {
                target: TargetRef {
                    api_version: "v1".into(),
                    kind: "Pod".into(),
                    name: "web-0".into(),
                    namespace: String::new(),
                },
                experiment_type: experiment_type.into(),
                duration: duration.into(),
                parameters: Default::default(),
            },
        );
        exp.metadata.namespace = Some("chaos".into());
        exp.metadata.resource_version = Some(self.bump_rv());
        let key = exp.key();
        self.objects.lock().unwrap().insert(key.clone(), exp);
        key
    }

    pub fn delete(&self, key: &ObjectKey) {
        self.objects.lock().unwrap().remove(key);
    }

    /// Make the next `n` status writes fail with a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn status(&self, key: &ObjectKey) -> ChaosExperimentStatus {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|exp| exp.status_or_default())
            .unwrap_or_default()
    }

    pub fn status_writes(&self) -> Vec<ChaosExperimentStatus> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn cache_reads(&self) -> usize {
        self.cache_reads.load(Ordering::SeqCst)
    }
}

impl ExperimentCache for FakeCluster {
    fn get(&self, key: &ObjectKey) -> Option<Arc<ChaosExperiment>> {
        self.cache_reads.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().get(key).cloned().map(Arc::new)
    }

    fn keys(&self) -> Vec<ObjectKey> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ExperimentStore for FakeCluster {
    async fn update_status(
        &self,
        experiment: &ChaosExperiment,
        status: &ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error> {
        let key = experiment.key();
        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::conflict(key.to_string()));
        }

        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(Error::not_found(key.to_string()));
        };
        if stored.metadata.resource_version != experiment.metadata.resource_version {
            return Err(Error::conflict(key.to_string()));
        }

        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(self.bump_rv());
        self.status_writes.lock().unwrap().push(status.clone());
        Ok(stored.clone())
    }
}

/// Action that records calls and optionally fails Stop
#[derive(Default)]
pub struct RecordingAction {
    starts: AtomicUsize,
    stops: AtomicUsize,
    stop_error: Option<String>,
}

impl RecordingAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_stop(stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            stop_error: Some(stderr.to_string()),
            ..Default::default()
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChaosAction for RecordingAction {
    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::PodFailure
    }

    async fn start(
        &self,
        _experiment: &ChaosExperiment,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(
        &self,
        _experiment: &ChaosExperiment,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        match &self.stop_error {
            Some(stderr) => Err(ActionError::Exec {
                message: "exit code 1".into(),
                stderr: stderr.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Resolves every known experiment type to the same recording action
pub struct SharedFactory(pub Arc<RecordingAction>);

impl ActionFactory for SharedFactory {
    fn create(&self, experiment_type: &str) -> Option<Arc<dyn ChaosAction>> {
        experiment_type
            .parse::<ExperimentType>()
            .ok()
            .map(|_| self.0.clone() as Arc<dyn ChaosAction>)
    }
}

/// Everything a scenario needs
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub action: Arc<RecordingAction>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_action(RecordingAction::new())
    }

    pub fn with_action(action: Arc<RecordingAction>) -> Self {
        let cluster = FakeCluster::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Self::reconciler(&cluster, &action, &clock);
        Self {
            cluster,
            action,
            clock,
            reconciler,
        }
    }

    /// A fresh reconciler over the same cluster, as after a process restart
    pub fn restart(&mut self) {
        self.reconciler = Self::reconciler(&self.cluster, &self.action, &self.clock);
    }

    fn reconciler(
        cluster: &Arc<FakeCluster>,
        action: &Arc<RecordingAction>,
        clock: &Arc<ManualClock>,
    ) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            cluster.clone(),
            cluster.clone(),
            Arc::new(SharedFactory(action.clone())),
            clock.clone(),
        ))
    }

    pub fn phase(&self, key: &ObjectKey) -> ExperimentPhase {
        self.cluster.status(key).phase
    }
}

//! Experiment state machine
//!
//! Each pass reads the cached object and acts on its phase:
//!
//! ```text
//! Pending ──validate──> Failed            (unknown type, bad duration)
//!    │
//!    └─write Running─> Start ──ok──> Running (effect=Applied)
//!                           └─err─> Failed
//! Running ──deadline──> Stop ─> (effect=Reverted) ─> Completed
//! Completed | Failed ─> no-op
//! ```
//!
//! Passes are level-triggered: redelivering an unchanged object is a no-op
//! except at the two edges that carry side effects.

use std::sync::Arc;
use std::time::Duration;

use chaos_actions::{ActionFactory, ChaosAction};
use chaos_common::crd::{
    ChaosExperiment, ChaosExperimentStatus, EffectState, ExperimentPhase, ObjectKey,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::error::ReconcileError;
use crate::registry::ActiveActions;
use crate::store::{ExperimentCache, ExperimentStore};

/// Status message for a clean completion
pub const COMPLETED_MESSAGE: &str = "Experiment completed successfully";

/// What the worker should do with the key after a successful pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing scheduled; clear backoff
    Done,
    /// Clear backoff and look again after the given delay
    RequeueAfter(Duration),
}

/// Drives experiments through their lifecycle
pub struct Reconciler {
    cache: Arc<dyn ExperimentCache>,
    store: Arc<dyn ExperimentStore>,
    factory: Arc<dyn ActionFactory>,
    registry: ActiveActions,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    /// Reconciler with an empty registry
    pub fn new(
        cache: Arc<dyn ExperimentCache>,
        store: Arc<dyn ExperimentStore>,
        factory: Arc<dyn ActionFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            store,
            factory,
            registry: ActiveActions::new(),
            clock,
        }
    }

    /// Actions currently applied by this process
    pub fn registry(&self) -> &ActiveActions {
        &self.registry
    }

    /// Run one reconciliation pass for `key`
    #[instrument(skip(self, cancel), fields(experiment = %key))]
    pub async fn sync(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, ReconcileError> {
        let Some(experiment) = self.cache.get(key) else {
            return Ok(self.handle_missing(key, cancel).await);
        };

        let phase = experiment.phase();
        debug!(phase = %phase, "Reconciling experiment");

        match phase {
            ExperimentPhase::Pending => self.handle_pending(&experiment, cancel).await,
            ExperimentPhase::Running => self.handle_running(&experiment, cancel).await,
            ExperimentPhase::Completed | ExperimentPhase::Failed => Ok(SyncOutcome::Done),
            ExperimentPhase::Unknown(phase) => Err(ReconcileError::UnknownPhase {
                key: key.clone(),
                phase,
            }),
        }
    }

    /// The object is gone from the cache
    ///
    /// Deletion races are expected. If this process still holds an action for
    /// the key, the experiment was deleted mid-run; reverse it best-effort.
    async fn handle_missing(&self, key: &ObjectKey, cancel: &CancellationToken) -> SyncOutcome {
        let Some(active) = self.registry.remove(key) else {
            debug!("Experiment not found in cache, nothing to do");
            return SyncOutcome::Done;
        };

        info!("Experiment deleted while running, stopping action");
        if let Err(e) = active.action.stop(&active.experiment, cancel).await {
            warn!(error = %e, "Failed to stop action for deleted experiment");
        }
        SyncOutcome::Done
    }

    async fn handle_pending(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, ReconcileError> {
        let key = experiment.key();
        let experiment_type = &experiment.spec.experiment_type;

        let Some(action) = self.factory.create(experiment_type) else {
            let message = format!("Unknown experiment type: {}", experiment_type);
            warn!(experiment_type = %experiment_type, "Unknown experiment type");
            self.fail(experiment, message).await?;
            return Ok(SyncOutcome::Done);
        };

        let duration = match experiment.duration() {
            Ok(duration) => duration,
            Err(e) => {
                warn!(duration = %experiment.spec.duration, error = %e, "Invalid duration");
                self.fail(experiment, format!("Invalid duration: {}", e)).await?;
                return Ok(SyncOutcome::Done);
            }
        };

        // Persist Running first: a conflict here means another writer raced us
        // and nothing has been started yet.
        let start_time = self.clock.now();
        let running = ChaosExperimentStatus::running(start_time);
        let experiment = self.store.update_status(experiment, &running).await?;
        info!(experiment_type = %experiment_type, "Experiment started");

        match action.start(&experiment, cancel).await {
            Ok(()) => {
                self.registry
                    .register(key.clone(), action, experiment.clone());

                let applied = running.with_effect(EffectState::Applied);
                if let Err(e) = self.store.update_status(&experiment, &applied).await {
                    warn!(error = %e, "Failed to record applied effect");
                }

                Ok(SyncOutcome::RequeueAfter(self.remaining(start_time, duration)))
            }
            Err(e) if e.is_cancelled() => {
                // Part of the effect may be in place; keep the action so the
                // deadline pass can reverse it.
                self.registry.register(key.clone(), action, experiment);
                Err(ReconcileError::Interrupted { key })
            }
            Err(e) => {
                error!(error = %e, "Failed to start experiment");
                let failed =
                    running.into_failed(self.clock.now(), format!("Failed to start experiment: {}", e));
                if let Err(write_err) = self.store.update_status(&experiment, &failed).await {
                    error!(error = %write_err, "Failed to record start failure");
                }
                Ok(SyncOutcome::Done)
            }
        }
    }

    async fn handle_running(
        &self,
        experiment: &ChaosExperiment,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, ReconcileError> {
        let key = experiment.key();
        let duration = experiment
            .duration()
            .map_err(|source| ReconcileError::InvalidDuration {
                key: key.clone(),
                duration: experiment.spec.duration.clone(),
                source,
            })?;

        let status = experiment.status_or_default();
        let Some(start_time) = status.start_time else {
            return Err(ReconcileError::MissingStartTime { key });
        };

        let remaining = self.remaining(start_time, duration);
        if !remaining.is_zero() {
            debug!(remaining_ms = remaining.as_millis() as u64, "Experiment still running");
            return Ok(SyncOutcome::RequeueAfter(remaining));
        }

        let mut experiment = experiment.clone();
        let mut status = status;
        let mut message = COMPLETED_MESSAGE.to_string();

        if experiment.effect() == Some(EffectState::Reverted) {
            self.registry.remove(&key);
            debug!("Effect already reverted, skipping stop");
        } else if let Some(action) = self.action_for_stop(&experiment) {
            match action.stop(&experiment, cancel).await {
                Ok(()) => {
                    self.registry.remove(&key);
                    status = status.with_effect(EffectState::Reverted);
                    experiment = self.store.update_status(&experiment, &status).await?;
                }
                Err(e) if e.is_cancelled() => {
                    return Err(ReconcileError::Interrupted { key });
                }
                Err(e) => {
                    self.registry.remove(&key);
                    warn!(error = %e, "Failed to stop action");
                    message = format!("Experiment completed with errors: {}", e);
                }
            }
        } else {
            self.registry.remove(&key);
        }

        let completed = status.into_completed(self.clock.now(), message);
        self.store.update_status(&experiment, &completed).await?;
        info!(message = %completed.message, "Experiment completed");

        Ok(SyncOutcome::Done)
    }

    /// Action to reverse `experiment`: the registered instance, or a fresh
    /// one built from the stored spec when this process did not start it.
    fn action_for_stop(&self, experiment: &ChaosExperiment) -> Option<Arc<dyn ChaosAction>> {
        if let Some(active) = self.registry.get(&experiment.key()) {
            return Some(active.action);
        }

        let action = self.factory.create(&experiment.spec.experiment_type);
        match &action {
            Some(_) => warn!("No active action registered, stopping from stored spec"),
            None => warn!(
                experiment_type = %experiment.spec.experiment_type,
                "No active action registered and type cannot be resolved, completing without stop"
            ),
        }
        action
    }

    /// Write a terminal Failed status
    async fn fail(&self, experiment: &ChaosExperiment, message: String) -> Result<(), ReconcileError> {
        let failed = experiment
            .status_or_default()
            .into_failed(self.clock.now(), message);
        self.store.update_status(experiment, &failed).await?;
        Ok(())
    }

    fn remaining(&self, start_time: chrono::DateTime<chrono::Utc>, duration: Duration) -> Duration {
        let elapsed = (self.clock.now() - start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        duration.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MockExperimentStore;
    use chaos_actions::{ActionError, ExperimentType};
    use chaos_common::crd::{ChaosExperimentSpec, TargetRef};
    use chrono::Utc;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        pub Action {}

        #[async_trait::async_trait]
        impl ChaosAction for Action {
            fn experiment_type(&self) -> ExperimentType;
            async fn start(
                &self,
                experiment: &ChaosExperiment,
                cancel: &CancellationToken,
            ) -> Result<(), ActionError>;
            async fn stop(
                &self,
                experiment: &ChaosExperiment,
                cancel: &CancellationToken,
            ) -> Result<(), ActionError>;
        }
    }

    /// Cache holding whatever the test puts in it
    #[derive(Default)]
    struct TestCache(Mutex<HashMap<ObjectKey, Arc<ChaosExperiment>>>);

    impl TestCache {
        fn with(experiment: ChaosExperiment) -> Self {
            let cache = Self::default();
            cache
                .0
                .lock()
                .unwrap()
                .insert(experiment.key(), Arc::new(experiment));
            cache
        }
    }

    impl ExperimentCache for TestCache {
        fn get(&self, key: &ObjectKey) -> Option<Arc<ChaosExperiment>> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn keys(&self) -> Vec<ObjectKey> {
            self.0.lock().unwrap().keys().cloned().collect()
        }
    }

    /// Factory handing out one shared action for the "pod-failure" type
    struct TestFactory(Option<Arc<dyn ChaosAction>>);

    impl ActionFactory for TestFactory {
        fn create(&self, experiment_type: &str) -> Option<Arc<dyn ChaosAction>> {
            match experiment_type {
                "pod-failure" => self.0.clone(),
                _ => None,
            }
        }
    }

    fn experiment(experiment_type: &str, duration: &str) -> ChaosExperiment {
        let mut exp = ChaosExperiment::new(
            "e1",
            ChaosExperimentSpec {
                target: TargetRef {
                    api_version: "v1".into(),
                    kind: "Pod".into(),
                    name: "p1".into(),
                    namespace: "ns".into(),
                },
                experiment_type: experiment_type.into(),
                duration: duration.into(),
                parameters: Default::default(),
            },
        );
        exp.metadata.namespace = Some("ns".into());
        exp.metadata.resource_version = Some("1".into());
        exp
    }

    fn running(exp: ChaosExperiment, started: chrono::DateTime<Utc>) -> ChaosExperiment {
        let mut exp = exp;
        exp.status = Some(ChaosExperimentStatus::running(started).with_effect(EffectState::Applied));
        exp
    }

    /// Store that echoes every write back with the new status applied
    fn echo_store(writes: Arc<Mutex<Vec<ChaosExperimentStatus>>>) -> MockExperimentStore {
        let mut store = MockExperimentStore::new();
        store.expect_update_status().returning(move |exp, status| {
            writes.lock().unwrap().push(status.clone());
            let mut updated = exp.clone();
            updated.status = Some(status.clone());
            Ok(updated)
        });
        store
    }

    fn reconciler(
        cache: TestCache,
        store: MockExperimentStore,
        action: Option<MockAction>,
        clock: Arc<ManualClock>,
    ) -> Reconciler {
        let action = action.map(|a| Arc::new(a) as Arc<dyn ChaosAction>);
        Reconciler::new(
            Arc::new(cache),
            Arc::new(store),
            Arc::new(TestFactory(action)),
            clock,
        )
    }

    fn key() -> ObjectKey {
        ObjectKey::new("ns", "e1")
    }

    mod pending {
        use super::*;

        #[tokio::test]
        async fn story_pending_experiment_starts_and_registers_action() {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let mut action = MockAction::new();
            action.expect_start().times(1).returning(|_, _| Ok(()));
            action.expect_stop().never();

            let r = reconciler(
                TestCache::with(experiment("pod-failure", "2s")),
                echo_store(writes.clone()),
                Some(action),
                clock,
            );

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::RequeueAfter(Duration::from_secs(2)));
            assert!(r.registry().contains(&key()));

            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 2);
            assert_eq!(writes[0].phase, ExperimentPhase::Running);
            assert!(writes[0].start_time.is_some());
            assert_eq!(writes[0].message, "Experiment started");
            assert_eq!(writes[1].effect, Some(EffectState::Applied));
        }

        #[tokio::test]
        async fn story_unknown_type_fails_without_running() {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let clock = Arc::new(ManualClock::new(Utc::now()));

            let r = reconciler(
                TestCache::with(experiment("teleport", "2s")),
                echo_store(writes.clone()),
                None,
                clock,
            );

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::Done);

            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].phase, ExperimentPhase::Failed);
            assert!(writes[0]
                .message
                .contains("Unknown experiment type: teleport"));
            assert!(writes[0].start_time.is_none());
            assert!(writes[0].end_time.is_some());
        }

        #[tokio::test]
        async fn story_unparseable_duration_fails_before_start() {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action.expect_start().never();

            let r = reconciler(
                TestCache::with(experiment("pod-failure", "a while")),
                echo_store(writes.clone()),
                Some(action),
                Arc::new(ManualClock::new(Utc::now())),
            );

            r.sync(&key(), &CancellationToken::new()).await.unwrap();

            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].phase, ExperimentPhase::Failed);
            assert!(writes[0].message.starts_with("Invalid duration:"));
        }

        #[tokio::test]
        async fn story_start_failure_marks_failed_with_error() {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action.expect_start().times(1).returning(|_, _| {
                Err(ActionError::TargetNotFound {
                    namespace: "ns".into(),
                    name: "p1".into(),
                })
            });

            let r = reconciler(
                TestCache::with(experiment("pod-failure", "2s")),
                echo_store(writes.clone()),
                Some(action),
                Arc::new(ManualClock::new(Utc::now())),
            );

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::Done);
            assert!(r.registry().is_empty());

            let writes = writes.lock().unwrap();
            let last = writes.last().unwrap();
            assert_eq!(last.phase, ExperimentPhase::Failed);
            assert_eq!(
                last.message,
                "Failed to start experiment: target pod ns/p1 not found"
            );
            assert!(last.start_time.is_some());
            assert!(last.end_time.is_some());
        }

        #[tokio::test]
        async fn story_conflict_on_running_write_is_retried_without_start() {
            let mut store = MockExperimentStore::new();
            store
                .expect_update_status()
                .times(1)
                .returning(|_, _| Err(chaos_common::Error::conflict("ns/e1")));
            let mut action = MockAction::new();
            action.expect_start().never();

            let r = reconciler(
                TestCache::with(experiment("pod-failure", "2s")),
                store,
                Some(action),
                Arc::new(ManualClock::new(Utc::now())),
            );

            let err = r
                .sync(&key(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn cancelled_start_keeps_action_for_reversal() {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action
                .expect_start()
                .returning(|_, _| Err(ActionError::Cancelled));

            let r = reconciler(
                TestCache::with(experiment("pod-failure", "2s")),
                echo_store(writes.clone()),
                Some(action),
                Arc::new(ManualClock::new(Utc::now())),
            );

            let err = r
                .sync(&key(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::Interrupted { .. }));
            assert!(r.registry().contains(&key()));
            // Only the Running write happened; no Failed status for an interrupted start
            assert_eq!(writes.lock().unwrap().len(), 1);
        }
    }

    mod running {
        use super::*;

        #[tokio::test]
        async fn story_deadline_not_reached_requeues_for_remainder() {
            let start = Utc::now();
            let clock = Arc::new(ManualClock::new(start));
            clock.advance(Duration::from_secs(1));
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = reconciler(
                TestCache::with(running(experiment("pod-failure", "2s"), start)),
                store,
                None,
                clock,
            );

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::RequeueAfter(Duration::from_secs(1)));
        }

        #[tokio::test]
        async fn story_deadline_reached_stops_and_completes() {
            let start = Utc::now();
            let clock = Arc::new(ManualClock::new(start));
            clock.advance(Duration::from_secs(2));
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action.expect_stop().times(1).returning(|_, _| Ok(()));
            let action = Arc::new(action);

            let exp = running(experiment("pod-failure", "2s"), start);
            let r = Reconciler::new(
                Arc::new(TestCache::with(exp.clone())),
                Arc::new(echo_store(writes.clone())),
                Arc::new(TestFactory(None)),
                clock,
            );
            r.registry().register(key(), action, exp);

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::Done);
            assert!(r.registry().is_empty());

            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 2);
            assert_eq!(writes[0].phase, ExperimentPhase::Running);
            assert_eq!(writes[0].effect, Some(EffectState::Reverted));
            assert_eq!(writes[1].phase, ExperimentPhase::Completed);
            assert_eq!(writes[1].message, COMPLETED_MESSAGE);
            assert_eq!(writes[1].start_time, Some(start));
            assert!(writes[1].end_time.is_some());
        }

        #[tokio::test]
        async fn story_stop_failure_still_completes_with_error_text() {
            let start = Utc::now();
            let clock = Arc::new(ManualClock::new(start));
            clock.advance(Duration::from_secs(5));
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action.expect_stop().times(1).returning(|_, _| {
                Err(ActionError::Exec {
                    message: "exit code 2".into(),
                    stderr: "RTNETLINK answers: No such file or directory".into(),
                })
            });
            let action = Arc::new(action);

            let exp = running(experiment("pod-failure", "2s"), start);
            let r = Reconciler::new(
                Arc::new(TestCache::with(exp.clone())),
                Arc::new(echo_store(writes.clone())),
                Arc::new(TestFactory(None)),
                clock,
            );
            r.registry().register(key(), action, exp);

            r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert!(r.registry().is_empty());

            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].phase, ExperimentPhase::Completed);
            assert!(writes[0].message.contains("Experiment completed with errors"));
            assert!(writes[0].message.contains("RTNETLINK answers"));
            assert_eq!(writes[0].effect, Some(EffectState::Applied));
        }

        #[tokio::test]
        async fn story_after_restart_stop_is_rebuilt_from_spec() {
            let start = Utc::now();
            let clock = Arc::new(ManualClock::new(start));
            clock.advance(Duration::from_secs(3));
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action
                .expect_stop()
                .withf(|exp, _| exp.spec.target.name == "p1")
                .times(1)
                .returning(|_, _| Ok(()));

            let r = reconciler(
                TestCache::with(running(experiment("pod-failure", "2s"), start)),
                echo_store(writes.clone()),
                Some(action),
                clock,
            );
            assert!(r.registry().is_empty());

            r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(
                writes.lock().unwrap().last().unwrap().phase,
                ExperimentPhase::Completed
            );
        }

        #[tokio::test]
        async fn story_reverted_effect_skips_second_stop() {
            let start = Utc::now();
            let clock = Arc::new(ManualClock::new(start));
            clock.advance(Duration::from_secs(3));
            let writes = Arc::new(Mutex::new(Vec::new()));
            let mut action = MockAction::new();
            action.expect_stop().never();

            let mut exp = running(experiment("pod-failure", "2s"), start);
            exp.status = exp
                .status
                .map(|s| s.with_effect(EffectState::Reverted));

            let r = reconciler(
                TestCache::with(exp.clone()),
                echo_store(writes.clone()),
                None,
                clock,
            );
            // Stop succeeded on an earlier pass whose Completed write was lost
            r.registry().register(key(), Arc::new(action), exp);

            r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert!(r.registry().is_empty());
            let writes = writes.lock().unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].phase, ExperimentPhase::Completed);
        }

        #[tokio::test]
        async fn story_invalid_duration_is_retryable_and_writes_nothing() {
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = reconciler(
                TestCache::with(running(experiment("pod-failure", "later"), Utc::now())),
                store,
                None,
                Arc::new(ManualClock::new(Utc::now())),
            );

            let err = r
                .sync(&key(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::InvalidDuration { .. }));
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn missing_start_time_is_an_invariant_violation() {
            let mut exp = experiment("pod-failure", "2s");
            exp.status = Some(ChaosExperimentStatus {
                phase: ExperimentPhase::Running,
                ..Default::default()
            });
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = reconciler(
                TestCache::with(exp),
                store,
                None,
                Arc::new(ManualClock::new(Utc::now())),
            );

            let err = r
                .sync(&key(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::MissingStartTime { .. }));
            assert!(!err.is_retryable());
        }
    }

    mod terminal_and_missing {
        use super::*;

        #[tokio::test]
        async fn story_terminal_phases_are_no_ops() {
            for phase in [ExperimentPhase::Completed, ExperimentPhase::Failed] {
                let mut exp = experiment("pod-failure", "2s");
                exp.status = Some(ChaosExperimentStatus {
                    phase,
                    ..Default::default()
                });
                let mut store = MockExperimentStore::new();
                store.expect_update_status().never();
                let mut action = MockAction::new();
                action.expect_start().never();
                action.expect_stop().never();

                let r = reconciler(
                    TestCache::with(exp),
                    store,
                    Some(action),
                    Arc::new(ManualClock::new(Utc::now())),
                );
                let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
                assert_eq!(outcome, SyncOutcome::Done);
            }
        }

        #[tokio::test]
        async fn unknown_phase_is_terminal_error() {
            let mut exp = experiment("pod-failure", "2s");
            exp.status = Some(ChaosExperimentStatus {
                phase: ExperimentPhase::Unknown("Paused".into()),
                ..Default::default()
            });
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = reconciler(
                TestCache::with(exp),
                store,
                None,
                Arc::new(ManualClock::new(Utc::now())),
            );
            let err = r
                .sync(&key(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::UnknownPhase { ref phase, .. } if phase == "Paused"));
        }

        #[tokio::test]
        async fn story_missing_object_is_a_silent_success() {
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = reconciler(
                TestCache::default(),
                store,
                None,
                Arc::new(ManualClock::new(Utc::now())),
            );
            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::Done);
        }

        #[tokio::test]
        async fn story_deleted_while_running_stops_best_effort() {
            let mut action = MockAction::new();
            action
                .expect_stop()
                .times(1)
                .returning(|_, _| Err(ActionError::Cancelled));
            let mut store = MockExperimentStore::new();
            store.expect_update_status().never();

            let r = Reconciler::new(
                Arc::new(TestCache::default()),
                Arc::new(store),
                Arc::new(TestFactory(None)),
                Arc::new(ManualClock::new(Utc::now())),
            );
            r.registry()
                .register(key(), Arc::new(action), experiment("pod-failure", "2s"));

            let outcome = r.sync(&key(), &CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, SyncOutcome::Done);
            assert!(r.registry().is_empty());
        }
    }
}

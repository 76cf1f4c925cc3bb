//! Controller runtime: watch, resync, and the worker pool
//!
//! The watch stream feeds a reflector cache and enqueues every key it sees.
//! A resync ticker re-enqueues every cached key so deadlines are rechecked
//! even when nothing changes, plus every key holding an active action so a
//! delete missed during a relist still reverts its effect. Workers pull keys and run one reconcile pass
//! each; the queue guarantees a key is held by at most one worker.

use std::sync::Arc;
use std::time::Duration;

use chaos_actions::DefaultActionFactory;
use chaos_common::crd::{ChaosExperiment, ObjectKey};
use chaos_common::retry::Backoff;
use chaos_common::{Error, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKER_COUNT};
use futures::{Stream, StreamExt};
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::SystemClock;
use crate::error::ReconcileError;
use crate::queue::WorkQueue;
use crate::reconciler::{Reconciler, SyncOutcome};
use crate::registry::ActiveActions;
use crate::store::{ExperimentCache, KubeExperimentStore};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client gives up on them.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Runtime knobs for [`run`]
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Concurrent reconcile workers
    pub workers: usize,
    /// Interval between full cache resyncs
    pub resync_interval: Duration,
    /// Server-side watch timeout
    pub watch_timeout_secs: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            watch_timeout_secs: WATCH_TIMEOUT_SECS,
        }
    }
}

/// Run the controller until `shutdown` fires
///
/// Returns once every worker has finished its in-flight pass. Actions
/// interrupted by shutdown are left for the next process to finish.
pub async fn run(
    client: Client,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let api: Api<ChaosExperiment> = Api::all(client.clone());
    let (reader, writer) = reflector::store();
    let queue = WorkQueue::new(Backoff::queue_default());

    let events = watcher::watcher(api, WatcherConfig::default().timeout(config.watch_timeout_secs))
        .default_backoff()
        .reflect(writer);
    let watch_task = tokio::spawn(enqueue_events(events, queue.clone()));

    info!("Waiting for experiment cache to sync");
    tokio::select! {
        _ = shutdown.cancelled() => {
            watch_task.abort();
            return Ok(());
        }
        ready = reader.wait_until_ready() => {
            ready.map_err(|e| Error::internal_with_context("cache_sync", e.to_string()))?;
        }
    }
    info!(experiments = reader.state().len(), "Experiment cache synced");

    let cache: Arc<Store<ChaosExperiment>> = Arc::new(reader);
    let reconciler = Arc::new(Reconciler::new(
        cache.clone(),
        Arc::new(KubeExperimentStore::new(client.clone())),
        Arc::new(DefaultActionFactory::from_client(client)),
        Arc::new(SystemClock),
    ));

    let resync_task = tokio::spawn(resync(
        cache as Arc<dyn ExperimentCache>,
        reconciler.registry().clone(),
        queue.clone(),
        config.resync_interval,
    ));

    let workers: Vec<_> = (0..config.workers.max(1))
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                queue.clone(),
                reconciler.clone(),
                shutdown.child_token(),
            ))
        })
        .collect();
    info!(workers = workers.len(), "Controller started");

    shutdown.cancelled().await;
    info!("Shutting down controller");

    queue.shutdown();
    resync_task.abort();
    watch_task.abort();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Worker exited abnormally");
        }
    }

    info!(
        active_actions = reconciler.registry().len(),
        "Controller stopped"
    );
    Ok(())
}

/// Enqueue the key of every object the watch reports
async fn enqueue_events<S>(events: S, queue: WorkQueue<ObjectKey>)
where
    S: Stream<Item = Result<Event<ChaosExperiment>, watcher::Error>>,
{
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Apply(exp)) | Ok(Event::InitApply(exp)) => queue.add(exp.key()),
            Ok(Event::Delete(exp)) => {
                debug!(experiment = %exp.key(), "Experiment deleted");
                queue.add(exp.key());
            }
            Ok(Event::Init) | Ok(Event::InitDone) => {}
            Err(e) => warn!(error = %e, "Experiment watch error"),
        }
    }
    debug!("Experiment watch stream ended");
}

/// Re-enqueue every cached and every active key on a fixed interval
async fn resync(
    cache: Arc<dyn ExperimentCache>,
    registry: ActiveActions,
    queue: WorkQueue<ObjectKey>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately and the watch has just enqueued everything
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let cached = cache.keys();
        let active = registry.keys();
        debug!(
            cached = cached.len(),
            active = active.len(),
            "Resyncing experiments"
        );
        // Active keys missing from the cache reach the deleted-while-running path
        for key in cached.into_iter().chain(active) {
            queue.add(key);
        }
    }
}

async fn worker_loop(
    id: usize,
    queue: WorkQueue<ObjectKey>,
    reconciler: Arc<Reconciler>,
    cancel: CancellationToken,
) {
    loop {
        // Only the wait is raced against shutdown; a pass in progress runs to
        // completion and sees the cancellation through its token.
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };
        process_key(&queue, &reconciler, key, &cancel).await;
    }
    debug!(worker = id, "Worker stopped");
}

/// Run one pass for `key` and feed the outcome back into the queue
///
/// Always releases the key with [`WorkQueue::done`]. A panicking pass is
/// caught and treated as a non-retryable error.
pub async fn process_key(
    queue: &WorkQueue<ObjectKey>,
    reconciler: &Arc<Reconciler>,
    key: ObjectKey,
    cancel: &CancellationToken,
) {
    let task = {
        let reconciler = reconciler.clone();
        let key = key.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { reconciler.sync(&key, &cancel).await })
    };

    let result = task.await.unwrap_or_else(|e| {
        Err(ReconcileError::Panicked {
            key: key.clone(),
            message: panic_message(e),
        })
    });

    match result {
        Ok(SyncOutcome::Done) => queue.forget(&key),
        Ok(SyncOutcome::RequeueAfter(delay)) => {
            queue.forget(&key);
            queue.add_after(key.clone(), delay);
        }
        Err(ReconcileError::Interrupted { .. }) => {
            info!(experiment = %key, "Reconcile interrupted by shutdown");
            queue.forget(&key);
        }
        Err(e) if e.is_retryable() => {
            warn!(
                experiment = %key,
                error = %e,
                attempt = queue.num_requeues(&key) + 1,
                "Reconcile failed, retrying with backoff"
            );
            queue.add_rate_limited(key.clone());
        }
        Err(e) => {
            error!(experiment = %key, error = %e, "Reconcile failed, dropping key");
            queue.forget(&key);
        }
    }

    queue.done(&key);
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

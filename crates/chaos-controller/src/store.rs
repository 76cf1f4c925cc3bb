//! Read and write seams over the ChaosExperiment store
//!
//! Reads come from the reflector cache (eventually consistent, no API round
//! trip). Writes go to the API server as status patches guarded by the
//! resourceVersion that was read, so a concurrent writer produces a conflict
//! instead of being overwritten.

use std::sync::Arc;

use async_trait::async_trait;
use chaos_common::crd::{ChaosExperiment, ChaosExperimentStatus, ObjectKey};
use chaos_common::{Error, CONTROLLER_FIELD_MANAGER};
use kube::api::{Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Point-in-time reads from the local cache
pub trait ExperimentCache: Send + Sync {
    /// Cached experiment for `key`, `None` if it is not (or no longer) known
    fn get(&self, key: &ObjectKey) -> Option<Arc<ChaosExperiment>>;

    /// Keys of every cached experiment
    fn keys(&self) -> Vec<ObjectKey>;
}

impl ExperimentCache for Store<ChaosExperiment> {
    fn get(&self, key: &ObjectKey) -> Option<Arc<ChaosExperiment>> {
        Store::get(self, &ObjectRef::new(&key.name).within(&key.namespace))
    }

    fn keys(&self) -> Vec<ObjectKey> {
        self.state().iter().map(|exp| exp.key()).collect()
    }
}

/// Status writes against the API server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Replace the status of `experiment`, conditional on its resourceVersion
    ///
    /// Returns the updated object so further writes in the same pass carry
    /// the new resourceVersion. A stale version yields [`Error::Conflict`].
    async fn update_status(
        &self,
        experiment: &ChaosExperiment,
        status: &ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error>;
}

/// [`ExperimentStore`] backed by the status subresource
pub struct KubeExperimentStore {
    client: Client,
}

impl KubeExperimentStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch replacing `status`, guarded by `resource_version` when known
pub(crate) fn status_patch(
    resource_version: Option<&str>,
    status: &ChaosExperimentStatus,
) -> Result<serde_json::Value, Error> {
    let mut patch = serde_json::json!({ "status": serde_json::to_value(status)? });
    if let Some(rv) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }
    Ok(patch)
}

#[async_trait]
impl ExperimentStore for KubeExperimentStore {
    async fn update_status(
        &self,
        experiment: &ChaosExperiment,
        status: &ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error> {
        let key = experiment.key();
        let api: Api<ChaosExperiment> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = status_patch(experiment.resource_version().as_deref(), status)?;

        debug!(
            experiment = %key,
            phase = %status.phase,
            resource_version = ?experiment.resource_version(),
            "Writing status"
        );

        api.patch_status(
            &key.name,
            &PatchParams::apply(CONTROLLER_FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::from_kube(key.to_string(), e))
    }
}

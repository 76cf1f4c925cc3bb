//! Target resolution
//!
//! Experiments name their target loosely (kind may be empty, namespace may be
//! omitted). Resolution normalizes that reference to a concrete pod and
//! confirms it exists before any action touches it.

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::{Api, Client};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::ActionError;

/// Parameter selecting the container commands run in
pub const CONTAINER_PARAM: &str = "container";

/// Pod lookup and deletion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Fetch a pod, `None` when it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ActionError>;

    /// Delete a pod
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ActionError>;
}

/// Real Kubernetes implementation of [`TargetClient`]
pub struct KubeTargetClient {
    client: Client,
}

impl KubeTargetClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetClient for KubeTargetClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ActionError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.get_opt(name).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ActionError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pods.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(ActionError::TargetNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// A pod that an action can address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Pod namespace
    pub namespace: String,
    /// Pod name
    pub name: String,
    /// Container for exec; `None` uses the pod's default container
    pub container: Option<String>,
}

/// Resolve an experiment's target to an existing pod
pub async fn resolve_target(
    client: &dyn TargetClient,
    experiment: &ChaosExperiment,
) -> Result<ResolvedTarget, ActionError> {
    let target = &experiment.spec.target;
    if !target.kind.is_empty() && !target.kind.eq_ignore_ascii_case("Pod") {
        return Err(ActionError::UnsupportedTarget {
            kind: target.kind.clone(),
        });
    }

    let namespace = experiment.target_namespace();
    if client.get_pod(&namespace, &target.name).await?.is_none() {
        return Err(ActionError::TargetNotFound {
            namespace,
            name: target.name.clone(),
        });
    }

    let container = experiment
        .spec
        .parameters
        .get(CONTAINER_PARAM)
        .filter(|c| !c.is_empty())
        .cloned();

    debug!(
        experiment = %experiment.key(),
        pod = %target.name,
        namespace = %namespace,
        "Resolved target"
    );

    Ok(ResolvedTarget {
        namespace,
        name: target.name.clone(),
        container,
    })
}

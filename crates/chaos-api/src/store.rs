//! CRUD access to ChaosExperiment objects

use async_trait::async_trait;
use chaos_common::crd::ChaosExperiment;
use chaos_common::Error;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

/// Experiment operations the API exposes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentApi: Send + Sync {
    /// Every experiment across all namespaces
    async fn list(&self) -> Result<Vec<ChaosExperiment>, Error>;

    /// One experiment
    async fn get(&self, namespace: &str, name: &str) -> Result<ChaosExperiment, Error>;

    /// Create `experiment` in its own namespace
    async fn create(&self, experiment: &ChaosExperiment) -> Result<ChaosExperiment, Error>;

    /// Delete one experiment
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`ExperimentApi`] backed by the Kubernetes API server
pub struct KubeExperimentApi {
    client: Client,
}

impl KubeExperimentApi {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<ChaosExperiment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ExperimentApi for KubeExperimentApi {
    async fn list(&self) -> Result<Vec<ChaosExperiment>, Error> {
        let api: Api<ChaosExperiment> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube("chaosexperiments", e))?;
        Ok(list.items)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ChaosExperiment, Error> {
        self.namespaced(namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(format!("{}/{}", namespace, name), e))
    }

    async fn create(&self, experiment: &ChaosExperiment) -> Result<ChaosExperiment, Error> {
        let namespace = experiment.namespace().unwrap_or_default();
        self.namespaced(&namespace)
            .create(&PostParams::default(), experiment)
            .await
            .map_err(|e| Error::from_kube(format!("{}/{}", namespace, experiment.name_any()), e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.namespaced(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(format!("{}/{}", namespace, name), e))?;
        Ok(())
    }
}

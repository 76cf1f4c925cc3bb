//! Kubernetes client helpers

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, CustomResourceExt};
use tracing::info;

use crate::crd::ChaosExperiment;
use crate::retry::{retry_with_backoff, Backoff};
use crate::{Error, CHAOS_API_GROUP, CONTROLLER_FIELD_MANAGER};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
///
/// Must exceed the watch timeout (25s) so long polls are not cut off.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

fn client_error(msg: impl std::fmt::Display) -> Error {
    Error::internal_with_context("create_client", msg.to_string())
}

/// Build a client configuration
///
/// With a kubeconfig path the file is loaded explicitly; otherwise the
/// in-cluster service account or `$KUBECONFIG` is inferred. `master`
/// overrides the API server URL from either source.
pub async fn load_config(kubeconfig: Option<&Path>, master: Option<&str>) -> Result<Config, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| client_error(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| client_error(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| client_error(format!("failed to infer config: {}", e)))?,
    };

    if let Some(master) = master.filter(|m| !m.is_empty()) {
        config.cluster_url = master
            .parse()
            .map_err(|e| client_error(format!("invalid master URL {:?}: {}", master, e)))?;
    }

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(config)
}

/// Create a kube client with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>, master: Option<&str>) -> Result<Client, Error> {
    let config = load_config(kubeconfig, master).await?;
    Client::try_from(config).map_err(|e| client_error(format!("failed to create client: {}", e)))
}

/// Render the ChaosExperiment CRD as YAML
pub fn crd_yaml() -> Result<String, Error> {
    serde_yaml::to_string(&ChaosExperiment::crd())
        .map_err(|e| Error::serialization(format!("failed to render CRD: {}", e)))
}

/// Install or update the ChaosExperiment CRD with server-side apply
pub async fn ensure_crd(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = ChaosExperiment::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| format!("chaosexperiments.{}", CHAOS_API_GROUP));
    let params = PatchParams::apply(CONTROLLER_FIELD_MANAGER).force();

    retry_with_backoff(
        &Backoff::default().with_max_attempts(5),
        "ensure_crd",
        || {
            let (crds, name, params, crd) = (&crds, &name, &params, &crd);
            async move { crds.patch(name, params, &Patch::Apply(crd)).await }
        },
    )
    .await
    .map_err(|e| Error::from_kube(name.clone(), e))?;

    info!(crd = %name, "CRD installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn crd_yaml_names_the_resource() {
        let yaml = crd_yaml().expect("CRD should serialize");
        assert!(yaml.contains(&format!("name: chaosexperiments.{}", CHAOS_API_GROUP)));
        assert!(yaml.contains("kind: ChaosExperiment"));
        assert!(yaml.contains("v1alpha1"));
    }

    fn json_response(status: http::StatusCode, body: serde_json::Value) -> http::Response<kube::client::Body> {
        http::Response::builder()
            .status(status)
            .body(kube::client::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn story_crd_install_retries_until_the_api_server_accepts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let service = tower::service_fn(move |req: http::Request<kube::client::Body>| {
            let attempt = seen.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(req.method(), http::Method::PATCH);
                let uri = req.uri().to_string();
                assert!(uri.contains("/customresourcedefinitions/chaosexperiments."));
                assert!(uri.contains("force=true"));

                let response = if attempt < 2 {
                    json_response(
                        http::StatusCode::SERVICE_UNAVAILABLE,
                        serde_json::json!({
                            "kind": "Status",
                            "apiVersion": "v1",
                            "status": "Failure",
                            "message": "etcd leader changed",
                            "reason": "ServiceUnavailable",
                            "code": 503
                        }),
                    )
                } else {
                    json_response(
                        http::StatusCode::OK,
                        serde_json::to_value(ChaosExperiment::crd()).unwrap(),
                    )
                };
                Ok::<_, std::convert::Infallible>(response)
            }
        });
        let client = Client::new(service, "default");

        ensure_crd(&client).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}

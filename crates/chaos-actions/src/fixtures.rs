//! Shared test builders

use chaos_common::crd::{ChaosExperiment, ChaosExperimentSpec, TargetRef};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;

/// Experiment `ns/<name>` targeting pod `ns/p1`
pub fn experiment(name: &str, experiment_type: &str, duration: &str) -> ChaosExperiment {
    let mut exp = ChaosExperiment::new(
        name,
        ChaosExperimentSpec {
            target: TargetRef {
                api_version: "v1".into(),
                kind: "Pod".into(),
                name: "p1".into(),
                namespace: String::new(),
            },
            experiment_type: experiment_type.into(),
            duration: duration.into(),
            parameters: Default::default(),
        },
    );
    exp.metadata.namespace = Some("ns".into());
    exp
}

/// Experiment with one parameter set
pub fn experiment_with(
    experiment_type: &str,
    duration: &str,
    key: &str,
    value: &str,
) -> ChaosExperiment {
    let mut exp = experiment("e1", experiment_type, duration);
    exp.spec.parameters.insert(key.into(), value.into());
    exp
}

/// Minimal pod object
pub fn pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

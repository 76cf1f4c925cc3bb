//! Request and response bodies

use std::collections::BTreeMap;

use chaos_actions::ExperimentType;
use chaos_common::crd::{ChaosExperiment, ChaosExperimentSpec, TargetRef};
use chaos_common::duration::parse_duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Target kind used when the request leaves it out
pub const DEFAULT_TARGET_KIND: &str = "Pod";

/// Body of `POST /api/experiments`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentRequest {
    /// Experiment name
    pub name: String,
    /// Namespace for the experiment and its target
    pub namespace: String,
    /// Name of the target pod
    pub target_name: String,
    /// Kind of the target, "Pod" when empty
    #[serde(default)]
    pub target_kind: String,
    /// Action type tag
    pub experiment_type: String,
    /// How long the disruption lasts
    pub duration: String,
    /// Action-specific parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl CreateExperimentRequest {
    /// Validate the request and build the object to create
    pub fn into_experiment(self) -> Result<ChaosExperiment, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::BadRequest("name is required".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(Error::BadRequest("namespace is required".into()));
        }
        if self.target_name.trim().is_empty() {
            return Err(Error::BadRequest("targetName is required".into()));
        }
        self.experiment_type
            .parse::<ExperimentType>()
            .map_err(|e| Error::BadRequest(e.to_string()))?;
        match parse_duration(&self.duration) {
            Ok(d) if d.is_zero() => {
                return Err(Error::BadRequest("duration must be positive".into()));
            }
            Ok(_) => {}
            Err(e) => return Err(Error::BadRequest(format!("Invalid duration: {}", e))),
        }

        let kind = if self.target_kind.is_empty() {
            DEFAULT_TARGET_KIND.to_string()
        } else {
            self.target_kind
        };

        let mut experiment = ChaosExperiment::new(
            &self.name,
            ChaosExperimentSpec {
                target: TargetRef {
                    api_version: "v1".into(),
                    kind,
                    name: self.target_name,
                    namespace: self.namespace.clone(),
                },
                experiment_type: self.experiment_type,
                duration: self.duration,
                parameters: self.parameters,
            },
        );
        experiment.metadata.namespace = Some(self.namespace);
        Ok(experiment)
    }
}

/// Experiment as returned by the API
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSummary {
    /// Experiment name
    pub name: String,
    /// Experiment namespace
    pub namespace: String,
    /// Action type tag
    pub experiment_type: String,
    /// Lifecycle phase
    pub status: String,
    /// When the action was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the experiment reached a terminal phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Last status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ChaosExperiment> for ExperimentSummary {
    fn from(experiment: &ChaosExperiment) -> Self {
        let key = experiment.key();
        let status = experiment.status_or_default();
        Self {
            name: key.name,
            namespace: key.namespace,
            experiment_type: experiment.spec.experiment_type.clone(),
            status: status.phase.as_str().to_string(),
            start_time: status.start_time,
            end_time: status.end_time,
            message: Some(status.message).filter(|m| !m.is_empty()),
        }
    }
}

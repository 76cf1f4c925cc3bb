//! ChaosExperiment Custom Resource Definition
//!
//! A ChaosExperiment declares a disruptive action against a target pod for a
//! bounded duration. The controller owns `status`; clients only write `spec`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::duration::{parse_duration, DurationError};

/// Lifecycle phase of an experiment
///
/// Phases only move forward: Pending -> Running -> Completed | Failed.
/// `Unknown` holds a value this controller does not recognize; it exists so a
/// foreign write surfaces as a reconcile error rather than a watch decode failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExperimentPhase {
    /// Not yet started (also the reading of an empty or absent phase)
    #[default]
    Pending,
    /// The disruptive action has been started
    Running,
    /// The duration elapsed and the action was reversed
    Completed,
    /// The experiment could not be started
    Failed,
    /// Unrecognized phase string
    Unknown(String),
}

impl ExperimentPhase {
    /// Wire representation of this phase
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Unknown(s) => s,
        }
    }

    /// Completed and Failed never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<&str> for ExperimentPhase {
    fn from(s: &str) -> Self {
        match s {
            "" | "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExperimentPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExperimentPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::from).unwrap_or_default())
    }
}

impl JsonSchema for ExperimentPhase {
    fn schema_name() -> String {
        "ExperimentPhase".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        // Plain string so that unrecognized values still pass admission
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some(
                    "Lifecycle phase: 'Pending', 'Running', 'Completed' or 'Failed'".to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        })
    }
}

/// Persisted marker of the side effect the controller has performed
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EffectState {
    /// Start succeeded; the disruption is in place
    Applied,
    /// Stop succeeded; the disruption has been reversed
    Reverted,
}

/// Reference to the object an experiment acts on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// API version of the target (e.g. "v1")
    #[serde(default)]
    pub api_version: String,

    /// Kind of the target; only "Pod" is supported
    #[serde(default)]
    pub kind: String,

    /// Name of the target
    pub name: String,

    /// Namespace of the target; empty means the experiment's namespace
    #[serde(default)]
    pub namespace: String,
}

/// Specification of a chaos experiment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "chaos.engineering",
    version = "v1alpha1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    shortname = "chaos",
    namespaced,
    status = "ChaosExperimentStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.experimentType"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    /// Object the action is applied to
    pub target: TargetRef,

    /// Action type tag: "pod-failure", "network-latency", "cpu-hog" or "memory-hog"
    pub experiment_type: String,

    /// How long the disruption lasts, e.g. "30s" or "5m"
    pub duration: String,

    /// Action-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// Observed state of a chaos experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: ExperimentPhase,

    /// Set once, when the experiment enters Running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Set once, when the experiment reaches Completed or Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Human-readable description of the current state
    #[serde(default)]
    pub message: String,

    /// Side effect the controller has performed so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectState>,
}

impl ChaosExperimentStatus {
    /// Status for the Pending -> Running edge
    pub fn running(start_time: DateTime<Utc>) -> Self {
        Self {
            phase: ExperimentPhase::Running,
            start_time: Some(start_time),
            end_time: None,
            message: "Experiment started".to_string(),
            effect: None,
        }
    }

    /// Move to Failed, stamping `end_time`
    pub fn into_failed(self, end_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        self.into_terminal(ExperimentPhase::Failed, end_time, message)
    }

    /// Move to Completed, stamping `end_time`
    pub fn into_completed(self, end_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        self.into_terminal(ExperimentPhase::Completed, end_time, message)
    }

    fn into_terminal(
        mut self,
        phase: ExperimentPhase,
        end_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        self.phase = phase;
        self.end_time = Some(end_time);
        self.message = message.into();
        self
    }

    /// Record the side effect marker
    pub fn with_effect(mut self, effect: EffectState) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Namespace-qualified identity of an experiment, rendered as `namespace/name`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Key for `namespace/name`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl ChaosExperiment {
    /// Queue and registry key of this experiment
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Current phase; an experiment without status is Pending
    pub fn phase(&self) -> ExperimentPhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// Current status, or an empty (Pending) one
    pub fn status_or_default(&self) -> ChaosExperimentStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Recorded side effect, if any
    pub fn effect(&self) -> Option<EffectState> {
        self.status.as_ref().and_then(|s| s.effect)
    }

    /// Namespace of the target, defaulting to the experiment's own namespace
    pub fn target_namespace(&self) -> String {
        if self.spec.target.namespace.is_empty() {
            self.namespace().unwrap_or_default()
        } else {
            self.spec.target.namespace.clone()
        }
    }

    /// Value of parameter `key`, or `default` when absent or empty
    pub fn parameter<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.spec
            .parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default)
    }

    /// Parse `spec.duration`
    pub fn duration(&self) -> Result<Duration, DurationError> {
        parse_duration(&self.spec.duration)
    }
}

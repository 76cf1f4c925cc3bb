//! Custom Resource Definitions for the chaos controller

mod experiment;

pub use experiment::{
    ChaosExperiment, ChaosExperimentSpec, ChaosExperimentStatus, EffectState, ExperimentPhase,
    ObjectKey, TargetRef,
};

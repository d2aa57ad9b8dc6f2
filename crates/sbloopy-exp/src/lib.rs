#![deny(missing_docs)]
#![doc = "Refinement loop, tolerance escalation and random baseline of the sbloopy design loop."]

pub mod baseline;
pub mod config;
pub mod escalate;
pub mod report;
pub mod serde;
pub mod workflow;

pub use baseline::RandomBaseline;
pub use config::{load_config, BaselineConfig, DesignConfig, EscalationConfig, WorkflowConfig};
pub use escalate::{escalate, learn_and_analyze, Candidates};
pub use report::{
    BaselinePoint, BaselineReport, BaselineRun, CurvePoint, ModelReport, RefinementReport,
};
pub use crate::serde::{from_yaml_slice, to_canonical_json_bytes};
pub use workflow::Workflow;

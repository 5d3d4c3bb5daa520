//! Orchestration loop and its wire types.

pub mod engine;
pub mod types;

pub use engine::{Orchestrator, OrchestratorMetricsSnapshot};
pub use types::{
    ExecutionStep, OrchestrationPreferences, OrchestrationRequest, OrchestrationResponse,
    ResponseMetadata, ResponseStatus, StepType,
};

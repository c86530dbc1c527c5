mod attempt;
mod orchestrator;
pub mod planner;
mod report;

pub use attempt::PublishAttempt;
pub use orchestrator::{
    DeploymentTarget, PublishOrchestrator, ScaleRequest, UpgradeRequest,
    DEFAULT_PUBLISH_CONCURRENCY,
};
pub use planner::Patch;
pub use report::{
    ClusterOutcome, ClusterStatus, ContainerRestarts, OperationReport, PodSummary, ReplicaCounts,
    StatusReport,
};

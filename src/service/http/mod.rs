use axum::{routing::get, Extension, Router};
use std::sync::Arc;

use crate::publish::PublishOrchestrator;

pub mod deployment;
pub mod health;
pub mod params;
pub mod response;

pub use params::ActionQuery;
pub use response::{ActionResponse, ClusterResult, ClusterStatusResult};

pub const ACTION_PREFIX: &str = "/openapi/v1/gateway/action";

pub fn http_router(orchestrator: Arc<PublishOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            &format!("{ACTION_PREFIX}/get_deployment_status"),
            get(deployment::get_deployment_status),
        )
        .route(
            &format!("{ACTION_PREFIX}/upgrade_deployment"),
            get(deployment::upgrade_deployment),
        )
        .route(
            &format!("{ACTION_PREFIX}/restart_deployment"),
            get(deployment::restart_deployment),
        )
        .route(
            &format!("{ACTION_PREFIX}/scale_deployment"),
            get(deployment::scale_deployment),
        )
        .route(
            &format!("{ACTION_PREFIX}/get_latest_deployment_tpl"),
            get(deployment::get_latest_deployment_tpl),
        )
        .layer(Extension(orchestrator))
}

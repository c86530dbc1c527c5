use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use shipyard_core::{DeploymentTemplate, PublishError};

use crate::publish::{
    ClusterOutcome, ClusterStatus, OperationReport, PodSummary, ReplicaCounts, StatusReport,
};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterResult {
    pub cluster: String,
    pub template_id: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
}

impl From<&ClusterOutcome> for ClusterResult {
    fn from(outcome: &ClusterOutcome) -> Self {
        Self {
            cluster: outcome.cluster.clone(),
            template_id: outcome.template_id,
            success: outcome.is_success(),
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterStatusResult {
    pub cluster: String,
    pub template_id: Option<i64>,
    pub healthz: bool,
    pub replicas: Option<ReplicaCounts>,
    #[serde(default)]
    pub pods: Vec<PodSummary>,
    pub error: Option<String>,
}

impl From<&ClusterStatus> for ClusterStatusResult {
    fn from(status: &ClusterStatus) -> Self {
        Self {
            cluster: status.cluster.clone(),
            template_id: status.template_id,
            healthz: status.healthz,
            replicas: status.replicas,
            pods: status.pods.clone(),
            error: status.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Body of every gateway action. `code` repeats the HTTP status so clients reading only the
/// body can tell a partial failure from success.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionResponse {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub clusters: Vec<ClusterResult>,
    #[serde(default)]
    pub templates: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<ClusterStatusResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<DeploymentTemplate>,
}

pub type ActionReply = (StatusCode, Json<ActionResponse>);

fn reply(status: StatusCode, mut response: ActionResponse) -> ActionReply {
    response.code = status.as_u16();

    (status, Json(response))
}

fn outcome_status(success: bool) -> StatusCode {
    if success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl ActionResponse {
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::OK.as_u16()
    }

    pub fn failure(err: &PublishError) -> ActionReply {
        let status = match err {
            PublishError::Validation(_) => StatusCode::BAD_REQUEST,
            PublishError::Authorization(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        reply(
            status,
            ActionResponse {
                errors: vec![err.to_string()],
                ..Default::default()
            },
        )
    }

    pub fn from_report(report: &OperationReport) -> ActionReply {
        reply(
            outcome_status(report.is_success()),
            ActionResponse {
                operation_id: Some(report.operation_id.clone()),
                errors: report.errors(),
                clusters: report.clusters.iter().map(ClusterResult::from).collect(),
                templates: report.templates.clone(),
                ..Default::default()
            },
        )
    }

    pub fn from_status(report: &StatusReport) -> ActionReply {
        reply(
            outcome_status(report.is_success()),
            ActionResponse {
                errors: report.errors(),
                statuses: report.clusters.iter().map(ClusterStatusResult::from).collect(),
                ..Default::default()
            },
        )
    }

    pub fn from_template(template: DeploymentTemplate) -> ActionReply {
        reply(
            StatusCode::OK,
            ActionResponse {
                templates: vec![template.id],
                template: Some(template),
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use shipyard_core::ValidationError;

    use super::*;

    #[test]
    fn test_failure_status_codes() {
        let (status, Json(body)) =
            ActionResponse::failure(&ValidationError::MissingParameter("cluster").into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, 400);
        assert_eq!(body.errors, vec!["missing cluster parameter"]);

        let (status, _) =
            ActionResponse::failure(&PublishError::Authorization("invalid api key".to_owned()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = ActionResponse::failure(&PublishError::Store("down".to_owned()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_partial_report_is_server_error() {
        let report = OperationReport {
            operation_id: "op-1".to_owned(),
            clusters: vec![
                ClusterOutcome::succeeded("a", 3),
                ClusterOutcome::failed("b", Some(3), PublishError::Cancelled("b".to_owned())),
            ],
            templates: vec![3],
        };

        let (status, Json(body)) = ActionResponse::from_report(&report);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.operation_id.as_deref(), Some("op-1"));
        assert!(body.clusters[0].success);
        assert_eq!(
            body.clusters[1].error.as_deref(),
            Some("cancelled before reaching cluster b")
        );
        assert_eq!(body.errors.len(), 1);
    }
}

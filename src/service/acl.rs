use async_trait::async_trait;
use chrono::Utc;
use std::fmt::{self, Debug};

use shipyard_core::{ApiKey, ApiKeyType, DeploymentIdentity, PublishError};

use crate::persistence::ApiKeyPersistence;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    GetDeploymentStatus,
    UpgradeDeployment,
    ScaleDeployment,
    RestartDeployment,
    GetLatestDeploymentTemplate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetDeploymentStatus => "GET_DEPLOYMENT_STATUS",
            Action::UpgradeDeployment => "UPGRADE_DEPLOYMENT",
            Action::ScaleDeployment => "SCALE_DEPLOYMENT",
            Action::RestartDeployment => "RESTART_DEPLOYMENT",
            Action::GetLatestDeploymentTemplate => "GET_LATEST_DEPLOYMENT_TPL",
        }
    }

    /// Permission an api key must carry to perform this action.
    pub fn permission(&self) -> String {
        format!("OPENAPI_{}", self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Authorizer: Debug + Send + Sync {
    /// Looks up the key behind `token`, rejecting unknown, deleted and expired keys.
    async fn authenticate(&self, token: &str) -> Result<ApiKey, PublishError>;

    fn check_permission(&self, api_key: &ApiKey, action: Action) -> bool;

    fn check_resource_scope(&self, api_key: &ApiKey, identity: &DeploymentIdentity) -> bool;
}

#[derive(Debug)]
pub struct ApiKeyAuthorizer {
    pub persistence: Box<dyn ApiKeyPersistence>,
}

#[async_trait]
impl Authorizer for ApiKeyAuthorizer {
    #[tracing::instrument(name = "acl::authenticate", skip_all)]
    async fn authenticate(&self, token: &str) -> Result<ApiKey, PublishError> {
        if token.is_empty() {
            return Err(PublishError::Authorization("missing api key".to_owned()));
        }

        let api_key = self
            .persistence
            .get_by_token(token)
            .await
            .map_err(PublishError::from_store)?
            .ok_or_else(|| PublishError::Authorization("invalid api key".to_owned()))?;

        if api_key.deleted {
            return Err(PublishError::Authorization(
                "api key has been deleted".to_owned(),
            ));
        }

        if api_key.is_expired(Utc::now()) {
            return Err(PublishError::Authorization("api key has expired".to_owned()));
        }

        Ok(api_key)
    }

    fn check_permission(&self, api_key: &ApiKey, action: Action) -> bool {
        let permission = action.permission();

        api_key.permissions.iter().any(|granted| *granted == permission)
    }

    fn check_resource_scope(&self, api_key: &ApiKey, identity: &DeploymentIdentity) -> bool {
        match api_key.key_type {
            ApiKeyType::Global => true,
            ApiKeyType::Namespace => api_key.resource_id == identity.namespace.id,
            ApiKeyType::Application => api_key.resource_id == identity.app.id,
        }
    }
}

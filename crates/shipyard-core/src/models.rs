use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of resource a publish status or history row refers to. Stored as an integer column,
/// so the discriminants must never be reordered.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[repr(i32)]
pub enum PublishKind {
    Deployment = 0,
    Service = 1,
    ConfigMap = 2,
    Secret = 3,
    PersistentVolumeClaim = 4,
    CronJob = 5,
    StatefulSet = 6,
    DaemonSet = 7,
    Ingress = 8,
    Hpa = 9,
}

impl TryFrom<i32> for PublishKind {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let kind = match value {
            0 => PublishKind::Deployment,
            1 => PublishKind::Service,
            2 => PublishKind::ConfigMap,
            3 => PublishKind::Secret,
            4 => PublishKind::PersistentVolumeClaim,
            5 => PublishKind::CronJob,
            6 => PublishKind::StatefulSet,
            7 => PublishKind::DaemonSet,
            8 => PublishKind::Ingress,
            9 => PublishKind::Hpa,
            _ => return Err(anyhow::anyhow!("unknown publish kind {value}")),
        };

        Ok(kind)
    }
}

impl fmt::Display for PublishKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(i32)]
pub enum ReleaseStatus {
    Success = 0,
    Failure = 1,
}

impl TryFrom<i32> for ReleaseStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReleaseStatus::Success),
            1 => Ok(ReleaseStatus::Failure),
            _ => Err(anyhow::anyhow!("unknown release status {value}")),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Namespace {
    pub id: i64,
    pub name: String,
    /// Kubernetes namespace workloads of this namespace are published into.
    pub kube_namespace: String,
    pub deleted: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub namespace_id: i64,
    pub deleted: bool,
}

/// Logical workload resource. One of these maps to one Kubernetes Deployment per cluster
/// it has been published to.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeploymentResource {
    pub id: i64,
    pub name: String,
    pub app_id: i64,
    /// Desired replica count keyed by cluster name.
    pub replicas: BTreeMap<String, i32>,
    pub deleted: bool,
}

impl DeploymentResource {
    pub fn replicas_for(&self, cluster: &str) -> Option<i32> {
        self.replicas.get(cluster).copied()
    }
}

/// The deployment together with the app and namespace that own it, read explicitly
/// one after the other.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentIdentity {
    pub deployment: DeploymentResource,
    pub app: App,
    pub namespace: Namespace,
}

/// Immutable snapshot of a serialized workload manifest.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeploymentTemplate {
    pub id: i64,
    pub name: String,
    pub template: String,
    pub deployment_id: i64,
    pub description: String,
    pub user: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewDeploymentTemplate {
    pub name: String,
    pub template: String,
    pub deployment_id: i64,
    pub description: String,
    pub user: String,
}

/// Live pointer: which template is believed deployed for (kind, resource id, cluster).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublishStatus {
    pub id: i64,
    pub kind: PublishKind,
    pub resource_id: i64,
    pub template_id: i64,
    pub cluster: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPublishStatus {
    pub kind: PublishKind,
    pub resource_id: i64,
    pub template_id: i64,
    pub cluster: String,
}

impl NewPublishStatus {
    pub fn deployment(resource_id: i64, cluster: &str, template_id: i64) -> Self {
        Self {
            kind: PublishKind::Deployment,
            resource_id,
            template_id,
            cluster: cluster.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublishHistory {
    pub id: i64,
    pub kind: PublishKind,
    pub resource_id: i64,
    pub resource_name: String,
    pub template_id: i64,
    pub cluster: String,
    pub user: String,
    pub message: String,
    pub status: ReleaseStatus,
    pub create_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPublishHistory {
    pub kind: PublishKind,
    pub resource_id: i64,
    pub resource_name: String,
    pub template_id: i64,
    pub cluster: String,
    pub user: String,
    pub message: String,
    pub status: ReleaseStatus,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(i32)]
pub enum ApiKeyType {
    Global = 0,
    Namespace = 1,
    Application = 2,
}

impl TryFrom<i32> for ApiKeyType {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApiKeyType::Global),
            1 => Ok(ApiKeyType::Namespace),
            2 => Ok(ApiKeyType::Application),
            _ => Err(anyhow::anyhow!("unknown api key type {value}")),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub key_type: ApiKeyType,
    /// Namespace id for namespace keys, app id for application keys, unused for global keys.
    pub resource_id: i64,
    pub permissions: Vec<String>,
    /// Lifetime in seconds counted from `create_time`; 0 never expires.
    pub expire_in: i64,
    pub create_time: DateTime<Utc>,
    pub deleted: bool,
}

impl ApiKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_in != 0 && now > self.create_time + chrono::Duration::seconds(self.expire_in)
    }

    /// Name recorded as the acting user on templates and history rows.
    pub fn display_name(&self) -> String {
        format!("[APIKey] {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_kind_round_trips_through_column_value() {
        for value in 0..10 {
            let kind = PublishKind::try_from(value).unwrap();
            assert_eq!(kind as i32, value);
        }

        assert!(PublishKind::try_from(10).is_err());
    }

    #[test]
    fn test_api_key_expiry() {
        let create_time = Utc::now() - chrono::Duration::seconds(120);
        let mut api_key = ApiKey {
            id: 1,
            name: "ci".to_owned(),
            token: "token".to_owned(),
            key_type: ApiKeyType::Global,
            resource_id: 0,
            permissions: vec![],
            expire_in: 0,
            create_time,
            deleted: false,
        };

        assert!(!api_key.is_expired(Utc::now()));

        api_key.expire_in = 60;
        assert!(api_key.is_expired(Utc::now()));

        api_key.expire_in = 3600;
        assert!(!api_key.is_expired(Utc::now()));
    }
}

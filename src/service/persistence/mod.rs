use async_trait::async_trait;
use std::fmt::Debug;

use shipyard_core::{
    ApiKey, App, DeploymentResource, DeploymentTemplate, Namespace, NewDeploymentTemplate,
    NewPublishHistory, NewPublishStatus, PublishHistory, PublishKind, PublishStatus,
};

pub mod memory;
pub mod relational;

#[async_trait]
pub trait TemplatePersistence: Debug + Send + Sync {
    async fn create(&self, template: &NewDeploymentTemplate) -> anyhow::Result<DeploymentTemplate>;
    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<DeploymentTemplate>>;

    /// Non-deleted templates of a deployment, newest first.
    async fn get_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Vec<DeploymentTemplate>>;

    async fn get_latest_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Option<DeploymentTemplate>>;

    /// Marks every template of the deployment deleted, or removes the rows when `logical` is false.
    async fn delete_by_deployment_id(&self, deployment_id: i64, logical: bool)
        -> anyhow::Result<u64>;
}

/// Atomic unit over the ledger rows of one (kind, resource id).
///
/// Nothing written through the transaction is visible to others until `commit`. Dropping it
/// without committing discards every write.
#[async_trait]
pub trait PublishStatusTransaction: Send {
    async fn list(&mut self) -> anyhow::Result<Vec<PublishStatus>>;
    async fn insert(&mut self, status: &NewPublishStatus) -> anyhow::Result<PublishStatus>;
    async fn delete(&mut self, id: i64) -> anyhow::Result<u64>;
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PublishStatusPersistence: Debug + Send + Sync {
    /// Opens a transaction serialized against every other transaction on the same
    /// (kind, resource id).
    async fn begin(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Box<dyn PublishStatusTransaction>>;

    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishStatus>>;
}

#[async_trait]
pub trait PublishHistoryPersistence: Debug + Send + Sync {
    async fn create(&self, history: &NewPublishHistory) -> anyhow::Result<PublishHistory>;

    /// History of one resource, newest first.
    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishHistory>>;
}

/// Read access to the namespace / app / deployment records owned by the rest of the platform.
#[async_trait]
pub trait ResourcePersistence: Debug + Send + Sync {
    async fn get_deployments_by_name(&self, name: &str) -> anyhow::Result<Vec<DeploymentResource>>;
    async fn get_app_by_id(&self, id: i64) -> anyhow::Result<Option<App>>;
    async fn get_namespace_by_id(&self, id: i64) -> anyhow::Result<Option<Namespace>>;
    async fn update_replicas(
        &self,
        deployment_id: i64,
        cluster: &str,
        replicas: i32,
    ) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait ApiKeyPersistence: Debug + Send + Sync {
    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<ApiKey>>;
}

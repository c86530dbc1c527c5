use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use std::fmt::Debug;
use std::sync::Arc;

use crate::GatewayError;

/// Handle on one cluster's live API.
///
/// Every call is bound to a single cluster; a failure here says nothing about any other
/// cluster. Implementations translate their transport errors into [`GatewayError`] and do not
/// retry on their own.
#[async_trait]
pub trait ClusterGateway: Debug + Send + Sync {
    fn cluster(&self) -> &str;

    async fn get(&self, namespace: &str, name: &str) -> Result<Deployment, GatewayError>;

    /// Creates the deployment when absent, otherwise replaces the live object with it.
    async fn create_or_update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError>;

    /// Replaces an existing live object. Fails with `NotFound` when it does not exist.
    async fn update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError>;

    /// Pods in `namespace` whose labels match `selector`, written as `key=value,...`.
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, GatewayError>;
}

#[async_trait]
pub trait ClusterGatewayFactory: Debug + Send + Sync {
    /// Resolves a cluster name to its gateway, `GatewayError::NotFound` if it is unknown.
    async fn resolve(&self, cluster: &str) -> Result<Arc<dyn ClusterGateway>, GatewayError>;
}

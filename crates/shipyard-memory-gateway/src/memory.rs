use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{Pod, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use shipyard_core::{ClusterGateway, ClusterGatewayFactory, GatewayError};

type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct ClusterState {
    deployments: HashMap<ObjectKey, Deployment>,
    /// Pods keyed by the deployment that owns them.
    pods: HashMap<ObjectKey, Vec<Pod>>,
    failure: Option<GatewayError>,
    writes: usize,
    revision: u64,
}

/// In-process stand-in for a cluster's API server.
///
/// Applied objects are stored as-is and immediately reported fully rolled out, with one running
/// pod per replica. A failure set
/// with [`MemoryClusterGateway::fail_with`] is returned by every call until cleared.
#[derive(Debug)]
pub struct MemoryClusterGateway {
    cluster: String,
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryClusterGateway {
    pub fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    pub fn fail_with(&self, failure: Option<GatewayError>) {
        if let Ok(mut state) = self.state.lock() {
            state.failure = failure;
        }
    }

    /// Number of create/update calls that reached the store.
    pub fn writes(&self) -> usize {
        self.state.lock().map(|state| state.writes).unwrap_or_default()
    }

    pub fn live(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state.lock().ok().and_then(|state| {
            state
                .deployments
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        })
    }

    /// Seeds an object as if it had been applied out of band.
    pub fn insert(&self, deployment: Deployment) {
        if let Ok(mut state) = self.state.lock() {
            let key = Self::key_of(&deployment);
            state.deployments.insert(key, deployment);
        }
    }

    pub fn set_status(&self, namespace: &str, name: &str, status: DeploymentStatus) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(deployment) = state
                .deployments
                .get_mut(&(namespace.to_string(), name.to_string()))
            {
                deployment.status = Some(status);
            }
        }
    }

    /// Replaces the pods of a deployment, e.g. to report one stuck in `Pending`.
    pub fn set_pods(&self, namespace: &str, name: &str, pods: Vec<Pod>) {
        if let Ok(mut state) = self.state.lock() {
            state
                .pods
                .insert((namespace.to_string(), name.to_string()), pods);
        }
    }

    fn key_of(deployment: &Deployment) -> ObjectKey {
        (
            deployment.metadata.namespace.clone().unwrap_or_default(),
            deployment.metadata.name.clone().unwrap_or_default(),
        )
    }

    fn get_state_locked(&self) -> Result<MutexGuard<ClusterState>, GatewayError> {
        match self.state.lock() {
            Ok(locked_state) => Ok(locked_state),
            Err(_) => Err(GatewayError::Transient {
                cluster: self.cluster.clone(),
                message: "failed to acquire lock".to_owned(),
            }),
        }
    }

    fn store(&self, state: &mut ClusterState, deployment: &Deployment) -> Deployment {
        state.revision += 1;
        state.writes += 1;

        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(state.revision.to_string());

        let replicas = stored
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);

        stored.status = Some(DeploymentStatus {
            replicas: Some(replicas),
            ready_replicas: Some(replicas),
            available_replicas: Some(replicas),
            updated_replicas: Some(replicas),
            ..Default::default()
        });

        let key = Self::key_of(&stored);
        let pods = running_pods(&stored, replicas, state.revision);
        state.pods.insert(key.clone(), pods);
        state.deployments.insert(key, stored.clone());

        stored
    }
}

fn running_pods(deployment: &Deployment, replicas: i32, revision: u64) -> Vec<Pod> {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let labels = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.metadata.as_ref())
        .and_then(|metadata| metadata.labels.clone());

    (0..replicas)
        .map(|index| Pod {
            metadata: ObjectMeta {
                name: Some(format!("{name}-{revision}-{index}")),
                namespace: deployment.metadata.namespace.clone(),
                labels: labels.clone(),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("memory-node".to_owned()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_owned()),
                pod_ip: Some(format!("10.0.0.{}", index + 1)),
                ..Default::default()
            }),
        })
        .collect()
}

/// Matches `key=value,...` against the pod's labels; an empty selector matches every pod.
fn matches_selector(pod: &Pod, selector: &BTreeMap<&str, &str>) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();

    selector
        .iter()
        .all(|(key, value)| labels.get(*key).map(String::as_str) == Some(*value))
}

#[async_trait]
impl ClusterGateway for MemoryClusterGateway {
    fn cluster(&self) -> &str {
        &self.cluster
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Deployment, GatewayError> {
        let state = self.get_state_locked()?;

        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        match state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
        {
            Some(deployment) => Ok(deployment.clone()),
            None => Err(GatewayError::NotFound {
                cluster: self.cluster.clone(),
                message: format!("deployments.apps \"{name}\" not found in {namespace}"),
            }),
        }
    }

    async fn create_or_update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError> {
        let mut state = self.get_state_locked()?;

        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        Ok(self.store(&mut state, deployment))
    }

    async fn update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError> {
        let mut state = self.get_state_locked()?;

        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        if !state.deployments.contains_key(&Self::key_of(deployment)) {
            return Err(GatewayError::NotFound {
                cluster: self.cluster.clone(),
                message: format!(
                    "deployments.apps \"{}\" not found",
                    deployment.metadata.name.clone().unwrap_or_default()
                ),
            });
        }

        Ok(self.store(&mut state, deployment))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, GatewayError> {
        let state = self.get_state_locked()?;

        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        let selector: BTreeMap<&str, &str> = selector
            .split(',')
            .filter_map(|requirement| requirement.split_once('='))
            .collect();

        Ok(state
            .pods
            .iter()
            .filter(|((pod_namespace, _), _)| pod_namespace == namespace)
            .flat_map(|(_, pods)| pods.iter())
            .filter(|pod| matches_selector(pod, &selector))
            .cloned()
            .collect())
    }
}

/// Resolves cluster names registered with [`MemoryGatewayFactory::register`].
#[derive(Debug, Default)]
pub struct MemoryGatewayFactory {
    gateways: Mutex<HashMap<String, Arc<MemoryClusterGateway>>>,
}

impl MemoryGatewayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cluster: &str) -> Arc<MemoryClusterGateway> {
        let gateway = Arc::new(MemoryClusterGateway::new(cluster));

        if let Ok(mut gateways) = self.gateways.lock() {
            gateways.insert(cluster.to_string(), Arc::clone(&gateway));
        }

        gateway
    }

    pub fn gateway(&self, cluster: &str) -> Option<Arc<MemoryClusterGateway>> {
        self.gateways
            .lock()
            .ok()
            .and_then(|gateways| gateways.get(cluster).cloned())
    }
}

#[async_trait]
impl ClusterGatewayFactory for MemoryGatewayFactory {
    async fn resolve(&self, cluster: &str) -> Result<Arc<dyn ClusterGateway>, GatewayError> {
        match self.gateway(cluster) {
            Some(gateway) => Ok(gateway as Arc<dyn ClusterGateway>),
            None => Err(GatewayError::NotFound {
                cluster: cluster.to_string(),
                message: "cluster is not registered".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use shipyard_core::test::get_manifest_fixture;

    use super::*;

    #[tokio::test]
    async fn test_create_update_get() {
        let factory = MemoryGatewayFactory::new();
        factory.register("eastus2");

        let gateway = factory.resolve("eastus2").await.unwrap();
        assert_eq!(gateway.cluster(), "eastus2");

        let mut deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);
        deployment.metadata.namespace = Some("team-a".to_owned());

        let update_err = gateway.update(&deployment).await.unwrap_err();
        assert!(matches!(update_err, GatewayError::NotFound { .. }));

        let created = gateway.create_or_update(&deployment).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(created.status.unwrap().ready_replicas, Some(1));

        let updated = gateway.update(&deployment).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));

        let fetched = gateway.get("team-a", "web").await.unwrap();
        assert_eq!(fetched.metadata.name.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let factory = MemoryGatewayFactory::new();
        let memory_gateway = factory.register("westus");

        memory_gateway.fail_with(Some(GatewayError::Transient {
            cluster: "westus".to_owned(),
            message: "connection reset".to_owned(),
        }));

        let gateway = factory.resolve("westus").await.unwrap();
        let deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);

        let err = gateway.create_or_update(&deployment).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(memory_gateway.writes(), 0);

        memory_gateway.fail_with(None);
        gateway.create_or_update(&deployment).await.unwrap();
        assert_eq!(memory_gateway.writes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let factory = MemoryGatewayFactory::new();

        let err = factory.resolve("nowhere").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_applied_deployment_reports_running_pods() {
        let factory = MemoryGatewayFactory::new();
        factory.register("eastus2");
        let gateway = factory.resolve("eastus2").await.unwrap();

        let mut deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);
        deployment.metadata.namespace = Some("team-a".to_owned());
        shipyard_core::manifest::set_replicas(&mut deployment, 2);
        gateway.create_or_update(&deployment).await.unwrap();

        let pods = gateway.list_pods("team-a", "app=web").await.unwrap();
        assert_eq!(pods.len(), 2);
        assert!(pods.iter().all(|pod| {
            pod.status.as_ref().and_then(|status| status.phase.as_deref()) == Some("Running")
        }));

        assert!(gateway.list_pods("team-a", "app=api").await.unwrap().is_empty());
        assert!(gateway.list_pods("team-b", "app=web").await.unwrap().is_empty());
    }
}

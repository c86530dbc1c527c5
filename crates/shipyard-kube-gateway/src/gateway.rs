use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;

use shipyard_core::{manifest, ClusterGateway, GatewayError};

#[derive(Clone)]
pub struct KubeClusterGateway {
    cluster: String,
    client: Client,
}

impl std::fmt::Debug for KubeClusterGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterGateway")
            .field("cluster", &self.cluster)
            .finish()
    }
}

impl KubeClusterGateway {
    pub fn new(cluster: &str, client: Client) -> Self {
        Self {
            cluster: cluster.to_string(),
            client,
        }
    }

    fn api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn translate(&self, err: kube::Error) -> GatewayError {
        match err {
            kube::Error::Api(api_err) => {
                GatewayError::from_status(&self.cluster, api_err.code, api_err.message.clone())
            }
            other => GatewayError::Transient {
                cluster: self.cluster.clone(),
                message: other.to_string(),
            },
        }
    }

    fn namespace_of(deployment: &Deployment) -> String {
        deployment
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_owned())
    }
}

#[async_trait]
impl ClusterGateway for KubeClusterGateway {
    fn cluster(&self) -> &str {
        &self.cluster
    }

    #[tracing::instrument(name = "kube::deployment::get", skip(self), fields(cluster = %self.cluster))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Deployment, GatewayError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|err| self.translate(err))
    }

    #[tracing::instrument(name = "kube::deployment::create_or_update", skip_all, fields(cluster = %self.cluster))]
    async fn create_or_update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError> {
        let namespace = Self::namespace_of(deployment);
        let name = manifest::name_of(deployment);
        let api = self.api(&namespace);

        match api.get(&name).await {
            Ok(live) => {
                let mut desired = deployment.clone();
                desired.metadata.resource_version = live.metadata.resource_version;

                tracing::debug!("replacing deployment {namespace}/{name}");

                api.replace(&name, &PostParams::default(), &desired)
                    .await
                    .map_err(|err| self.translate(err))
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                let mut desired = deployment.clone();
                desired.metadata.resource_version = None;

                tracing::info!("creating deployment {namespace}/{name}");

                api.create(&PostParams::default(), &desired)
                    .await
                    .map_err(|err| self.translate(err))
            }
            Err(err) => Err(self.translate(err)),
        }
    }

    #[tracing::instrument(name = "kube::deployment::update", skip_all, fields(cluster = %self.cluster))]
    async fn update(&self, deployment: &Deployment) -> Result<Deployment, GatewayError> {
        let namespace = Self::namespace_of(deployment);
        let name = manifest::name_of(deployment);

        self.api(&namespace)
            .replace(&name, &PostParams::default(), deployment)
            .await
            .map_err(|err| self.translate(err))
    }

    #[tracing::instrument(name = "kube::pod::list", skip(self), fields(cluster = %self.cluster))]
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, GatewayError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        pods.list(&ListParams::default().labels(selector))
            .await
            .map(|list| list.items)
            .map_err(|err| self.translate(err))
    }
}

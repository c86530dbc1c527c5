use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use shipyard_core::{ClusterGateway, ClusterGatewayFactory, GatewayError};

use crate::{ClusterRegistration, ClusterRegistry, KubeClusterGateway};

/// Builds one client per registered cluster on first use and reuses it afterwards.
#[derive(Debug)]
pub struct KubeGatewayFactory {
    registry: ClusterRegistry,
    gateways: RwLock<HashMap<String, Arc<KubeClusterGateway>>>,
}

impl KubeGatewayFactory {
    pub fn new(registry: ClusterRegistry) -> Self {
        Self {
            registry,
            gateways: RwLock::new(HashMap::new()),
        }
    }

    async fn connect(registration: &ClusterRegistration) -> anyhow::Result<Client> {
        let config = match &registration.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                let options = KubeConfigOptions {
                    context: registration.context.clone(),
                    ..Default::default()
                };

                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None => Config::infer().await?,
        };

        Ok(Client::try_from(config)?)
    }
}

#[async_trait]
impl ClusterGatewayFactory for KubeGatewayFactory {
    #[tracing::instrument(name = "kube::factory::resolve", skip(self))]
    async fn resolve(&self, cluster: &str) -> Result<Arc<dyn ClusterGateway>, GatewayError> {
        if let Some(gateway) = self.gateways.read().await.get(cluster) {
            return Ok(Arc::clone(gateway) as Arc<dyn ClusterGateway>);
        }

        let registration = self
            .registry
            .get(cluster)
            .ok_or_else(|| GatewayError::NotFound {
                cluster: cluster.to_string(),
                message: "cluster is not registered".to_owned(),
            })?;

        let client = Self::connect(registration).await.map_err(|err| {
            tracing::error!("failed to build client for cluster {cluster}: {err:#}");
            GatewayError::Transient {
                cluster: cluster.to_string(),
                message: format!("{err:#}"),
            }
        })?;

        let mut gateways = self.gateways.write().await;
        let gateway = gateways
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(KubeClusterGateway::new(cluster, client)));

        Ok(Arc::clone(gateway) as Arc<dyn ClusterGateway>)
    }
}

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use shipyard_core::{App, DeploymentResource, Namespace};

use crate::persistence::ResourcePersistence;

#[derive(Debug, Default)]
struct ResourceTables {
    namespaces: HashMap<i64, Namespace>,
    apps: HashMap<i64, App>,
    deployments: HashMap<i64, DeploymentResource>,
}

/// Namespace, app and deployment records kept in memory. Records are seeded with the
/// `insert_*` methods.
#[derive(Clone, Debug, Default)]
pub struct ResourceMemoryPersistence {
    tables: Arc<Mutex<ResourceTables>>,
}

impl ResourceMemoryPersistence {
    pub fn insert_namespace(&self, namespace: Namespace) -> anyhow::Result<()> {
        self.get_tables_locked()?
            .namespaces
            .insert(namespace.id, namespace);

        Ok(())
    }

    pub fn insert_app(&self, app: App) -> anyhow::Result<()> {
        self.get_tables_locked()?.apps.insert(app.id, app);

        Ok(())
    }

    pub fn insert_deployment(&self, deployment: DeploymentResource) -> anyhow::Result<()> {
        self.get_tables_locked()?
            .deployments
            .insert(deployment.id, deployment);

        Ok(())
    }

    pub fn get_deployment_by_id(&self, id: i64) -> anyhow::Result<Option<DeploymentResource>> {
        Ok(self.get_tables_locked()?.deployments.get(&id).cloned())
    }

    fn get_tables_locked(&self) -> anyhow::Result<MutexGuard<ResourceTables>> {
        match self.tables.lock() {
            Ok(locked_tables) => Ok(locked_tables),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

#[async_trait]
impl ResourcePersistence for ResourceMemoryPersistence {
    async fn get_deployments_by_name(&self, name: &str) -> anyhow::Result<Vec<DeploymentResource>> {
        let locked_tables = self.get_tables_locked()?;

        let mut deployments: Vec<DeploymentResource> = locked_tables
            .deployments
            .values()
            .filter(|deployment| deployment.name == name)
            .cloned()
            .collect();
        deployments.sort_by_key(|deployment| deployment.id);

        Ok(deployments)
    }

    async fn get_app_by_id(&self, id: i64) -> anyhow::Result<Option<App>> {
        Ok(self.get_tables_locked()?.apps.get(&id).cloned())
    }

    async fn get_namespace_by_id(&self, id: i64) -> anyhow::Result<Option<Namespace>> {
        Ok(self.get_tables_locked()?.namespaces.get(&id).cloned())
    }

    async fn update_replicas(
        &self,
        deployment_id: i64,
        cluster: &str,
        replicas: i32,
    ) -> anyhow::Result<u64> {
        let mut locked_tables = self.get_tables_locked()?;

        match locked_tables.deployments.get_mut(&deployment_id) {
            Some(deployment) => {
                deployment.replicas.insert(cluster.to_string(), replicas);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use shipyard_core::test::get_deployment_resource_fixture;

    use super::*;

    #[tokio::test]
    async fn test_update_replicas() {
        let persistence = ResourceMemoryPersistence::default();
        let deployment = get_deployment_resource_fixture();
        persistence.insert_deployment(deployment.clone()).unwrap();

        let updated = persistence
            .update_replicas(deployment.id, "eastus2", 4)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let fetched = persistence
            .get_deployments_by_name(&deployment.name)
            .await
            .unwrap();
        assert_eq!(fetched[0].replicas_for("eastus2"), Some(4));

        assert_eq!(persistence.update_replicas(404, "eastus2", 4).await.unwrap(), 0);
    }
}

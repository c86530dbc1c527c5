use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use std::{collections::BTreeMap, sync::Arc};

use shipyard_core::{App, DeploymentResource, Namespace};

use crate::persistence::ResourcePersistence;

#[derive(Debug, sqlx::FromRow)]
struct DeploymentRow {
    id: i64,
    name: String,
    app_id: i64,
    replicas: Json<BTreeMap<String, i32>>,
    deleted: bool,
}

impl From<DeploymentRow> for DeploymentResource {
    fn from(row: DeploymentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            app_id: row.app_id,
            replicas: row.replicas.0,
            deleted: row.deleted,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppRow {
    id: i64,
    name: String,
    namespace_id: i64,
    deleted: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct NamespaceRow {
    id: i64,
    name: String,
    kube_namespace: String,
    deleted: bool,
}

#[derive(Debug)]
pub struct ResourceRelationalPersistence {
    pub db: Arc<PgPool>,
}

#[async_trait]
impl ResourcePersistence for ResourceRelationalPersistence {
    #[tracing::instrument(name = "relational::resource::get_deployments_by_name", skip_all)]
    async fn get_deployments_by_name(&self, name: &str) -> anyhow::Result<Vec<DeploymentResource>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(
            "SELECT * FROM deployments WHERE name = $1 ORDER BY id",
        )
        .bind(name)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(DeploymentResource::from).collect())
    }

    #[tracing::instrument(name = "relational::resource::get_app_by_id", skip_all)]
    async fn get_app_by_id(&self, id: i64) -> anyhow::Result<Option<App>> {
        let row = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;

        Ok(row.map(|row| App {
            id: row.id,
            name: row.name,
            namespace_id: row.namespace_id,
            deleted: row.deleted,
        }))
    }

    #[tracing::instrument(name = "relational::resource::get_namespace_by_id", skip_all)]
    async fn get_namespace_by_id(&self, id: i64) -> anyhow::Result<Option<Namespace>> {
        let row = sqlx::query_as::<_, NamespaceRow>("SELECT * FROM namespaces WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;

        Ok(row.map(|row| Namespace {
            id: row.id,
            name: row.name,
            kube_namespace: row.kube_namespace,
            deleted: row.deleted,
        }))
    }

    #[tracing::instrument(name = "relational::resource::update_replicas", skip_all)]
    async fn update_replicas(
        &self,
        deployment_id: i64,
        cluster: &str,
        replicas: i32,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
                UPDATE deployments
                SET replicas = jsonb_set(replicas, ARRAY[$2], to_jsonb($3::INTEGER), TRUE)
                WHERE id = $1
            "#,
        )
        .bind(deployment_id)
        .bind(cluster)
        .bind(replicas)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

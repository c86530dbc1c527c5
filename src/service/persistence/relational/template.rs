use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use shipyard_core::{DeploymentTemplate, NewDeploymentTemplate};

use crate::persistence::TemplatePersistence;

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    name: String,
    template: String,
    deployment_id: i64,
    description: String,
    user_name: String,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
    deleted: bool,
}

impl From<TemplateRow> for DeploymentTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            template: row.template,
            deployment_id: row.deployment_id,
            description: row.description,
            user: row.user_name,
            create_time: row.create_time,
            update_time: row.update_time,
            deleted: row.deleted,
        }
    }
}

#[derive(Debug)]
pub struct TemplateRelationalPersistence {
    pub db: Arc<PgPool>,
}

#[async_trait]
impl TemplatePersistence for TemplateRelationalPersistence {
    #[tracing::instrument(name = "relational::template::create", skip_all)]
    async fn create(&self, template: &NewDeploymentTemplate) -> anyhow::Result<DeploymentTemplate> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            INSERT INTO deployment_templates
               (name, template, deployment_id, description, user_name)
            VALUES
               ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&template.name)
        .bind(&template.template)
        .bind(template.deployment_id)
        .bind(&template.description)
        .bind(&template.user)
        .fetch_one(&*self.db)
        .await?;

        Ok(row.into())
    }

    #[tracing::instrument(name = "relational::template::get_by_id", skip_all)]
    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<DeploymentTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM deployment_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(DeploymentTemplate::from))
    }

    #[tracing::instrument(name = "relational::template::get_by_deployment_id", skip_all)]
    async fn get_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Vec<DeploymentTemplate>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
                SELECT * FROM deployment_templates
                WHERE deployment_id = $1 AND deleted = FALSE
                ORDER BY create_time DESC, id DESC
            "#,
        )
        .bind(deployment_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(DeploymentTemplate::from).collect())
    }

    #[tracing::instrument(name = "relational::template::get_latest_by_deployment_id", skip_all)]
    async fn get_latest_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Option<DeploymentTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
                SELECT * FROM deployment_templates
                WHERE deployment_id = $1 AND deleted = FALSE
                ORDER BY create_time DESC, id DESC
                LIMIT 1
            "#,
        )
        .bind(deployment_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(DeploymentTemplate::from))
    }

    #[tracing::instrument(name = "relational::template::delete_by_deployment_id", skip_all)]
    async fn delete_by_deployment_id(
        &self,
        deployment_id: i64,
        logical: bool,
    ) -> anyhow::Result<u64> {
        let query = if logical {
            r#"
                UPDATE deployment_templates SET deleted = TRUE, update_time = now()
                WHERE deployment_id = $1 AND deleted = FALSE
            "#
        } else {
            "DELETE FROM deployment_templates WHERE deployment_id = $1"
        };

        let result = sqlx::query(query)
            .bind(deployment_id)
            .execute(&*self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

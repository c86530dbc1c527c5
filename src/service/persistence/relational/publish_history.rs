use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use shipyard_core::{NewPublishHistory, PublishHistory, PublishKind, ReleaseStatus};

use crate::persistence::PublishHistoryPersistence;

#[derive(Debug, sqlx::FromRow)]
struct PublishHistoryRow {
    id: i64,
    kind: i32,
    resource_id: i64,
    resource_name: String,
    template_id: i64,
    cluster: String,
    user_name: String,
    message: String,
    status: i32,
    create_time: DateTime<Utc>,
}

impl TryFrom<PublishHistoryRow> for PublishHistory {
    type Error = anyhow::Error;

    fn try_from(row: PublishHistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: PublishKind::try_from(row.kind)?,
            resource_id: row.resource_id,
            resource_name: row.resource_name,
            template_id: row.template_id,
            cluster: row.cluster,
            user: row.user_name,
            message: row.message,
            status: ReleaseStatus::try_from(row.status)?,
            create_time: row.create_time,
        })
    }
}

#[derive(Debug)]
pub struct PublishHistoryRelationalPersistence {
    pub db: Arc<PgPool>,
}

#[async_trait]
impl PublishHistoryPersistence for PublishHistoryRelationalPersistence {
    #[tracing::instrument(name = "relational::publish_history::create", skip_all)]
    async fn create(&self, history: &NewPublishHistory) -> anyhow::Result<PublishHistory> {
        let row = sqlx::query_as::<_, PublishHistoryRow>(
            r#"
            INSERT INTO publish_history
               (kind, resource_id, resource_name, template_id, cluster, user_name, message, status)
            VALUES
               ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(history.kind as i32)
        .bind(history.resource_id)
        .bind(&history.resource_name)
        .bind(history.template_id)
        .bind(&history.cluster)
        .bind(&history.user)
        .bind(&history.message)
        .bind(history.status as i32)
        .fetch_one(&*self.db)
        .await?;

        PublishHistory::try_from(row)
    }

    #[tracing::instrument(name = "relational::publish_history::get_by_resource", skip_all)]
    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishHistory>> {
        let rows = sqlx::query_as::<_, PublishHistoryRow>(
            r#"
                SELECT * FROM publish_history
                WHERE kind = $1 AND resource_id = $2
                ORDER BY create_time DESC, id DESC
            "#,
        )
        .bind(kind as i32)
        .bind(resource_id)
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter().map(PublishHistory::try_from).collect()
    }
}

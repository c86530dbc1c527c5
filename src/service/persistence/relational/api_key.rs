use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use shipyard_core::{ApiKey, ApiKeyType};

use crate::persistence::ApiKeyPersistence;

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: i64,
    name: String,
    token: String,
    key_type: i32,
    resource_id: i64,
    permissions: Vec<String>,
    expire_in: i64,
    create_time: DateTime<Utc>,
    deleted: bool,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = anyhow::Error;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            token: row.token,
            key_type: ApiKeyType::try_from(row.key_type)?,
            resource_id: row.resource_id,
            permissions: row.permissions,
            expire_in: row.expire_in,
            create_time: row.create_time,
            deleted: row.deleted,
        })
    }
}

#[derive(Debug)]
pub struct ApiKeyRelationalPersistence {
    pub db: Arc<PgPool>,
}

#[async_trait]
impl ApiKeyPersistence for ApiKeyRelationalPersistence {
    #[tracing::instrument(name = "relational::api_key::get_by_token", skip_all)]
    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE token = $1")
            .bind(token)
            .fetch_optional(&*self.db)
            .await?;

        row.map(ApiKey::try_from).transpose()
    }
}

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use shipyard_core::{NewPublishStatus, PublishError, PublishKind, PublishStatus};

use crate::persistence::{PublishStatusPersistence, PublishStatusTransaction};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, sqlx::FromRow)]
struct PublishStatusRow {
    id: i64,
    kind: i32,
    resource_id: i64,
    template_id: i64,
    cluster: String,
}

impl TryFrom<PublishStatusRow> for PublishStatus {
    type Error = anyhow::Error;

    fn try_from(row: PublishStatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: PublishKind::try_from(row.kind)?,
            resource_id: row.resource_id,
            template_id: row.template_id,
            cluster: row.cluster,
        })
    }
}

fn into_statuses(rows: Vec<PublishStatusRow>) -> anyhow::Result<Vec<PublishStatus>> {
    rows.into_iter().map(PublishStatus::try_from).collect()
}

fn lock_key(kind: PublishKind, resource_id: i64) -> String {
    format!("publish_status:{}:{}", kind as i32, resource_id)
}

#[derive(Debug)]
pub struct PublishStatusRelationalPersistence {
    pub db: Arc<PgPool>,
}

struct RelationalStatusTransaction {
    transaction: Transaction<'static, Postgres>,
    kind: PublishKind,
    resource_id: i64,
}

#[async_trait]
impl PublishStatusTransaction for RelationalStatusTransaction {
    #[tracing::instrument(name = "relational::publish_status::list", skip_all)]
    async fn list(&mut self) -> anyhow::Result<Vec<PublishStatus>> {
        let rows = sqlx::query_as::<_, PublishStatusRow>(
            "SELECT * FROM publish_status WHERE kind = $1 AND resource_id = $2 ORDER BY id",
        )
        .bind(self.kind as i32)
        .bind(self.resource_id)
        .fetch_all(&mut self.transaction)
        .await?;

        into_statuses(rows)
    }

    #[tracing::instrument(name = "relational::publish_status::insert", skip_all)]
    async fn insert(&mut self, status: &NewPublishStatus) -> anyhow::Result<PublishStatus> {
        let result = sqlx::query_as::<_, PublishStatusRow>(
            r#"
            INSERT INTO publish_status
               (kind, resource_id, template_id, cluster)
            VALUES
               ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(status.kind as i32)
        .bind(status.resource_id)
        .bind(status.template_id)
        .bind(&status.cluster)
        .fetch_one(&mut self.transaction)
        .await;

        match result {
            Ok(row) => PublishStatus::try_from(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(PublishError::LedgerConflict(db_err.message().to_string()).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(name = "relational::publish_status::delete", skip_all)]
    async fn delete(&mut self, id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM publish_status WHERE id = $1")
            .bind(id)
            .execute(&mut self.transaction)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.transaction.commit().await?;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.transaction.rollback().await?;

        Ok(())
    }
}

#[async_trait]
impl PublishStatusPersistence for PublishStatusRelationalPersistence {
    #[tracing::instrument(name = "relational::publish_status::begin", skip_all)]
    async fn begin(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Box<dyn PublishStatusTransaction>> {
        let mut transaction = self.db.begin().await?;

        // held until commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key(kind, resource_id))
            .execute(&mut transaction)
            .await?;

        Ok(Box::new(RelationalStatusTransaction {
            transaction,
            kind,
            resource_id,
        }))
    }

    #[tracing::instrument(name = "relational::publish_status::get_by_resource", skip_all)]
    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishStatus>> {
        let rows = sqlx::query_as::<_, PublishStatusRow>(
            "SELECT * FROM publish_status WHERE kind = $1 AND resource_id = $2 ORDER BY id",
        )
        .bind(kind as i32)
        .bind(resource_id)
        .fetch_all(&*self.db)
        .await?;

        into_statuses(rows)
    }
}

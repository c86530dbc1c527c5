use std::collections::BTreeMap;

use shipyard_core::{NewPublishStatus, PublishError, PublishKind, PublishStatus};

use crate::persistence::PublishStatusPersistence;

/// What a ledger upsert did to the live pointer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LedgerChange {
    Inserted,
    Replaced { previous_template_id: i64 },
    Unchanged,
}

#[derive(Debug)]
pub struct PublishStatusService {
    pub persistence: Box<dyn PublishStatusPersistence>,
}

impl PublishStatusService {
    /// Points (kind, resource id, cluster) at `status.template_id`.
    ///
    /// Runs as one transaction: there is never more than one row for the key, and a failed
    /// switch leaves the previous row in place.
    #[tracing::instrument(
        name = "service::publish_status::publish",
        skip_all,
        fields(resource_id = status.resource_id, cluster = %status.cluster, template_id = status.template_id)
    )]
    pub async fn publish(&self, status: &NewPublishStatus) -> anyhow::Result<LedgerChange> {
        let mut transaction = self
            .persistence
            .begin(status.kind, status.resource_id)
            .await?;

        let rows = transaction.list().await?;
        let current: Vec<&PublishStatus> = rows
            .iter()
            .filter(|row| row.cluster == status.cluster)
            .collect();

        if current.len() > 1 {
            transaction.rollback().await?;

            return Err(PublishError::LedgerConflict(format!(
                "{} rows for {} {} on cluster {}",
                current.len(),
                status.kind,
                status.resource_id,
                status.cluster
            ))
            .into());
        }

        let change = match current.first() {
            None => {
                transaction.insert(status).await?;
                LedgerChange::Inserted
            }
            Some(row) if row.template_id == status.template_id => LedgerChange::Unchanged,
            Some(row) => {
                let previous_template_id = row.template_id;

                transaction.delete(row.id).await?;

                if let Err(err) = transaction.insert(status).await {
                    if let Err(rollback_err) = transaction.rollback().await {
                        tracing::error!("publish status rollback failed: {rollback_err:#}");
                    }

                    return Err(err);
                }

                LedgerChange::Replaced {
                    previous_template_id,
                }
            }
        };

        transaction.commit().await?;

        tracing::info!("publish status {change:?}");

        Ok(change)
    }

    #[tracing::instrument(name = "service::publish_status::get", skip(self))]
    pub async fn get(
        &self,
        kind: PublishKind,
        resource_id: i64,
        cluster: &str,
    ) -> anyhow::Result<Option<PublishStatus>> {
        let rows = self.persistence.get_by_resource(kind, resource_id).await?;

        Ok(rows.into_iter().find(|row| row.cluster == cluster))
    }

    /// Live template id per cluster for one resource.
    #[tracing::instrument(name = "service::publish_status::live_templates", skip(self))]
    pub async fn live_templates(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<BTreeMap<String, i64>> {
        let rows = self.persistence.get_by_resource(kind, resource_id).await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.cluster, row.template_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::persistence::memory::PublishStatusMemoryPersistence;

    fn memory_service() -> (PublishStatusService, PublishStatusMemoryPersistence) {
        let persistence = PublishStatusMemoryPersistence::default();

        (
            PublishStatusService {
                persistence: Box::new(persistence.clone()),
            },
            persistence,
        )
    }

    #[tokio::test]
    async fn test_insert_then_idempotent_republish() {
        let (service, _) = memory_service();
        let status = NewPublishStatus::deployment(5, "a", 10);

        assert_eq!(service.publish(&status).await.unwrap(), LedgerChange::Inserted);
        assert_eq!(service.publish(&status).await.unwrap(), LedgerChange::Unchanged);

        let rows = service
            .persistence
            .get_by_resource(PublishKind::Deployment, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_switch_leaves_exactly_one_row() {
        let (service, _) = memory_service();

        service
            .publish(&NewPublishStatus::deployment(5, "a", 10))
            .await
            .unwrap();
        service
            .publish(&NewPublishStatus::deployment(5, "b", 10))
            .await
            .unwrap();

        let change = service
            .publish(&NewPublishStatus::deployment(5, "a", 11))
            .await
            .unwrap();
        assert_eq!(
            change,
            LedgerChange::Replaced {
                previous_template_id: 10
            }
        );

        let live = service
            .live_templates(PublishKind::Deployment, 5)
            .await
            .unwrap();
        assert_eq!(live.get("a"), Some(&11));
        assert_eq!(live.get("b"), Some(&10));
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_previous_row() {
        let (service, persistence) = memory_service();

        service
            .publish(&NewPublishStatus::deployment(5, "a", 10))
            .await
            .unwrap();

        persistence.fail_next_insert();

        assert!(service
            .publish(&NewPublishStatus::deployment(5, "a", 11))
            .await
            .is_err());

        let row = service
            .get(PublishKind::Deployment, 5, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.template_id, 10);

        let rows = persistence
            .get_by_resource(PublishKind::Deployment, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rows_reported_as_conflict() {
        let (service, persistence) = memory_service();

        persistence
            .force_insert(&NewPublishStatus::deployment(5, "a", 10))
            .await;
        persistence
            .force_insert(&NewPublishStatus::deployment(5, "a", 11))
            .await;

        let err = service
            .publish(&NewPublishStatus::deployment(5, "a", 12))
            .await
            .unwrap_err();

        assert!(matches!(
            PublishError::from_store(err),
            PublishError::LedgerConflict(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_never_duplicate() {
        let (service, _) = memory_service();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .publish(&NewPublishStatus::deployment(5, "a", 10 + (i % 2)))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let rows = service
            .persistence
            .get_by_resource(PublishKind::Deployment, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}

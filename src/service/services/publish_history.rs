use shipyard_core::{NewPublishHistory, PublishHistory, PublishKind};

use crate::persistence::PublishHistoryPersistence;

#[derive(Debug)]
pub struct PublishHistoryService {
    pub persistence: Box<dyn PublishHistoryPersistence>,
}

impl PublishHistoryService {
    #[tracing::instrument(
        name = "service::publish_history::record",
        skip_all,
        fields(resource_id = history.resource_id, cluster = %history.cluster)
    )]
    pub async fn record(&self, history: &NewPublishHistory) -> anyhow::Result<PublishHistory> {
        let recorded = self.persistence.create(history).await?;

        tracing::info!(
            "{:?} publish of template {} recorded",
            recorded.status,
            recorded.template_id
        );

        Ok(recorded)
    }

    #[tracing::instrument(name = "service::publish_history::get_by_resource", skip(self))]
    pub async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishHistory>> {
        self.persistence.get_by_resource(kind, resource_id).await
    }
}

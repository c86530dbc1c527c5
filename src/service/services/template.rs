use shipyard_core::{DeploymentTemplate, NewDeploymentTemplate};

use crate::persistence::TemplatePersistence;

#[derive(Debug)]
pub struct TemplateService {
    pub persistence: Box<dyn TemplatePersistence>,
}

impl TemplateService {
    #[tracing::instrument(name = "service::template::create", skip_all)]
    pub async fn create(
        &self,
        template: &NewDeploymentTemplate,
    ) -> anyhow::Result<DeploymentTemplate> {
        let created = self.persistence.create(template).await?;

        tracing::info!(
            "template {} created for deployment {}",
            created.id,
            created.deployment_id
        );

        Ok(created)
    }

    #[tracing::instrument(name = "service::template::get_by_id", skip(self))]
    pub async fn get_by_id(&self, template_id: i64) -> anyhow::Result<Option<DeploymentTemplate>> {
        self.persistence.get_by_id(template_id).await
    }

    #[tracing::instrument(name = "service::template::get_by_deployment_id", skip(self))]
    pub async fn get_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Vec<DeploymentTemplate>> {
        self.persistence.get_by_deployment_id(deployment_id).await
    }

    #[tracing::instrument(name = "service::template::get_latest_by_deployment_id", skip(self))]
    pub async fn get_latest_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Option<DeploymentTemplate>> {
        self.persistence
            .get_latest_by_deployment_id(deployment_id)
            .await
    }

    /// Removes the templates of a deleted deployment, soft-deleting them when `logical` is set.
    #[tracing::instrument(name = "service::template::delete_by_deployment_id", skip(self))]
    pub async fn delete_by_deployment_id(
        &self,
        deployment_id: i64,
        logical: bool,
    ) -> anyhow::Result<u64> {
        let deleted_count = self
            .persistence
            .delete_by_deployment_id(deployment_id, logical)
            .await?;

        tracing::info!("{deleted_count} templates of deployment {deployment_id} deleted");

        Ok(deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::TemplateMemoryPersistence;

    #[tokio::test]
    async fn test_create_latest_delete() {
        let template_service = TemplateService {
            persistence: Box::<TemplateMemoryPersistence>::default(),
        };

        let new_template = NewDeploymentTemplate {
            name: "web".to_owned(),
            template: "{}".to_owned(),
            deployment_id: 5,
            description: "[APIKey] first".to_owned(),
            user: "[APIKey] ci".to_owned(),
        };

        let first = template_service.create(&new_template).await.unwrap();
        let second = template_service.create(&new_template).await.unwrap();

        let latest = template_service
            .get_latest_by_deployment_id(5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);

        let all = template_service.get_by_deployment_id(5).await.unwrap();
        assert_eq!(
            all.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        template_service
            .delete_by_deployment_id(5, true)
            .await
            .unwrap();

        assert!(template_service
            .get_latest_by_deployment_id(5)
            .await
            .unwrap()
            .is_none());
    }
}

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use shipyard_core::{DeploymentTemplate, NewDeploymentTemplate};

use crate::persistence::TemplatePersistence;

#[derive(Debug, Default)]
struct TemplateTable {
    models: HashMap<i64, DeploymentTemplate>,
    next_id: i64,
}

#[derive(Clone, Debug, Default)]
pub struct TemplateMemoryPersistence {
    table: Arc<Mutex<TemplateTable>>,
}

impl TemplateMemoryPersistence {
    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<TemplateTable>> {
        match self.table.lock() {
            Ok(locked_models) => Ok(locked_models),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }

    fn newest_first(mut templates: Vec<DeploymentTemplate>) -> Vec<DeploymentTemplate> {
        templates.sort_by(|a, b| {
            b.create_time
                .cmp(&a.create_time)
                .then_with(|| b.id.cmp(&a.id))
        });

        templates
    }
}

#[async_trait]
impl TemplatePersistence for TemplateMemoryPersistence {
    async fn create(&self, template: &NewDeploymentTemplate) -> anyhow::Result<DeploymentTemplate> {
        let mut locked_table = self.get_models_locked()?;

        locked_table.next_id += 1;
        let now = Utc::now();

        let created = DeploymentTemplate {
            id: locked_table.next_id,
            name: template.name.clone(),
            template: template.template.clone(),
            deployment_id: template.deployment_id,
            description: template.description.clone(),
            user: template.user.clone(),
            create_time: now,
            update_time: now,
            deleted: false,
        };

        locked_table.models.insert(created.id, created.clone());

        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<DeploymentTemplate>> {
        let locked_table = self.get_models_locked()?;

        Ok(locked_table.models.get(&id).cloned())
    }

    async fn get_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Vec<DeploymentTemplate>> {
        let locked_table = self.get_models_locked()?;

        let templates = locked_table
            .models
            .values()
            .filter(|template| template.deployment_id == deployment_id && !template.deleted)
            .cloned()
            .collect();

        Ok(Self::newest_first(templates))
    }

    async fn get_latest_by_deployment_id(
        &self,
        deployment_id: i64,
    ) -> anyhow::Result<Option<DeploymentTemplate>> {
        let templates = self.get_by_deployment_id(deployment_id).await?;

        Ok(templates.into_iter().next())
    }

    async fn delete_by_deployment_id(
        &self,
        deployment_id: i64,
        logical: bool,
    ) -> anyhow::Result<u64> {
        let mut locked_table = self.get_models_locked()?;
        let mut affected = 0;

        if logical {
            let now = Utc::now();
            for template in locked_table.models.values_mut() {
                if template.deployment_id == deployment_id && !template.deleted {
                    template.deleted = true;
                    template.update_time = now;
                    affected += 1;
                }
            }
        } else {
            let before = locked_table.models.len();
            locked_table
                .models
                .retain(|_, template| template.deployment_id != deployment_id);
            affected = (before - locked_table.models.len()) as u64;
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_template(deployment_id: i64, description: &str) -> NewDeploymentTemplate {
        NewDeploymentTemplate {
            name: "web".to_owned(),
            template: "{}".to_owned(),
            deployment_id,
            description: description.to_owned(),
            user: "tester".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let persistence = TemplateMemoryPersistence::default();

        let first = persistence.create(&new_template(5, "first")).await.unwrap();
        let second = persistence.create(&new_template(5, "second")).await.unwrap();
        persistence.create(&new_template(6, "other")).await.unwrap();

        assert_ne!(first.id, second.id);

        let fetched = persistence.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "first");

        let latest = persistence
            .get_latest_by_deployment_id(5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);

        let deleted = persistence.delete_by_deployment_id(5, true).await.unwrap();
        assert_eq!(deleted, 2);

        assert!(persistence.get_by_deployment_id(5).await.unwrap().is_empty());
        assert!(persistence.get_by_id(first.id).await.unwrap().unwrap().deleted);

        let removed = persistence.delete_by_deployment_id(5, false).await.unwrap();
        assert_eq!(removed, 2);
        assert!(persistence.get_by_id(first.id).await.unwrap().is_none());
        assert_eq!(persistence.get_by_deployment_id(6).await.unwrap().len(), 1);
    }
}

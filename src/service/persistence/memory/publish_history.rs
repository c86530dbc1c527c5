use async_trait::async_trait;
use chrono::Utc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use shipyard_core::{NewPublishHistory, PublishHistory, PublishKind};

use crate::persistence::PublishHistoryPersistence;

#[derive(Clone, Debug, Default)]
pub struct PublishHistoryMemoryPersistence {
    models: Arc<Mutex<Vec<PublishHistory>>>,
    unavailable: Arc<AtomicBool>,
}

impl PublishHistoryMemoryPersistence {
    /// While set, every append fails as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<Vec<PublishHistory>>> {
        match self.models.lock() {
            Ok(locked_models) => Ok(locked_models),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

#[async_trait]
impl PublishHistoryPersistence for PublishHistoryMemoryPersistence {
    async fn create(&self, history: &NewPublishHistory) -> anyhow::Result<PublishHistory> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("publish history store unavailable"));
        }

        let mut locked_models = self.get_models_locked()?;

        let created = PublishHistory {
            id: locked_models.len() as i64 + 1,
            kind: history.kind,
            resource_id: history.resource_id,
            resource_name: history.resource_name.clone(),
            template_id: history.template_id,
            cluster: history.cluster.clone(),
            user: history.user.clone(),
            message: history.message.clone(),
            status: history.status,
            create_time: Utc::now(),
        };
        locked_models.push(created.clone());

        Ok(created)
    }

    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishHistory>> {
        let locked_models = self.get_models_locked()?;

        Ok(locked_models
            .iter()
            .rev()
            .filter(|history| history.kind == kind && history.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use shipyard_core::ReleaseStatus;

    use super::*;

    fn new_history(cluster: &str, status: ReleaseStatus) -> NewPublishHistory {
        NewPublishHistory {
            kind: PublishKind::Deployment,
            resource_id: 5,
            resource_name: "web".to_owned(),
            template_id: 10,
            cluster: cluster.to_owned(),
            user: "tester".to_owned(),
            message: "upgrade".to_owned(),
            status,
        }
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let persistence = PublishHistoryMemoryPersistence::default();

        persistence
            .create(&new_history("a", ReleaseStatus::Success))
            .await
            .unwrap();
        persistence
            .create(&new_history("b", ReleaseStatus::Failure))
            .await
            .unwrap();

        let history = persistence
            .get_by_resource(PublishKind::Deployment, 5)
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].cluster, "b");
        assert_eq!(history[1].cluster, "a");

        persistence.set_unavailable(true);
        assert!(persistence
            .create(&new_history("c", ReleaseStatus::Success))
            .await
            .is_err());
    }
}

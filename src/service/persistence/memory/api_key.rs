use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use shipyard_core::ApiKey;

use crate::persistence::ApiKeyPersistence;

#[derive(Clone, Debug, Default)]
pub struct ApiKeyMemoryPersistence {
    models: Arc<Mutex<HashMap<String, ApiKey>>>,
}

impl ApiKeyMemoryPersistence {
    pub fn insert(&self, api_key: ApiKey) -> anyhow::Result<()> {
        let mut locked_models = self.get_models_locked()?;

        locked_models.insert(api_key.token.clone(), api_key);

        Ok(())
    }

    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<HashMap<String, ApiKey>>> {
        match self.models.lock() {
            Ok(locked_models) => Ok(locked_models),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

#[async_trait]
impl ApiKeyPersistence for ApiKeyMemoryPersistence {
    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<ApiKey>> {
        let locked_models = self.get_models_locked()?;

        Ok(locked_models.get(token).cloned())
    }
}

use shipyard_core::{DeploymentIdentity, PublishError, ValidationError};

use crate::persistence::ResourcePersistence;

#[derive(Debug)]
pub struct ResourceService {
    pub persistence: Box<dyn ResourcePersistence>,
}

fn invalid(name: &'static str, reason: String) -> anyhow::Error {
    PublishError::Validation(ValidationError::InvalidParameter { name, reason }).into()
}

impl ResourceService {
    /// Finds the deployment called `deployment` whose app lives in the namespace called
    /// `namespace`, reading deployment, app and namespace one after the other.
    #[tracing::instrument(name = "service::resource::resolve_identity", skip(self))]
    pub async fn resolve_identity(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> anyhow::Result<DeploymentIdentity> {
        let candidates = self.persistence.get_deployments_by_name(deployment).await?;

        if candidates.is_empty() {
            return Err(invalid(
                "deployment",
                format!("deployment {deployment} not found"),
            ));
        }

        let mut deleted_rejection = None;

        for candidate in candidates {
            let app = match self.persistence.get_app_by_id(candidate.app_id).await? {
                Some(app) => app,
                None => continue,
            };

            let owning_namespace = match self
                .persistence
                .get_namespace_by_id(app.namespace_id)
                .await?
            {
                Some(owning_namespace) => owning_namespace,
                None => continue,
            };

            if owning_namespace.name != namespace {
                continue;
            }

            // A deleted row only rejects the request when no live row of the same name matches.
            if candidate.deleted {
                deleted_rejection.get_or_insert((
                    "deployment",
                    format!("deployment {deployment} has been deleted"),
                ));
                continue;
            }

            if owning_namespace.deleted {
                deleted_rejection.get_or_insert((
                    "namespace",
                    format!("namespace {namespace} has been deleted"),
                ));
                continue;
            }

            return Ok(DeploymentIdentity {
                deployment: candidate,
                app,
                namespace: owning_namespace,
            });
        }

        if let Some((name, reason)) = deleted_rejection {
            return Err(invalid(name, reason));
        }

        Err(invalid(
            "namespace",
            format!("deployment {deployment} does not belong to namespace {namespace}"),
        ))
    }

    #[tracing::instrument(name = "service::resource::update_replicas", skip(self))]
    pub async fn update_replicas(
        &self,
        deployment_id: i64,
        cluster: &str,
        replicas: i32,
    ) -> anyhow::Result<u64> {
        self.persistence
            .update_replicas(deployment_id, cluster, replicas)
            .await
    }
}

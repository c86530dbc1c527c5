use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Semaphore;
use uuid::Uuid;

use shipyard_core::{
    manifest, ApiKey, ApiKeyType, ClusterGatewayFactory, DeploymentIdentity, DeploymentTemplate,
    NewDeploymentTemplate, NewPublishHistory, NewPublishStatus, PublishError, PublishHistory,
    PublishKind, ReleaseStatus, ValidationError, MAX_REPLICAS,
};

use super::attempt::PublishAttempt;
use super::planner::{self, Patch};
use super::report::{
    self, ClusterOutcome, ClusterStatus, OperationReport, PodSummary, ReplicaCounts, StatusReport,
};
use crate::acl::{Action, Authorizer};
use crate::services::{
    PublishHistoryService, PublishStatusService, ResourceService, TemplateService,
};

pub const DEFAULT_PUBLISH_CONCURRENCY: usize = 8;

/// Deployment addressed by namespace and name, and the clusters an operation targets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeploymentTarget {
    pub namespace: String,
    pub deployment: String,
    pub clusters: Vec<String>,
}

impl DeploymentTarget {
    fn validate_identity(&self) -> Result<(), ValidationError> {
        if self.namespace.is_empty() {
            return Err(ValidationError::MissingParameter("namespace"));
        }

        if self.deployment.is_empty() {
            return Err(ValidationError::MissingParameter("deployment"));
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.validate_identity()?;

        if self.clusters.iter().all(|cluster| cluster.is_empty()) {
            return Err(ValidationError::MissingParameter("cluster"));
        }

        Ok(())
    }

    /// Requested clusters in request order, without blanks or repeats.
    fn distinct_clusters(&self) -> Vec<String> {
        let mut clusters: Vec<String> = Vec::with_capacity(self.clusters.len());

        for cluster in &self.clusters {
            if !cluster.is_empty() && !clusters.contains(cluster) {
                clusters.push(cluster.clone());
            }
        }

        clusters
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpgradeRequest {
    pub target: DeploymentTarget,
    pub patch: Patch,
    /// Publishes this template as-is, or with `publish` unset, patches it instead of each
    /// cluster's live template.
    pub template_id: Option<i64>,
    pub publish: bool,
    pub description: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScaleRequest {
    pub target: DeploymentTarget,
    pub replicas: i64,
}

type Mutation = Arc<dyn Fn(&mut Deployment) + Send + Sync>;

/// Sets the shared flag when the operation that owns it is dropped, so spawned per-cluster
/// work that has not reached its cluster yet stops there.
#[derive(Debug, Default)]
struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Drop for Cancellation {
    fn drop(&mut self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct PublishContext {
    identity: DeploymentIdentity,
    user: String,
    message: String,
    cancelled: Arc<AtomicBool>,
}

impl PublishContext {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn history_entry(&self, cluster: &str, template_id: i64) -> NewPublishHistory {
        NewPublishHistory {
            kind: PublishKind::Deployment,
            resource_id: self.identity.deployment.id,
            resource_name: self.identity.deployment.name.clone(),
            template_id,
            cluster: cluster.to_string(),
            user: self.user.clone(),
            message: self.message.clone(),
            status: ReleaseStatus::Failure,
        }
    }
}

fn validate_replicas(replicas: i64) -> Result<i32, ValidationError> {
    if replicas <= 0 || replicas > i64::from(MAX_REPLICAS) {
        return Err(ValidationError::InvalidRange {
            replicas,
            max: MAX_REPLICAS,
        });
    }

    Ok(replicas as i32)
}

fn replica_counts(deployment: &Deployment) -> ReplicaCounts {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.clone().unwrap_or_default();

    ReplicaCounts {
        desired,
        current: status.replicas.unwrap_or(0),
        ready: status.ready_replicas.unwrap_or(0),
        available: status.available_replicas.unwrap_or(0),
        updated: status.updated_replicas.unwrap_or(0),
        unavailable: status.unavailable_replicas.unwrap_or(0),
    }
}

fn in_request_order(clusters: &[String], outcomes: &mut [ClusterOutcome]) {
    outcomes.sort_by_key(|outcome| {
        clusters
            .iter()
            .position(|cluster| *cluster == outcome.cluster)
            .unwrap_or(usize::MAX)
    });
}

/// Drives Upgrade, Restart, Scale and status reads across clusters.
///
/// Batch-level failures (validation, authorization) come back as `Err` before any cluster is
/// touched. Everything after that is reported per cluster in the returned report.
#[derive(Clone, Debug)]
pub struct PublishOrchestrator {
    pub template_service: Arc<TemplateService>,
    pub publish_status_service: Arc<PublishStatusService>,
    pub publish_history_service: Arc<PublishHistoryService>,
    pub resource_service: Arc<ResourceService>,
    pub gateway_factory: Arc<dyn ClusterGatewayFactory>,
    pub authorizer: Arc<dyn Authorizer>,
    concurrency: Arc<Semaphore>,
}

impl PublishOrchestrator {
    pub fn new(
        template_service: Arc<TemplateService>,
        publish_status_service: Arc<PublishStatusService>,
        publish_history_service: Arc<PublishHistoryService>,
        resource_service: Arc<ResourceService>,
        gateway_factory: Arc<dyn ClusterGatewayFactory>,
        authorizer: Arc<dyn Authorizer>,
        concurrency: usize,
    ) -> Self {
        Self {
            template_service,
            publish_status_service,
            publish_history_service,
            resource_service,
            gateway_factory,
            authorizer,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<ApiKey, PublishError> {
        self.authorizer.authenticate(token).await
    }

    async fn authorize(
        &self,
        api_key: &ApiKey,
        action: Action,
        target: &DeploymentTarget,
    ) -> Result<DeploymentIdentity, PublishError> {
        if !self.authorizer.check_permission(api_key, action) {
            return Err(PublishError::Authorization(format!(
                "api key {} lacks permission {}",
                api_key.name,
                action.permission()
            )));
        }

        let identity = self
            .resource_service
            .resolve_identity(&target.namespace, &target.deployment)
            .await
            .map_err(PublishError::from_store)?;

        if !self.authorizer.check_resource_scope(api_key, &identity) {
            return Err(PublishError::Authorization(format!(
                "api key {} has no access to deployment {}",
                api_key.name, identity.deployment.name
            )));
        }

        Ok(identity)
    }

    #[tracing::instrument(
        name = "publish::orchestrator::upgrade",
        skip_all,
        fields(deployment = %request.target.deployment, operation_id = tracing::field::Empty)
    )]
    pub async fn upgrade(
        &self,
        api_key: &ApiKey,
        request: &UpgradeRequest,
    ) -> Result<OperationReport, PublishError> {
        request.target.validate()?;

        if request.template_id.is_none() && request.patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        let identity = self
            .authorize(api_key, Action::UpgradeDeployment, &request.target)
            .await?;

        let operation_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("operation_id", &operation_id.as_str());

        let clusters = request.target.distinct_clusters();

        let explicit = match request.template_id {
            Some(template_id) => Some(self.owned_template(&identity, template_id).await?),
            None => None,
        };

        let cancellation = Cancellation::default();
        let context = Arc::new(PublishContext {
            identity,
            user: api_key.display_name(),
            message: format!("[APIKey] {}", request.description),
            cancelled: Arc::clone(&cancellation.flag),
        });

        if let (Some(template), true) = (&explicit, request.publish) {
            let assignments = clusters
                .iter()
                .map(|cluster| (cluster.clone(), template.clone()))
                .collect();

            let mut outcomes = self.publish_all(&context, assignments).await;
            in_request_order(&clusters, &mut outcomes);

            return Ok(OperationReport {
                operation_id,
                clusters: outcomes,
                templates: vec![template.id],
            });
        }

        let mut outcomes = Vec::new();

        let bases = match explicit {
            Some(template) => clusters
                .iter()
                .map(|cluster| (cluster.clone(), template.clone()))
                .collect(),
            None => {
                let (bases, failures) = self.live_bases(&context.identity, &clusters).await?;
                outcomes.extend(failures);
                bases
            }
        };

        let plan = planner::plan(bases, &request.patch);

        outcomes.extend(
            plan.failures
                .into_iter()
                .map(|(cluster, err)| ClusterOutcome::failed(&cluster, None, err)),
        );

        let mut templates = Vec::new();
        let mut assignments = Vec::new();

        for group in plan.groups {
            match self.persist_group(&context, &request.description, &group).await {
                Ok(template) => {
                    if !templates.contains(&template.id) {
                        templates.push(template.id);
                    }

                    assignments.extend(
                        group
                            .clusters
                            .iter()
                            .map(|cluster| (cluster.clone(), template.clone())),
                    );
                }
                Err(err) => outcomes.extend(
                    group
                        .clusters
                        .iter()
                        .map(|cluster| ClusterOutcome::failed(cluster, None, err.clone())),
                ),
            }
        }

        if request.publish {
            outcomes.extend(self.publish_all(&context, assignments).await);
        } else {
            outcomes.extend(
                assignments
                    .iter()
                    .map(|(cluster, template)| ClusterOutcome::succeeded(cluster, template.id)),
            );
        }

        in_request_order(&clusters, &mut outcomes);

        let report = OperationReport {
            operation_id,
            clusters: outcomes,
            templates,
        };

        tracing::info!(
            "upgrade of {} finished with {} failed clusters",
            context.identity.deployment.name,
            report.errors().len()
        );

        Ok(report)
    }

    #[tracing::instrument(
        name = "publish::orchestrator::restart",
        skip_all,
        fields(deployment = %target.deployment, operation_id = tracing::field::Empty)
    )]
    pub async fn restart(
        &self,
        api_key: &ApiKey,
        target: &DeploymentTarget,
    ) -> Result<OperationReport, PublishError> {
        target.validate()?;

        let identity = self
            .authorize(api_key, Action::RestartDeployment, target)
            .await?;

        let restarted_at = Utc::now();
        let mutation: Mutation = Arc::new(move |deployment: &mut Deployment| {
            manifest::mark_restarted(deployment, restarted_at)
        });

        self.mutate_live(api_key, identity, target, "restart".to_owned(), mutation)
            .await
    }

    #[tracing::instrument(
        name = "publish::orchestrator::scale",
        skip_all,
        fields(deployment = %request.target.deployment, operation_id = tracing::field::Empty)
    )]
    pub async fn scale(
        &self,
        api_key: &ApiKey,
        request: &ScaleRequest,
    ) -> Result<OperationReport, PublishError> {
        request.target.validate()?;
        let replicas = validate_replicas(request.replicas)?;

        let identity = self
            .authorize(api_key, Action::ScaleDeployment, &request.target)
            .await?;
        let deployment_id = identity.deployment.id;

        let mutation: Mutation = Arc::new(move |deployment: &mut Deployment| {
            manifest::set_replicas(deployment, replicas)
        });

        let report = self
            .mutate_live(
                api_key,
                identity,
                &request.target,
                format!("scale to {replicas} replicas"),
                mutation,
            )
            .await?;

        for outcome in report.clusters.iter().filter(|outcome| outcome.is_success()) {
            if let Err(err) = self
                .resource_service
                .update_replicas(deployment_id, &outcome.cluster, replicas)
                .await
            {
                tracing::error!(
                    "failed to persist {replicas} desired replicas for cluster {}: {err:#}",
                    outcome.cluster
                );
            }
        }

        Ok(report)
    }

    #[tracing::instrument(name = "publish::orchestrator::status", skip_all, fields(deployment = %target.deployment))]
    pub async fn status(
        &self,
        api_key: &ApiKey,
        target: &DeploymentTarget,
    ) -> Result<StatusReport, PublishError> {
        target.validate()?;

        let identity = self
            .authorize(api_key, Action::GetDeploymentStatus, target)
            .await?;

        let live = self
            .publish_status_service
            .live_templates(PublishKind::Deployment, identity.deployment.id)
            .await
            .map_err(PublishError::from_store)?;

        let clusters = target.distinct_clusters();
        let statuses = join_all(clusters.iter().map(|cluster| {
            self.cluster_status(&identity, cluster, live.get(cluster).copied())
        }))
        .await;

        Ok(StatusReport { clusters: statuses })
    }

    /// Newest live template of the deployment. The lookup spans every namespace, so only global
    /// keys may perform it.
    #[tracing::instrument(name = "publish::orchestrator::latest_template", skip(self, api_key))]
    pub async fn latest_template(
        &self,
        api_key: &ApiKey,
        namespace: &str,
        app: &str,
        deployment: &str,
    ) -> Result<DeploymentTemplate, PublishError> {
        let target = DeploymentTarget {
            namespace: namespace.to_string(),
            deployment: deployment.to_string(),
            clusters: Vec::new(),
        };
        target.validate_identity()?;

        if app.is_empty() {
            return Err(ValidationError::MissingParameter("app").into());
        }

        if api_key.key_type != ApiKeyType::Global {
            return Err(PublishError::Authorization(format!(
                "api key {} is not a global key",
                api_key.name
            )));
        }

        let identity = self
            .authorize(api_key, Action::GetLatestDeploymentTemplate, &target)
            .await?;

        if identity.app.name != app {
            return Err(ValidationError::InvalidParameter {
                name: "app",
                reason: format!("deployment {deployment} does not belong to app {app}"),
            }
            .into());
        }

        self.template_service
            .get_latest_by_deployment_id(identity.deployment.id)
            .await
            .map_err(PublishError::from_store)?
            .ok_or_else(|| {
                ValidationError::InvalidParameter {
                    name: "deployment",
                    reason: format!("deployment {deployment} has no template"),
                }
                .into()
            })
    }

    /// Publish history of a deployment, newest first.
    #[tracing::instrument(name = "publish::orchestrator::history", skip(self, api_key))]
    pub async fn history(
        &self,
        api_key: &ApiKey,
        namespace: &str,
        deployment: &str,
    ) -> Result<Vec<PublishHistory>, PublishError> {
        let target = DeploymentTarget {
            namespace: namespace.to_string(),
            deployment: deployment.to_string(),
            clusters: Vec::new(),
        };
        target.validate_identity()?;

        let identity = self
            .authorize(api_key, Action::GetDeploymentStatus, &target)
            .await?;

        self.publish_history_service
            .get_by_resource(PublishKind::Deployment, identity.deployment.id)
            .await
            .map_err(PublishError::from_store)
    }

    async fn owned_template(
        &self,
        identity: &DeploymentIdentity,
        template_id: i64,
    ) -> Result<DeploymentTemplate, PublishError> {
        let invalid = |reason: String| -> PublishError {
            ValidationError::InvalidParameter {
                name: "template_id",
                reason,
            }
            .into()
        };

        let template = self
            .template_service
            .get_by_id(template_id)
            .await
            .map_err(PublishError::from_store)?
            .ok_or_else(|| invalid(format!("template {template_id} not found")))?;

        if template.deployment_id != identity.deployment.id {
            return Err(invalid(format!(
                "template {template_id} does not belong to deployment {}",
                identity.deployment.name
            )));
        }

        if template.deleted {
            return Err(invalid(format!("template {template_id} has been deleted")));
        }

        Ok(template)
    }

    /// Template each cluster currently runs. Clusters never published fail with `NotPublished`.
    async fn live_bases(
        &self,
        identity: &DeploymentIdentity,
        clusters: &[String],
    ) -> Result<(Vec<(String, DeploymentTemplate)>, Vec<ClusterOutcome>), PublishError> {
        let live = self
            .publish_status_service
            .live_templates(PublishKind::Deployment, identity.deployment.id)
            .await
            .map_err(PublishError::from_store)?;

        let mut templates: BTreeMap<i64, Result<DeploymentTemplate, PublishError>> =
            BTreeMap::new();

        for template_id in clusters.iter().filter_map(|cluster| live.get(cluster)) {
            if templates.contains_key(template_id) {
                continue;
            }

            let template = match self.template_service.get_by_id(*template_id).await {
                Ok(Some(template)) => Ok(template),
                Ok(None) => Err(PublishError::InvalidTemplate {
                    template_id: *template_id,
                    reason: "live template no longer exists".to_owned(),
                }),
                Err(err) => Err(PublishError::from_store(err)),
            };

            templates.insert(*template_id, template);
        }

        let mut bases = Vec::new();
        let mut failures = Vec::new();

        for cluster in clusters {
            let template_id = match live.get(cluster) {
                Some(template_id) => *template_id,
                None => {
                    failures.push(ClusterOutcome::failed(
                        cluster,
                        None,
                        PublishError::NotPublished {
                            resource_id: identity.deployment.id,
                            cluster: cluster.clone(),
                        },
                    ));
                    continue;
                }
            };

            match templates.get(&template_id) {
                Some(Ok(template)) => bases.push((cluster.clone(), template.clone())),
                Some(Err(err)) => {
                    failures.push(ClusterOutcome::failed(cluster, Some(template_id), err.clone()))
                }
                None => {}
            }
        }

        Ok((bases, failures))
    }

    /// Writes the group's new template, or reuses its source when the patch changed nothing.
    async fn persist_group(
        &self,
        context: &PublishContext,
        description: &str,
        group: &planner::PlannedGroup,
    ) -> Result<DeploymentTemplate, PublishError> {
        if !group.changed {
            tracing::info!(
                "manifest unchanged for {:?}, keeping template {}",
                group.clusters,
                group.source.id
            );

            return Ok(group.source.clone());
        }

        let template = manifest::serialize_manifest(&group.manifest)
            .map_err(|err| PublishError::InvalidTemplate {
                template_id: group.source.id,
                reason: err.to_string(),
            })?;

        self.template_service
            .create(&NewDeploymentTemplate {
                name: group.source.name.clone(),
                template,
                deployment_id: context.identity.deployment.id,
                description: format!("[APIKey] {description}"),
                user: context.user.clone(),
            })
            .await
            .map_err(PublishError::from_store)
    }

    /// Runs per-cluster work as spawned tasks bounded by the concurrency limit.
    async fn fan_out(
        &self,
        tasks: Vec<(String, BoxFuture<'static, ClusterOutcome>)>,
    ) -> Vec<ClusterOutcome> {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|(cluster, task)| {
                let concurrency = Arc::clone(&self.concurrency);
                let handle = tokio::spawn(async move {
                    let _permit = concurrency.acquire_owned().await.ok();
                    task.await
                });

                (cluster, handle)
            })
            .collect();

        join_all(handles.into_iter().map(|(cluster, handle)| async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("publish task for cluster {cluster} failed: {err}");

                    ClusterOutcome::failed(
                        &cluster,
                        None,
                        PublishError::Store(format!("publish task failed: {err}")),
                    )
                }
            }
        }))
        .await
    }

    async fn publish_all(
        &self,
        context: &Arc<PublishContext>,
        assignments: Vec<(String, DeploymentTemplate)>,
    ) -> Vec<ClusterOutcome> {
        let tasks = assignments
            .into_iter()
            .map(|(cluster, template)| {
                let orchestrator = self.clone();
                let context = Arc::clone(context);
                let task_cluster = cluster.clone();

                let task = async move {
                    orchestrator
                        .publish_one(&context, &task_cluster, &template)
                        .await
                }
                .boxed();

                (cluster, task)
            })
            .collect();

        self.fan_out(tasks).await
    }

    #[tracing::instrument(
        name = "publish::orchestrator::publish_one",
        skip(self, context, template),
        fields(template_id = template.id)
    )]
    async fn publish_one(
        &self,
        context: &PublishContext,
        cluster: &str,
        template: &DeploymentTemplate,
    ) -> ClusterOutcome {
        if context.is_cancelled() {
            return ClusterOutcome::failed(
                cluster,
                Some(template.id),
                PublishError::Cancelled(cluster.to_string()),
            );
        }

        let mut attempt = PublishAttempt::begin(
            Arc::clone(&self.publish_history_service),
            context.history_entry(cluster, template.id),
        );

        let outcome = match self.apply_template(context, cluster, template).await {
            Ok(()) => {
                attempt.succeeded(context.message.clone());

                let status = NewPublishStatus::deployment(
                    context.identity.deployment.id,
                    cluster,
                    template.id,
                );

                match self.publish_status_service.publish(&status).await {
                    Ok(_) => ClusterOutcome::succeeded(cluster, template.id),
                    Err(err) => {
                        tracing::error!(
                            "template {} applied to cluster {cluster} but the live pointer was not updated: {err:#}",
                            template.id
                        );

                        ClusterOutcome::failed(
                            cluster,
                            Some(template.id),
                            PublishError::from_store(err),
                        )
                    }
                }
            }
            Err(err) => {
                tracing::warn!("publish of template {} failed: {err}", template.id);
                attempt.failed(&err);

                ClusterOutcome::failed(cluster, Some(template.id), err)
            }
        };

        attempt.finish().await;

        outcome
    }

    async fn apply_template(
        &self,
        context: &PublishContext,
        cluster: &str,
        template: &DeploymentTemplate,
    ) -> Result<(), PublishError> {
        let gateway = self.gateway_factory.resolve(cluster).await?;

        let mut deployment = manifest::parse_template(template)?;
        manifest::apply_cluster_overrides(
            &mut deployment,
            &context.identity.namespace.kube_namespace,
            context.identity.deployment.replicas_for(cluster),
        );

        if context.is_cancelled() {
            return Err(PublishError::Cancelled(cluster.to_string()));
        }

        gateway.create_or_update(&deployment).await?;

        Ok(())
    }

    /// Restart and Scale: edit each cluster's live object in place, keeping its live template.
    async fn mutate_live(
        &self,
        api_key: &ApiKey,
        identity: DeploymentIdentity,
        target: &DeploymentTarget,
        message: String,
        mutation: Mutation,
    ) -> Result<OperationReport, PublishError> {
        let operation_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("operation_id", &operation_id.as_str());

        let live = self
            .publish_status_service
            .live_templates(PublishKind::Deployment, identity.deployment.id)
            .await
            .map_err(PublishError::from_store)?;

        let clusters = target.distinct_clusters();
        let cancellation = Cancellation::default();
        let context = Arc::new(PublishContext {
            identity,
            user: api_key.display_name(),
            message,
            cancelled: Arc::clone(&cancellation.flag),
        });

        let mut outcomes = Vec::new();
        let mut tasks = Vec::new();
        let mut templates = Vec::new();

        for cluster in &clusters {
            let template_id = match live.get(cluster) {
                Some(template_id) => *template_id,
                None => {
                    outcomes.push(ClusterOutcome::failed(
                        cluster,
                        None,
                        PublishError::NotPublished {
                            resource_id: context.identity.deployment.id,
                            cluster: cluster.clone(),
                        },
                    ));
                    continue;
                }
            };

            if !templates.contains(&template_id) {
                templates.push(template_id);
            }

            let orchestrator = self.clone();
            let context = Arc::clone(&context);
            let mutation = Arc::clone(&mutation);
            let task_cluster = cluster.clone();

            let task = async move {
                orchestrator
                    .update_live(&context, &task_cluster, template_id, &mutation)
                    .await
            }
            .boxed();

            tasks.push((cluster.clone(), task));
        }

        outcomes.extend(self.fan_out(tasks).await);
        in_request_order(&clusters, &mut outcomes);

        Ok(OperationReport {
            operation_id,
            clusters: outcomes,
            templates,
        })
    }

    #[tracing::instrument(
        name = "publish::orchestrator::update_live",
        skip(self, context, mutation)
    )]
    async fn update_live(
        &self,
        context: &PublishContext,
        cluster: &str,
        template_id: i64,
        mutation: &Mutation,
    ) -> ClusterOutcome {
        if context.is_cancelled() {
            return ClusterOutcome::failed(
                cluster,
                Some(template_id),
                PublishError::Cancelled(cluster.to_string()),
            );
        }

        let mut attempt = PublishAttempt::begin(
            Arc::clone(&self.publish_history_service),
            context.history_entry(cluster, template_id),
        );

        let outcome = match self.apply_mutation(context, cluster, mutation).await {
            Ok(()) => {
                attempt.succeeded(context.message.clone());
                ClusterOutcome::succeeded(cluster, template_id)
            }
            Err(err) => {
                tracing::warn!("{} failed: {err}", context.message);
                attempt.failed(&err);
                ClusterOutcome::failed(cluster, Some(template_id), err)
            }
        };

        attempt.finish().await;

        outcome
    }

    async fn apply_mutation(
        &self,
        context: &PublishContext,
        cluster: &str,
        mutation: &Mutation,
    ) -> Result<(), PublishError> {
        let gateway = self.gateway_factory.resolve(cluster).await?;

        let mut live = gateway
            .get(
                &context.identity.namespace.kube_namespace,
                &context.identity.deployment.name,
            )
            .await?;

        mutation(&mut live);

        if context.is_cancelled() {
            return Err(PublishError::Cancelled(cluster.to_string()));
        }

        gateway.update(&live).await?;

        Ok(())
    }

    async fn cluster_status(
        &self,
        identity: &DeploymentIdentity,
        cluster: &str,
        template_id: Option<i64>,
    ) -> ClusterStatus {
        let observed = async {
            let gateway = self.gateway_factory.resolve(cluster).await?;
            let live = gateway
                .get(
                    &identity.namespace.kube_namespace,
                    &identity.deployment.name,
                )
                .await?;
            let pods = gateway
                .list_pods(
                    &identity.namespace.kube_namespace,
                    &manifest::label_selector(&live),
                )
                .await?;

            Ok::<_, PublishError>((
                replica_counts(&live),
                pods.iter().map(PodSummary::from).collect::<Vec<_>>(),
            ))
        }
        .await;

        match observed {
            Ok((counts, pods)) => ClusterStatus {
                cluster: cluster.to_string(),
                template_id,
                replicas: Some(counts),
                healthz: report::is_healthy(&counts, &pods),
                pods,
                error: None,
            },
            Err(err) => ClusterStatus {
                cluster: cluster.to_string(),
                template_id,
                replicas: None,
                pods: Vec::new(),
                healthz: false,
                error: Some(err),
            },
        }
    }
}

use axum::extract::{Extension, Query};
use std::sync::Arc;

use shipyard_core::ApiKey;

use super::params::ActionQuery;
use super::response::{ActionReply, ActionResponse};
use crate::publish::PublishOrchestrator;

async fn authenticate(
    orchestrator: &PublishOrchestrator,
    query: &ActionQuery,
) -> Result<ApiKey, ActionReply> {
    orchestrator
        .authenticate(query.apikey.as_deref().unwrap_or_default())
        .await
        .map_err(|err| {
            tracing::warn!("rejected gateway action: {err}");
            ActionResponse::failure(&err)
        })
}

#[tracing::instrument(name = "http::deployment::get_deployment_status", skip_all)]
pub async fn get_deployment_status(
    Extension(orchestrator): Extension<Arc<PublishOrchestrator>>,
    Query(query): Query<ActionQuery>,
) -> ActionReply {
    let api_key = match authenticate(&orchestrator, &query).await {
        Ok(api_key) => api_key,
        Err(reply) => return reply,
    };

    match orchestrator.status(&api_key, &query.target()).await {
        Ok(report) => ActionResponse::from_status(&report),
        Err(err) => ActionResponse::failure(&err),
    }
}

#[tracing::instrument(name = "http::deployment::upgrade_deployment", skip_all)]
pub async fn upgrade_deployment(
    Extension(orchestrator): Extension<Arc<PublishOrchestrator>>,
    Query(query): Query<ActionQuery>,
) -> ActionReply {
    let api_key = match authenticate(&orchestrator, &query).await {
        Ok(api_key) => api_key,
        Err(reply) => return reply,
    };

    let request = match query.upgrade_request() {
        Ok(request) => request,
        Err(err) => return ActionResponse::failure(&err.into()),
    };

    match orchestrator.upgrade(&api_key, &request).await {
        Ok(report) => ActionResponse::from_report(&report),
        Err(err) => ActionResponse::failure(&err),
    }
}

#[tracing::instrument(name = "http::deployment::restart_deployment", skip_all)]
pub async fn restart_deployment(
    Extension(orchestrator): Extension<Arc<PublishOrchestrator>>,
    Query(query): Query<ActionQuery>,
) -> ActionReply {
    let api_key = match authenticate(&orchestrator, &query).await {
        Ok(api_key) => api_key,
        Err(reply) => return reply,
    };

    match orchestrator.restart(&api_key, &query.target()).await {
        Ok(report) => ActionResponse::from_report(&report),
        Err(err) => ActionResponse::failure(&err),
    }
}

#[tracing::instrument(name = "http::deployment::scale_deployment", skip_all)]
pub async fn scale_deployment(
    Extension(orchestrator): Extension<Arc<PublishOrchestrator>>,
    Query(query): Query<ActionQuery>,
) -> ActionReply {
    let api_key = match authenticate(&orchestrator, &query).await {
        Ok(api_key) => api_key,
        Err(reply) => return reply,
    };

    let request = match query.scale_request() {
        Ok(request) => request,
        Err(err) => return ActionResponse::failure(&err.into()),
    };

    match orchestrator.scale(&api_key, &request).await {
        Ok(report) => ActionResponse::from_report(&report),
        Err(err) => ActionResponse::failure(&err),
    }
}

#[tracing::instrument(name = "http::deployment::get_latest_deployment_tpl", skip_all)]
pub async fn get_latest_deployment_tpl(
    Extension(orchestrator): Extension<Arc<PublishOrchestrator>>,
    Query(query): Query<ActionQuery>,
) -> ActionReply {
    let api_key = match authenticate(&orchestrator, &query).await {
        Ok(api_key) => api_key,
        Err(reply) => return reply,
    };

    let target = query.target();
    let app = query.app.clone().unwrap_or_default();

    match orchestrator
        .latest_template(&api_key, &target.namespace, &app, &target.deployment)
        .await
    {
        Ok(template) => ActionResponse::from_template(template),
        Err(err) => ActionResponse::failure(&err),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shipyard_core::test::{
        get_api_key_fixture, get_app_fixture, get_deployment_resource_fixture,
        get_namespace_fixture, get_template_fixture,
    };
    use shipyard_core::{ApiKey, ApiKeyType, ClusterGatewayFactory, NewDeploymentTemplate};
    use shipyard_memory_gateway::MemoryGatewayFactory;
    use tower::ServiceExt;

    use crate::acl::ApiKeyAuthorizer;
    use crate::http::{http_router, ACTION_PREFIX};
    use crate::persistence::memory::{
        ApiKeyMemoryPersistence, PublishHistoryMemoryPersistence, PublishStatusMemoryPersistence,
        ResourceMemoryPersistence, TemplateMemoryPersistence,
    };
    use crate::persistence::TemplatePersistence;
    use crate::publish::DEFAULT_PUBLISH_CONCURRENCY;
    use crate::services::{
        PublishHistoryService, PublishStatusService, ResourceService, TemplateService,
    };

    use super::*;

    const TOKEN: &str = "api-key-fixture-token";
    const GLOBAL_TOKEN: &str = "global-api-key-token";

    async fn orchestrator(gateways: Arc<MemoryGatewayFactory>) -> (Arc<PublishOrchestrator>, i64) {
        let resources = ResourceMemoryPersistence::default();
        resources.insert_namespace(get_namespace_fixture()).unwrap();
        resources.insert_app(get_app_fixture()).unwrap();
        resources
            .insert_deployment(get_deployment_resource_fixture())
            .unwrap();

        let api_keys = ApiKeyMemoryPersistence::default();
        api_keys
            .insert(get_api_key_fixture(
                ApiKeyType::Namespace,
                get_namespace_fixture().id,
                &["GET_DEPLOYMENT_STATUS", "UPGRADE_DEPLOYMENT", "GET_LATEST_DEPLOYMENT_TPL"],
            ))
            .unwrap();
        api_keys
            .insert(ApiKey {
                token: GLOBAL_TOKEN.to_owned(),
                ..get_api_key_fixture(ApiKeyType::Global, 0, &["GET_LATEST_DEPLOYMENT_TPL"])
            })
            .unwrap();

        let templates = TemplateMemoryPersistence::default();
        let fixture = get_template_fixture(0, 5, &[("web", "nginx:1.24")]);
        let template = templates
            .create(&NewDeploymentTemplate {
                name: fixture.name,
                template: fixture.template,
                deployment_id: fixture.deployment_id,
                description: fixture.description,
                user: fixture.user,
            })
            .await
            .unwrap();

        let orchestrator = PublishOrchestrator::new(
            Arc::new(TemplateService {
                persistence: Box::new(templates),
            }),
            Arc::new(PublishStatusService {
                persistence: Box::<PublishStatusMemoryPersistence>::default(),
            }),
            Arc::new(PublishHistoryService {
                persistence: Box::<PublishHistoryMemoryPersistence>::default(),
            }),
            Arc::new(ResourceService {
                persistence: Box::new(resources),
            }),
            gateways as Arc<dyn ClusterGatewayFactory>,
            Arc::new(ApiKeyAuthorizer {
                persistence: Box::new(api_keys),
            }),
            DEFAULT_PUBLISH_CONCURRENCY,
        );

        (Arc::new(orchestrator), template.id)
    }

    async fn call(orchestrator: &Arc<PublishOrchestrator>, uri: &str) -> (StatusCode, ActionResponse) {
        let response = http_router(Arc::clone(orchestrator))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (orchestrator, _) = orchestrator(Arc::new(MemoryGatewayFactory::new())).await;

        let response = http_router(orchestrator)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upgrade_then_status() {
        let gateways = Arc::new(MemoryGatewayFactory::new());
        gateways.register("a");
        let (orchestrator, template_id) = orchestrator(Arc::clone(&gateways)).await;

        let (status, body) = call(
            &orchestrator,
            &format!(
                "{ACTION_PREFIX}/upgrade_deployment?apikey={TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a&template_id={template_id}"
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_success());
        assert!(body.operation_id.is_some());
        assert_eq!(body.clusters[0].template_id, Some(template_id));

        let (status, body) = call(
            &orchestrator,
            &format!(
                "{ACTION_PREFIX}/get_deployment_status?apikey={TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a"
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.statuses[0].healthz);
        assert_eq!(body.statuses[0].template_id, Some(template_id));
        assert_eq!(body.statuses[0].pods.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_per_cluster() {
        let gateways = Arc::new(MemoryGatewayFactory::new());
        gateways.register("a");
        let (orchestrator, template_id) = orchestrator(gateways).await;

        let (status, body) = call(
            &orchestrator,
            &format!(
                "{ACTION_PREFIX}/upgrade_deployment?apikey={TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a,unknown&template_id={template_id}"
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, 500);
        assert!(body.clusters[0].success);
        assert!(!body.clusters[1].success);
        assert_eq!(body.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (orchestrator, _) = orchestrator(Arc::new(MemoryGatewayFactory::new())).await;

        let (status, _) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/upgrade_deployment?apikey=wrong&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a&images=web=nginx"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/upgrade_deployment?apikey={TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.errors, vec!["empty images and environments: nothing to upgrade"]);

        // the key carries no SCALE_DEPLOYMENT permission
        let (status, _) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/scale_deployment?apikey={TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture&cluster=a&replicas=2"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_latest_template() {
        let (orchestrator, template_id) = orchestrator(Arc::new(MemoryGatewayFactory::new())).await;

        let (status, body) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/get_latest_deployment_tpl?apikey={GLOBAL_TOKEN}&namespace=namespace-fixture&app=app-fixture&deployment=deployment-fixture"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.template.unwrap().id, template_id);

        let (status, _) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/get_latest_deployment_tpl?apikey={TOKEN}&namespace=namespace-fixture&app=app-fixture&deployment=deployment-fixture"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &orchestrator,
            &format!("{ACTION_PREFIX}/get_latest_deployment_tpl?apikey={GLOBAL_TOKEN}&namespace=namespace-fixture&deployment=deployment-fixture"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, 400);
    }
}

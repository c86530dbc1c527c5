use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

use crate::{
    ApiKey, ApiKeyType, App, DeploymentIdentity, DeploymentResource, DeploymentTemplate,
    Namespace,
};

pub const DEPLOYMENT_FIXTURE_NAME: &str = "deployment-fixture";

pub fn get_namespace_fixture() -> Namespace {
    Namespace {
        id: 1,
        name: "namespace-fixture".to_owned(),
        kube_namespace: "kube-namespace-fixture".to_owned(),
        deleted: false,
    }
}

pub fn get_app_fixture() -> App {
    let namespace = get_namespace_fixture();

    App {
        id: 2,
        name: "app-fixture".to_owned(),
        namespace_id: namespace.id,
        deleted: false,
    }
}

pub fn get_deployment_resource_fixture() -> DeploymentResource {
    let app = get_app_fixture();

    DeploymentResource {
        id: 5,
        name: DEPLOYMENT_FIXTURE_NAME.to_owned(),
        app_id: app.id,
        replicas: BTreeMap::new(),
        deleted: false,
    }
}

pub fn get_identity_fixture() -> DeploymentIdentity {
    DeploymentIdentity {
        deployment: get_deployment_resource_fixture(),
        app: get_app_fixture(),
        namespace: get_namespace_fixture(),
    }
}

/// Every container carries `LOG_LEVEL=info` and `REGION=eu` so environment patches have
/// something to match.
pub fn get_manifest_fixture(name: &str, containers: &[(&str, &str)]) -> Deployment {
    let labels = BTreeMap::from([("app".to_owned(), name.to_owned())]);

    let containers = containers
        .iter()
        .map(|(container_name, image)| Container {
            name: container_name.to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                EnvVar {
                    name: "LOG_LEVEL".to_owned(),
                    value: Some("info".to_owned()),
                    ..Default::default()
                },
                EnvVar {
                    name: "REGION".to_owned(),
                    value: Some("eu".to_owned()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn get_template_fixture(
    id: i64,
    deployment_id: i64,
    containers: &[(&str, &str)],
) -> DeploymentTemplate {
    let manifest = get_manifest_fixture(DEPLOYMENT_FIXTURE_NAME, containers);
    let now = Utc::now();

    DeploymentTemplate {
        id,
        name: DEPLOYMENT_FIXTURE_NAME.to_owned(),
        template: serde_json::to_string(&manifest).unwrap_or_default(),
        deployment_id,
        description: "template fixture".to_owned(),
        user: "fixture".to_owned(),
        create_time: now,
        update_time: now,
        deleted: false,
    }
}

pub fn get_api_key_fixture(key_type: ApiKeyType, resource_id: i64, actions: &[&str]) -> ApiKey {
    ApiKey {
        id: 1,
        name: "api-key-fixture".to_owned(),
        token: "api-key-fixture-token".to_owned(),
        key_type,
        resource_id,
        permissions: actions
            .iter()
            .map(|action| format!("OPENAPI_{action}"))
            .collect(),
        expire_in: 0,
        create_time: Utc::now(),
        deleted: false,
    }
}

// Helpers for the Kubernetes Deployment manifests stored inside templates.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;

use crate::{DeploymentTemplate, PublishError};

pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

pub fn parse_template(template: &DeploymentTemplate) -> Result<Deployment, PublishError> {
    serde_json::from_str(&template.template).map_err(|err| PublishError::InvalidTemplate {
        template_id: template.id,
        reason: err.to_string(),
    })
}

pub fn serialize_manifest(deployment: &Deployment) -> anyhow::Result<String> {
    Ok(serde_json::to_string(deployment)?)
}

pub fn name_of(deployment: &Deployment) -> String {
    deployment.metadata.name.clone().unwrap_or_default()
}

/// Applies the per-cluster parts of a publish: target namespace and, when the deployment
/// records one for this cluster, the desired replica count.
pub fn apply_cluster_overrides(
    deployment: &mut Deployment,
    kube_namespace: &str,
    replicas: Option<i32>,
) {
    deployment.metadata.namespace = Some(kube_namespace.to_string());

    if let Some(replicas) = replicas {
        deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }
}

/// Bumps the pod template restart marker so the cluster rolls every pod.
pub fn mark_restarted(deployment: &mut Deployment, at: DateTime<Utc>) {
    let spec = deployment.spec.get_or_insert_with(Default::default);
    let metadata = spec.template.metadata.get_or_insert_with(Default::default);

    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            RESTARTED_AT_ANNOTATION.to_string(),
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
}

pub fn set_replicas(deployment: &mut Deployment, replicas: i32) {
    deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
}

/// Label selector of the deployment's pods as `key=value,...`, empty when it has no match labels.
pub fn label_selector(deployment: &Deployment) -> String {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.as_ref())
        .map(|labels| {
            labels
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{get_manifest_fixture, get_template_fixture};

    #[test]
    fn test_parse_template() {
        let template = get_template_fixture(10, 5, &[("web", "nginx:1.25")]);
        let deployment = parse_template(&template).unwrap();

        assert_eq!(name_of(&deployment), "deployment-fixture");

        let mut broken = template.clone();
        broken.template = "{not json".to_owned();

        assert!(matches!(
            parse_template(&broken),
            Err(PublishError::InvalidTemplate {
                template_id: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_cluster_overrides() {
        let mut deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);

        apply_cluster_overrides(&mut deployment, "team-a", None);
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(1));

        apply_cluster_overrides(&mut deployment, "team-a", Some(4));
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(4));
    }

    #[test]
    fn test_mark_restarted() {
        let mut deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        mark_restarted(&mut deployment, at);

        let annotations = deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();

        assert_eq!(
            annotations.get(RESTARTED_AT_ANNOTATION).map(String::as_str),
            Some("2026-01-02T03:04:05Z")
        );
    }

    #[test]
    fn test_label_selector() {
        let deployment = get_manifest_fixture("web", &[("web", "nginx:1.25")]);
        assert_eq!(label_selector(&deployment), "app=web");

        assert_eq!(label_selector(&Deployment::default()), "");
    }
}

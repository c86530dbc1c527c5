//! Groups target clusters by the template they currently run and patches each group's
//! manifest once.

use k8s_openapi::api::apps::v1::Deployment;
use std::collections::{BTreeMap, BTreeSet};

use shipyard_core::{manifest, DeploymentTemplate, PublishError};

/// Requested container images keyed by container name, and environment values keyed by
/// variable name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Patch {
    pub images: BTreeMap<String, String>,
    pub environments: BTreeMap<String, String>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.environments.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedGroup {
    /// Template every cluster of the group runs today.
    pub source: DeploymentTemplate,
    pub clusters: Vec<String>,
    pub manifest: Deployment,
    /// False when the patch left the manifest as it was, so no new template is needed.
    pub changed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub groups: Vec<PlannedGroup>,
    pub failures: Vec<(String, PublishError)>,
}

/// Overwrites matching environment variables in every container, then swaps images by exact
/// container name. Variables that no container defines are ignored.
///
/// Fails without touching `deployment` when an image names a container it does not have.
pub fn patch_manifest(deployment: &mut Deployment, patch: &Patch) -> Result<(), PublishError> {
    let containers = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .unwrap_or_default();

    let present: BTreeSet<&str> = containers.iter().map(|c| c.name.as_str()).collect();
    let missing: Vec<String> = patch
        .images
        .keys()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(PublishError::UnknownContainer {
            containers: missing,
        });
    }

    let pod = match deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    {
        Some(pod) => pod,
        None => return Ok(()),
    };

    for container in pod.containers.iter_mut() {
        for env in container.env.iter_mut().flatten() {
            if let Some(value) = patch.environments.get(&env.name) {
                env.value = Some(value.clone());
                env.value_from = None;
            }
        }

        if let Some(image) = patch.images.get(&container.name) {
            container.image = Some(image.clone());
        }
    }

    Ok(())
}

/// Plans a patch over `bases`, the template each target cluster starts from.
///
/// A failing group fails every cluster in it and leaves other groups alone.
pub fn plan(bases: Vec<(String, DeploymentTemplate)>, patch: &Patch) -> Plan {
    let mut grouped: BTreeMap<i64, (DeploymentTemplate, Vec<String>)> = BTreeMap::new();

    for (cluster, template) in bases {
        grouped
            .entry(template.id)
            .or_insert_with(|| (template, Vec::new()))
            .1
            .push(cluster);
    }

    let mut plan = Plan::default();

    for (_, (source, clusters)) in grouped {
        let planned = manifest::parse_template(&source).and_then(|original| {
            let mut patched = original.clone();
            patch_manifest(&mut patched, patch)?;
            let changed = patched != original;

            Ok((patched, changed))
        });

        match planned {
            Ok((manifest, changed)) => plan.groups.push(PlannedGroup {
                source,
                clusters,
                manifest,
                changed,
            }),
            Err(err) => {
                tracing::warn!("template {} cannot be patched: {err}", source.id);

                plan.failures
                    .extend(clusters.into_iter().map(|cluster| (cluster, err.clone())));
            }
        }
    }

    plan
}

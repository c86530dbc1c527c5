use serde::Deserialize;
use std::collections::BTreeMap;

use shipyard_core::ValidationError;

use crate::publish::{DeploymentTarget, Patch, ScaleRequest, UpgradeRequest};

/// Query string shared by every gateway action. Lists are flattened into comma separated
/// `key=value` strings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionQuery {
    pub apikey: Option<String>,
    pub namespace: Option<String>,
    pub app: Option<String>,
    pub deployment: Option<String>,
    pub cluster: Option<String>,
    pub images: Option<String>,
    pub environments: Option<String>,
    pub template_id: Option<String>,
    pub publish: Option<String>,
    pub replicas: Option<String>,
    pub description: Option<String>,
}

/// Parses `a=1,b=2`. Entries with an empty key or value are dropped, later keys win.
pub fn parse_pairs(value: Option<&str>) -> BTreeMap<String, String> {
    value
        .unwrap_or_default()
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn parse_clusters(value: Option<&str>) -> Vec<String> {
    let mut clusters: Vec<String> = Vec::new();

    for cluster in value.unwrap_or_default().split(',').map(str::trim) {
        if !cluster.is_empty() && !clusters.iter().any(|known| known == cluster) {
            clusters.push(cluster.to_string());
        }
    }

    clusters
}

fn parse_template_id(value: Option<&str>) -> Result<Option<i64>, ValidationError> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(value) => value,
    };

    match value.parse::<i64>() {
        // 0 is what clients send when they have no template in mind
        Ok(0) => Ok(None),
        Ok(template_id) if template_id > 0 => Ok(Some(template_id)),
        _ => Err(ValidationError::InvalidParameter {
            name: "template_id",
            reason: format!("{value} is not a template id"),
        }),
    }
}

fn parse_publish(value: Option<&str>) -> Result<bool, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("true") || value == "1" => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") || value == "0" => Ok(false),
        Some(value) => Err(ValidationError::InvalidParameter {
            name: "publish",
            reason: format!("{value} is not a boolean"),
        }),
    }
}

fn parse_replicas(value: Option<&str>) -> Result<i64, ValidationError> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::MissingParameter("replicas"))?;

    value
        .parse()
        .map_err(|_| ValidationError::InvalidParameter {
            name: "replicas",
            reason: format!("{value} is not a number"),
        })
}

impl ActionQuery {
    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            namespace: self.namespace.clone().unwrap_or_default().trim().to_string(),
            deployment: self.deployment.clone().unwrap_or_default().trim().to_string(),
            clusters: parse_clusters(self.cluster.as_deref()),
        }
    }

    pub fn upgrade_request(&self) -> Result<UpgradeRequest, ValidationError> {
        Ok(UpgradeRequest {
            target: self.target(),
            patch: Patch {
                images: parse_pairs(self.images.as_deref()),
                environments: parse_pairs(self.environments.as_deref()),
            },
            template_id: parse_template_id(self.template_id.as_deref())?,
            publish: parse_publish(self.publish.as_deref())?,
            description: self.description.clone().unwrap_or_default(),
        })
    }

    pub fn scale_request(&self) -> Result<ScaleRequest, ValidationError> {
        Ok(ScaleRequest {
            target: self.target(),
            replicas: parse_replicas(self.replicas.as_deref())?,
        })
    }
}

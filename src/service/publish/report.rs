use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use shipyard_core::PublishError;

const POD_RUNNING: &str = "Running";

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterOutcome {
    pub cluster: String,
    /// Template the cluster was published with, or staged for when nothing was published.
    pub template_id: Option<i64>,
    pub error: Option<PublishError>,
}

impl ClusterOutcome {
    pub fn succeeded(cluster: &str, template_id: i64) -> Self {
        Self {
            cluster: cluster.to_string(),
            template_id: Some(template_id),
            error: None,
        }
    }

    pub fn failed(cluster: &str, template_id: Option<i64>, error: PublishError) -> Self {
        Self {
            cluster: cluster.to_string(),
            template_id,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of an Upgrade, Restart or Scale: one outcome per requested cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationReport {
    pub operation_id: String,
    pub clusters: Vec<ClusterOutcome>,
    /// Templates created or selected by the operation.
    pub templates: Vec<i64>,
}

impl OperationReport {
    pub fn is_success(&self) -> bool {
        self.clusters.iter().all(ClusterOutcome::is_success)
    }

    pub fn outcome(&self, cluster: &str) -> Option<&ClusterOutcome> {
        self.clusters.iter().find(|outcome| outcome.cluster == cluster)
    }

    /// One `cluster: error` line per failed cluster.
    pub fn errors(&self) -> Vec<String> {
        self.clusters
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error
                    .as_ref()
                    .map(|err| format!("{}: {err}", outcome.cluster))
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReplicaCounts {
    pub desired: i32,
    pub current: i32,
    pub ready: i32,
    pub available: i32,
    pub updated: i32,
    pub unavailable: i32,
}

impl ReplicaCounts {
    /// Every desired replica is current, updated, ready and available, and none is unavailable.
    pub fn is_rolled_out(&self) -> bool {
        self.current == self.desired
            && self.updated == self.desired
            && self.ready == self.desired
            && self.available == self.desired
            && self.unavailable == 0
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContainerRestarts {
    pub name: String,
    pub restart_count: i32,
}

/// One pod of a deployment as the cluster reports it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub state: String,
    pub pod_ip: String,
    pub node_name: String,
    pub start_time: Option<String>,
    pub containers: Vec<ContainerRestarts>,
}

impl PodSummary {
    pub fn is_serving(&self) -> bool {
        self.state == POD_RUNNING && !self.pod_ip.is_empty()
    }
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.clone().unwrap_or_default();

        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            state: status.phase.unwrap_or_default(),
            pod_ip: status.pod_ip.unwrap_or_default(),
            node_name: pod
                .spec
                .as_ref()
                .and_then(|spec| spec.node_name.clone())
                .unwrap_or_default(),
            start_time: status
                .start_time
                .and_then(|time| serde_json::to_value(time).ok())
                .and_then(|time| time.as_str().map(str::to_owned)),
            containers: status
                .container_statuses
                .unwrap_or_default()
                .into_iter()
                .map(|container| ContainerRestarts {
                    name: container.name,
                    restart_count: container.restart_count,
                })
                .collect(),
        }
    }
}

/// A cluster is healthy once the rollout is complete and every pod is running with an address.
pub fn is_healthy(replicas: &ReplicaCounts, pods: &[PodSummary]) -> bool {
    replicas.is_rolled_out() && pods.iter().all(PodSummary::is_serving)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterStatus {
    pub cluster: String,
    pub template_id: Option<i64>,
    pub replicas: Option<ReplicaCounts>,
    pub pods: Vec<PodSummary>,
    pub healthz: bool,
    pub error: Option<PublishError>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    pub clusters: Vec<ClusterStatus>,
}

impl StatusReport {
    pub fn is_success(&self) -> bool {
        self.clusters.iter().all(|status| status.error.is_none())
    }

    pub fn errors(&self) -> Vec<String> {
        self.clusters
            .iter()
            .filter_map(|status| {
                status
                    .error
                    .as_ref()
                    .map(|err| format!("{}: {err}", status.cluster))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_pod(name: &str) -> PodSummary {
        PodSummary {
            name: name.to_owned(),
            state: POD_RUNNING.to_owned(),
            pod_ip: "10.0.0.1".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_health_requires_full_rollout() {
        let counts = ReplicaCounts {
            desired: 3,
            current: 3,
            ready: 3,
            available: 3,
            updated: 3,
            unavailable: 0,
        };
        let pods = vec![running_pod("web-0"), running_pod("web-1"), running_pod("web-2")];
        assert!(is_healthy(&counts, &pods));

        assert!(!is_healthy(
            &ReplicaCounts {
                updated: 2,
                ..counts
            },
            &pods
        ));

        assert!(!is_healthy(
            &ReplicaCounts {
                current: 4,
                ..counts
            },
            &pods
        ));

        assert!(!is_healthy(
            &ReplicaCounts {
                unavailable: 1,
                ..counts
            },
            &pods
        ));
    }

    #[test]
    fn test_health_requires_serving_pods() {
        let counts = ReplicaCounts {
            desired: 2,
            current: 2,
            ready: 2,
            available: 2,
            updated: 2,
            unavailable: 0,
        };

        let pending = PodSummary {
            state: "Pending".to_owned(),
            ..running_pod("web-1")
        };
        assert!(!is_healthy(&counts, &[running_pod("web-0"), pending]));

        let unaddressed = PodSummary {
            pod_ip: String::new(),
            ..running_pod("web-1")
        };
        assert!(!is_healthy(&counts, &[running_pod("web-0"), unaddressed]));
    }

    #[test]
    fn test_pod_summary_from_pod() {
        use k8s_openapi::api::core::v1::{ContainerStatus, PodSpec, PodStatus};
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_owned()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-a".to_owned()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_owned()),
                pod_ip: Some("10.1.2.3".to_owned()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "web".to_owned(),
                    restart_count: 4,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let summary = PodSummary::from(&pod);
        assert_eq!(summary.node_name, "node-a");
        assert_eq!(summary.pod_ip, "10.1.2.3");
        assert_eq!(summary.start_time, None);
        assert_eq!(
            summary.containers,
            vec![ContainerRestarts {
                name: "web".to_owned(),
                restart_count: 4,
            }]
        );
        assert!(summary.is_serving());
    }

    #[test]
    fn test_errors_name_their_cluster() {
        let report = OperationReport {
            operation_id: "op".to_owned(),
            clusters: vec![
                ClusterOutcome::succeeded("a", 1),
                ClusterOutcome::failed(
                    "b",
                    None,
                    PublishError::NotPublished {
                        resource_id: 5,
                        cluster: "b".to_owned(),
                    },
                ),
            ],
            templates: vec![1],
        };

        assert!(!report.is_success());
        assert_eq!(
            report.errors(),
            vec!["b: deployment 5 has never been published to cluster b"]
        );
    }
}

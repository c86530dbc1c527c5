use thiserror::Error;

/// Failure reported by a cluster's live API, reduced to the handful of cases callers act on.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GatewayError {
    #[error("cluster {cluster}: not found: {message}")]
    NotFound { cluster: String, message: String },

    #[error("cluster {cluster}: conflict: {message}")]
    Conflict { cluster: String, message: String },

    #[error("cluster {cluster}: unauthorized: {message}")]
    Unauthorized { cluster: String, message: String },

    #[error("cluster {cluster}: transient failure: {message}")]
    Transient { cluster: String, message: String },
}

impl GatewayError {
    /// Classifies an HTTP status code returned by a cluster API server.
    pub fn from_status(cluster: &str, code: u16, message: impl Into<String>) -> Self {
        let cluster = cluster.to_string();
        let message = message.into();

        match code {
            404 | 410 => GatewayError::NotFound { cluster, message },
            409 => GatewayError::Conflict { cluster, message },
            401 | 403 => GatewayError::Unauthorized { cluster, message },
            _ => GatewayError::Transient { cluster, message },
        }
    }

    pub fn cluster(&self) -> &str {
        match self {
            GatewayError::NotFound { cluster, .. }
            | GatewayError::Conflict { cluster, .. }
            | GatewayError::Unauthorized { cluster, .. }
            | GatewayError::Transient { cluster, .. } => cluster,
        }
    }

    /// Whether re-invoking the same operation may succeed without operator changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Conflict { .. } | GatewayError::Transient { .. }
        )
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("invalid {name} parameter: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid replicas parameter: {replicas} not in range (0,{max}]")]
    InvalidRange { replicas: i64, max: i32 },

    #[error("empty images and environments: nothing to upgrade")]
    EmptyPatch,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("deployment {resource_id} has never been published to cluster {cluster}")]
    NotPublished { resource_id: i64, cluster: String },

    #[error("deployment template has no container named: {}", .containers.join(","))]
    UnknownContainer { containers: Vec<String> },

    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("publish status ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("template {template_id} is not a valid deployment manifest: {reason}")]
    InvalidTemplate { template_id: i64, reason: String },

    #[error("store failure: {0}")]
    Store(String),

    #[error("cancelled before reaching cluster {0}")]
    Cancelled(String),
}

impl PublishError {
    /// Converts a persistence failure, keeping ledger conflicts distinguishable.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<PublishError>() {
            Ok(publish_error) => publish_error,
            Err(err) => PublishError::Store(format!("{err:#}")),
        }
    }

    /// Errors that reject the whole batch before any cluster is touched.
    pub fn is_batch_level(&self) -> bool {
        matches!(
            self,
            PublishError::Validation(_) | PublishError::Authorization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_classification() {
        assert!(matches!(
            GatewayError::from_status("a", 404, "gone"),
            GatewayError::NotFound { .. }
        ));
        assert!(matches!(
            GatewayError::from_status("a", 409, "stale"),
            GatewayError::Conflict { .. }
        ));
        assert!(matches!(
            GatewayError::from_status("a", 403, "rbac"),
            GatewayError::Unauthorized { .. }
        ));
        assert!(matches!(
            GatewayError::from_status("a", 503, "unavailable"),
            GatewayError::Transient { .. }
        ));

        let transient = GatewayError::from_status("a", 429, "slow down");
        assert!(transient.is_retryable());
        assert_eq!(transient.cluster(), "a");

        assert!(!GatewayError::from_status("a", 401, "who").is_retryable());
    }

    #[test]
    fn test_unknown_container_lists_names() {
        let err = PublishError::UnknownContainer {
            containers: vec!["sidecar".to_owned(), "worker".to_owned()],
        };

        assert_eq!(
            err.to_string(),
            "deployment template has no container named: sidecar,worker"
        );
    }

    #[test]
    fn test_from_store_keeps_ledger_conflicts() {
        let err = anyhow::Error::new(PublishError::LedgerConflict("two rows".to_owned()));
        assert!(matches!(
            PublishError::from_store(err),
            PublishError::LedgerConflict(_)
        ));

        let err = anyhow::anyhow!("connection reset");
        assert!(matches!(
            PublishError::from_store(err),
            PublishError::Store(_)
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How to reach one named cluster. With no kubeconfig the in-cluster or default
/// configuration is inferred.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterRegistration {
    pub name: String,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterRegistry {
    #[serde(default)]
    pub clusters: Vec<ClusterRegistration>,
}

impl ClusterRegistry {
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|err| {
            anyhow::anyhow!("failed to read cluster registry {}: {err}", path.display())
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let registry: ClusterRegistry = serde_json::from_str(contents)?;

        let mut names: Vec<&str> = registry.clusters.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        if let Some(window) = names.windows(2).find(|window| window[0] == window[1]) {
            return Err(anyhow::anyhow!(
                "cluster {} is registered more than once",
                window[0]
            ));
        }

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ClusterRegistration> {
        self.clusters.iter().find(|cluster| cluster.name == name)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_load_registry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"clusters":[{{"name":"eastus2","kubeconfig":"/etc/kube/eastus2","context":"admin"}},{{"name":"local"}}]}}"#
        )
        .unwrap();

        let registry = ClusterRegistry::load(file.path()).await.unwrap();

        assert_eq!(registry.clusters.len(), 2);

        let eastus2 = registry.get("eastus2").unwrap();
        assert_eq!(eastus2.context.as_deref(), Some("admin"));
        assert_eq!(
            eastus2.kubeconfig.as_deref(),
            Some(Path::new("/etc/kube/eastus2"))
        );

        let local = registry.get("local").unwrap();
        assert!(local.kubeconfig.is_none());

        assert!(registry.get("westus").is_none());
    }

    #[test]
    fn test_duplicate_cluster_rejected() {
        let err = ClusterRegistry::parse(r#"{"clusters":[{"name":"a"},{"name":"a"}]}"#)
            .unwrap_err();

        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(ClusterRegistry::load("/nonexistent/clusters.json")
            .await
            .is_err());
    }
}

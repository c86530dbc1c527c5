use anyhow::{anyhow, Context};

use shipyard::http::{ActionResponse, ACTION_PREFIX};

/// Calls the gateway actions of a shipyard API server.
pub struct GatewayClient {
    endpoint: String,
    apikey: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(endpoint: &str, apikey: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            apikey: apikey.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn health(&self) -> anyhow::Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} answered {}", self.endpoint, response.status()));
        }

        Ok(())
    }

    /// Partial failures come back as a parsed response, not an error, so callers can print
    /// every cluster's outcome.
    pub async fn action(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> anyhow::Result<ActionResponse> {
        let mut query: Vec<(&str, &str)> = vec![("apikey", self.apikey.as_str())];
        query.extend(params.iter().map(|(key, value)| (*key, value.as_str())));

        let response = self
            .http
            .get(format!("{}{ACTION_PREFIX}/{action}", self.endpoint))
            .query(&query)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!("{action} answered {status}: {body}");

        serde_json::from_str(&body)
            .with_context(|| format!("unexpected {status} response from {action}: {body}"))
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Thin wrapper over the publish endpoint, acting as a backend service would.
pub struct Publisher {
    client: reqwest::Client,
    base_url: String,
    service_token: String,
    service_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishOutcome {
    pub success: bool,
    pub channel: String,
    pub delivered: usize,
    pub timestamp: u64,
}

impl Publisher {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        service_token: String,
        service_name: String,
    ) -> Self {
        Self {
            client,
            base_url,
            service_token,
            service_name,
        }
    }

    /// Publish one log record for a workflow channel.
    pub async fn publish_log(
        &self,
        workspace_id: &str,
        workflow_id: Option<&str>,
        log_data: Value,
    ) -> Result<PublishOutcome> {
        let mut body = json!({
            "service": self.service_name,
            "workspace_id": workspace_id,
            "logData": log_data,
        });
        if let Some(workflow_id) = workflow_id {
            body["workflow_id"] = json!(workflow_id);
        }

        let response = self
            .client
            .post(format!("{}/api/logs/publish", self.base_url))
            .header("X-Service-Token", &self.service_token)
            .json(&body)
            .send()
            .await
            .context("publish request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("publish rejected with {status}: {text}");
        }

        response
            .json::<PublishOutcome>()
            .await
            .context("publish response was not the expected JSON shape")
    }

    /// Check broker health.
    pub async fn health_check(&self) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("health request failed")?;
        response
            .json::<Value>()
            .await
            .context("health response was not JSON")
    }
}

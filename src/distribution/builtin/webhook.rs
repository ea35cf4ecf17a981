//! Webhook distributor. POSTs approved submissions as JSON.
//!
//! Per-feed config: `{"url": "https://..."}`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::distribution::plugin::Distributor;
use crate::error::PluginError;
use crate::pipeline::types::Submission;

pub struct WebhookDistributor {
    client: reqwest::Client,
    endpoints: RwLock<HashMap<String, String>>,
}

impl WebhookDistributor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    fn failure(&self, reason: impl Into<String>) -> PluginError {
        PluginError::DistributeFailed {
            name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for WebhookDistributor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Distributor for WebhookDistributor {
    fn name(&self) -> &str {
        "webhook-distributor"
    }

    async fn initialize(&self, feed_id: &str, config: &serde_json::Value) -> Result<(), PluginError> {
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| PluginError::InitFailed {
                name: self.name().to_string(),
                reason: format!("feed {feed_id}: `url` must be an http(s) URL"),
            })?;
        self.endpoints
            .write()
            .await
            .insert(feed_id.to_string(), url.to_string());
        Ok(())
    }

    async fn distribute(&self, feed_id: &str, submission: &Submission) -> Result<(), PluginError> {
        let url = self
            .endpoints
            .read()
            .await
            .get(feed_id)
            .cloned()
            .ok_or_else(|| self.failure(format!("feed {feed_id} is not initialized")))?;

        let body = serde_json::json!({
            "feed_id": feed_id,
            "submission": submission,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(self.failure(format!("webhook returned {}", resp.status())));
        }
        debug!(feed_id, submission_id = %submission.id, "Webhook delivered");
        Ok(())
    }
}

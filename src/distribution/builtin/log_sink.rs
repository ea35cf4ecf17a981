//! Distributor that only emits a tracing event.

use async_trait::async_trait;
use tracing::info;

use crate::distribution::plugin::Distributor;
use crate::error::PluginError;
use crate::pipeline::types::Submission;

pub struct LogDistributor;

#[async_trait]
impl Distributor for LogDistributor {
    fn name(&self) -> &str {
        "log-distributor"
    }

    async fn initialize(&self, feed_id: &str, _config: &serde_json::Value) -> Result<(), PluginError> {
        info!(feed_id, "Log distributor ready");
        Ok(())
    }

    async fn distribute(&self, feed_id: &str, submission: &Submission) -> Result<(), PluginError> {
        info!(
            feed_id,
            submission_id = %submission.id,
            author = %submission.author_handle,
            content = %submission.content,
            "Distributed submission"
        );
        Ok(())
    }
}

//! Distribution pipeline — transform then fan out an approved submission
//! to every distribution target configured for a feed.
//!
//! Failure isolation:
//! - transform failure → log, distribute the original content
//! - one target failing → log, the other targets still run
//! - nothing here returns an error to the caller

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, PluginRef};
use crate::distribution::registry::PluginRegistry;
use crate::error::PluginError;
use crate::feed::ItemId;
use crate::pipeline::types::Submission;
use crate::store::Database;

/// A target that did not receive the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionFailure {
    pub plugin: String,
    pub error: String,
}

/// Outcome of one `process_approved` call.
#[derive(Debug, Clone, Default)]
pub struct DistributionReport {
    pub feed_id: String,
    pub submission_id: Option<ItemId>,
    /// Whether a configured transform failed and original content was used.
    pub transform_failed: bool,
    /// Targets that accepted the submission.
    pub delivered: Vec<String>,
    pub failures: Vec<DistributionFailure>,
}

impl DistributionReport {
    fn skipped(feed_id: &str, submission_id: ItemId) -> Self {
        Self {
            feed_id: feed_id.to_string(),
            submission_id: Some(submission_id),
            ..Self::default()
        }
    }

    /// Number of targets invoked.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }
}

/// Runs feed stream outputs against loaded plugins.
pub struct DistributionService {
    config: Arc<AppConfig>,
    registry: Arc<PluginRegistry>,
    db: Arc<dyn Database>,
    /// (feed, plugin) pairs whose distributor has been initialized.
    initialized: Mutex<HashSet<(String, String)>>,
    /// Serializes transformer initialize + transform pairs.
    transform_guard: Mutex<()>,
}

impl DistributionService {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<PluginRegistry>,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            config,
            registry,
            db,
            initialized: Mutex::new(HashSet::new()),
            transform_guard: Mutex::new(()),
        }
    }

    /// Transform and distribute an approved submission for one feed.
    pub async fn process_approved(&self, feed_id: &str, submission: &Submission) -> DistributionReport {
        let mut report = DistributionReport::skipped(feed_id, submission.id);

        let Some(feed) = self.config.feed(feed_id) else {
            warn!(feed_id, submission_id = %submission.id, "Distribution skipped: feed not configured");
            return report;
        };
        let Some(stream) = feed.enabled_stream() else {
            debug!(feed_id, "Distribution skipped: stream output disabled");
            return report;
        };
        if stream.distribute.is_empty() {
            error!(feed_id, "Configuration error: stream enabled with no distribution targets");
            return report;
        }

        let mut outgoing = submission.clone();
        if let Some(transform) = &stream.transform {
            match self.transform(&feed.id, transform, submission).await {
                Ok(content) => outgoing.content = content,
                Err(e) => {
                    error!(
                        feed_id,
                        submission_id = %submission.id,
                        plugin = %transform.plugin,
                        error = %e,
                        "Transform failed; distributing original content"
                    );
                    report.transform_failed = true;
                }
            }
        }

        let results = join_all(
            stream
                .distribute
                .iter()
                .map(|target| self.distribute_one(&feed.id, target, &outgoing)),
        )
        .await;

        for (target, result) in stream.distribute.iter().zip(results) {
            match result {
                Ok(()) => report.delivered.push(target.plugin.clone()),
                Err(e) => {
                    error!(
                        feed_id,
                        submission_id = %submission.id,
                        plugin = %target.plugin,
                        error = %e,
                        "Distribution target failed"
                    );
                    report.failures.push(DistributionFailure {
                        plugin: target.plugin.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            feed_id,
            submission_id = %submission.id,
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            "Distribution complete"
        );
        report
    }

    async fn transform(
        &self,
        feed_id: &str,
        target: &PluginRef,
        submission: &Submission,
    ) -> Result<String, PluginError> {
        let transformer = self
            .registry
            .transformer(&target.plugin)
            .ok_or_else(|| PluginError::NotFound {
                name: target.plugin.clone(),
            })?;
        let (config, stored) = self.plugin_config(feed_id, target).await?;

        let _guard = self.transform_guard.lock().await;
        transformer.initialize(&config).await?;
        if !stored {
            self.persist_plugin_config(feed_id, target).await?;
        }
        transformer.transform(submission).await
    }

    async fn distribute_one(
        &self,
        feed_id: &str,
        target: &PluginRef,
        submission: &Submission,
    ) -> Result<(), PluginError> {
        let distributor = self
            .registry
            .distributor(&target.plugin)
            .ok_or_else(|| PluginError::NotFound {
                name: target.plugin.clone(),
            })?;

        let key = (feed_id.to_string(), target.plugin.clone());
        let ready = self.initialized.lock().await.contains(&key);
        if !ready {
            let (config, stored) = self.plugin_config(feed_id, target).await?;
            distributor.initialize(feed_id, &config).await?;
            if !stored {
                self.persist_plugin_config(feed_id, target).await?;
            }
            self.initialized.lock().await.insert(key);
        }

        distributor.distribute(feed_id, submission).await
    }

    /// Settings for a (feed, plugin) pair: the persisted copy if one exists,
    /// otherwise the configured one. The flag tells whether it came from the store.
    async fn plugin_config(
        &self,
        feed_id: &str,
        target: &PluginRef,
    ) -> Result<(serde_json::Value, bool), PluginError> {
        match self.db.get_feed_plugin_config(feed_id, &target.plugin).await? {
            Some(stored) => Ok((stored, true)),
            None => Ok((target.config.clone(), false)),
        }
    }

    /// Freeze the configured settings once an initialize call accepted them.
    async fn persist_plugin_config(
        &self,
        feed_id: &str,
        target: &PluginRef,
    ) -> Result<(), PluginError> {
        self.db
            .save_feed_plugin_config(feed_id, &target.plugin, &target.config)
            .await?;
        Ok(())
    }
}

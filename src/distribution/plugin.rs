//! Plugin capability traits.
//!
//! A plugin plays one of two roles: a [`Transformer`] rewrites submission
//! content before delivery, a [`Distributor`] delivers it to a sink.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PluginKind;
use crate::error::PluginError;
use crate::pipeline::types::Submission;

/// Rewrites a submission's content.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Plugin name for logging.
    fn name(&self) -> &str;

    /// Apply settings before a transform call.
    async fn initialize(&self, config: &serde_json::Value) -> Result<(), PluginError>;

    /// Produce the content to distribute.
    async fn transform(&self, submission: &Submission) -> Result<String, PluginError>;

    /// Release resources at process shutdown.
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Delivers approved submissions to an external sink.
#[async_trait]
pub trait Distributor: Send + Sync {
    /// Plugin name for logging.
    fn name(&self) -> &str;

    /// Prepare per-feed state. Called once per feed.
    async fn initialize(&self, feed_id: &str, config: &serde_json::Value)
    -> Result<(), PluginError>;

    /// Deliver one submission for `feed_id`.
    async fn distribute(&self, feed_id: &str, submission: &Submission) -> Result<(), PluginError>;

    /// Release resources at process shutdown.
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A loaded plugin instance.
#[derive(Clone)]
pub enum Plugin {
    Transformer(Arc<dyn Transformer>),
    Distributor(Arc<dyn Distributor>),
}

impl Plugin {
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Transformer(_) => PluginKind::Transformer,
            Self::Distributor(_) => PluginKind::Distributor,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Transformer(t) => t.name(),
            Self::Distributor(d) => d.name(),
        }
    }

    pub async fn shutdown(&self) -> Result<(), PluginError> {
        match self {
            Self::Transformer(t) => t.shutdown().await,
            Self::Distributor(d) => d.shutdown().await,
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

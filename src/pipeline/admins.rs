//! Admin lookup: approver handles from the feed config resolved to
//! platform user ids once at startup. Read-only afterwards.

use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::feed::FeedClient;

#[derive(Debug, Clone, Default)]
pub struct AdminCache {
    /// user id → handle (lowercase).
    handles: HashMap<String, String>,
}

impl AdminCache {
    /// Resolve every approver handle across all feeds.
    ///
    /// Handles that fail to resolve are logged and left out.
    pub async fn build(client: &dyn FeedClient, feeds: &[FeedConfig]) -> Self {
        let approvers: BTreeSet<String> = feeds
            .iter()
            .flat_map(|f| f.moderation.approvers.iter())
            .map(|h| h.trim_start_matches('@').to_lowercase())
            .collect();

        let mut handles = HashMap::new();
        for handle in approvers {
            match client.resolve_user_id(&handle).await {
                Ok(Some(id)) => {
                    handles.insert(id, handle);
                }
                Ok(None) => warn!(handle = %handle, "Approver handle not found"),
                Err(e) => warn!(handle = %handle, error = %e, "Failed to resolve approver handle"),
            }
        }

        info!(admins = handles.len(), "Admin cache built");
        Self { handles }
    }

    /// Build from known (user id, handle) pairs.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: AsRef<str>,
    {
        Self {
            handles: pairs
                .into_iter()
                .map(|(id, handle)| (id.into(), handle.as_ref().to_lowercase()))
                .collect(),
        }
    }

    /// Admin handle for a platform user id.
    pub fn handle_for(&self, user_id: &str) -> Option<&str> {
        self.handles.get(user_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

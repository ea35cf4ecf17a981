//! Feed client trait. Pure I/O against the social platform.

use async_trait::async_trait;

use crate::error::FeedError;
use crate::feed::types::{Item, ItemId};

/// Access to the social platform the bot account lives on.
///
/// Implementations handle transport and session state only. Ingestion,
/// classification, and moderation logic live in the pipeline.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Establish a session.
    async fn login(&self) -> Result<(), FeedError>;

    /// Tear down the session.
    async fn logout(&self) -> Result<(), FeedError>;

    /// Fetch one page of items matching `query`, newest first.
    ///
    /// `older_than` is the oldest id of the previous page; only items
    /// strictly older than it are returned.
    async fn fetch_mentions_page(
        &self,
        query: &str,
        page_size: usize,
        older_than: Option<ItemId>,
    ) -> Result<Vec<Item>, FeedError>;

    /// Fetch a single item. `Ok(None)` when it does not exist.
    async fn fetch_item(&self, id: ItemId) -> Result<Option<Item>, FeedError>;

    /// Resolve a handle to the platform's user id.
    async fn resolve_user_id(&self, handle: &str) -> Result<Option<String>, FeedError>;

    /// Reply to `target`. Returns the new item's id when the platform reports it.
    async fn send_reply(&self, target: ItemId, text: &str) -> Result<Option<ItemId>, FeedError>;
}

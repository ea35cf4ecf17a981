//! Mention ingestor — pages the feed back to the cursor and returns the
//! unseen items oldest-first.
//!
//! Paging stops at the first of:
//! 1. an item at or below the cursor
//! 2. a short page (fewer items than requested)
//! 3. the page cap
//! 4. a transport error (logged; whatever was collected is kept)
//!
//! The ingestor never persists the cursor. The caller decides when to.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::feed::{FeedClient, Item, ItemId};

/// Result of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    /// Items strictly newer than the input cursor, ascending by id.
    pub items: Vec<Item>,
    /// Highest id seen, or the input cursor when nothing new arrived.
    pub cursor: Option<ItemId>,
}

/// Drives a [`FeedClient`] to collect new mentions.
pub struct MentionIngestor {
    client: Arc<dyn FeedClient>,
    query: String,
    page_size: usize,
    max_pages: usize,
}

impl MentionIngestor {
    pub fn new(client: Arc<dyn FeedClient>, query: impl Into<String>, page_size: usize, max_pages: usize) -> Self {
        Self {
            client,
            query: query.into(),
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Build the mentions query for a bot handle.
    pub fn mentions_query(bot_handle: &str) -> String {
        format!("@{}", bot_handle.trim_start_matches('@'))
    }

    /// Fetch every item newer than `cursor`.
    pub async fn fetch_new_items(&self, cursor: Option<ItemId>) -> IngestBatch {
        let mut collected: BTreeMap<ItemId, Item> = BTreeMap::new();
        let mut older_than: Option<ItemId> = None;

        for page_number in 0..self.max_pages {
            let page = match self
                .client
                .fetch_mentions_page(&self.query, self.page_size, older_than)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        page = page_number,
                        collected = collected.len(),
                        error = %e,
                        "Mention fetch failed; keeping partial batch"
                    );
                    break;
                }
            };

            let fetched = page.len();
            let mut reached_cursor = false;
            let mut oldest: Option<ItemId> = None;

            for item in page {
                oldest = Some(oldest.map_or(item.id, |o| o.min(item.id)));
                if cursor.is_some_and(|c| item.id <= c) {
                    reached_cursor = true;
                    continue;
                }
                collected.entry(item.id).or_insert(item);
            }

            debug!(page = page_number, fetched, reached_cursor, "Mentions page processed");

            if reached_cursor || fetched < self.page_size {
                break;
            }
            match oldest {
                // A page that does not move the token backwards would loop forever.
                Some(o) if older_than.is_none_or(|prev| o < prev) => older_than = Some(o),
                _ => break,
            }
        }

        let new_cursor = collected.keys().next_back().copied().or(cursor);
        let items: Vec<Item> = collected.into_values().collect();

        if !items.is_empty() {
            info!(
                count = items.len(),
                cursor = ?new_cursor.map(|c| c.to_string()),
                "Ingested new mentions"
            );
        }

        IngestBatch {
            items,
            cursor: new_cursor,
        }
    }
}

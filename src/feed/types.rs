//! Raw feed item types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

// ── Item id ─────────────────────────────────────────────────────────

/// Feed item identifier.
///
/// Transmitted as a decimal string but ordered as an unsigned 64-bit
/// integer, so `"10" > "9"` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(u64);

impl ItemId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for ItemId {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FeedError::InvalidItemId(s.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| FeedError::InvalidItemId(s.to_string()))
    }
}

impl TryFrom<String> for ItemId {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0.to_string()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Item ────────────────────────────────────────────────────────────

/// A single post fetched from the feed. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub author_id: String,
    pub author_handle: String,
    pub text: String,
    /// The item this one replies to, if any.
    #[serde(default)]
    pub in_reply_to: Option<ItemId>,
    /// Platform timestamp in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Hashtag labels without the leading `#`.
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Case-insensitive hashtag membership.
    pub fn has_hashtag(&self, tag: &str) -> bool {
        self.hashtags.iter().any(|h| h.eq_ignore_ascii_case(tag))
    }
}

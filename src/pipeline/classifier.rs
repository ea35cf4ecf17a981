//! Item classifier. Pure pattern matching, no I/O.
//!
//! - body contains the submission marker and the item is a reply → Submission
//! - body contains the marker but no reply target → Submission (fails
//!   validation later, in the processor)
//! - exactly one of `#approve` / `#reject` → Moderation
//! - anything else → Ignore
//!
//! The submission check always runs first.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::FeedConfig;
use crate::error::ConfigError;
use crate::feed::Item;
use crate::pipeline::types::{Classification, ModerationAction};

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag pattern is valid"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+").expect("mention pattern is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const APPROVE_LABEL: &str = "approve";
const REJECT_LABEL: &str = "reject";

/// Maps raw items to the action they request.
#[derive(Debug, Clone)]
pub struct Classifier {
    marker: Regex,
}

impl Classifier {
    /// Build a classifier for the given submission marker (e.g. `!submit`).
    pub fn new(marker: &str) -> Result<Self, ConfigError> {
        let marker = Regex::new(&format!("(?i){}", regex::escape(marker.trim()))).map_err(|e| {
            ConfigError::InvalidValue {
                key: "global.submission_marker".into(),
                message: e.to_string(),
            }
        })?;
        Ok(Self { marker })
    }

    /// Classify a single item.
    pub fn classify(&self, item: &Item) -> Classification {
        if self.is_submission(item) {
            return Classification::Submission;
        }
        match moderation_action(item) {
            Some(action) => Classification::Moderation(action),
            None => Classification::Ignore,
        }
    }

    /// Whether the body carries the submission marker.
    pub fn is_submission(&self, item: &Item) -> bool {
        self.marker.is_match(&item.text)
    }

    /// Free text left after removing the marker, hashtags, and mentions.
    pub fn extract_note(&self, text: &str) -> Option<String> {
        let without_marker = self.marker.replace_all(text, " ");
        clean_note(&without_marker)
    }
}

/// The moderation action requested by the item's labels, if exactly one is present.
pub fn moderation_action(item: &Item) -> Option<ModerationAction> {
    let approve = item.has_hashtag(APPROVE_LABEL);
    let reject = item.has_hashtag(REJECT_LABEL);
    match (approve, reject) {
        (true, false) => Some(ModerationAction::Approve),
        (false, true) => Some(ModerationAction::Reject),
        _ => None,
    }
}

/// Moderation note: body text minus hashtags and mentions.
pub fn moderation_note(text: &str) -> Option<String> {
    clean_note(text)
}

/// Configured feed ids tagged on the item, in configuration order.
pub fn matching_feeds(item: &Item, feeds: &[FeedConfig]) -> Vec<String> {
    feeds
        .iter()
        .filter(|feed| item.has_hashtag(&feed.id))
        .map(|feed| feed.id.clone())
        .collect()
}

fn clean_note(text: &str) -> Option<String> {
    let stripped = HASHTAG.replace_all(text, " ");
    let stripped = MENTION.replace_all(&stripped, " ");
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
    let note = collapsed.trim();
    if note.is_empty() {
        None
    } else {
        Some(note.to_string())
    }
}

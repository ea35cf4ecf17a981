//! Shared types for the submission pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::ItemId;

// ── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of a submission. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a status string from the DB; unknown values read as pending.
    pub fn from_db(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Moderation ──────────────────────────────────────────────────────

/// Decision an admin can take on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    /// Status a pending submission moves to under this action.
    pub fn resulting_status(&self) -> SubmissionStatus {
        match self {
            Self::Approve => SubmissionStatus::Approved,
            Self::Reject => SubmissionStatus::Rejected,
        }
    }
}

/// One append-only moderation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moderation {
    /// Handle of the acting admin.
    pub admin_id: String,
    pub action: ModerationAction,
    pub timestamp: DateTime<Utc>,
    pub submission_id: ItemId,
    pub note: Option<String>,
}

// ── Submission ──────────────────────────────────────────────────────

/// A curated item, keyed by the original item's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Id of the original (submitted) item.
    pub id: ItemId,
    pub author_id: String,
    pub author_handle: String,
    pub content: String,
    pub curator_id: String,
    pub curator_handle: String,
    pub curator_note: Option<String>,
    /// Id of the mention that triggered the submission.
    pub curator_item_id: ItemId,
    pub status: SubmissionStatus,
    /// Our reply to the curator. Moderation replies target this id.
    pub acknowledgment_id: Option<ItemId>,
    /// Our reply to the moderator.
    pub moderation_response_id: Option<ItemId>,
    /// When the original item was posted.
    pub created_at: DateTime<Utc>,
    /// When the curator submitted it.
    pub submitted_at: DateTime<Utc>,
    /// Ordered by timestamp.
    pub moderation_history: Vec<Moderation>,
}

// ── Classification ──────────────────────────────────────────────────

/// What an ingested item asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Carries the submission marker. May still fail validation.
    Submission,
    Moderation(ModerationAction),
    Ignore,
}

impl Classification {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Moderation(ModerationAction::Approve) => "approve",
            Self::Moderation(ModerationAction::Reject) => "reject",
            Self::Ignore => "ignore",
        }
    }
}

//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the cursor, submissions with their moderation history and feed
//! associations, per-user daily counters, and per-feed plugin settings.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::feed::ItemId;
use crate::pipeline::types::{Moderation, Submission, SubmissionStatus};

/// Backend-agnostic storage contract.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Cursor ──────────────────────────────────────────────────────

    /// Id of the most recently ingested item, `None` at cold start.
    async fn get_cursor(&self) -> Result<Option<ItemId>, DatabaseError>;

    /// Overwrite the cursor. Also used by operators to rewind.
    async fn set_cursor(&self, cursor: ItemId) -> Result<(), DatabaseError>;

    // ── Feeds ───────────────────────────────────────────────────────

    /// Insert or update a feed row from configuration.
    async fn upsert_feed(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), DatabaseError>;

    // ── Submissions ─────────────────────────────────────────────────

    /// Create a submission, its feed associations, and bump the curator's
    /// daily counter as one transaction. Nothing is written on failure.
    async fn create_submission(
        &self,
        submission: &Submission,
        feed_ids: &[String],
        date_key: &str,
    ) -> Result<(), DatabaseError>;

    /// Get a submission (with moderation history) by original item id.
    async fn get_submission(&self, id: ItemId) -> Result<Option<Submission>, DatabaseError>;

    /// Get the submission whose acknowledgment reply has this id.
    async fn get_submission_by_acknowledgment(
        &self,
        acknowledgment_id: ItemId,
    ) -> Result<Option<Submission>, DatabaseError>;

    /// Record our acknowledgment reply.
    async fn set_acknowledgment_id(
        &self,
        id: ItemId,
        acknowledgment_id: ItemId,
    ) -> Result<(), DatabaseError>;

    /// Set a submission's status and the moderator reply id.
    async fn update_submission_status(
        &self,
        id: ItemId,
        status: SubmissionStatus,
        moderation_response_id: Option<ItemId>,
    ) -> Result<(), DatabaseError>;

    /// All submissions, optionally filtered by status, newest first.
    async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, DatabaseError>;

    /// Submissions associated with a feed, optionally filtered by status.
    async fn list_feed_submissions(
        &self,
        feed_id: &str,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, DatabaseError>;

    // ── Feed associations ───────────────────────────────────────────

    /// Associate a submission with a feed. Returns `false` if the pair existed.
    async fn add_submission_feed(
        &self,
        submission_id: ItemId,
        feed_id: &str,
    ) -> Result<bool, DatabaseError>;

    /// Remove an association. Returns `false` if it did not exist.
    async fn remove_submission_feed(
        &self,
        submission_id: ItemId,
        feed_id: &str,
    ) -> Result<bool, DatabaseError>;

    /// Feed ids a submission is associated with.
    async fn get_submission_feeds(&self, submission_id: ItemId)
    -> Result<Vec<String>, DatabaseError>;

    // ── Moderation ──────────────────────────────────────────────────

    /// Append a moderation record.
    async fn add_moderation(&self, moderation: &Moderation) -> Result<(), DatabaseError>;

    // ── Daily counters ──────────────────────────────────────────────

    /// Submissions created by `user_id` on `date_key` (UTC `YYYY-MM-DD`).
    async fn get_daily_submission_count(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<u32, DatabaseError>;

    /// Increment the counter, resetting it when the date key changed.
    async fn increment_daily_submission_count(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<(), DatabaseError>;

    // ── Plugin settings ─────────────────────────────────────────────

    /// Persisted settings for a (feed, plugin) pair.
    async fn get_feed_plugin_config(
        &self,
        feed_id: &str,
        plugin_id: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Persist settings for a (feed, plugin) pair. Existing settings are kept.
    async fn save_feed_plugin_config(
        &self,
        feed_id: &str,
        plugin_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), DatabaseError>;
}

//! Submission processor — the per-item approval state machine.
//!
//! `pending --approve--> approved`, `pending --reject--> rejected`. Both
//! terminal states are final.
//!
//! Flow per item (oldest first):
//! 1. Drop items from the bot itself or blacklisted handles
//! 2. Classify → submission / moderation / ignore
//! 3. Submission: rate limit → fetch original → match feeds → persist → acknowledge
//! 4. Moderation: resolve admin → resolve submission → record → confirm →
//!    update status → distribute to the feeds this admin approves for
//!
//! Every step is safe to repeat: reprocessing an item that already took
//! effect is a no-op.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::distribution::{DistributionReport, DistributionService};
use crate::error::{ConfigError, SubmissionError};
use crate::feed::{FeedClient, Item, ItemId};
use crate::pipeline::admins::AdminCache;
use crate::pipeline::classifier::{self, Classifier};
use crate::pipeline::types::{
    Classification, Moderation, ModerationAction, Submission, SubmissionStatus,
};
use crate::store::Database;

/// What handling one item did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Not for us, or silently dropped (non-admin, already decided, ...).
    Ignored,
    /// Curator is at the daily limit.
    LimitReached,
    /// Submission attempt without a reply target or feed tag.
    Invalid,
    /// A new submission was created.
    Submitted {
        submission_id: ItemId,
        feeds: Vec<String>,
    },
    /// The original item was already submitted; lists newly added feeds.
    AlreadySubmitted {
        submission_id: ItemId,
        added_feeds: Vec<String>,
    },
    /// A moderation decision took effect.
    Moderated {
        submission_id: ItemId,
        status: SubmissionStatus,
        distributed_to: Vec<String>,
    },
    /// Logged error; no further effect.
    Failed,
}

impl ItemOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::LimitReached => "limit_reached",
            Self::Invalid => "invalid",
            Self::Submitted { .. } => "submitted",
            Self::AlreadySubmitted { .. } => "already_submitted",
            Self::Moderated { .. } => "moderated",
            Self::Failed => "failed",
        }
    }
}

/// Owns submission, moderation, and daily counter writes.
pub struct SubmissionProcessor {
    config: Arc<AppConfig>,
    db: Arc<dyn Database>,
    client: Arc<dyn FeedClient>,
    classifier: Classifier,
    admins: AdminCache,
    distribution: Arc<DistributionService>,
}

impl SubmissionProcessor {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<dyn Database>,
        client: Arc<dyn FeedClient>,
        admins: AdminCache,
        distribution: Arc<DistributionService>,
    ) -> Result<Self, ConfigError> {
        let classifier = Classifier::new(&config.global.submission_marker)?;
        Ok(Self {
            config,
            db,
            client,
            classifier,
            admins,
            distribution,
        })
    }

    /// Process a batch in order. Failures are logged per item and never
    /// stop the batch.
    pub async fn process_batch(&self, items: &[Item]) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.process(item).await);
        }
        outcomes
    }

    /// Process a single item.
    pub async fn process(&self, item: &Item) -> ItemOutcome {
        if self.is_filtered(item) {
            debug!(item_id = %item.id, author = %item.author_handle, "Skipping filtered author");
            return ItemOutcome::Ignored;
        }

        let classification = self.classifier.classify(item);
        debug!(item_id = %item.id, kind = classification.label(), "Classified item");

        let result = match classification {
            Classification::Submission => self.handle_submission(item).await,
            Classification::Moderation(action) => self.handle_moderation(item, action).await,
            Classification::Ignore => Ok(ItemOutcome::Ignored),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(item_id = %item.id, kind = classification.label(), error = %e, "Failed to process item");
                ItemOutcome::Failed
            }
        }
    }

    fn is_filtered(&self, item: &Item) -> bool {
        let handle = item.author_handle.trim_start_matches('@');
        let bot = self.config.global.bot_handle.trim_start_matches('@');
        (!bot.is_empty() && handle.eq_ignore_ascii_case(bot))
            || self
                .config
                .global
                .blacklist
                .iter()
                .any(|b| b.trim_start_matches('@').eq_ignore_ascii_case(handle))
    }

    // ── Submissions ─────────────────────────────────────────────────

    async fn handle_submission(&self, item: &Item) -> Result<ItemOutcome, SubmissionError> {
        let existing = match item.in_reply_to {
            Some(target) => self.db.get_submission(target).await?,
            None => None,
        };

        // Replaying the trigger that created the submission was already counted.
        if let Some(existing) = existing
            .as_ref()
            .filter(|s| s.curator_item_id == item.id)
        {
            return self.handle_resubmission(item, existing.clone()).await;
        }

        let date_key = Utc::now().format("%Y-%m-%d").to_string();
        let limit = self.config.global.max_daily_submissions_per_user;
        let count = self
            .db
            .get_daily_submission_count(&item.author_id, &date_key)
            .await?;
        if count >= limit {
            let e = SubmissionError::LimitReached {
                user: item.author_handle.clone(),
            };
            info!(item_id = %item.id, count, limit, error = %e, "Submission refused");
            self.reply_best_effort(
                item.id,
                &format!(
                    "You've reached your daily limit of {limit} submissions. Please try again tomorrow."
                ),
            )
            .await;
            return Ok(ItemOutcome::LimitReached);
        }

        if let Some(existing) = existing {
            return self.handle_resubmission(item, existing).await;
        }

        let Some(target_id) = item.in_reply_to else {
            let e = SubmissionError::MissingReplyTarget {
                item_id: item.id.to_string(),
            };
            info!(item_id = %item.id, error = %e, "Invalid submission");
            self.reply_best_effort(
                item.id,
                &format!(
                    "To submit, reply to the post you want curated with {} and a feed hashtag.",
                    self.config.global.submission_marker
                ),
            )
            .await;
            return Ok(ItemOutcome::Invalid);
        };

        let original = self.client.fetch_item(target_id).await?.ok_or_else(|| {
            SubmissionError::TargetUnavailable {
                target_id: target_id.to_string(),
            }
        })?;

        let feeds = classifier::matching_feeds(item, &self.config.feeds);
        if feeds.is_empty() {
            let e = SubmissionError::NoMatchingFeed {
                item_id: item.id.to_string(),
            };
            info!(error = %e, "Invalid submission");
            self.reply_best_effort(item.id, &self.feed_guidance()).await;
            return Ok(ItemOutcome::Invalid);
        }

        let submission = Submission {
            id: original.id,
            author_id: original.author_id.clone(),
            author_handle: original.author_handle.clone(),
            content: original.text.clone(),
            curator_id: item.author_id.clone(),
            curator_handle: item.author_handle.clone(),
            curator_note: self.classifier.extract_note(&item.text),
            curator_item_id: item.id,
            status: self.config.global.default_status,
            acknowledgment_id: None,
            moderation_response_id: None,
            created_at: original.created_at,
            submitted_at: item.created_at,
            moderation_history: Vec::new(),
        };

        // Submission, feed rows, and counter commit together or not at all.
        self.db
            .create_submission(&submission, &feeds, &date_key)
            .await?;
        info!(
            submission_id = %submission.id,
            curator = %submission.curator_handle,
            feeds = ?feeds,
            "Submission created"
        );

        self.acknowledge(item.id, submission.id, &feeds).await;

        Ok(ItemOutcome::Submitted {
            submission_id: submission.id,
            feeds,
        })
    }

    /// A trigger whose original item is already stored.
    ///
    /// Adds any newly tagged feeds, never duplicating existing pairs, and
    /// does not count against the daily limit.
    async fn handle_resubmission(
        &self,
        item: &Item,
        existing: Submission,
    ) -> Result<ItemOutcome, SubmissionError> {
        let mut added_feeds = Vec::new();
        for feed_id in classifier::matching_feeds(item, &self.config.feeds) {
            if self.db.add_submission_feed(existing.id, &feed_id).await? {
                added_feeds.push(feed_id);
            }
        }

        if !added_feeds.is_empty() {
            info!(submission_id = %existing.id, feeds = ?added_feeds, "Added feeds to existing submission");
        }

        if existing.acknowledgment_id.is_none() && item.id == existing.curator_item_id {
            let feeds = self.db.get_submission_feeds(existing.id).await?;
            self.acknowledge(item.id, existing.id, &feeds).await;
        } else if !added_feeds.is_empty() {
            let tags = format_tags(&added_feeds);
            self.reply_best_effort(item.id, &format!("Also added to {tags}."))
                .await;
        } else {
            debug!(submission_id = %existing.id, item_id = %item.id, "Submission already recorded");
        }

        Ok(ItemOutcome::AlreadySubmitted {
            submission_id: existing.id,
            added_feeds,
        })
    }

    /// Reply to the curator and store the reply id as the moderation key.
    async fn acknowledge(&self, trigger_id: ItemId, submission_id: ItemId, feeds: &[String]) {
        let text = format!(
            "Received! Your submission for {} is awaiting moderation.",
            format_tags(feeds)
        );
        let Some(ack_id) = self.reply_best_effort(trigger_id, &text).await else {
            warn!(submission_id = %submission_id, "No acknowledgment id; submission cannot be moderated by reply");
            return;
        };
        if let Err(e) = self.db.set_acknowledgment_id(submission_id, ack_id).await {
            error!(submission_id = %submission_id, ack_id = %ack_id, error = %e, "Failed to store acknowledgment id");
        }
    }

    fn feed_guidance(&self) -> String {
        let ids: Vec<String> = self.config.feeds.iter().map(|f| f.id.clone()).collect();
        if ids.is_empty() {
            "No feeds are accepting submissions right now.".to_string()
        } else {
            format!(
                "Please tag at least one feed with your submission: {}",
                format_tags(&ids)
            )
        }
    }

    // ── Moderation ──────────────────────────────────────────────────

    async fn handle_moderation(
        &self,
        item: &Item,
        action: ModerationAction,
    ) -> Result<ItemOutcome, SubmissionError> {
        let Some(admin) = self.admins.handle_for(&item.author_id) else {
            let e = SubmissionError::NotAuthorized {
                user: item.author_handle.clone(),
            };
            debug!(item_id = %item.id, error = %e, "Ignoring moderation");
            return Ok(ItemOutcome::Ignored);
        };
        let admin = admin.to_string();

        let Some(target) = item.in_reply_to else {
            debug!(item_id = %item.id, "Moderation without reply target");
            return Ok(ItemOutcome::Ignored);
        };

        let Some(submission) = self.db.get_submission_by_acknowledgment(target).await? else {
            debug!(item_id = %item.id, target = %target, "Moderation target is not an acknowledgment");
            return Ok(ItemOutcome::Ignored);
        };

        if submission.status != self.config.global.default_status {
            debug!(
                submission_id = %submission.id,
                status = %submission.status,
                "Submission already decided"
            );
            return Ok(ItemOutcome::Ignored);
        }

        // Audit trail: recorded even if the admin approves no feed of this submission.
        let moderation = Moderation {
            admin_id: admin.clone(),
            action,
            timestamp: item.created_at,
            submission_id: submission.id,
            note: classifier::moderation_note(&item.text),
        };
        let already_recorded = submission.moderation_history.iter().any(|m| {
            m.admin_id == moderation.admin_id
                && m.action == moderation.action
                && m.timestamp.timestamp_micros() == moderation.timestamp.timestamp_micros()
        });
        if already_recorded {
            debug!(submission_id = %submission.id, admin = %admin, "Moderation already recorded");
        } else {
            self.db.add_moderation(&moderation).await?;
        }

        let status = action.resulting_status();
        let feeds = self.db.get_submission_feeds(submission.id).await?;
        let targets: Vec<String> = match action {
            ModerationAction::Approve => feeds
                .iter()
                .filter(|feed_id| {
                    self.config
                        .feed(feed_id)
                        .is_some_and(|f| f.is_approver(&admin) && f.enabled_stream().is_some())
                })
                .cloned()
                .collect(),
            ModerationAction::Reject => Vec::new(),
        };

        let confirmation = match action {
            ModerationAction::Approve if targets.is_empty() => "Approved.".to_string(),
            ModerationAction::Approve => format!("Approved for {}.", format_tags(&targets)),
            ModerationAction::Reject => "This submission has been rejected.".to_string(),
        };

        let Some(response_id) = self.reply_best_effort(item.id, &confirmation).await else {
            warn!(
                submission_id = %submission.id,
                admin = %admin,
                "Moderation confirmation not sent; status left unchanged"
            );
            return Ok(ItemOutcome::Failed);
        };

        self.db
            .update_submission_status(submission.id, status, Some(response_id))
            .await?;
        info!(submission_id = %submission.id, admin = %admin, status = %status, "Submission moderated");

        let mut decided = submission;
        decided.status = status;
        decided.moderation_response_id = Some(response_id);
        if !already_recorded {
            decided.moderation_history.push(moderation);
        }

        for feed_id in &targets {
            self.distribution.process_approved(feed_id, &decided).await;
        }

        Ok(ItemOutcome::Moderated {
            submission_id: decided.id,
            status,
            distributed_to: targets,
        })
    }

    /// Send a reply; failures are logged and yield `None`.
    async fn reply_best_effort(&self, target: ItemId, text: &str) -> Option<ItemId> {
        match self.client.send_reply(target, text).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                warn!(target = %target, "Reply sent but no id returned");
                None
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to send reply");
                None
            }
        }
    }

    // ── Operational controls ────────────────────────────────────────

    /// Upsert every configured feed so submissions can reference it.
    pub async fn sync_feeds(&self) -> Result<(), SubmissionError> {
        for feed in &self.config.feeds {
            self.db
                .upsert_feed(&feed.id, &feed.name, feed.description.as_deref())
                .await?;
        }
        debug!(feeds = self.config.feeds.len(), "Feeds synced");
        Ok(())
    }

    /// Re-run distribution for every approved submission of a feed.
    pub async fn redistribute_feed(
        &self,
        feed_id: &str,
    ) -> Result<Vec<DistributionReport>, SubmissionError> {
        let feed = self
            .config
            .feed(feed_id)
            .ok_or_else(|| SubmissionError::UnknownFeed(feed_id.to_string()))?;

        let approved = self
            .db
            .list_feed_submissions(&feed.id, Some(SubmissionStatus::Approved))
            .await?;
        info!(feed_id = %feed.id, count = approved.len(), "Redistributing approved submissions");

        let mut reports = Vec::with_capacity(approved.len());
        for submission in &approved {
            reports.push(self.distribution.process_approved(&feed.id, submission).await);
        }
        Ok(reports)
    }

    pub async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, SubmissionError> {
        Ok(self.db.list_submissions(status).await?)
    }

    pub async fn list_feed_submissions(
        &self,
        feed_id: &str,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, SubmissionError> {
        Ok(self.db.list_feed_submissions(feed_id, status).await?)
    }

    pub async fn remove_feed_association(
        &self,
        submission_id: ItemId,
        feed_id: &str,
    ) -> Result<bool, SubmissionError> {
        Ok(self.db.remove_submission_feed(submission_id, feed_id).await?)
    }
}

fn format_tags(feeds: &[String]) -> String {
    feeds
        .iter()
        .map(|f| format!("#{f}"))
        .collect::<Vec<_>>()
        .join(", ")
}

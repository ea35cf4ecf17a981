//! Integration tests for the submission lifecycle.
//!
//! Each test wires the real processor, distribution service, and an
//! in-memory libSQL store against a stub feed client, then drives items
//! through the same path the poller uses.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use mention_curator::config::AppConfig;
use mention_curator::distribution::{
    Distributor, DistributionService, Plugin, PluginRegistry,
};
use mention_curator::error::{FeedError, PluginError};
use mention_curator::feed::{FeedClient, Item, ItemId};
use mention_curator::pipeline::{
    AdminCache, ItemOutcome, MentionIngestor, MentionPoller, Submission, SubmissionProcessor,
    SubmissionStatus,
};
use mention_curator::store::{Database, LibSqlBackend};

/// First id handed out for bot replies.
const FIRST_REPLY_ID: u64 = 1000;

// ── Stub feed ───────────────────────────────────────────────────────

/// In-memory feed: known items, a mentions timeline, and recorded replies.
struct StubFeed {
    items: Mutex<BTreeMap<ItemId, Item>>,
    mentions: Mutex<Vec<Item>>,
    replies: Mutex<Vec<(ItemId, String)>>,
    next_reply: AtomicU64,
    replies_fail: AtomicBool,
}

impl StubFeed {
    fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            mentions: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            next_reply: AtomicU64::new(FIRST_REPLY_ID),
            replies_fail: AtomicBool::new(false),
        }
    }

    fn publish(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    fn mention(&self, item: Item) {
        self.publish(item.clone());
        self.mentions.lock().unwrap().push(item);
    }

    fn replies(&self) -> Vec<(ItemId, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedClient for StubFeed {
    async fn login(&self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn fetch_mentions_page(
        &self,
        _query: &str,
        page_size: usize,
        older_than: Option<ItemId>,
    ) -> Result<Vec<Item>, FeedError> {
        let mut page: Vec<Item> = self
            .mentions
            .lock()
            .unwrap()
            .iter()
            .filter(|i| older_than.is_none_or(|o| i.id < o))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(page_size);
        Ok(page)
    }

    async fn fetch_item(&self, id: ItemId) -> Result<Option<Item>, FeedError> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn resolve_user_id(&self, _handle: &str) -> Result<Option<String>, FeedError> {
        Ok(None)
    }

    async fn send_reply(&self, target: ItemId, text: &str) -> Result<Option<ItemId>, FeedError> {
        if self.replies_fail.load(Ordering::Relaxed) {
            return Err(FeedError::RequestFailed {
                endpoint: "replies".into(),
                reason: "rate limited".into(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .push((target, text.to_string()));
        Ok(Some(ItemId::new(self.next_reply.fetch_add(1, Ordering::Relaxed))))
    }
}

// ── Recording distributor ───────────────────────────────────────────

#[derive(Default)]
struct Deliveries {
    calls: Mutex<Vec<(String, ItemId, String)>>,
}

impl Deliveries {
    fn all(&self) -> Vec<(String, ItemId, String)> {
        self.calls.lock().unwrap().clone()
    }
}

struct RecordingDistributor {
    name: &'static str,
    fail: bool,
    deliveries: Arc<Deliveries>,
}

#[async_trait]
impl Distributor for RecordingDistributor {
    fn name(&self) -> &str {
        self.name
    }

    async fn initialize(&self, _feed_id: &str, _config: &serde_json::Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn distribute(&self, feed_id: &str, submission: &Submission) -> Result<(), PluginError> {
        if self.fail {
            return Err(PluginError::DistributeFailed {
                name: self.name.to_string(),
                reason: "sink offline".into(),
            });
        }
        self.deliveries.calls.lock().unwrap().push((
            feed_id.to_string(),
            submission.id,
            submission.content.clone(),
        ));
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    feed: Arc<StubFeed>,
    db: Arc<dyn Database>,
    deliveries: Arc<Deliveries>,
    processor: Arc<SubmissionProcessor>,
}

impl Harness {
    async fn new(config: serde_json::Value) -> Self {
        let config = Arc::new(AppConfig::from_json(&config.to_string()).unwrap());
        let feed = Arc::new(StubFeed::new());
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let deliveries = Arc::new(Deliveries::default());

        let mut registry = PluginRegistry::new();
        for (name, fail) in [("good", false), ("bad", true)] {
            registry.insert(
                name,
                Plugin::Distributor(Arc::new(RecordingDistributor {
                    name,
                    fail,
                    deliveries: Arc::clone(&deliveries),
                })),
            );
        }

        let distribution = Arc::new(DistributionService::new(
            Arc::clone(&config),
            Arc::new(registry),
            Arc::clone(&db),
        ));
        let admins = AdminCache::from_pairs([("m1", "modA"), ("m2", "modB")]);
        let client: Arc<dyn FeedClient> = feed.clone();
        let processor = Arc::new(
            SubmissionProcessor::new(
                config,
                Arc::clone(&db),
                client,
                admins,
                distribution,
            )
            .unwrap(),
        );
        processor.sync_feeds().await.unwrap();

        Self {
            feed,
            db,
            deliveries,
            processor,
        }
    }

    fn poller(&self) -> MentionPoller {
        let client: Arc<dyn FeedClient> = self.feed.clone();
        let ingestor = MentionIngestor::new(client, "@curatorbot", 2, 10);
        MentionPoller::new(ingestor, Arc::clone(&self.processor), Arc::clone(&self.db))
    }

    async fn submission(&self, id: u64) -> Submission {
        self.db
            .get_submission(ItemId::new(id))
            .await
            .unwrap()
            .expect("submission stored")
    }
}

fn config(max_daily: u32) -> serde_json::Value {
    serde_json::json!({
        "global": {
            "bot_handle": "curatorbot",
            "max_daily_submissions_per_user": max_daily,
            "blacklist": ["spammer"]
        },
        "plugins": {
            "good": { "type": "distributor", "url": "test:good" },
            "bad": { "type": "distributor", "url": "test:bad" }
        },
        "feeds": [
            {
                "id": "test",
                "name": "Test",
                "moderation": { "approvers": ["modA"] },
                "outputs": { "stream": { "enabled": true, "distribute": [{ "plugin": "good" }] } }
            },
            {
                "id": "a",
                "moderation": { "approvers": ["modA"] },
                "outputs": { "stream": { "enabled": true, "distribute": [{ "plugin": "good" }] } }
            },
            {
                "id": "b",
                "moderation": { "approvers": ["modB"] },
                "outputs": { "stream": { "enabled": true, "distribute": [{ "plugin": "good" }] } }
            },
            {
                "id": "flaky",
                "moderation": { "approvers": ["modA"] },
                "outputs": { "stream": {
                    "enabled": true,
                    "distribute": [{ "plugin": "bad" }, { "plugin": "good" }]
                } }
            }
        ]
    })
}

fn item(id: u64, author: &str, text: &str, reply_to: Option<u64>) -> Item {
    let hashtags = text
        .split_whitespace()
        .filter_map(|w| w.strip_prefix('#'))
        .map(|t| {
            t.chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect();
    Item {
        id: ItemId::new(id),
        author_id: format!("{author}-id"),
        author_handle: author.to_string(),
        text: text.to_string(),
        in_reply_to: reply_to.map(ItemId::new),
        timestamp: id as i64,
        hashtags,
        created_at: Utc::now(),
    }
}

/// Moderation items come from the admin ids the cache knows.
fn admin_item(id: u64, admin_id: &str, handle: &str, text: &str, reply_to: u64) -> Item {
    let mut i = item(id, handle, text, Some(reply_to));
    i.author_id = admin_id.to_string();
    i
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_then_approve_distributes_once() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello world", None));

    let outcome = h
        .processor
        .process(&item(101, "curator", "@curatorbot !submit #test great read", Some(100)))
        .await;
    assert_eq!(
        outcome,
        ItemOutcome::Submitted {
            submission_id: ItemId::new(100),
            feeds: vec!["test".into()],
        }
    );

    let stored = h.submission(100).await;
    assert_eq!(stored.status, SubmissionStatus::Pending);
    assert_eq!(stored.content, "hello world");
    assert_eq!(stored.author_handle, "writer");
    assert_eq!(stored.curator_handle, "curator");
    assert_eq!(stored.curator_item_id, ItemId::new(101));
    assert_eq!(stored.curator_note.as_deref(), Some("great read"));
    assert_eq!(stored.acknowledgment_id, Some(ItemId::new(FIRST_REPLY_ID)));
    assert_eq!(h.feed.replies()[0].0, ItemId::new(101));
    assert_eq!(
        h.db.get_daily_submission_count("curator-id", &today()).await.unwrap(),
        1
    );

    let outcome = h
        .processor
        .process(&admin_item(102, "m1", "modA", "#approve solid pick", FIRST_REPLY_ID))
        .await;
    assert_eq!(
        outcome,
        ItemOutcome::Moderated {
            submission_id: ItemId::new(100),
            status: SubmissionStatus::Approved,
            distributed_to: vec!["test".into()],
        }
    );

    let stored = h.submission(100).await;
    assert_eq!(stored.status, SubmissionStatus::Approved);
    assert_eq!(stored.moderation_response_id, Some(ItemId::new(FIRST_REPLY_ID + 1)));
    assert_eq!(stored.moderation_history.len(), 1);
    assert_eq!(stored.moderation_history[0].admin_id, "moda");
    assert_eq!(stored.moderation_history[0].note.as_deref(), Some("solid pick"));

    assert_eq!(
        h.deliveries.all(),
        vec![("test".to_string(), ItemId::new(100), "hello world".to_string())]
    );

    // A second decision on a decided submission is ignored.
    let again = h
        .processor
        .process(&admin_item(103, "m1", "modA", "#reject", FIRST_REPLY_ID))
        .await;
    assert_eq!(again, ItemOutcome::Ignored);
    assert_eq!(h.submission(100).await.status, SubmissionStatus::Approved);
    assert_eq!(h.deliveries.all().len(), 1);
}

#[tokio::test]
async fn reject_records_decision_without_distribution() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "meh", None));
    h.processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;

    let outcome = h
        .processor
        .process(&admin_item(102, "m1", "modA", "#reject off topic", FIRST_REPLY_ID))
        .await;
    assert_eq!(
        outcome,
        ItemOutcome::Moderated {
            submission_id: ItemId::new(100),
            status: SubmissionStatus::Rejected,
            distributed_to: vec![],
        }
    );
    assert!(h.deliveries.all().is_empty());
    assert_eq!(h.submission(100).await.status, SubmissionStatus::Rejected);
}

#[tokio::test]
async fn daily_limit_blocks_further_submissions() {
    let h = Harness::new(config(1)).await;
    h.feed.publish(item(100, "writer", "one", None));
    h.feed.publish(item(200, "writer", "two", None));

    let first = h
        .processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;
    assert!(matches!(first, ItemOutcome::Submitted { .. }));

    let second = h
        .processor
        .process(&item(201, "curator", "!submit #test", Some(200)))
        .await;
    assert_eq!(second, ItemOutcome::LimitReached);
    assert!(h.db.get_submission(ItemId::new(200)).await.unwrap().is_none());

    let replies = h.feed.replies();
    assert_eq!(replies.last().unwrap().0, ItemId::new(201));
    assert!(replies.last().unwrap().1.contains("daily limit"));
}

#[tokio::test]
async fn multi_feed_submission_creates_one_row_per_feed() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "cross-post", None));

    let outcome = h
        .processor
        .process(&item(101, "curator", "!submit #a #zzz #b", Some(100)))
        .await;
    assert_eq!(
        outcome,
        ItemOutcome::Submitted {
            submission_id: ItemId::new(100),
            feeds: vec!["a".into(), "b".into()],
        }
    );

    let mut feeds = h.db.get_submission_feeds(ItemId::new(100)).await.unwrap();
    feeds.sort();
    assert_eq!(feeds, vec!["a", "b"]);
    assert_eq!(h.processor.list_feed_submissions("b", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn approval_distributes_only_to_feeds_the_admin_moderates() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "cross-post", None));
    h.processor
        .process(&item(101, "curator", "!submit #a #b", Some(100)))
        .await;

    let outcome = h
        .processor
        .process(&admin_item(102, "m1", "modA", "#approve", FIRST_REPLY_ID))
        .await;
    assert_eq!(
        outcome,
        ItemOutcome::Moderated {
            submission_id: ItemId::new(100),
            status: SubmissionStatus::Approved,
            distributed_to: vec!["a".into()],
        }
    );

    let feeds: Vec<String> = h.deliveries.all().into_iter().map(|(f, _, _)| f).collect();
    assert_eq!(feeds, vec!["a"]);
}

#[tokio::test]
async fn failing_distributor_does_not_block_the_rest() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #flaky", Some(100)))
        .await;

    let outcome = h
        .processor
        .process(&admin_item(102, "m1", "modA", "#approve", FIRST_REPLY_ID))
        .await;
    assert!(matches!(outcome, ItemOutcome::Moderated { .. }));
    assert_eq!(h.submission(100).await.status, SubmissionStatus::Approved);
    assert_eq!(
        h.deliveries.all(),
        vec![("flaky".to_string(), ItemId::new(100), "hello".to_string())]
    );
}

#[tokio::test]
async fn invalid_submissions_get_guidance() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));

    let no_target = h
        .processor
        .process(&item(101, "curator", "!submit #test", None))
        .await;
    assert_eq!(no_target, ItemOutcome::Invalid);

    let no_feed = h
        .processor
        .process(&item(102, "curator", "!submit #unknown", Some(100)))
        .await;
    assert_eq!(no_feed, ItemOutcome::Invalid);

    let missing = h
        .processor
        .process(&item(103, "curator", "!submit #test", Some(999)))
        .await;
    assert_eq!(missing, ItemOutcome::Failed);

    assert!(h.processor.list_submissions(None).await.unwrap().is_empty());
    let targets: Vec<ItemId> = h.feed.replies().into_iter().map(|(t, _)| t).collect();
    assert_eq!(targets, vec![ItemId::new(101), ItemId::new(102)]);
    assert_eq!(
        h.db.get_daily_submission_count("curator-id", &today()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn resubmission_adds_new_feeds_without_counting() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #a", Some(100)))
        .await;

    let repeat = h
        .processor
        .process(&item(101, "curator", "!submit #a", Some(100)))
        .await;
    assert_eq!(
        repeat,
        ItemOutcome::AlreadySubmitted {
            submission_id: ItemId::new(100),
            added_feeds: vec![],
        }
    );

    let other = h
        .processor
        .process(&item(105, "someone", "!submit #a #b", Some(100)))
        .await;
    assert_eq!(
        other,
        ItemOutcome::AlreadySubmitted {
            submission_id: ItemId::new(100),
            added_feeds: vec!["b".into()],
        }
    );

    assert_eq!(h.db.get_submission_feeds(ItemId::new(100)).await.unwrap().len(), 2);
    assert_eq!(
        h.db.get_daily_submission_count("curator-id", &today()).await.unwrap(),
        1
    );
    assert_eq!(
        h.db.get_daily_submission_count("someone-id", &today()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn moderation_from_non_admins_and_filtered_authors_is_ignored() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;

    let stranger = h
        .processor
        .process(&item(102, "stranger", "#approve", Some(FIRST_REPLY_ID)))
        .await;
    assert_eq!(stranger, ItemOutcome::Ignored);

    let blocked = h
        .processor
        .process(&item(103, "spammer", "!submit #test", Some(100)))
        .await;
    assert_eq!(blocked, ItemOutcome::Ignored);

    let own = h
        .processor
        .process(&item(104, "curatorbot", "!submit #test", Some(100)))
        .await;
    assert_eq!(own, ItemOutcome::Ignored);

    let stored = h.submission(100).await;
    assert_eq!(stored.status, SubmissionStatus::Pending);
    assert!(stored.moderation_history.is_empty());
}

#[tokio::test]
async fn failed_confirmation_leaves_status_pending() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;

    h.feed.replies_fail.store(true, Ordering::Relaxed);
    let outcome = h
        .processor
        .process(&admin_item(102, "m1", "modA", "#approve", FIRST_REPLY_ID))
        .await;
    assert_eq!(outcome, ItemOutcome::Failed);

    let stored = h.submission(100).await;
    assert_eq!(stored.status, SubmissionStatus::Pending);
    assert_eq!(stored.moderation_history.len(), 1);
    assert!(h.deliveries.all().is_empty());
}

#[tokio::test]
async fn poller_processes_oldest_first_and_advances_cursor() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "first", None));
    h.feed.publish(item(102, "writer", "second", None));
    h.feed.mention(item(105, "curator", "!submit #test", Some(102)));
    h.feed.mention(item(101, "curator", "!submit #test", Some(100)));
    h.feed.mention(item(103, "chatty", "@curatorbot hi", None));

    let poller = h.poller();
    let summary = poller.poll_once().await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.cursor, Some(ItemId::new(105)));
    let labels: Vec<&str> = summary.outcomes.iter().map(|o| o.label()).collect();
    assert_eq!(labels, vec!["submitted", "ignored", "submitted"]);
    assert_eq!(poller.cursor().await.unwrap(), Some(ItemId::new(105)));

    // Acknowledgments follow item order.
    let targets: Vec<ItemId> = h.feed.replies().into_iter().map(|(t, _)| t).collect();
    assert_eq!(targets, vec![ItemId::new(101), ItemId::new(105)]);

    let idle = poller.poll_once().await.unwrap();
    assert_eq!(idle.fetched, 0);
}

#[tokio::test]
async fn rewound_cursor_replays_without_side_effects() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.feed.mention(item(101, "curator", "!submit #test", Some(100)));

    let poller = h.poller();
    poller.poll_once().await.unwrap();
    let replies_before = h.feed.replies().len();

    poller.set_cursor(ItemId::new(100)).await.unwrap();
    let replay = poller.poll_once().await.unwrap();
    assert_eq!(replay.outcomes.len(), 1);
    assert!(matches!(replay.outcomes[0], ItemOutcome::AlreadySubmitted { .. }));

    assert_eq!(h.feed.replies().len(), replies_before);
    assert_eq!(h.processor.list_submissions(None).await.unwrap().len(), 1);
    assert_eq!(
        h.db.get_daily_submission_count("curator-id", &today()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn redistribute_replays_approved_submissions() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;
    h.processor
        .process(&admin_item(102, "m1", "modA", "#approve", FIRST_REPLY_ID))
        .await;

    let reports = h.processor.redistribute_feed("test").await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].delivered, vec!["good"]);
    assert_eq!(h.deliveries.all().len(), 2);

    assert!(h.processor.redistribute_feed("nope").await.is_err());

    assert!(
        h.processor
            .remove_feed_association(ItemId::new(100), "test")
            .await
            .unwrap()
    );
    assert!(h.processor.redistribute_feed("test").await.unwrap().is_empty());
}

#[tokio::test]
async fn adding_feeds_to_existing_submission_respects_daily_limit() {
    let h = Harness::new(config(1)).await;
    h.feed.publish(item(100, "writer", "one", None));
    h.feed.publish(item(200, "writer", "two", None));

    // Someone else created the submission, so it costs "curator" nothing yet.
    h.processor
        .process(&item(201, "other", "!submit #a", Some(200)))
        .await;
    let first = h
        .processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;
    assert!(matches!(first, ItemOutcome::Submitted { .. }));

    let over = h
        .processor
        .process(&item(202, "curator", "!submit #b", Some(200)))
        .await;
    assert_eq!(over, ItemOutcome::LimitReached);
    assert_eq!(
        h.db.get_submission_feeds(ItemId::new(200)).await.unwrap(),
        vec!["a"]
    );

    let replies = h.feed.replies();
    assert_eq!(replies.last().unwrap().0, ItemId::new(202));
    assert!(replies.last().unwrap().1.contains("daily limit"));
}

#[tokio::test]
async fn retried_decision_is_recorded_once() {
    let h = Harness::new(config(15)).await;
    h.feed.publish(item(100, "writer", "hello", None));
    h.processor
        .process(&item(101, "curator", "!submit #test", Some(100)))
        .await;

    let decision = admin_item(102, "m1", "modA", "#approve", FIRST_REPLY_ID);
    h.feed.replies_fail.store(true, Ordering::Relaxed);
    assert_eq!(h.processor.process(&decision).await, ItemOutcome::Failed);
    assert_eq!(h.processor.process(&decision).await, ItemOutcome::Failed);
    assert_eq!(h.submission(100).await.moderation_history.len(), 1);

    h.feed.replies_fail.store(false, Ordering::Relaxed);
    let outcome = h.processor.process(&decision).await;
    assert!(matches!(outcome, ItemOutcome::Moderated { .. }));

    let stored = h.submission(100).await;
    assert_eq!(stored.status, SubmissionStatus::Approved);
    assert_eq!(stored.moderation_history.len(), 1);
    assert_eq!(h.deliveries.all().len(), 1);
}

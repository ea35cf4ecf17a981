//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::feed::ItemId;
use crate::pipeline::types::{Moderation, ModerationAction, Submission, SubmissionStatus};
use crate::store::migrations;
use crate::store::traits::Database;

/// Key of the ingestion cursor in the `state` table.
const CURSOR_KEY: &str = "last_item_id";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Load moderation history for one submission, ordered by timestamp.
    async fn load_history(&self, submission_id: ItemId) -> Result<Vec<Moderation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT admin_id, action, note, timestamp FROM moderation_history
                 WHERE submission_id = ?1 ORDER BY timestamp ASC, id ASC",
                params![submission_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?;

        let mut history = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?
        {
            let action_str: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            let Some(action) = ModerationAction::from_db(&action_str) else {
                debug!(action = %action_str, "Skipping unknown moderation action");
                continue;
            };
            let timestamp: String = row
                .get(3)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            history.push(Moderation {
                admin_id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
                action,
                note: row.get::<String>(2).ok(),
                timestamp: parse_datetime(&timestamp),
                submission_id,
            });
        }
        history.sort_by_key(|m| m.timestamp);
        Ok(history)
    }

    /// Run a submission query and attach each row's moderation history.
    async fn query_submissions(
        &self,
        sql: &str,
        args: Vec<libsql::Value>,
        context: &str,
    ) -> Result<Vec<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?;

        let mut submissions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?
        {
            submissions.push(row_to_submission(&row)?);
        }

        for submission in &mut submissions {
            submission.moderation_history = self.load_history(submission.id).await?;
        }
        Ok(submissions)
    }

    async fn query_one_submission(
        &self,
        sql: &str,
        args: Vec<libsql::Value>,
        context: &str,
    ) -> Result<Option<Submission>, DatabaseError> {
        Ok(self
            .query_submissions(sql, args, context)
            .await?
            .into_iter()
            .next())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 so text order is time order.
fn fmt_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_item_id(s: &str) -> Result<ItemId, DatabaseError> {
    s.parse()
        .map_err(|e| DatabaseError::Serialization(format!("bad item id {s:?}: {e}")))
}

fn parse_optional_item_id(s: Option<String>) -> Option<ItemId> {
    s.and_then(|s| s.parse().ok())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_id(id: Option<ItemId>) -> libsql::Value {
    match id {
        Some(id) => libsql::Value::Text(id.to_string()),
        None => libsql::Value::Null,
    }
}

/// Bumps a user's daily counter, restarting at 1 when the date key changed.
const INCREMENT_COUNT_SQL: &str = "INSERT INTO submission_counts (user_id, count, last_reset_date) VALUES (?1, 1, ?2)
     ON CONFLICT(user_id) DO UPDATE SET
        count = CASE WHEN last_reset_date = excluded.last_reset_date THEN count + 1 ELSE 1 END,
        last_reset_date = excluded.last_reset_date";

const SUBMISSION_COLUMNS: &str = "s.id, s.author_id, s.author_handle, s.content, s.curator_id, s.curator_handle, s.curator_note, s.curator_item_id, s.status, s.acknowledgment_id, s.moderation_response_id, s.created_at, s.submitted_at";

/// Map a libsql Row to a Submission (without history).
///
/// Column order matches SUBMISSION_COLUMNS.
fn row_to_submission(row: &libsql::Row) -> Result<Submission, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };

    Ok(Submission {
        id: parse_item_id(&get(0)?)?,
        author_id: get(1)?,
        author_handle: get(2)?,
        content: get(3)?,
        curator_id: get(4)?,
        curator_handle: get(5)?,
        curator_note: row.get::<String>(6).ok(),
        curator_item_id: parse_item_id(&get(7)?)?,
        status: SubmissionStatus::from_db(&get(8)?),
        acknowledgment_id: parse_optional_item_id(row.get::<String>(9).ok()),
        moderation_response_id: parse_optional_item_id(row.get::<String>(10).ok()),
        created_at: parse_datetime(&get(11)?),
        submitted_at: parse_datetime(&get(12)?),
        moderation_history: Vec::new(),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Cursor ──────────────────────────────────────────────────────

    async fn get_cursor(&self) -> Result<Option<ItemId>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM state WHERE key = ?1", params![CURSOR_KEY])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_cursor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                parse_item_id(&value).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_cursor: {e}"))),
        }
    }

    async fn set_cursor(&self, cursor: ItemId) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![CURSOR_KEY, cursor.to_string(), fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_cursor: {e}")))?;
        Ok(())
    }

    // ── Feeds ───────────────────────────────────────────────────────

    async fn upsert_feed(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO feeds (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, description = excluded.description",
                params![id, name, opt_text(description), fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_feed: {e}")))?;
        Ok(())
    }

    // ── Submissions ─────────────────────────────────────────────────

    async fn create_submission(
        &self,
        submission: &Submission,
        feed_ids: &[String],
        date_key: &str,
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_submission begin: {e}")))?;

        let now = fmt_datetime(&Utc::now());
        let result: Result<(), DatabaseError> = async {
            tx.execute(
                "INSERT INTO submissions (id, author_id, author_handle, content, curator_id, curator_handle, curator_note, curator_item_id, status, acknowledgment_id, moderation_response_id, created_at, submitted_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    submission.id.to_string(),
                    submission.author_id.as_str(),
                    submission.author_handle.as_str(),
                    submission.content.as_str(),
                    submission.curator_id.as_str(),
                    submission.curator_handle.as_str(),
                    opt_text(submission.curator_note.as_deref()),
                    submission.curator_item_id.to_string(),
                    submission.status.as_str(),
                    opt_id(submission.acknowledgment_id),
                    opt_id(submission.moderation_response_id),
                    fmt_datetime(&submission.created_at),
                    fmt_datetime(&submission.submitted_at),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(format!("insert submission: {e}")))?;

            for feed_id in feed_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO submission_feeds (submission_id, feed_id) VALUES (?1, ?2)",
                    params![submission.id.to_string(), feed_id.as_str()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("insert submission feed: {e}")))?;
            }

            tx.execute(
                INCREMENT_COUNT_SQL,
                params![submission.curator_id.as_str(), date_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment count: {e}")))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("create_submission commit: {e}"))),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn get_submission(&self, id: ItemId) -> Result<Option<Submission>, DatabaseError> {
        self.query_one_submission(
            &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.id = ?1"),
            vec![id.to_string().into()],
            "get_submission",
        )
        .await
    }

    async fn get_submission_by_acknowledgment(
        &self,
        acknowledgment_id: ItemId,
    ) -> Result<Option<Submission>, DatabaseError> {
        self.query_one_submission(
            &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.acknowledgment_id = ?1"),
            vec![acknowledgment_id.to_string().into()],
            "get_submission_by_acknowledgment",
        )
        .await
    }

    async fn set_acknowledgment_id(
        &self,
        id: ItemId,
        acknowledgment_id: ItemId,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE submissions SET acknowledgment_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![
                    id.to_string(),
                    acknowledgment_id.to_string(),
                    fmt_datetime(&Utc::now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_acknowledgment_id: {e}")))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "submission".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_submission_status(
        &self,
        id: ItemId,
        status: SubmissionStatus,
        moderation_response_id: Option<ItemId>,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE submissions SET status = ?2, moderation_response_id = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    id.to_string(),
                    status.as_str(),
                    opt_id(moderation_response_id),
                    fmt_datetime(&Utc::now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_submission_status: {e}")))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "submission".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, DatabaseError> {
        match status {
            Some(status) => {
                self.query_submissions(
                    &format!(
                        "SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.status = ?1 ORDER BY s.submitted_at DESC"
                    ),
                    vec![status.as_str().into()],
                    "list_submissions",
                )
                .await
            }
            None => {
                self.query_submissions(
                    &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s ORDER BY s.submitted_at DESC"),
                    Vec::new(),
                    "list_submissions",
                )
                .await
            }
        }
    }

    async fn list_feed_submissions(
        &self,
        feed_id: &str,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, DatabaseError> {
        let base = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions s
             JOIN submission_feeds sf ON sf.submission_id = s.id
             WHERE sf.feed_id = ?1"
        );
        match status {
            Some(status) => {
                self.query_submissions(
                    &format!("{base} AND s.status = ?2 ORDER BY s.submitted_at ASC"),
                    vec![feed_id.into(), status.as_str().into()],
                    "list_feed_submissions",
                )
                .await
            }
            None => {
                self.query_submissions(
                    &format!("{base} ORDER BY s.submitted_at ASC"),
                    vec![feed_id.into()],
                    "list_feed_submissions",
                )
                .await
            }
        }
    }

    // ── Feed associations ───────────────────────────────────────────

    async fn add_submission_feed(
        &self,
        submission_id: ItemId,
        feed_id: &str,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO submission_feeds (submission_id, feed_id) VALUES (?1, ?2)",
                params![submission_id.to_string(), feed_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_submission_feed: {e}")))?;
        Ok(changed > 0)
    }

    async fn remove_submission_feed(
        &self,
        submission_id: ItemId,
        feed_id: &str,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM submission_feeds WHERE submission_id = ?1 AND feed_id = ?2",
                params![submission_id.to_string(), feed_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_submission_feed: {e}")))?;
        Ok(changed > 0)
    }

    async fn get_submission_feeds(
        &self,
        submission_id: ItemId,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT feed_id FROM submission_feeds WHERE submission_id = ?1 ORDER BY feed_id",
                params![submission_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_submission_feeds: {e}")))?;

        let mut feeds = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_submission_feeds: {e}")))?
        {
            feeds.push(
                row.get::<String>(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            );
        }
        Ok(feeds)
    }

    // ── Moderation ──────────────────────────────────────────────────

    async fn add_moderation(&self, moderation: &Moderation) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO moderation_history (submission_id, admin_id, action, note, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    moderation.submission_id.to_string(),
                    moderation.admin_id.as_str(),
                    moderation.action.as_str(),
                    opt_text(moderation.note.as_deref()),
                    fmt_datetime(&moderation.timestamp)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_moderation: {e}")))?;
        Ok(())
    }

    // ── Daily counters ──────────────────────────────────────────────

    async fn get_daily_submission_count(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<u32, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT count, last_reset_date FROM submission_counts WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_daily_submission_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                let last_reset: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                if last_reset == date_key {
                    Ok(u32::try_from(count).unwrap_or(u32::MAX))
                } else {
                    Ok(0)
                }
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_daily_submission_count: {e}"
            ))),
        }
    }

    async fn increment_daily_submission_count(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(INCREMENT_COUNT_SQL, params![user_id, date_key])
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_daily_submission_count: {e}")))?;
        Ok(())
    }

    // ── Plugin settings ─────────────────────────────────────────────

    async fn get_feed_plugin_config(
        &self,
        feed_id: &str,
        plugin_id: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT config FROM feed_plugins WHERE feed_id = ?1 AND plugin_id = ?2",
                params![feed_id, plugin_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_feed_plugin_config: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_feed_plugin_config: {e}"))),
        }
    }

    async fn save_feed_plugin_config(
        &self,
        feed_id: &str,
        plugin_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let raw =
            serde_json::to_string(config).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO feed_plugins (feed_id, plugin_id, config, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![feed_id, plugin_id, raw, fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_feed_plugin_config: {e}")))?;
        Ok(())
    }
}

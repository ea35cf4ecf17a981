//! Configuration types.
//!
//! The feed/plugin layout comes from a JSON document; process-level settings
//! (database path, bridge URL, credentials) come from environment variables.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::types::SubmissionStatus;

/// Default configuration document location.
const DEFAULT_CONFIG_PATH: &str = "./curator.config.json";

/// Default database location.
const DEFAULT_DB_PATH: &str = "./data/curator.db";

/// Default feed bridge endpoint.
const DEFAULT_FEED_API_URL: &str = "http://127.0.0.1:3001";

/// Parsed configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    /// Plugin registry: name → kind + load location.
    #[serde(default)]
    pub plugins: HashMap<String, PluginEntry>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// Settings shared by every feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Handle of the bot account that is mentioned.
    pub bot_handle: String,
    /// Submissions an author may create per UTC day.
    pub max_daily_submissions_per_user: u32,
    /// Status a freshly created submission starts in.
    pub default_status: SubmissionStatus,
    /// Case-insensitive token that marks an item as a submission.
    pub submission_marker: String,
    /// Seconds between polls.
    pub poll_interval_secs: u64,
    /// Items requested per mentions page.
    pub page_size: usize,
    /// Upper bound on pages fetched in one poll.
    pub max_pages: usize,
    /// Handles whose items are never processed.
    pub blacklist: Vec<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bot_handle: String::new(),
            max_daily_submissions_per_user: 15,
            default_status: SubmissionStatus::Pending,
            submission_marker: "!submit".to_string(),
            poll_interval_secs: 60,
            page_size: 20,
            max_pages: 10,
            blacklist: Vec::new(),
        }
    }
}

/// Plugin role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Transformer,
    Distributor,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transformer => "transformer",
            Self::Distributor => "distributor",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    #[serde(rename = "type")]
    pub kind: PluginKind,
    /// Load location, resolved against the built-in plugin table.
    #[serde(default)]
    pub url: String,
}

/// One destination feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl FeedConfig {
    /// Whether `handle` is one of this feed's approvers (case-insensitive).
    pub fn is_approver(&self, handle: &str) -> bool {
        self.moderation
            .approvers
            .iter()
            .any(|a| a.trim_start_matches('@').eq_ignore_ascii_case(handle.trim_start_matches('@')))
    }

    /// The stream output, if present and enabled.
    pub fn enabled_stream(&self) -> Option<&StreamConfig> {
        self.outputs.stream.as_ref().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub approvers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default)]
    pub stream: Option<StreamConfig>,
}

/// Transform → distribute configuration for approved items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub transform: Option<PluginRef>,
    #[serde(default)]
    pub distribute: Vec<PluginRef>,
}

/// Reference to a registered plugin plus its per-feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRef {
    pub plugin: String,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl AppConfig {
    /// Read and validate a configuration document from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a feed by id (case-insensitive).
    pub fn feed(&self, id: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.id.eq_ignore_ascii_case(id))
    }

    /// Check the document for mistakes that must abort startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "global.page_size".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.global.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "global.max_pages".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.global.submission_marker.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "global.submission_marker".into(),
                hint: "Set a token such as \"!submit\".".into(),
            });
        }

        for (name, entry) in &self.plugins {
            if entry.url.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: format!("plugins.{name}.url"),
                    hint: "Every plugin needs a load location.".into(),
                });
            }
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.id.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: "feeds[].id".into(),
                    hint: "Every feed needs an id.".into(),
                });
            }
            if !seen.insert(feed.id.to_lowercase()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("feeds.{}", feed.id),
                    message: "duplicate feed id".into(),
                });
            }
            let Some(stream) = &feed.outputs.stream else {
                continue;
            };
            if let Some(transform) = &stream.transform {
                self.check_plugin_ref(&feed.id, transform, PluginKind::Transformer)?;
            }
            for target in &stream.distribute {
                self.check_plugin_ref(&feed.id, target, PluginKind::Distributor)?;
            }
        }
        Ok(())
    }

    fn check_plugin_ref(
        &self,
        feed_id: &str,
        plugin_ref: &PluginRef,
        expected: PluginKind,
    ) -> Result<(), ConfigError> {
        let key = format!("feeds.{feed_id}.outputs.stream.{}", plugin_ref.plugin);
        match self.plugins.get(&plugin_ref.plugin) {
            None => Err(ConfigError::InvalidValue {
                key,
                message: "plugin is not declared in `plugins`".into(),
            }),
            Some(entry) if entry.kind != expected => Err(ConfigError::InvalidValue {
                key,
                message: format!("plugin is a {}, expected a {expected}", entry.kind),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub feed_api_url: String,
    pub feed_api_token: Option<SecretString>,
    /// Overrides `global.poll_interval_secs` when set.
    pub poll_interval_secs: Option<u64>,
}

impl RuntimeConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        let config_path = std::env::var("CURATOR_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
            .into();

        let db_path = std::env::var("CURATOR_DB_PATH")
            .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
            .into();

        let feed_api_url =
            std::env::var("FEED_API_URL").unwrap_or_else(|_| DEFAULT_FEED_API_URL.to_string());

        let feed_api_token = std::env::var("FEED_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let poll_interval_secs = std::env::var("CURATOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            config_path,
            db_path,
            feed_api_url,
            feed_api_token,
            poll_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "global": { "bot_handle": "curatorbot", "max_daily_submissions_per_user": 3 },
        "plugins": {
            "template-transform": { "type": "transformer", "url": "builtin:template-transform" },
            "log-distributor": { "type": "distributor", "url": "builtin:log-distributor" }
        },
        "feeds": [{
            "id": "test",
            "name": "Test Feed",
            "moderation": { "approvers": ["Alice"] },
            "outputs": { "stream": {
                "enabled": true,
                "transform": { "plugin": "template-transform", "config": { "template": "{content}" } },
                "distribute": [{ "plugin": "log-distributor" }]
            } }
        }]
    }"#;

    #[test]
    fn parses_document_with_defaults() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.global.bot_handle, "curatorbot");
        assert_eq!(config.global.max_daily_submissions_per_user, 3);
        assert_eq!(config.global.submission_marker, "!submit");
        assert_eq!(config.global.page_size, 20);
        assert_eq!(config.global.default_status, SubmissionStatus::Pending);

        let feed = config.feed("TEST").unwrap();
        assert!(feed.is_approver("alice"));
        assert!(!feed.is_approver("bob"));
        let stream = feed.enabled_stream().unwrap();
        assert_eq!(stream.distribute.len(), 1);
        assert!(stream.distribute[0].config.is_object());
    }

    #[test]
    fn rejects_plugin_without_location() {
        let raw = r#"{ "plugins": { "x": { "type": "distributor", "url": "" } } }"#;
        let err = AppConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn rejects_undeclared_stream_plugin() {
        let raw = r#"{ "feeds": [{ "id": "a", "outputs": { "stream": {
            "enabled": true, "distribute": [{ "plugin": "missing" }] } } }] }"#;
        let err = AppConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_wrong_plugin_kind() {
        let raw = r#"{
            "plugins": { "t": { "type": "transformer", "url": "builtin:template-transform" } },
            "feeds": [{ "id": "a", "outputs": { "stream": {
                "enabled": true, "distribute": [{ "plugin": "t" }] } } }] }"#;
        let err = AppConfig::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("expected a distributor"));
    }

    #[test]
    fn rejects_duplicate_feed_ids() {
        let raw = r#"{ "feeds": [{ "id": "a" }, { "id": "A" }] }"#;
        assert!(AppConfig::from_json(raw).is_err());
    }

    #[test]
    fn disabled_stream_is_hidden() {
        let raw = r#"{ "feeds": [{ "id": "a", "outputs": { "stream": { "enabled": false } } }] }"#;
        let config = AppConfig::from_json(raw).unwrap();
        assert!(config.feed("a").unwrap().enabled_stream().is_none());
    }
}

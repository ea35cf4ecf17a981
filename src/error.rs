//! Error types for the curator.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

/// Configuration-related errors. These abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Feed client errors. Transient: the poll loop logs them and retries next tick.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Request to {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid item id: {0:?}")]
    InvalidItemId(String),
}

/// Errors raised while handling a single submission or moderation item.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Daily submission limit reached for {user}")]
    LimitReached { user: String },

    #[error("Item {item_id} has no reply target")]
    MissingReplyTarget { item_id: String },

    #[error("Reply target {target_id} could not be fetched")]
    TargetUnavailable { target_id: String },

    #[error("No configured feed tagged in item {item_id}")]
    NoMatchingFeed { item_id: String },

    #[error("{user} is not an approver")]
    NotAuthorized { user: String },

    #[error("Feed {0} is not configured")]
    UnknownFeed(String),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Plugin load, transform, and distribute failures. Always isolated to one plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin {name} is not registered")]
    NotFound { name: String },

    #[error("Plugin {name} has no load location")]
    MissingLocation { name: String },

    #[error("Plugin {name} is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Plugin {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("Plugin {name} initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Plugin {name} transform failed: {reason}")]
    TransformFailed { name: String, reason: String },

    #[error("Plugin {name} distribute failed: {reason}")]
    DistributeFailed { name: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the curator.
pub type Result<T> = std::result::Result<T, Error>;

//! Plugins shipped with the curator.

pub mod log_sink;
pub mod template;
pub mod webhook;

pub use log_sink::LogDistributor;
pub use template::TemplateTransformer;
pub use webhook::WebhookDistributor;

/// Load location of [`TemplateTransformer`].
pub const TEMPLATE_TRANSFORM: &str = "builtin:template-transform";

/// Load location of [`WebhookDistributor`].
pub const WEBHOOK_DISTRIBUTOR: &str = "builtin:webhook-distributor";

/// Load location of [`LogDistributor`].
pub const LOG_DISTRIBUTOR: &str = "builtin:log-distributor";

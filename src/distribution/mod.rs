//! Distribution of approved submissions.
//!
//! Each feed's stream output runs an optional transform stage followed by
//! one or more distribute stages. Plugins are resolved through a static
//! catalog and loaded once at startup.

pub mod builtin;
pub mod plugin;
pub mod registry;
pub mod service;

pub use plugin::{Distributor, Plugin, Transformer};
pub use registry::{PluginCatalog, PluginRegistry};
pub use service::{DistributionReport, DistributionService};

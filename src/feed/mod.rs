//! Social feed access: item types and the client the ingestor drives.

pub mod client;
pub mod http;
pub mod types;

pub use client::FeedClient;
pub use http::HttpFeedClient;
pub use types::{Item, ItemId};

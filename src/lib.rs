//! Mention curator: ingests feed mentions, moderates submissions, and fans
//! approved items out to distribution plugins.

pub mod config;
pub mod distribution;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod store;

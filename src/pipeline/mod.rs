//! Mention processing pipeline.
//!
//! Every poll cycle flows through:
//! 1. `MentionIngestor::fetch_new_items()`: paged fetch above the cursor
//! 2. `Classifier::classify()`: submission / moderation / ignore
//! 3. `SubmissionProcessor::process()`: lifecycle state machine
//! 4. `DistributionService::process_approved()`: on approval only

pub mod admins;
pub mod classifier;
pub mod ingestor;
pub mod poller;
pub mod processor;
pub mod types;

pub use admins::AdminCache;
pub use classifier::Classifier;
pub use ingestor::{IngestBatch, MentionIngestor};
pub use poller::{MentionPoller, PollSummary, PollerHandle, spawn_poller};
pub use processor::{ItemOutcome, SubmissionProcessor};
pub use types::{Classification, Moderation, ModerationAction, Submission, SubmissionStatus};

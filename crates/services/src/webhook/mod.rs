pub mod dedup;
pub mod event;
pub mod processor;
pub mod signature;

pub use dedup::{Deduplicator, RecentKeys};
pub use event::{EventKind, TrackKind, WebhookEvent};
pub use processor::{WebhookOutcome, WebhookProcessor};
pub use signature::WebhookVerifier;

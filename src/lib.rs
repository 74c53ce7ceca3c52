// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod fetcher;
pub mod model;
pub mod source;
pub mod store;
pub mod subscription;
pub mod telegram;

// ---- Re-exports for stable public API ----
pub use crate::dispatcher::{DispatchStats, Dispatcher};
pub use crate::fetcher::{FetchCursor, Fetcher};
pub use crate::model::{ChatId, Destination, Item, ItemId};
pub use crate::source::SourceTimeline;
pub use crate::store::Store;
pub use crate::subscription::SubscriptionManager;
pub use crate::telegram::{Messenger, SendError};

// src/subscription.rs
//! Subscribe/unsubscribe, driven synchronously by the command front-end.

use std::sync::Arc;

use chrono::Utc;

use crate::fetcher::FetchCursor;
use crate::model::{ChatId, Destination};
use crate::store::{Store, StoreResult};

pub struct SubscriptionManager {
    store: Arc<Store>,
    cursor: FetchCursor,
}

impl SubscriptionManager {
    pub fn new(store: Arc<Store>, cursor: FetchCursor) -> Self {
        Self { store, cursor }
    }

    /// Subscribe a chat. The watermark starts at the current fetch
    /// cursor, so the chat only receives items fetched from now on, not
    /// backlog. Re-subscribing an existing chat re-points the watermark
    /// at the current cursor (it re-skips whatever queued up meanwhile).
    pub fn subscribe(&self, chat: ChatId, title: &str) -> StoreResult<Destination> {
        let dest = Destination {
            id: chat,
            title: title.to_string(),
            subscribed_at: Utc::now(),
            watermark: self.cursor.get(),
        };
        self.store.upsert_destination(&dest)?;
        tracing::info!(chat = %chat, watermark = ?dest.watermark.map(|w| w.as_u64()), "subscribed");
        Ok(dest)
    }

    /// Remove the chat. Idempotent when it was never subscribed.
    pub fn unsubscribe(&self, chat: ChatId) -> StoreResult<()> {
        self.store.delete_destination(chat)?;
        tracing::info!(chat = %chat, "unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn manager(cursor: FetchCursor) -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(Store::open_in_memory().unwrap()), cursor)
    }

    #[test]
    fn subscribe_skips_backlog_via_cursor() {
        let cursor = FetchCursor::new(Some(ItemId(101)));
        let mgr = manager(cursor);
        let dest = mgr.subscribe(ChatId(5), "news").unwrap();
        assert_eq!(dest.watermark, Some(ItemId(101)));
        assert!(!dest.is_behind(ItemId(101)));
        assert!(dest.is_behind(ItemId(102)));
    }

    #[test]
    fn subscribe_before_any_fetch_has_unset_watermark() {
        let mgr = manager(FetchCursor::new(None));
        let dest = mgr.subscribe(ChatId(5), "news").unwrap();
        assert_eq!(dest.watermark, None);
    }

    #[test]
    fn resubscribe_repoints_watermark_at_cursor() {
        let cursor = FetchCursor::new(Some(ItemId(101)));
        let mgr = manager(cursor.clone());
        mgr.subscribe(ChatId(5), "news").unwrap();
        cursor.advance(ItemId(110));
        let dest = mgr.subscribe(ChatId(5), "news").unwrap();
        assert_eq!(dest.watermark, Some(ItemId(110)));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mgr = manager(FetchCursor::new(None));
        mgr.unsubscribe(ChatId(5)).unwrap();
        mgr.subscribe(ChatId(5), "news").unwrap();
        mgr.unsubscribe(ChatId(5)).unwrap();
        mgr.unsubscribe(ChatId(5)).unwrap();
    }
}

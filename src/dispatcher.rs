// src/dispatcher.rs
//! Dispatch cycles: fan pending items out to subscribed chats and purge
//! items once every chat is past them.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use metrics::{counter, describe_counter};

use crate::model::{ChatId, Destination, ItemId};
use crate::store::Store;
use crate::telegram::Messenger;

fn ensure_metrics_described() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        describe_counter!("dispatch_runs_total", "Completed dispatch cycles.");
        describe_counter!("dispatch_delivered_total", "Successful deliveries.");
        describe_counter!("dispatch_failures_total", "Failed delivery attempts.");
        describe_counter!(
            "dispatch_unacked_total",
            "Deliveries sent but whose watermark write failed (will repeat)."
        );
        describe_counter!("dispatch_purged_total", "Items purged after full delivery.");
    });
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
    /// Sent successfully, but the watermark write failed; the delivery
    /// repeats next cycle (at-least-once).
    pub unacked: usize,
    pub purged: usize,
}

/// Delivery is at-least-once: the watermark write happens after the send,
/// so a crash (or an unapplied write racing the next cycle's snapshot)
/// between the two can repeat one message. Accepted trade-off; the
/// alternative is a per-(item, chat) ledger.
pub struct Dispatcher<M: Messenger + ?Sized> {
    messenger: Arc<M>,
    store: Arc<Store>,
}

impl<M: Messenger + ?Sized> Dispatcher<M> {
    pub fn new(messenger: Arc<M>, store: Arc<Store>) -> Self {
        Self { messenger, store }
    }

    /// One dispatch cycle over a snapshot of items and destinations.
    ///
    /// Items go out in ascending id order. The first failure for a chat
    /// sidelines it for the rest of the cycle: delivering a later item
    /// after a failed earlier one would advance the watermark past the
    /// failed item and lose it forever. The sidelined chat's watermark
    /// stays put, so it catches up in order next cycle without skipping
    /// anything, and the item stays stored until every chat is past it.
    /// Chats subscribed mid-cycle are picked up next cycle.
    pub async fn run_dispatch_cycle(&self) -> Result<DispatchStats> {
        ensure_metrics_described();

        let items = self.store.list_items_ordered()?;
        let mut dests = self.store.list_destinations()?;
        let mut stats = DispatchStats::default();
        let mut sidelined: HashSet<ChatId> = HashSet::new();

        for item in &items {
            for dest in dests.iter_mut() {
                if sidelined.contains(&dest.id) || !dest.is_behind(item.id) {
                    continue;
                }
                match self.messenger.send(dest.id, &item.text).await {
                    Ok(()) => {
                        if self.advance_watermark(dest, item.id) {
                            stats.delivered += 1;
                            counter!("dispatch_delivered_total").increment(1);
                        } else {
                            // Sent but not acknowledged in the store; the
                            // send will repeat (at-least-once). Later items
                            // must wait so ordering holds.
                            stats.unacked += 1;
                            counter!("dispatch_unacked_total").increment(1);
                            sidelined.insert(dest.id);
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        counter!("dispatch_failures_total").increment(1);
                        sidelined.insert(dest.id);
                        tracing::warn!(chat = %dest.id, item = %item.id, error = %e,
                            "delivery failed, will retry next cycle");
                    }
                }
            }

            let all_past = dests
                .iter()
                .all(|d| d.watermark.is_some_and(|w| w >= item.id));
            if all_past {
                match self.store.delete_item(item.id) {
                    Ok(()) => {
                        stats.purged += 1;
                        counter!("dispatch_purged_total").increment(1);
                    }
                    Err(e) => {
                        // Harmless to leave behind: the purge re-runs next
                        // cycle once the store is back.
                        tracing::warn!(item = %item.id, error = %e, "purge failed");
                    }
                }
            }
        }

        counter!("dispatch_runs_total").increment(1);
        tracing::debug!(
            items = items.len(),
            delivered = stats.delivered,
            failed = stats.failed,
            unacked = stats.unacked,
            purged = stats.purged,
            "dispatch cycle done"
        );
        Ok(stats)
    }

    /// Persist the advanced watermark; the in-memory snapshot follows the
    /// durable write, never the other way round. Returns false when the
    /// write failed (the delivery will repeat — at-least-once).
    fn advance_watermark(&self, dest: &mut Destination, to: ItemId) -> bool {
        if dest.watermark.is_some_and(|w| w > to) {
            // Impossible given the is_behind gate above; a decrease here
            // means corrupted state, so refuse it loudly.
            tracing::error!(chat = %dest.id, watermark = ?dest.watermark, to = %to,
                "refusing watermark regression");
            return false;
        }
        let mut updated = dest.clone();
        updated.watermark = Some(to);
        match self.store.upsert_destination(&updated) {
            Ok(()) => {
                *dest = updated;
                true
            }
            Err(e) => {
                tracing::warn!(chat = %dest.id, error = %e, "watermark write failed");
                false
            }
        }
    }
}

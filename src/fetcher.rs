// src/fetcher.rs
//! Fetch cycles: pull posts newer than the cursor and persist them.

use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::model::ItemId;
use crate::source::SourceTimeline;
use crate::store::Store;

/// First cycle after a cold start pulls a single post so a fresh deploy
/// does not flood subscribers with history.
const BOOTSTRAP_COUNT: usize = 1;
/// Steady-state batch cap per cycle.
const BATCH_COUNT: usize = 5;

fn ensure_metrics_described() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_runs_total", "Completed fetch cycles.");
        describe_counter!("fetch_items_total", "Items persisted by fetch cycles.");
        describe_counter!("fetch_errors_total", "Fetch cycles aborted by an error.");
        describe_gauge!("fetch_cursor", "Highest item id ever fetched.");
    });
}

/// Process-wide high-water mark of fetched item ids. An explicit shared
/// handle rather than module state: the fetcher advances it, the
/// subscription manager reads it to skip backlog for new subscribers.
#[derive(Clone, Default)]
pub struct FetchCursor(Arc<Mutex<Option<ItemId>>>);

impl FetchCursor {
    pub fn new(initial: Option<ItemId>) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn get(&self) -> Option<ItemId> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forward-only; a stale or duplicate id never regresses the cursor.
    pub fn advance(&self, to: ItemId) {
        let mut cur = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if cur.map_or(true, |c| c < to) {
            *cur = Some(to);
        }
    }
}

pub struct Fetcher<S: SourceTimeline + ?Sized> {
    source: Arc<S>,
    store: Arc<Store>,
    cursor: FetchCursor,
}

impl<S: SourceTimeline + ?Sized> Fetcher<S> {
    /// Seeds the cursor from the highest id already in the store, so a
    /// restart does not re-announce items that were fetched before it.
    pub fn new(source: Arc<S>, store: Arc<Store>) -> Result<Self> {
        let cursor = FetchCursor::new(store.max_item_id()?);
        Ok(Self {
            source,
            store,
            cursor,
        })
    }

    pub fn cursor(&self) -> FetchCursor {
        self.cursor.clone()
    }

    /// One fetch cycle. Returns the number of items persisted.
    ///
    /// The cursor only ever reflects durable writes: it advances per
    /// upserted item, so a store failure mid-batch leaves the remaining
    /// window to be refetched next cycle, and an empty batch or a source
    /// error leaves the cursor untouched.
    pub async fn run_fetch_cycle(&self) -> Result<usize> {
        ensure_metrics_described();

        let since = self.cursor.get();
        let count = if since.is_some() {
            BATCH_COUNT
        } else {
            BOOTSTRAP_COUNT
        };

        let items = match self.source.fetch_since(since, count).await {
            Ok(items) => items,
            Err(e) => {
                counter!("fetch_errors_total").increment(1);
                return Err(e.context("fetching timeline"));
            }
        };

        let mut persisted = 0usize;
        for item in &items {
            if let Err(e) = self.store.upsert_item(item) {
                counter!("fetch_errors_total").increment(1);
                counter!("fetch_items_total").increment(persisted as u64);
                return Err(anyhow::Error::new(e).context(format!("persisting item {}", item.id)));
            }
            persisted += 1;
            self.cursor.advance(item.id);
        }

        counter!("fetch_runs_total").increment(1);
        counter!("fetch_items_total").increment(persisted as u64);
        if let Some(c) = self.cursor.get() {
            gauge!("fetch_cursor").set(c.as_u64() as f64);
        }

        tracing::debug!(
            since = ?since.map(|c| c.as_u64()),
            fetched = items.len(),
            cursor = ?self.cursor.get().map(|c| c.as_u64()),
            "fetch cycle done"
        );
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_never_regresses() {
        let cursor = FetchCursor::new(None);
        assert_eq!(cursor.get(), None);
        cursor.advance(ItemId(10));
        cursor.advance(ItemId(9));
        assert_eq!(cursor.get(), Some(ItemId(10)));
        cursor.advance(ItemId(11));
        assert_eq!(cursor.get(), Some(ItemId(11)));
    }
}

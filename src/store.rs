//! SQLite-backed store for items and destinations.
//!
//! Every write is an idempotent upsert or delete, so any cycle can be
//! safely retried after a failure. Item ids are stored as INTEGER, which
//! keeps `ORDER BY id ASC` in agreement with the in-process numeric
//! comparison.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::model::{ChatId, Destination, Item, ItemId};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Retryable: the underlying database rejected or lost the call.
    /// Callers leave their in-memory state untouched and retry next cycle.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the on-disk store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                 id         INTEGER PRIMARY KEY,
                 text       TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS destinations (
                 id            INTEGER PRIMARY KEY,
                 title         TEXT NOT NULL,
                 subscribed_at TEXT NOT NULL,
                 watermark     INTEGER
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or fully replace the item with this id.
    pub fn upsert_item(&self, item: &Item) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO items (id, text, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET text = ?2, created_at = ?3",
            params![item.id.as_u64(), item.text, item.created_at],
        )?;
        Ok(())
    }

    /// Insert or fully replace the destination with this chat id.
    pub fn upsert_destination(&self, dest: &Destination) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO destinations (id, title, subscribed_at, watermark)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET title = ?2, subscribed_at = ?3, watermark = ?4",
            params![
                dest.id.0,
                dest.title,
                dest.subscribed_at,
                dest.watermark.map(ItemId::as_u64)
            ],
        )?;
        Ok(())
    }

    /// Remove the item if present. No error when absent.
    pub fn delete_item(&self, id: ItemId) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM items WHERE id = ?1", params![id.as_u64()])?;
        Ok(())
    }

    /// Remove the destination if present. No error when absent.
    pub fn delete_destination(&self, id: ChatId) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM destinations WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    /// All items, ascending by id.
    pub fn list_items_ordered(&self) -> StoreResult<Vec<Item>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, text, created_at FROM items ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Item {
                id: ItemId(row.get(0)?),
                text: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All destinations, in no particular order.
    pub fn list_destinations(&self) -> StoreResult<Vec<Destination>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, title, subscribed_at, watermark FROM destinations")?;
        let rows = stmt.query_map([], |row| {
            Ok(Destination {
                id: ChatId(row.get(0)?),
                title: row.get(1)?,
                subscribed_at: row.get(2)?,
                watermark: row.get::<_, Option<u64>>(3)?.map(ItemId),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Highest stored item id, used to seed the fetch cursor after a restart.
    pub fn max_item_id(&self) -> StoreResult<Option<ItemId>> {
        let conn = self.lock();
        let max: Option<u64> =
            conn.query_row("SELECT MAX(id) FROM items", [], |row| row.get(0))?;
        Ok(max.map(ItemId))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: u64, text: &str) -> Item {
        Item {
            id: ItemId(id),
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_without_duplicating() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_item(&item(101, "first")).unwrap();
        store.upsert_item(&item(101, "edited")).unwrap();

        let items = store.list_items_ordered().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "edited");
    }

    #[test]
    fn scan_is_numeric_not_lexicographic() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_item(&item(10, "ten")).unwrap();
        store.upsert_item(&item(9, "nine")).unwrap();

        let ids: Vec<u64> = store
            .list_items_ordered()
            .unwrap()
            .iter()
            .map(|i| i.id.as_u64())
            .collect();
        assert_eq!(ids, vec![9, 10]);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.delete_item(ItemId(42)).unwrap();
        store.delete_destination(ChatId(7)).unwrap();
    }

    #[test]
    fn max_item_id_tracks_highest() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.max_item_id().unwrap(), None);
        store.upsert_item(&item(103, "c")).unwrap();
        store.upsert_item(&item(101, "a")).unwrap();
        assert_eq!(store.max_item_id().unwrap(), Some(ItemId(103)));
    }

    #[test]
    fn destination_roundtrip_keeps_watermark_sentinel() {
        let store = Store::open_in_memory().unwrap();
        let dest = Destination {
            id: ChatId(-1001),
            title: "news".into(),
            subscribed_at: Utc::now(),
            watermark: None,
        };
        store.upsert_destination(&dest).unwrap();
        let listed = store.list_destinations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].watermark, None);
        assert_eq!(listed[0].id, ChatId(-1001));
    }
}

// src/model.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a source post. The source hands these out as
/// numeric-like strings; we parse at the boundary and compare
/// numerically everywhere (store index, watermarks, purge checks),
/// so "9" vs "10" can never sort the wrong way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ItemId)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A fetched source post waiting to be relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub text: String,
    /// Source-provided publish time. Informational; never used for
    /// ordering decisions.
    pub created_at: DateTime<Utc>,
}

/// A subscribed chat that receives relayed items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: ChatId,
    pub title: String,
    pub subscribed_at: DateTime<Utc>,
    /// Highest item id already delivered to this chat. `None` means
    /// nothing was ever delivered, which sorts behind every item.
    pub watermark: Option<ItemId>,
}

impl Destination {
    /// True when `item` has not yet been delivered to this destination.
    pub fn is_behind(&self, item: ItemId) -> bool {
        match self.watermark {
            Some(w) => w < item,
            None => true,
        }
    }
}

/// Telegram chat identifier (negative for groups/channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ids_compare_numerically() {
        let a: ItemId = "9".parse().unwrap();
        let b: ItemId = "10".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn unset_watermark_is_behind_everything() {
        let d = Destination {
            id: ChatId(-100),
            title: "chat".into(),
            subscribed_at: Utc::now(),
            watermark: None,
        };
        assert!(d.is_behind(ItemId(1)));
    }

    #[test]
    fn watermark_gates_delivery() {
        let mut d = Destination {
            id: ChatId(1),
            title: "chat".into(),
            subscribed_at: Utc::now(),
            watermark: Some(ItemId(101)),
        };
        assert!(!d.is_behind(ItemId(101)));
        assert!(d.is_behind(ItemId(102)));
        d.watermark = Some(ItemId(102));
        assert!(!d.is_behind(ItemId(102)));
    }
}

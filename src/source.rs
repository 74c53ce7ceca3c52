// src/source.rs
//! Source timeline client: pulls posts newer than a cursor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::model::{Item, ItemId};

/// Narrow contract the fetcher and the /latest command consume.
/// Errors are transient by convention; the calling cycle logs and retries.
#[async_trait]
pub trait SourceTimeline: Send + Sync {
    /// Items strictly newer than `cursor` (all available when `None`),
    /// ascending by id. Capped at `max_count` from the newest end, like
    /// the upstream API. Empty when nothing new.
    async fn fetch_since(&self, cursor: Option<ItemId>, max_count: usize) -> Result<Vec<Item>>;

    /// The single most recent item, if the timeline has any.
    async fn latest(&self) -> Result<Option<Item>> {
        Ok(self.fetch_since(None, 1).await?.pop())
    }
}

#[derive(Debug, Deserialize)]
struct TimelinePost {
    id_str: String,
    text: String,
    created_at: Option<String>,
}

/// Twitter-style timestamps ("Wed Oct 10 20:19:24 +0000 2018"), with an
/// RFC 3339 fallback for API variants that use it.
fn parse_post_time(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_str(ts, "%a %b %d %H:%M:%S %z %Y")
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

/// HTTP client for a Twitter-style `user_timeline` endpoint.
pub struct HttpTimeline {
    base_url: String,
    bearer_token: String,
    user_id: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTimeline {
    pub fn new(base_url: String, bearer_token: String, user_id: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            user_id,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn parse_posts(posts: Vec<TimelinePost>) -> Result<Vec<Item>> {
        let mut out = Vec::with_capacity(posts.len());
        for p in posts {
            let id: ItemId = p
                .id_str
                .parse()
                .with_context(|| format!("non-numeric post id {:?}", p.id_str))?;
            out.push(Item {
                id,
                text: p.text,
                created_at: p
                    .created_at
                    .as_deref()
                    .map(parse_post_time)
                    .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
            });
        }
        // The API returns newest first; the pipeline wants ascending ids.
        out.sort_by_key(|i| i.id);
        Ok(out)
    }
}

#[async_trait]
impl SourceTimeline for HttpTimeline {
    async fn fetch_since(&self, cursor: Option<ItemId>, max_count: usize) -> Result<Vec<Item>> {
        let url = format!("{}/statuses/user_timeline.json", self.base_url);
        let mut req = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .timeout(self.timeout)
            .query(&[
                ("user_id", self.user_id.as_str()),
                ("count", &max_count.to_string()),
            ]);
        if let Some(since) = cursor {
            req = req.query(&[("since_id", since.to_string())]);
        }

        let resp = req.send().await.context("timeline request failed")?;
        let posts: Vec<TimelinePost> = resp
            .error_for_status()
            .context("timeline returned non-2xx")?
            .json()
            .await
            .context("parsing timeline json")?;
        Self::parse_posts(posts)
    }
}

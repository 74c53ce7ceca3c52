// src/commands.rs
//! Thin Telegram command front-end. Parses slash commands from the
//! long-poll update stream and calls into the subscription manager; it
//! owns no pipeline state of its own. Replies are best-effort.

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::ChatId;
use crate::source::SourceTimeline;
use crate::subscription::SubscriptionManager;
use crate::telegram::{Message, Messenger, TelegramClient, Update};

const HELP_TEXT: &str = "Commands:\n\
    /start — subscribe this chat to new posts\n\
    /stop — unsubscribe (admins only)\n\
    /latest — show the most recent post\n\
    /ping — check the bot is alive";

pub struct CommandFrontEnd {
    client: Arc<TelegramClient>,
    subscriptions: SubscriptionManager,
    source: Arc<dyn SourceTimeline>,
    admins: Vec<String>,
    allowed_chat_id: Option<i64>,
    shutdown: watch::Sender<bool>,
}

impl CommandFrontEnd {
    pub fn new(
        client: Arc<TelegramClient>,
        subscriptions: SubscriptionManager,
        source: Arc<dyn SourceTimeline>,
        admins: Vec<String>,
        allowed_chat_id: Option<i64>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            client,
            subscriptions,
            source,
            admins,
            allowed_chat_id,
            shutdown,
        }
    }

    /// Long-poll loop; exits when the shutdown flag flips.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut offset: Option<i64> = None;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                res = self.client.get_updates(offset, 25) => match res {
                    Ok(updates) => {
                        for update in updates {
                            offset = Some(update.update_id + 1);
                            self.handle_update(update).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "getUpdates failed");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                },
            }
        }
        tracing::info!("command front-end stopped");
    }

    async fn handle_update(&self, update: Update) {
        let Some(msg) = update.message else { return };
        let Some(text) = msg.text.clone() else { return };
        let Some(command) = parse_command(&text) else { return };

        match command.as_str() {
            "/start" => self.cmd_start(&msg).await,
            "/stop" => self.cmd_stop(&msg).await,
            "/ping" => self.reply(&msg, "Pong!").await,
            "/latest" => self.cmd_latest(&msg).await,
            "/terminate" => self.cmd_terminate(&msg).await,
            _ => self.reply(&msg, HELP_TEXT).await,
        }
    }

    async fn cmd_start(&self, msg: &Message) {
        if let Some(allowed) = self.allowed_chat_id {
            if msg.chat.id != allowed {
                self.reply(msg, "This chat is not allowed to use the bot.")
                    .await;
                return;
            }
        }
        let title = msg
            .chat
            .title
            .clone()
            .or_else(|| msg.chat.username.clone())
            .unwrap_or_else(|| msg.chat.id.to_string());
        match self.subscriptions.subscribe(ChatId(msg.chat.id), &title) {
            Ok(_) => self.reply(msg, "You successfully subscribed to news.").await,
            Err(e) => {
                tracing::warn!(error = %e, "subscribe failed");
                self.reply(msg, "Something went wrong, please try again later.")
                    .await;
            }
        }
    }

    async fn cmd_stop(&self, msg: &Message) {
        if !self.is_admin(msg) {
            self.reply(msg, "Only administrators can unsubscribe.").await;
            return;
        }
        match self.subscriptions.unsubscribe(ChatId(msg.chat.id)) {
            Ok(()) => {
                self.reply(msg, "You successfully un-subscribed from news.")
                    .await
            }
            Err(e) => {
                tracing::warn!(error = %e, "unsubscribe failed");
                self.reply(msg, "Something went wrong, please try again later.")
                    .await;
            }
        }
    }

    /// On-demand most-recent-post query; goes straight to the source
    /// client, outside the fetch/dispatch pipeline.
    async fn cmd_latest(&self, msg: &Message) {
        match self.source.latest().await {
            Ok(Some(item)) => self.reply(msg, &item.text).await,
            Ok(None) => self.reply(msg, "Nothing to show yet.").await,
            Err(e) => {
                tracing::warn!(error = %e, "latest query failed");
                self.reply(msg, "Source is not responding, try again later.")
                    .await;
            }
        }
    }

    async fn cmd_terminate(&self, msg: &Message) {
        if !self.is_admin(msg) {
            self.reply(msg, "You are not authorized to terminate the bot.")
                .await;
            return;
        }
        self.reply(msg, "Terminating bot. Please restart manually.")
            .await;
        tracing::info!("terminate requested by admin");
        let _ = self.shutdown.send(true);
    }

    fn is_admin(&self, msg: &Message) -> bool {
        msg.from
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .is_some_and(|name| self.admins.iter().any(|a| a == name))
    }

    async fn reply(&self, msg: &Message, text: &str) {
        if let Err(e) = self.client.send(ChatId(msg.chat.id), text).await {
            tracing::warn!(chat = msg.chat.id, error = %e, "reply failed");
        }
    }
}

/// First token of a message, with any `@BotName` suffix stripped.
/// Returns `None` for plain text.
fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.split('@').next().unwrap_or(first);
    Some(cmd.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/start"), Some("/start".into()));
        assert_eq!(parse_command("/START@RelayBot now"), Some("/start".into()));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }
}

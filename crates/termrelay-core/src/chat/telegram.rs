//! Telegram chat transport, built on `teloxide`'s long-polling `Dispatcher`.
//!
//! Inbound messages are forwarded from the dispatcher's own tokio task into
//! a bounded channel; `recv` drains that channel without blocking the
//! dispatcher. A single authorized chat id is allowed through — everyone
//! else is silently dropped (deny-by-default).

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::errors::ChatError;

use super::{ChatTransport, InboundMessage};

/// Telegram's hard message limit is 4096 characters; stay under it.
const CHUNK_MAX: usize = 4090;

pub struct TelegramTransport {
    bot: Bot,
    authorized_chat_id: i64,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    _dispatch_handle: tokio::task::JoinHandle<()>,
}

impl TelegramTransport {
    /// Start the bot and spawn its long-polling dispatch loop. Only
    /// messages from `authorized_chat_id` are forwarded into `recv`.
    pub fn spawn(token: String, authorized_chat_id: i64) -> Self {
        let bot = Bot::new(token);
        let (tx, inbound_rx) = mpsc::channel(64);

        let handler = Update::filter_message().endpoint({
            let tx = tx.clone();
            move |msg: Message| {
                let tx = tx.clone();
                async move {
                    handle_inbound(msg, authorized_chat_id, &tx).await;
                    respond(())
                }
            }
        });

        let dispatch_bot = bot.clone();
        let dispatch_handle = tokio::spawn(async move {
            Dispatcher::builder(dispatch_bot, handler)
                .default_handler(|_upd| async {})
                .build()
                .dispatch()
                .await;
        });

        Self {
            bot,
            authorized_chat_id,
            inbound_rx: Mutex::new(inbound_rx),
            _dispatch_handle: dispatch_handle,
        }
    }
}

async fn handle_inbound(msg: Message, authorized_chat_id: i64, tx: &mpsc::Sender<InboundMessage>) {
    let chat_id = msg.chat.id.0;
    if chat_id != authorized_chat_id {
        debug!(event = "chat.telegram.unauthorized_sender", chat_id);
        return;
    }
    let Some(text) = msg.text() else { return };
    if tx
        .send(InboundMessage {
            chat_id,
            text: text.to_string(),
        })
        .await
        .is_err()
    {
        warn!(event = "chat.telegram.inbound_channel_closed");
    }
}

#[async_trait::async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<(), ChatError> {
        send_response(&self.bot, ChatId(self.authorized_chat_id), text).await;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<InboundMessage>, ChatError> {
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(msg) => Ok(Some(msg)),
            None => Err(ChatError::RequestFailed {
                message: "telegram dispatcher task ended".to_string(),
            }),
        }
    }
}

/// Split `text` into Telegram-sized chunks, closing and reopening any open
/// fenced code block across a split so rendering stays correct.
fn split_chunks_smart(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut fence_open = false;

    for line in &lines {
        let cost = if current.is_empty() { line.len() } else { 1 + line.len() };

        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            if fence_open {
                current.push_str("\n```");
            }
            chunks.push(std::mem::take(&mut current));
            if fence_open {
                current.push_str("```\n");
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        if line.trim_start().starts_with("```") {
            fence_open = !fence_open;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Escape Telegram MarkdownV2 special characters.
fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if matches!(
            ch,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|' | '{'
                | '}' | '.' | '!'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Send `text`, chunked to the Telegram limit. Tries MarkdownV2 first and
/// falls back to plain text if Telegram rejects the parse mode.
async fn send_response(bot: &Bot, chat_id: ChatId, text: &str) {
    let chunks = split_chunks_smart(text);
    for (i, chunk) in chunks.iter().enumerate() {
        let escaped = escape_markdown_v2(chunk);
        let sent = bot
            .send_message(chat_id, &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await;

        if sent.is_err() {
            if let Err(e) = bot.send_message(chat_id, chunk).await {
                warn!(event = "chat.telegram.send_failed", chunk_index = i, error = %e);
            }
        }

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// `--register` discovery mode: wait for the first inbound message from
/// anyone, reply with their chat id, and return it.
pub async fn discover_chat_id(token: &str) -> Result<i64, ChatError> {
    let bot = Bot::new(token);
    let (tx, rx) = mpsc::channel(1);
    let tx = Arc::new(tx);

    let handler = Update::filter_message().endpoint({
        let tx = Arc::clone(&tx);
        move |msg: Message| {
            let tx = Arc::clone(&tx);
            async move {
                let _ = tx.try_send(msg.chat.id.0);
                respond(())
            }
        }
    });

    let dispatch_bot = bot.clone();
    let dispatch_handle = tokio::spawn(async move {
        Dispatcher::builder(dispatch_bot, handler)
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    });

    let mut rx = rx;
    let chat_id = rx.recv().await.ok_or_else(|| ChatError::RequestFailed {
        message: "no inbound message received before channel closed".to_string(),
    })?;

    dispatch_handle.abort();
    send_response(&bot, ChatId(chat_id), &format!("Your chat id is `{chat_id}`.")).await;
    Ok(chat_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(split_chunks_smart("hello").len(), 1);
    }

    #[test]
    fn over_limit_splits_on_newline() {
        let line = "a".repeat(2000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks_smart(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX + 4, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn escapes_markdown_v2_specials() {
        let escaped = escape_markdown_v2("Hello. World! (test)");
        assert!(escaped.contains("\\."));
        assert!(escaped.contains("\\!"));
        assert!(escaped.contains("\\("));
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(escape_markdown_v2("hello world 123"), "hello world 123");
    }
}

//! ChatTarget - sends records to Telegram chats through the Bot API

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};
use validator::Validate;

use contracts::{ChatConfig, ContractError, LogRecord, Target};

use super::{check_timestamp_format, readable};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters with a meaning in MarkdownV2
const MARKDOWN_RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text for Telegram's MarkdownV2 parse mode
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Target posting every record to each configured chat.
///
/// Best effort: failures are traced and never returned.
pub struct ChatTarget {
    name: String,
    config: ChatConfig,
    client: Client,
    url: String,
}

impl ChatTarget {
    pub fn build(name: impl Into<String>, config: ChatConfig) -> Result<Self, ContractError> {
        let name = name.into();
        config.validate()?;
        check_timestamp_format(&name, &config.timestamp)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ContractError::target_build(&name, e.to_string()))?;
        let url = format!(
            "{}/bot{}/sendMessage",
            config.api_base.trim_end_matches('/'),
            config.token
        );

        Ok(Self {
            name,
            config,
            client,
            url,
        })
    }

    fn format(&self, record: &LogRecord) -> String {
        let timestamp = record.time.format(&self.config.timestamp).to_string();
        let mut message = format!(
            "_{} · __{}__ {}_\n*{}:* {}",
            escape_markdown(&timestamp),
            escape_markdown(&record.component),
            escape_markdown(&record.instance),
            escape_markdown(&record.level),
            escape_markdown(&record.title)
        );
        if let Some(data) = &record.data {
            message.push_str("\n`");
            message.push_str(&escape_markdown(&readable(data)));
            message.push('`');
        }
        message
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "MarkdownV2",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Target for ChatTarget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "chat_target_log", skip_all, fields(target_name = %self.name))]
    async fn log(&mut self, record: &LogRecord) -> Result<(), ContractError> {
        let text = self.format(record);
        for &chat_id in &self.config.chats {
            match self.send(chat_id, &text).await {
                Ok(()) => debug!(chat_id, "Log sent to chat"),
                // The url carries the bot token
                Err(e) => warn!(chat_id, error = %e.without_url(), "Failed to send log to chat"),
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

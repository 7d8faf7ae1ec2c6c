use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::config::TelegramConfig;

/// Body of a Bot API `sendMessage` call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendMessage {
    pub chat_id: String,
    pub text: String,
    pub disable_web_page_preview: bool,
}

impl SendMessage {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            disable_web_page_preview: true,
        }
    }
}

/// What the Bot API said about a message it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Non-2xx reply; `details` is the raw response body, or empty if it
    /// could not be read.
    Rejected { status: StatusCode, details: String },
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send one message. Never retried: a retry after an unseen success
    /// would post the lead twice.
    ///
    /// `Err` means the request never got an HTTP answer (connect, DNS,
    /// timeout). The token is part of the URL, so it is stripped from the
    /// error before it is returned.
    pub async fn send_message(&self, bot_token: &str, message: &SendMessage) -> Result<SendOutcome> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, bot_token);

        debug!(
            "Sending message to Telegram chat {} ({} bytes)",
            message.chat_id,
            message.text.len()
        );

        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to send request to Telegram")?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Ok(SendOutcome::Rejected { status, details });
        }

        Ok(SendOutcome::Delivered)
    }
}

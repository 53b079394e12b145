//! Discord webhook notifications.

use super::Notifier;
use crate::error::ConfigError;
use crate::updater::digest::truncate_digest;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const WEBHOOK_PREFIXES: [&str; 2] = [
    "https://discord.com/api/webhooks/",
    "https://discordapp.com/api/webhooks/",
];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Daemon error text can echo registry credentials; keep only the head of it.
const MAX_ERROR_LEN: usize = 200;

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str) -> std::result::Result<Self, ConfigError> {
        if !WEBHOOK_PREFIXES.iter().any(|p| webhook_url.starts_with(p)) {
            return Err(ConfigError::InvalidWebhook);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }

    async fn send(&self, content: String) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("discord webhook returned status {}", resp.status());
        }
        Ok(())
    }
}

pub(crate) fn update_message(group: &str, image: &str, old: &str, new: &str) -> String {
    format!(
        "✅ Updated {}\nImage: {}\n{} → {}",
        group,
        image,
        truncate_digest(old),
        truncate_digest(new)
    )
}

pub(crate) fn error_message(group: &str, message: &str) -> String {
    let message = match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    };
    format!("❌ Failed to update {}\nError: {}", group, message)
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_update(
        &self,
        group: &str,
        image: &str,
        old_digest: &str,
        new_digest: &str,
    ) -> Result<()> {
        self.send(update_message(group, image, old_digest, new_digest))
            .await
    }

    async fn send_error(&self, group: &str, message: &str) -> Result<()> {
        self.send(error_message(group, message)).await
    }
}

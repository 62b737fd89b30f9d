//! Minimal Discord REST client: post to one channel and purge it.

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DiscordConfig;

const API_BASE: &str = "https://discord.com/api/v10";
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discord returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    channel_id: String,
}

impl DiscordClient {
    pub fn new(token: &str, channel_id: &str) -> Result<Self, DiscordError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("DiscordBot (api-uptime-monitor, ", env!("CARGO_PKG_VERSION"), ")"))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            token: token.to_string(),
            channel_id: channel_id.to_string(),
        })
    }

    /// `None` when no bot token and channel are configured.
    pub fn from_config(config: &DiscordConfig) -> Result<Option<Self>, DiscordError> {
        let Some((token, channel)) = config.bot_credentials() else {
            return Ok(None);
        };
        let mut client = Self::new(token, channel)?;
        if let Some(base) = config.api_base.as_deref().filter(|b| !b.is_empty()) {
            client = client.with_base_url(base.trim_end_matches('/'));
        }
        Ok(Some(client))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn channel_url(&self, suffix: &str) -> String {
        format!("{}/channels/{}{}", self.base_url, self.channel_id, suffix)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    pub async fn send_message(&self, content: &str) -> Result<(), DiscordError> {
        let resp = self
            .http
            .post(self.channel_url("/messages"))
            .header("Authorization", self.auth())
            .json(&json!({ "content": content }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn fetch_page(&self) -> Result<Vec<MessageRef>, DiscordError> {
        let resp = self
            .http
            .get(self.channel_url("/messages"))
            .query(&[("limit", PAGE_SIZE)])
            .header("Authorization", self.auth())
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<(), DiscordError> {
        let resp = self
            .http
            .post(self.channel_url("/messages/bulk-delete"))
            .header("Authorization", self.auth())
            .json(&json!({ "messages": ids }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<(), DiscordError> {
        let resp = self
            .http
            .delete(self.channel_url(&format!("/messages/{id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Deletes every message in the channel that Discord still allows to be
    /// bulk-deleted. Returns how many were removed.
    pub async fn clear_channel(&self, now: DateTime<Utc>) -> Result<usize, DiscordError> {
        // Bulk delete rejects anything older than two weeks; keep a minute of slack.
        let cutoff = now - chrono::Duration::days(14) + chrono::Duration::minutes(1);
        let mut total = 0;

        loop {
            let page = self.fetch_page().await?;
            let fetched = page.len();
            let eligible: Vec<String> = page
                .into_iter()
                .filter(|m| snowflake_timestamp(&m.id).is_some_and(|ts| ts > cutoff))
                .map(|m| m.id)
                .collect();

            match eligible.as_slice() {
                [] => break,
                [single] => self.delete_message(single).await?,
                many => self.bulk_delete(many).await?,
            }
            total += eligible.len();
            info!(deleted = eligible.len(), total, "deleted message batch");

            // Old messages stay behind and would come back on the next page.
            if fetched < PAGE_SIZE || eligible.len() < fetched {
                break;
            }
        }

        debug!(total, channel = %self.channel_id, "channel cleared");
        Ok(total)
    }
}

async fn check(resp: Response) -> Result<Response, DiscordError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(DiscordError::Api { status, body })
    }
}

/// Creation time encoded in a Discord snowflake id.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let millis = i64::try_from(raw >> 22).ok()? + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis)
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::{Target, BUGTRACKER, OCTADESK};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub bugtracker: BugtrackerConfig,
    #[serde(default)]
    pub octadesk: OctadeskConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

fn default_check_interval() -> u64 { 60 }
fn default_api_port() -> u16 { 10001 }
pub fn default_timeout() -> u64 { 60_000 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            api_port: default_api_port(),
            bugtracker: BugtrackerConfig::default(),
            octadesk: OctadeskConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BugtrackerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub policy: AlertPolicy,
}

impl Default for BugtrackerConfig {
    fn default() -> Self {
        Self { url: String::new(), timeout_ms: default_timeout(), policy: AlertPolicy::default() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OctadeskConfig {
    #[serde(default)]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub policy: AlertPolicy,
}

impl Default for OctadeskConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_ms: default_timeout(),
            policy: AlertPolicy::default(),
        }
    }
}

/// Where notifications go. A bot token with a channel id wins over a webhook.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub channel_id: Option<String>,
    pub webhook_url: Option<String>,
    /// Overrides the Discord REST base URL.
    #[serde(default)]
    pub api_base: Option<String>,
}

impl DiscordConfig {
    pub fn bot_credentials(&self) -> Option<(&str, &str)> {
        match (self.token.as_deref(), self.channel_id.as_deref()) {
            (Some(token), Some(channel)) if !token.is_empty() && !channel.is_empty() => {
                Some((token, channel))
            }
            _ => None,
        }
    }
}

/// Optional per-endpoint notification rules. Both off means the baseline
/// behaviour: one "down" and one "recovered" message per episode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Send a "still down" reminder each time the outage crosses another
    /// multiple of this many seconds.
    #[serde(default)]
    pub repeat_down_after_secs: Option<u64>,
    /// Recoveries shorter than this are logged but not announced.
    #[serde(default)]
    pub min_recovery_notice_secs: Option<u64>,
}

/// `None` when the value does not fit a `chrono::Duration`.
fn policy_duration(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

impl AlertPolicy {
    pub fn repeat_down_after(&self) -> Option<chrono::Duration> {
        self.repeat_down_after_secs
            .filter(|secs| *secs > 0)
            .and_then(policy_duration)
    }

    pub fn min_recovery_notice(&self) -> Option<chrono::Duration> {
        self.min_recovery_notice_secs.and_then(policy_duration)
    }

    fn validate(&self, endpoint: &str) -> Result<()> {
        let fields = [
            ("repeat_down_after_secs", self.repeat_down_after_secs),
            ("min_recovery_notice_secs", self.min_recovery_notice_secs),
        ];
        for (field, value) in fields {
            if let Some(secs) = value {
                if policy_duration(secs).is_none() {
                    bail!("{endpoint} policy.{field} is out of range: {secs}");
                }
            }
        }
        Ok(())
    }
}

impl MonitorConfig {
    /// Reads the JSON file if present, then layers environment variables on top.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            info!(path = %path.display(), "config file not found, using environment only");
            MonitorConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("API_URL1") {
            self.bugtracker.url = url;
        }
        if let Some(url) = lookup("API_URL2") {
            self.octadesk.base_url = url;
        }
        if let Some(key) = lookup("API_OCTADESK_KEY") {
            self.octadesk.api_key = Some(key);
        }
        if let Some(channel) = lookup("CHANNEL_ID") {
            self.discord.channel_id = Some(channel);
        }
        if let Some(token) = lookup("BOT_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(url) = lookup("DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = Some(url);
        }
        if let Some(port) = lookup("MONITOR_PORT") {
            self.api_port = port
                .trim()
                .parse()
                .with_context(|| format!("MONITOR_PORT is not a valid port: {port}"))?;
        }
        if let Some(interval) = lookup("CHECK_INTERVAL_SECS") {
            self.check_interval = interval
                .trim()
                .parse()
                .with_context(|| format!("CHECK_INTERVAL_SECS is not a number: {interval}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval == 0 {
            bail!("check_interval must be at least one second");
        }
        if self.bugtracker.url.trim().is_empty() {
            bail!("Bugtracker URL is missing (bugtracker.url or API_URL1)");
        }
        if self.octadesk.base_url.trim().is_empty() {
            bail!("Octadesk URL is missing (octadesk.base_url or API_URL2)");
        }
        if self.octadesk.api_key.as_deref().map_or(true, str::is_empty) {
            bail!("Octadesk API key is missing (octadesk.api_key or API_OCTADESK_KEY)");
        }
        if self.bugtracker.timeout_ms == 0 {
            bail!("bugtracker.timeout_ms must be greater than zero");
        }
        if self.octadesk.timeout_ms == 0 {
            bail!("octadesk.timeout_ms must be greater than zero");
        }
        self.bugtracker.policy.validate(BUGTRACKER)?;
        self.octadesk.policy.validate(OCTADESK)?;
        if self.discord.bot_credentials().is_none()
            && self.discord.webhook_url.as_deref().map_or(true, str::is_empty)
        {
            bail!("No notification destination: set BOT_TOKEN and CHANNEL_ID, or DISCORD_WEBHOOK_URL");
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// The two monitored endpoints, in evaluation order.
    pub fn targets(&self) -> Vec<Target> {
        let octadesk_url = format!(
            "{}/chat?sort[direction]=asc",
            self.octadesk.base_url.trim_end_matches('/')
        );
        let mut octadesk_headers = vec![("accept".to_string(), "application/json".to_string())];
        if let Some(key) = &self.octadesk.api_key {
            octadesk_headers.push(("X-API-KEY".to_string(), key.clone()));
        }

        vec![
            Target {
                name: BUGTRACKER.into(),
                url: self.bugtracker.url.clone(),
                headers: Vec::new(),
                timeout: Duration::from_millis(self.bugtracker.timeout_ms),
                policy: self.bugtracker.policy,
            },
            Target {
                name: OCTADESK.into(),
                url: octadesk_url,
                headers: octadesk_headers,
                timeout: Duration::from_millis(self.octadesk.timeout_ms),
                policy: self.octadesk.policy,
            },
        ]
    }
}

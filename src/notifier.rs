//! Best-effort delivery of status messages.
//!
//! Notifications are queued by the engine and delivered by a single
//! background task, in order. A failed delivery is logged and dropped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::DiscordConfig;
use crate::discord::DiscordClient;
use crate::models::Notification;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Never fails; delivery errors are logged by the implementation.
    async fn notify(&self, text: &str);
}

#[async_trait]
impl Notifier for DiscordClient {
    async fn notify(&self, text: &str) {
        match self.send_message(text).await {
            Ok(()) => debug!("notification delivered to channel"),
            Err(e) => error!(error = %e, "failed to send channel message"),
        }
    }
}

/// Posts to a Discord webhook URL.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create webhook client")?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, text: &str) {
        let payload = serde_json::json!({
            "username": "API Monitor",
            "content": text,
        });
        match self.http.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => debug!("webhook delivered"),
            Ok(resp) => error!(status = %resp.status(), "webhook rejected notification"),
            Err(e) => error!(error = %e, "failed to send webhook"),
        }
    }
}

/// Picks the configured destination; the bot channel wins over a webhook.
pub fn from_config(config: &DiscordConfig) -> Result<Arc<dyn Notifier>> {
    if let Some(client) = DiscordClient::from_config(config).context("Failed to create Discord client")? {
        info!(channel = config.channel_id.as_deref().unwrap_or_default(), "notifications go to Discord channel");
        return Ok(Arc::new(client));
    }
    match config.webhook_url.as_deref() {
        Some(url) if !url.is_empty() => {
            info!("notifications go to Discord webhook");
            Ok(Arc::new(WebhookNotifier::new(url)?))
        }
        _ => bail!("No notification destination configured"),
    }
}

pub type NotificationSender = mpsc::UnboundedSender<Notification>;

pub fn notification_channel() -> (NotificationSender, mpsc::UnboundedReceiver<Notification>) {
    mpsc::unbounded_channel()
}

/// Delivers queued notifications until every sender is dropped.
pub async fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Notification>, notifier: Arc<dyn Notifier>) {
    while let Some(notification) = rx.recv().await {
        info!(endpoint = %notification.endpoint, kind = ?notification.kind, "sending notification");
        notifier.notify(&notification.message()).await;
    }
    debug!("notification dispatcher stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures delivered texts.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use crate::discord::fake::{self, Channel};
    use crate::models::{Downtime, NotificationKind};
    use std::sync::Mutex;

    fn down(endpoint: &str) -> Notification {
        Notification { endpoint: endpoint.into(), kind: NotificationKind::Down }
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let recorder = Arc::new(RecordingNotifier::default());
        let (tx, rx) = notification_channel();
        let handle = tokio::spawn(run_dispatcher(rx, recorder.clone()));

        tx.send(down("Bugtracker")).unwrap();
        tx.send(Notification {
            endpoint: "Bugtracker".into(),
            kind: NotificationKind::Recovered { downtime: Downtime::from_millis(61_000) },
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("fora do ar"));
        assert!(messages[1].contains("0 horas, 1 minutos e 1 segundos"));
    }

    #[tokio::test]
    async fn discord_client_notifies_channel() {
        let channel = Arc::new(Mutex::new(Channel::default()));
        let base = fake::serve(channel.clone()).await;
        let client = DiscordClient::new("test-token", "42").unwrap().with_base_url(base);

        client.notify("ping").await;
        assert_eq!(channel.lock().unwrap().sent, vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/webhook").unwrap();
        notifier.notify("nobody is listening").await;

        let channel = Arc::new(Mutex::new(Channel::default()));
        let base = fake::serve(channel.clone()).await;
        let client = DiscordClient::new("wrong-token", "42").unwrap().with_base_url(base);
        client.notify("rejected").await;
        assert!(channel.lock().unwrap().sent.is_empty());
    }

    #[test]
    fn bot_credentials_win_over_webhook() {
        let config = DiscordConfig {
            token: Some("t".into()),
            channel_id: Some("1".into()),
            webhook_url: Some("https://discord.com/api/webhooks/1/x".into()),
            api_base: None,
        };
        assert!(from_config(&config).is_ok());
        assert!(from_config(&DiscordConfig::default()).is_err());
    }
}

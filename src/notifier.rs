//! High-value lead alerts.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Notification sink for scheduled discovery runs.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert(&self, job_id: Uuid, high_value_count: usize, summary: &str) -> anyhow::Result<()>;
}

/// Writes alerts to the log. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, job_id: Uuid, high_value_count: usize, summary: &str) -> anyhow::Result<()> {
        tracing::info!(
            "🔥 Job {} found {} high-value leads: {}",
            job_id,
            high_value_count,
            summary
        );
        Ok(())
    }
}

/// Posts alerts as JSON to a webhook.
pub struct WebhookNotifier {
    webhook_url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, http: Client) -> Self {
        Self { webhook_url, http }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn alert(&self, job_id: Uuid, high_value_count: usize, summary: &str) -> anyhow::Result<()> {
        let payload = json!({
            "type": "high_value_leads",
            "job_id": job_id,
            "high_value_count": high_value_count,
            "summary": summary,
            "text": format!("{} high-value leads discovered: {}", high_value_count, summary),
        });

        let resp = self.http.post(&self.webhook_url).json(&payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("Alert webhook returned {}: {}", status, body);
            anyhow::bail!("Alert webhook returned {}", status);
        }

        tracing::info!("Alert sent for job {}", job_id);
        Ok(())
    }
}

/// Fire-and-forget: the alert runs on its own task and failures are only logged.
pub fn spawn_alert(notifier: Arc<dyn Notifier>, job_id: Uuid, high_value_count: usize, summary: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.alert(job_id, high_value_count, &summary).await {
            tracing::warn!("Failed to send alert for job {}: {}", job_id, e);
        }
    });
}

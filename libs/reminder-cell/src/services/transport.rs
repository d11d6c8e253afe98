use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;

/// Outbound messaging seam. The production implementation talks to the
/// WhatsApp gateway; tests substitute their own.
#[async_trait]
pub trait ReminderTransport: Send + Sync {
    async fn send_text(&self, phone: &str, message: &str) -> Result<()>;
}

pub struct WhatsAppClient {
    client: Client,
    api_url: String,
    api_token: String,
}

impl WhatsAppClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.whatsapp_api_url.clone(),
            api_token: config.whatsapp_api_token.clone(),
        }
    }
}

#[async_trait]
impl ReminderTransport for WhatsAppClient {
    async fn send_text(&self, phone: &str, message: &str) -> Result<()> {
        debug!("Sending WhatsApp message to {}", phone);

        let response = self
            .client
            .post(format!("{}/send", self.api_url))
            .bearer_auth(&self.api_token)
            .json(&json!({
                "to": phone,
                "message": message
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gateway returned {}: {}", status, body));
        }

        Ok(())
    }
}

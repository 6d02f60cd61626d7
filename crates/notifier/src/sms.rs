//! TextMagic SMS client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use hireport_common::config::AppConfig;
use hireport_engine::transport::{SmsReceipt, SmsSender};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    text: &'a str,
    phones: &'a str,
}

pub struct TextMagicClient {
    http_client: Client,
    base_url: String,
    username: String,
    api_key: String,
}

impl TextMagicClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    /// `None` when TextMagic credentials are not configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        match (&config.textmagic_username, &config.textmagic_api_key) {
            (Some(username), Some(api_key)) => {
                tracing::info!(base_url = %config.textmagic_api_url, "TextMagic client initialized");
                Some(Self::new(
                    config.textmagic_api_url.clone(),
                    username.clone(),
                    api_key.clone(),
                ))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl SmsSender for TextMagicClient {
    async fn send_sms(&self, destination: &str, body: &str) -> SmsReceipt {
        let url = format!("{}/api/v2/messages", self.base_url);
        // TextMagic wants E.164 digits without the leading plus
        let phones = destination.trim_start_matches('+');

        let response = self
            .http_client
            .post(&url)
            .header("X-TM-Username", &self.username)
            .header("X-TM-Key", &self.api_key)
            .json(&SendMessageRequest { text: body, phones })
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(phones, "TextMagic accepted message");
                SmsReceipt::delivered()
            }
            Ok(response) => {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                SmsReceipt::failed(format!("TextMagic returned {}: {}", status, error_text))
            }
            Err(e) => SmsReceipt::failed(format!("TextMagic request failed: {}", e)),
        }
    }

    fn name(&self) -> &'static str {
        "textmagic"
    }
}

//! Outbound transport seams.
//!
//! The engine never talks SMTP or HTTP itself; it hands fully built messages
//! to a `Mailer` or `SmsSender`. Concrete implementations live in the
//! notifier crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An email ready to hand to a mail transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    /// Recipient email address.
    pub to: String,
    /// Recipient display name, may be empty.
    pub to_name: String,
    /// Sender email address.
    pub from: String,
    /// Sender display name.
    pub from_name: String,
    pub reply_to: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl OutgoingEmail {
    /// Address the message to a single recipient.
    pub fn to(&mut self, email: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.to = email.into();
        self.to_name = name.into();
        self
    }

    /// Override the default sender.
    pub fn from(&mut self, email: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.from = email.into();
        self.from_name = name.into();
        self
    }

    pub fn reply_to(&mut self, email: impl Into<String>) -> &mut Self {
        self.reply_to = Some(email.into());
        self
    }
}

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Result of a single SMS send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReceipt {
    pub success: bool,
    pub error: Option<String>,
}

impl SmsReceipt {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), TransportError>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

/// SMS transport. Failures are reported in the receipt, not as errors.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, destination: &str, body: &str) -> SmsReceipt;

    fn name(&self) -> &'static str;
}

/// Crude HTML → text conversion for the plain-text alternative part.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut tag = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "br/" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3")
                    && !text.ends_with('\n')
                {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => text.push(ch),
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x3D;", "=")
        .replace("&#x60;", "`")
        .replace("&amp;", "&");

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

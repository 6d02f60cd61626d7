//! SMTP mailer using lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use hireport_common::config::AppConfig;
use hireport_engine::transport::{Mailer, OutgoingEmail, TransportError};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport from config.
    ///
    /// `SMTP_USE_TLS` selects a TLS relay; otherwise a plaintext connection is
    /// used (Mailpit/Mailhog in development), with credentials only if set.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        let builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let mut builder = builder.port(config.smtp_port);

        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        tracing::info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            tls = config.smtp_use_tls,
            "SMTP mailer configured"
        );

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str, name: &str, field: &str) -> Result<Mailbox, TransportError> {
    let address: Address = address
        .trim()
        .parse()
        .map_err(|e| TransportError::Rejected(format!("Invalid {} address: {}", field, e)))?;
    let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, address))
}

/// Assemble a multipart/alternative message (text + HTML).
pub fn build_message(email: &OutgoingEmail) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(mailbox(&email.from, &email.from_name, "from")?)
        .to(mailbox(&email.to, &email.to_name, "to")?)
        .subject(email.subject.as_str());

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(mailbox(reply_to, "", "reply-to")?);
    }
    for cc in &email.cc {
        builder = builder.cc(mailbox(cc, "", "cc")?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(mailbox(bcc, "", "bcc")?);
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text_body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html_body.clone()),
                ),
        )
        .map_err(|e| TransportError::Rejected(format!("Failed to build message: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = build_message(email)?;

        self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                TransportError::Rejected(e.to_string())
            } else {
                TransportError::Unavailable(e.to_string())
            }
        })?;

        tracing::debug!(to = %email.to, subject = %email.subject, "SMTP accepted message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

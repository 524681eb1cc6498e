/// Mail delivery backends
///
/// The orchestrator only talks to the [`Mailer`] trait. Two backends ship:
///
/// - [`LogMailer`] writes each email to the log. It is the default, so a
///   development setup needs no mail infrastructure (OTP codes show up in
///   the worker output).
/// - [`HttpMailer`] POSTs each email as JSON to a relay service with an
///   optional bearer token.
///
/// # Example
///
/// ```no_run
/// use nexusflow_worker::mailer::{HttpMailer, Mailer};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = HttpMailer::new("https://relay.example.com/send", Some("token".to_string()))?;
/// println!("using {}", mailer.name());
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use nexusflow_shared::models::email_outbox::OutboxEmail;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    /// The relay answered with a non-success status
    #[error("Relay rejected the email with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Network failure or timeout
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Mailer configuration error: {0}")]
    Config(String),
}

pub type MailerResult<T> = Result<T, MailerError>;

/// Delivers one email. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    async fn send(&self, from: &str, email: &OutboxEmail) -> MailerResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, from: &str, email: &OutboxEmail) -> MailerResult<()> {
        tracing::info!(
            email_id = %email.id,
            from = %from,
            to = %email.to_address,
            subject = %email.subject,
            body = %email.body_text,
            "Email delivered to log"
        );
        Ok(())
    }
}

/// JSON body sent to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// The outbox id; relays can use it to drop duplicates after a retry
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl RelayMessage {
    pub fn new(from: &str, email: &OutboxEmail) -> Self {
        Self {
            id: email.id.to_string(),
            from: from.to_string(),
            to: email.to_address.clone(),
            subject: email.subject.clone(),
            text: email.body_text.clone(),
        }
    }
}

pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpMailer {
    const TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(url: impl Into<String>, token: Option<String>) -> MailerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| MailerError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, from: &str, email: &OutboxEmail) -> MailerResult<()> {
        let mut request = self.client.post(&self.url).json(&RelayMessage::new(from, email));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                body: body.trim().chars().take(500).collect(),
            });
        }

        tracing::debug!(email_id = %email.id, status = status.as_u16(), "Relay accepted email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexusflow_shared::models::email_outbox::EmailStatus;
    use uuid::Uuid;

    fn email() -> OutboxEmail {
        OutboxEmail {
            id: Uuid::new_v4(),
            to_address: "jane@acme.test".to_string(),
            subject: "Hello".to_string(),
            body_text: "Hi Jane".to_string(),
            status: EmailStatus::Sending,
            attempts: 1,
            last_error: None,
            next_attempt_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sent_at: None,
        }
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(LogMailer.send("noreply@nexusflow.test", &email()).await.is_ok());
        assert_eq!(LogMailer.name(), "log");
    }

    #[test]
    fn test_relay_message_shape() {
        let email = email();
        let message = RelayMessage::new("NexusFlow <noreply@nexusflow.test>", &email);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["id"], email.id.to_string());
        assert_eq!(json["to"], "jane@acme.test");
        assert_eq!(json["text"], "Hi Jane");
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_http_mailer_reports_transport_errors() {
        let mailer = HttpMailer::new("http://127.0.0.1:1/send", None).unwrap();
        let err = mailer.send("noreply@nexusflow.test", &email()).await.unwrap_err();
        assert!(matches!(err, MailerError::Transport(_)));
    }
}

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub mod render;

type HmacSha256 = Hmac<Sha256>;

/// A rendered email ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Mail channel errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Relay request failed: {0}")]
    Relay(String),
    #[error("Relay returned status {0}")]
    RelayStatus(u16),
}

/// Outbound mail channel. The report worker is the only producer; swapping
/// implementations swaps the delivery mechanism, not the workflow.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Delivers mail by POSTing the message to an HTTP relay service. The relay
/// owns templating of the outer envelope, provider selection, and bounce
/// handling; this side only signs and ships the payload.
#[derive(Clone)]
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    from_address: String,
    from_name: Option<String>,
    signing_secret: Option<String>,
}

impl HttpRelayMailer {
    pub fn new(
        relay_url: impl Into<String>,
        from_address: impl Into<String>,
        from_name: Option<String>,
        signing_secret: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MailError::Relay(e.to_string()))?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            from_address: from_address.into(),
            from_name,
            signing_secret,
        })
    }

    fn sign_payload(&self, timestamp: &str, body: &str) -> Option<String> {
        let secret = self.signing_secret.as_ref()?;
        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    async fn post_once(
        &self,
        body: &str,
        timestamp: &str,
        signature: Option<&str>,
    ) -> Result<(), MailError> {
        let mut request = self
            .client
            .post(&self.relay_url)
            .header("Content-Type", "application/json")
            .header("Timestamp", timestamp)
            .body(body.to_string());

        if let Some(sig) = signature {
            request = request.header("X-Signature", sig);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Relay(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MailError::RelayStatus(response.status().as_u16()))
        }
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    from_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_name: Option<&'a str>,
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let payload = RelayPayload {
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
            from_address: &self.from_address,
            from_name: self.from_name.as_deref(),
        };
        let body =
            serde_json::to_string(&payload).map_err(|e| MailError::Relay(e.to_string()))?;
        let timestamp = chrono::Utc::now().to_rfc3339();
        let signature = self.sign_payload(&timestamp, &body);

        // One retry; persistent failure goes back to the caller, which owns
        // the queue-level retry policy.
        match self.post_once(&body, &timestamp, signature.as_deref()).await {
            Ok(()) => {
                info!("Report email delivered through relay");
                Ok(())
            }
            Err(first) => {
                warn!("Relay delivery failed, retrying once: {}", first);
                self.post_once(&body, &timestamp, signature.as_deref())
                    .await
                    .map(|()| info!("Report email delivered through relay on retry"))
            }
        }
    }
}

/// Development fallback when no relay is configured: logs the delivery
/// instead of sending anything.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body_bytes = message.html_body.len(),
            "mail relay not configured; logging email instead of sending"
        );
        Ok(())
    }
}

/// Captures sent mail for assertions in tests.
#[derive(Debug, Default)]
pub struct InMemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_message() -> EmailMessage {
        EmailMessage {
            to: "owner@example.com".to_string(),
            subject: "Top Products Report: 2025-01-01 to 2025-01-31".to_string(),
            html_body: "<table></table>".to_string(),
        }
    }

    #[tokio::test]
    async fn relay_mailer_posts_signed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header_exists("X-Signature"))
            .and(header_exists("Timestamp"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpRelayMailer::new(
            format!("{}/send", server.uri()),
            "reports@storefront.local",
            Some("Sales Reports".to_string()),
            Some("relay-secret".to_string()),
            5,
        )
        .unwrap();

        mailer.send(sample_message()).await.unwrap();
    }

    #[tokio::test]
    async fn relay_mailer_retries_once_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let mailer =
            HttpRelayMailer::new(server.uri(), "reports@storefront.local", None, None, 5).unwrap();

        let result = mailer.send(sample_message()).await;
        assert!(matches!(result, Err(MailError::RelayStatus(503))));
    }

    #[tokio::test]
    async fn in_memory_mailer_captures_messages() {
        let mailer = InMemoryMailer::new();
        mailer.send(sample_message()).await.unwrap();

        let sent = mailer.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
    }
}

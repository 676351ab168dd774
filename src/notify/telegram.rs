use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("no bot token configured")]
    MissingToken,
}

/// Outbound message port.
pub trait Notifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Sends through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, token: Option<&str>) -> Result<Self, NotifyError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(NotifyError::MissingToken)?;
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = SendMessage { chat_id, text, disable_web_page_preview: true };

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = ?status, chat_id, "Non-success response sending message");
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }
        debug!(chat_id, "Message accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_required() {
        assert!(matches!(
            TelegramNotifier::new("https://api.telegram.org", None),
            Err(NotifyError::MissingToken)
        ));
        assert!(matches!(
            TelegramNotifier::new("https://api.telegram.org", Some("")),
            Err(NotifyError::MissingToken)
        ));
        let n = TelegramNotifier::new("https://api.telegram.org/", Some("abc")).unwrap();
        assert_eq!(n.api_base, "https://api.telegram.org");
    }
}

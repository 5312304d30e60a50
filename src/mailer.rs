use std::time::Duration;

use serde_json::json;

use crate::error::ApiError;

/// Outbound mail sender used for password-reset messages.
///
/// Posts to a JSON mail API when one is configured; otherwise logs the
/// message body so local development works without mail credentials.
#[derive(Clone, Debug)]
pub struct Mailer {
    api_url: Option<String>,
    from: String,
}

impl Mailer {
    pub fn new(api_url: Option<String>, from: String) -> Self {
        Self { api_url, from }
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        let Some(api_url) = self.api_url.as_deref() else {
            tracing::info!("mail (dev mode) to={to} subject={subject:?}: {body}");
            return Ok(());
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Upstream(format!("mail client error: {e}")))?;

        let payload = json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": body,
        });

        let resp = client.post(api_url).json(&payload).send().await.map_err(|e| {
            tracing::warn!("mail send to {to} failed: {e}");
            ApiError::Upstream("There was an error sending the email. Please try again later".into())
        })?;

        if !resp.status().is_success() {
            tracing::warn!("mail API returned {} for {to}", resp.status());
            return Err(ApiError::Upstream(
                "There was an error sending the email. Please try again later".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_mode_send_always_succeeds() {
        let mailer = Mailer::new(None, "no-reply@linkdash.local".into());
        assert!(mailer
            .send("user@example.com", "Reset", "token link")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unreachable_mail_api_is_upstream() {
        let mailer = Mailer::new(Some("http://127.0.0.1:1".into()), "no-reply@x".into());
        let err = mailer
            .send("user@example.com", "Reset", "token link")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}

use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;

/// reCAPTCHA-style siteverify response shape.
#[derive(Deserialize)]
struct VerifyResponse {
    success: bool,
}

/// Verify a CAPTCHA token against the configured verification service.
///
/// `secret: None` means verification is disabled (dev/test mode) and every
/// request passes. A missing or failed token is a validation error; a
/// transport failure talking to the service is an upstream error.
pub async fn verify(
    secret: Option<&str>,
    verify_url: &str,
    token: Option<&str>,
    remote_ip: Option<&str>,
) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Captcha is empty"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| ApiError::Upstream(format!("captcha client error: {e}")))?;

    let mut params = vec![("secret", secret), ("response", token)];
    if let Some(ip) = remote_ip {
        params.push(("remoteip", ip));
    }

    let resp = client
        .post(verify_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!("captcha verification request failed: {e}");
            ApiError::Upstream("Captcha verification unavailable".into())
        })?;

    let body: VerifyResponse = resp.json().await.map_err(|e| {
        tracing::warn!("captcha verification parse error: {e}");
        ApiError::Upstream("Captcha verification unavailable".into())
    })?;

    if !body.success {
        return Err(ApiError::validation("Failed captcha verification"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_captcha_accepts_anything() {
        assert!(verify(None, "http://127.0.0.1:1", None, None).await.is_ok());
        assert!(verify(None, "http://127.0.0.1:1", Some("tok"), Some("1.2.3.4"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_token_is_a_validation_error() {
        let err = verify(Some("secret"), "http://127.0.0.1:1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = verify(Some("secret"), "http://127.0.0.1:1", Some("  "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_upstream() {
        let err = verify(Some("secret"), "http://127.0.0.1:1", Some("tok"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}

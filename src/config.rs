use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./linkdash.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when rendering short links, e.g. "https://lnkd.sh"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// Secret used to sign and verify bearer tokens
    pub jwt_secret: String,

    /// How many hours an issued token remains valid
    pub jwt_ttl_hours: u64,

    /// Base URL of the geo-IP lookup service (ip-api.com JSON shape)
    pub geo_api_url: String,

    /// CAPTCHA verification secret; verification is skipped when unset
    pub captcha_secret: Option<String>,

    /// CAPTCHA verification endpoint
    pub captcha_verify_url: String,

    /// Mail API endpoint for outbound password-reset mail; when unset the
    /// mailer logs the message instead of sending it
    pub mail_api_url: Option<String>,

    /// Sender address for outbound mail
    pub mail_from: String,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set in the environment or .env file")?;

        if jwt_secret.trim().len() < 16 {
            anyhow::bail!("JWT_SECRET must be at least 16 characters");
        }

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let jwt_ttl_hours = std::env::var("JWT_TTL_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse::<u64>()
            .unwrap_or(24);

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let geo_api_url = std::env::var("GEO_API_URL")
            .unwrap_or_else(|_| "http://ip-api.com/json".into())
            .trim_end_matches('/')
            .to_owned();

        let captcha_secret = std::env::var("CAPTCHA_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let captcha_verify_url = std::env::var("CAPTCHA_VERIFY_URL")
            .unwrap_or_else(|_| "https://www.google.com/recaptcha/api/siteverify".into());

        let mail_api_url = std::env::var("MAIL_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let mail_from =
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@linkdash.local".into());

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./linkdash.db".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            base_url,
            jwt_secret,
            jwt_ttl_hours,
            geo_api_url,
            captcha_secret,
            captcha_verify_url,
            mail_api_url,
            mail_from,
        })
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            base_url: "http://localhost:3000".into(),
            jwt_secret: "test-secret-test-secret".into(),
            jwt_ttl_hours: 24,
            geo_api_url: "http://ip-api.com/json".into(),
            captcha_secret: None,
            captcha_verify_url: "https://www.google.com/recaptcha/api/siteverify".into(),
            mail_api_url: None,
            mail_from: "no-reply@linkdash.local".into(),
        }
    }
}

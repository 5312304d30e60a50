//! Test utilities and helpers.
//!
//! Common fixtures used across the handler and repository test modules.
//! Only compiled for tests.

#![cfg(test)]

use std::sync::Arc;

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    analytics, auth,
    cache::LinkCache,
    config::AppConfig,
    db,
    geo::{self, GeoCache},
    handlers::auth::SignupRequest,
    mailer::Mailer,
    models::{ClickEvent, Link, User, UserAgentFlags},
    AppState,
};

/// The fixture password every test user is created with.
pub const TEST_PASSWORD: &str = "correct horse";

/// Fresh in-memory database with all migrations applied.
///
/// `max_connections(1)` matters: each new connection to `sqlite::memory:`
/// would otherwise get its own empty database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

/// Full application state over a fresh in-memory database, with the
/// collaborators in their offline modes (no captcha secret, logging
/// mailer, geo lookups that never leave the process for loopback IPs).
pub async fn test_state() -> Arc<AppState> {
    let config = AppConfig::default();
    let mailer = Mailer::new(None, config.mail_from.clone());
    Arc::new(AppState {
        db: setup_test_db().await,
        config,
        cache: LinkCache::new(),
        geo_cache: GeoCache::new(),
        mailer,
    })
}

pub async fn create_test_user(pool: &SqlitePool, email: &str, role: &str) -> User {
    let password_hash = auth::hash_password(TEST_PASSWORD).expect("failed to hash password");
    db::create_user(
        pool,
        "Test User",
        email,
        &password_hash,
        role,
        Utc::now().timestamp_millis(),
    )
    .await
    .expect("failed to create test user")
}

pub async fn create_test_link(
    pool: &SqlitePool,
    alias: &str,
    long_url: &str,
    creator_id: Option<i64>,
) -> Link {
    db::create_link(
        pool,
        alias,
        long_url,
        Some("127.0.0.1"),
        false,
        creator_id,
        Utc::now().timestamp_millis(),
    )
    .await
    .expect("failed to create test link")
}

/// Append a minimal click (sentinel geo, no UA flags) at a chosen instant.
pub async fn insert_click(pool: &SqlitePool, link_id: i64, clicked_at: i64, ip: &str) {
    let event = ClickEvent {
        ip: ip.into(),
        geo: geo::NOT_RECOGNIZED.into(),
        flags: UserAgentFlags::default(),
        clicked_at,
        clicked_day: analytics::iso_day(clicked_at),
    };
    db::append_click(pool, link_id, &event)
        .await
        .expect("failed to append test click");
}

pub fn signup_request(email: &str) -> SignupRequest {
    SignupRequest {
        name: "Test User".into(),
        email: email.into(),
        password: TEST_PASSWORD.into(),
        password_confirm: TEST_PASSWORD.into(),
        tos_agreement: true,
    }
}

/// Collect a response body back into JSON for assertions.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not JSON")
}

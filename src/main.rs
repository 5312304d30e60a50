use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analytics;
mod auth;
mod cache;
mod captcha;
mod config;
mod db;
mod error;
mod geo;
mod handlers;
mod mailer;
mod models;
mod test_utils;

use cache::LinkCache;
use geo::GeoCache;
use mailer::Mailer;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
    /// Hot-path cache: alias → link id + destination, so a redirect
    /// usually needs no links-table read.
    pub cache: LinkCache,
    /// In-memory cache for IP → country lookups so the same IP is never
    /// looked up more than once per server lifetime.
    pub geo_cache: GeoCache,
    pub mailer: Mailer,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkdash=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting linkdash on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    let bind_addr = format!("{}:{}", config.host, config.port);

    // Open SQLite connection pool
    // CREATE the file if it doesn't exist yet
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .foreign_keys(true),
        )
        .await?;

    // Run embedded migrations (files in migrations/)
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    // Build shared state
    let cache = LinkCache::new();
    db::warm_cache(&db, &cache).await?;

    let geo_cache = GeoCache::new();
    let mailer = Mailer::new(config.mail_api_url.clone(), config.mail_from.clone());

    let state = Arc::new(AppState {
        db,
        config,
        cache,
        geo_cache,
        mailer,
    });

    // ── Router ─────────────────────────────────────────────────────────────
    let api_router = Router::new()
        .route(
            "/links",
            post(handlers::links::create_link).get(handlers::links::list_links),
        )
        .route("/links/random", post(handlers::links::random_alias))
        .route(
            "/links/:id",
            get(handlers::links::get_link).patch(handlers::links::update_link),
        )
        .route("/stats/dashboard", post(handlers::stats::dashboard))
        .route("/stats/overview", post(handlers::stats::overview))
        .route("/stats/devices", post(handlers::stats::devices))
        .route("/stats/links", post(handlers::stats::my_links))
        .route("/stats/link/:id", post(handlers::stats::link_stats))
        .route("/users/signup", post(handlers::auth::signup))
        .route("/users/login", post(handlers::auth::login))
        .route("/users/forgot-password", post(handlers::auth::forgot_password))
        .route(
            "/users/reset-password/:token",
            patch(handlers::auth::reset_password),
        )
        .route(
            "/users/update-my-password",
            patch(handlers::auth::update_password),
        )
        .route("/users/update-me", patch(handlers::users::update_me))
        .route("/users/delete-me", delete(handlers::users::delete_me))
        .route("/users", get(handlers::users::list_users))
        .route("/users/:id", get(handlers::users::get_user));

    let app = Router::new()
        // Health check — returns 200 OK with no auth required
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/api/v1", api_router)
        // Short-link redirect — must come LAST so /api/v1/* takes priority
        .route("/:alias", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

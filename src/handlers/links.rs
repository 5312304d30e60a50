use crate::{
    auth::{AuthUser, MaybeAuthUser},
    captcha, db,
    error::ApiError,
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};

/// Alias length for generated codes; the 62-letter alphabet makes
/// collisions vanishingly rare, but generation still retries on one.
const RANDOM_ALIAS_LEN: usize = 6;
const MAX_ALIAS_ATTEMPTS: usize = 10;

// ── Request types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    pub long_url: String,
    pub alias: Option<String>,
    #[serde(default)]
    pub random_alias: bool,
    pub captcha_token: Option<String>,
}

/// Explicit allowed-fields DTO for link updates: the destination is the
/// only field an owner may change — the alias is immutable once set.
#[derive(Deserialize)]
pub struct UpdateLinkRequest {
    pub long_url: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// POST /api/v1/links
///
/// Creates a short link with either a caller-supplied alias (CAPTCHA
/// verified, Conflict if taken) or a generated random one. Identity is
/// attached when a valid bearer token accompanies the request; anonymous
/// creations are allowed and keep only the creator IP.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<CreateLinkRequest>,
) -> Result<Response, ApiError> {
    let long_url = validate_long_url(&req.long_url)?;
    let creator_ip = super::extract_ip(&headers, addr);

    let (alias, is_random) = match req.alias.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(alias) => {
            validate_alias(alias)?;

            // Human-chosen aliases go through CAPTCHA; generated ones don't.
            captcha::verify(
                state.config.captcha_secret.as_deref(),
                &state.config.captcha_verify_url,
                req.captcha_token.as_deref(),
                Some(&creator_ip),
            )
            .await?;

            if db::alias_exists(&state.db, alias).await? {
                return Err(ApiError::alias_taken(alias));
            }
            (alias.to_owned(), false)
        }
        None if req.random_alias => (generate_unique_alias(&state.db).await?, true),
        None => {
            return Err(ApiError::validation(
                "Provide an alias or request a random one",
            ))
        }
    };

    let created = db::create_link(
        &state.db,
        &alias,
        &long_url,
        Some(&creator_ip),
        is_random,
        user.map(|u| u.id),
        Utc::now().timestamp_millis(),
    )
    .await
    .map_err(|e| {
        // Concurrent create with the same alias loses the UNIQUE race.
        if is_unique_violation(&e) {
            ApiError::alias_taken(&alias)
        } else {
            ApiError::Database(e)
        }
    })?;

    state.cache.set(&created.alias, created.id, &created.long_url);

    Ok(super::created(json!({
        "link": created,
        "short_url": format!("{}/{}", state.config.base_url, created.alias),
    })))
}

/// GET /api/v1/links — the authenticated user's links with click totals.
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let links = db::get_links_with_stats(&state.db, auth.id()).await?;
    Ok(super::success(json!({ "links": links })))
}

/// GET /api/v1/links/:id
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let link = db::get_link_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::link_id_not_found(id))?;
    Ok(super::success(json!({ "link": link })))
}

/// PATCH /api/v1/links/:id — owner-only destination update.
pub async fn update_link(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<UpdateLinkRequest>,
) -> Result<Response, ApiError> {
    let link = db::get_link_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::link_id_not_found(id))?;

    // Ownership: the stored creator must be the authenticated user.
    // Anonymous links have no owner, so nobody may edit them.
    if link.creator_id != Some(auth.id()) {
        return Err(ApiError::not_owner());
    }

    let long_url = validate_long_url(&req.long_url)?;

    let updated = db::update_link_long_url(&state.db, id, &long_url)
        .await?
        .ok_or_else(|| ApiError::link_id_not_found(id))?;

    state.cache.set(&updated.alias, updated.id, &updated.long_url);

    Ok(super::success(json!({ "link": updated })))
}

/// POST /api/v1/links/random — preview a freshly generated alias without
/// creating anything.
pub async fn random_alias(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let alias = generate_unique_alias(&state.db).await?;
    Ok(super::success(json!({ "alias": alias })))
}

// ── Validation ─────────────────────────────────────────────────────────────

/// Validate and trim a long URL. The stored value keeps the caller's
/// spelling; the scheme default is applied at redirect time.
fn validate_long_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.len() < 3 || trimmed.len() > 1000 {
        return Err(ApiError::validation(
            "URL must be between 3 and 1000 characters long",
        ));
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };

    let parsed =
        url::Url::parse(&candidate).map_err(|_| ApiError::validation("Must be a valid URL"))?;
    if parsed.host_str().is_none() {
        return Err(ApiError::validation("Must be a valid URL"));
    }

    Ok(trimmed.to_owned())
}

/// Aliases are restricted to ASCII alphanumerics.
fn validate_alias(alias: &str) -> Result<(), ApiError> {
    if alias.is_empty() || alias.len() > 64 {
        return Err(ApiError::validation(
            "Custom URL should be between 1 and 64 characters",
        ));
    }
    if !alias.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::validation(
            "Custom URL should contain only numbers and letters of the English alphabet",
        ));
    }
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

// ── Alias generation ───────────────────────────────────────────────────────

/// Generate a random alias that doesn't already exist in the registry.
/// A collision just regenerates; after ten attempts the last code is used
/// and the UNIQUE constraint remains the final guard.
pub(crate) async fn generate_unique_alias(
    pool: &sqlx::SqlitePool,
) -> Result<String, sqlx::Error> {
    let mut code = random_code(RANDOM_ALIAS_LEN);
    for _ in 0..MAX_ALIAS_ATTEMPTS {
        if !db::alias_exists(pool, &code).await? {
            return Ok(code);
        }
        code = random_code(RANDOM_ALIAS_LEN);
    }
    Ok(code)
}

/// Random alphanumeric string (uppercase + lowercase + digits).
fn random_code(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_link, create_test_user, test_state};

    fn create_req(long_url: &str, alias: Option<&str>, random: bool) -> CreateLinkRequest {
        CreateLinkRequest {
            long_url: long_url.into(),
            alias: alias.map(str::to_owned),
            random_alias: random,
            captcha_token: None,
        }
    }

    fn conn() -> ConnectInfo<SocketAddr> {
        ConnectInfo("127.0.0.1:5000".parse().unwrap())
    }

    #[test]
    fn random_code_uses_the_alphanumeric_alphabet() {
        for _ in 0..50 {
            let code = random_code(RANDOM_ALIAS_LEN);
            assert_eq!(code.len(), RANDOM_ALIAS_LEN);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn url_validation() {
        assert!(validate_long_url("example.com").is_ok());
        assert!(validate_long_url("  https://example.com/path?q=1  ").is_ok());
        assert!(validate_long_url("ab").is_err());
        assert!(validate_long_url(&"a".repeat(1001)).is_err());
        assert!(validate_long_url("http://").is_err());
    }

    #[test]
    fn alias_validation() {
        assert!(validate_alias("abc123").is_ok());
        assert!(validate_alias("ABCxyz9").is_ok());
        assert!(validate_alias("with-dash").is_err());
        assert!(validate_alias("with space").is_err());
        assert!(validate_alias("ünïcode").is_err());
    }

    #[tokio::test]
    async fn duplicate_explicit_alias_is_a_conflict() {
        let state = test_state().await;

        let first = create_link(
            State(state.clone()),
            MaybeAuthUser(None),
            conn(),
            HeaderMap::new(),
            axum::Json(create_req("https://example.com", Some("abc123"), false)),
        )
        .await;
        assert!(first.is_ok());

        let second = create_link(
            State(state),
            MaybeAuthUser(None),
            conn(),
            HeaderMap::new(),
            axum::Json(create_req("https://other.example.com", Some("abc123"), false)),
        )
        .await
        .unwrap_err();
        assert!(matches!(second, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn random_aliases_stay_unique_across_creations() {
        let state = test_state().await;

        for _ in 0..20 {
            // every creation succeeds, so no generated alias collided with
            // an existing one (the UNIQUE constraint would have fired)
            let result = create_link(
                State(state.clone()),
                MaybeAuthUser(None),
                conn(),
                HeaderMap::new(),
                axum::Json(create_req("https://example.com", None, true)),
            )
            .await;
            assert!(result.is_ok());
        }

        let generated = generate_unique_alias(&state.db).await.unwrap();
        assert!(!db::alias_exists(&state.db, &generated).await.unwrap());
    }

    #[tokio::test]
    async fn create_without_alias_or_random_flag_fails_validation() {
        let state = test_state().await;
        let err = create_link(
            State(state),
            MaybeAuthUser(None),
            conn(),
            HeaderMap::new(),
            axum::Json(create_req("https://example.com", None, false)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn only_the_owner_may_update_a_link() {
        let state = test_state().await;
        let owner = create_test_user(&state.db, "owner@example.com", "user").await;
        let other = create_test_user(&state.db, "other@example.com", "user").await;
        let link = create_test_link(&state.db, "mine01", "https://example.com", Some(owner.id)).await;

        // owner succeeds
        let ok = update_link(
            State(state.clone()),
            AuthUser {
                user: owner.clone(),
            },
            Path(link.id),
            axum::Json(UpdateLinkRequest {
                long_url: "https://changed.example.com".into(),
            }),
        )
        .await;
        assert!(ok.is_ok());

        // someone else is forbidden
        let err = update_link(
            State(state.clone()),
            AuthUser { user: other },
            Path(link.id),
            axum::Json(UpdateLinkRequest {
                long_url: "https://evil.example.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let stored = db::get_link_by_id(&state.db, link.id).await.unwrap().unwrap();
        assert_eq!(stored.long_url, "https://changed.example.com");
    }

    #[tokio::test]
    async fn anonymous_links_cannot_be_updated() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "user@example.com", "user").await;
        let link = create_test_link(&state.db, "anon01", "https://example.com", None).await;

        let err = update_link(
            State(state),
            AuthUser { user },
            Path(link.id),
            axum::Json(UpdateLinkRequest {
                long_url: "https://takeover.example.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn updating_a_missing_link_is_not_found() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "user@example.com", "user").await;

        let err = update_link(
            State(state),
            AuthUser { user },
            Path(9999),
            axum::Json(UpdateLinkRequest {
                long_url: "https://example.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}

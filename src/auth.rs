use crate::{
    db,
    error::ApiError,
    models::{Role, User},
    AppState,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// How long a password-reset token stays valid.
pub const RESET_TOKEN_TTL_MS: i64 = 10 * 60 * 1000;

// ── Passwords ──────────────────────────────────────────────────────────────

/// Hash a password with Argon2id and a fresh salt (PHC string output).
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hash failure: {e}")))
}

/// Constant-time verification of a candidate password against a PHC hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ── Bearer tokens ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    /// Issue time, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Sign a bearer token for a user with the configured lifetime.
pub fn sign_token(user_id: i64, secret: &str, ttl_hours: u64) -> Result<String, ApiError> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat,
        exp: iat + (ttl_hours as i64) * 3600,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failure: {e}")))
}

/// Verify a bearer token's signature and expiry.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token. Please log in again".into()))
}

/// `true` when the user changed their password after the token was issued,
/// which invalidates every token from before the change.
pub fn changed_password_after(user: &User, token_iat: i64) -> bool {
    match user.password_changed_at {
        Some(changed_ms) => token_iat < changed_ms / 1000,
        None => false,
    }
}

// ── Password-reset tokens ──────────────────────────────────────────────────

/// Generate a single-use reset token. Returns `(plain, digest)`: the plain
/// token goes into the reset mail, only the sha256 hex digest is stored.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plain: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let digest = hash_reset_token(&plain);
    (plain, digest)
}

/// One-way digest of a reset token, hex-encoded.
pub fn hash_reset_token(plain: &str) -> String {
    let digest = Sha256::digest(plain.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ── Extractors ─────────────────────────────────────────────────────────────

fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.trim().is_empty() {
                return Some(token.trim().to_owned());
            }
        }
    }

    // Fall back to the cookie set at login
    let jar = CookieJar::from_headers(&parts.headers);
    jar.get("jwt").map(|c| c.value().to_owned())
}

/// Resolve a token to its (still valid) user: signature + expiry, user
/// still exists and is active, password unchanged since issue.
async fn resolve_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = verify_token(token, &state.config.jwt_secret)?;

    let user = db::find_active_user_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| {
            ApiError::Unauthorized("User with the given token no longer exists".into())
        })?;

    if changed_password_after(&user, claims.iat) {
        return Err(ApiError::Unauthorized(
            "User recently changed password. Please log in again".into(),
        ));
    }

    Ok(user)
}

/// Extractor that enforces authentication on any handler that includes it
/// as a parameter. The request must carry a valid bearer token (header or
/// cookie); otherwise the handler never runs and the request fails with
/// 401.
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    /// Restrict an operation to a fixed set of roles.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.user.role()) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You do not have permission to perform this action".into(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let token = bearer_token(parts).ok_or_else(|| {
            ApiError::Unauthorized("You are not logged in. Please log in and try again".into())
        })?;

        let user = resolve_user(&state, &token).await?;
        Ok(AuthUser { user })
    }
}

/// Extractor that attaches identity when a valid token accompanies the
/// request but never rejects — anonymous requests proceed with `None`.
pub struct MaybeAuthUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let user = match bearer_token(parts) {
            Some(token) => resolve_user(&state, &token).await.ok(),
            None => None,
        };

        Ok(MaybeAuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(password_changed_at: Option<i64>) -> User {
        User {
            id: 1,
            name: "Tester".into(),
            email: "tester@example.com".into(),
            password_hash: String::new(),
            role: "user".into(),
            password_changed_at,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: 0,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert_ne!(hash, "correct horse battery");
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip() {
        let token = sign_token(42, "test-secret-test-secret", 24).unwrap();
        let claims = verify_token(&token, "test-secret-test-secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = sign_token(42, "test-secret-test-secret", 24).unwrap();
        let err = verify_token(&token, "another-secret-entirely").unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Hand-roll a token whose exp is far in the past (beyond leeway).
        let iat = Utc::now().timestamp() - 7200;
        let claims = Claims {
            sub: 42,
            iat,
            exp: iat + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-test-secret"),
        )
        .unwrap();

        let err = verify_token(&token, "test-secret-test-secret").unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn password_change_invalidates_older_tokens() {
        // token issued at t0, password changed at t1 > t0
        let t0 = 1_600_000_000;
        let t1_ms = (t0 + 100) * 1000;
        let user = test_user(Some(t1_ms));
        assert!(changed_password_after(&user, t0));

        // a token issued after the change stays valid
        assert!(!changed_password_after(&user, t0 + 200));

        // never-changed password never invalidates
        assert!(!changed_password_after(&test_user(None), t0));
    }

    #[test]
    fn reset_token_digest_is_deterministic_and_one_way() {
        let (plain, digest) = generate_reset_token();
        assert_eq!(plain.len(), 64);
        assert_ne!(plain, digest);
        assert_eq!(hash_reset_token(&plain), digest);

        let (other_plain, other_digest) = generate_reset_token();
        assert_ne!(plain, other_plain);
        assert_ne!(digest, other_digest);
    }

    #[test]
    fn role_restriction() {
        let auth = AuthUser {
            user: test_user(None),
        };
        assert!(auth.require_role(&[Role::User]).is_ok());
        assert!(matches!(
            auth.require_role(&[Role::Admin]).unwrap_err(),
            ApiError::Forbidden(_)
        ));

        let mut admin = test_user(None);
        admin.role = "admin".into();
        let auth = AuthUser { user: admin };
        assert!(auth.require_role(&[Role::Admin]).is_ok());
    }
}

use crate::{
    auth::{self, AuthUser},
    db,
    error::ApiError,
    models::User,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

// ── Request types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub tos_agreement: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub password_current: String,
    pub password: String,
    pub password_confirm: String,
}

// ── Token issue ────────────────────────────────────────────────────────────

/// Issue a fresh bearer token for the user and respond with it in both the
/// JSON envelope and an http-only cookie.
fn send_token(user: &User, state: &AppState, status: StatusCode) -> Result<Response, ApiError> {
    let token = auth::sign_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;

    let cookie = Cookie::build(("jwt", token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.config.jwt_ttl_hours as i64))
        .build();
    let jar = CookieJar::new().add(cookie);

    let body = Json(json!({
        "status": "success",
        "token": token,
        "data": { "user": user.public() },
    }));

    Ok((status, jar, body).into_response())
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// POST /api/v1/users/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::validation(
            "A user name must be between 1 and 100 characters",
        ));
    }

    let email = validate_email(&req.email)?;
    validate_password(&req.password, &req.password_confirm)?;

    if !req.tos_agreement {
        return Err(ApiError::validation(
            "Please read and confirm Terms Of Use to continue",
        ));
    }

    if db::email_exists(&state.db, &email).await? {
        return Err(ApiError::Conflict("Given email already in use".into()));
    }

    let password_hash = auth::hash_password(&req.password)?;
    let user = db::create_user(
        &state.db,
        name,
        &email,
        &password_hash,
        "user",
        Utc::now().timestamp_millis(),
    )
    .await?;

    tracing::info!("new user signed up: {}", user.email);
    send_token(&user, &state, StatusCode::CREATED)
}

/// POST /api/v1/users/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation(
            "Please provide correct email and password pair",
        ));
    }

    let email = req.email.trim().to_lowercase();
    let user = db::find_active_user_by_email(&state.db, &email).await?;

    // One error path for both unknown email and wrong password: the
    // response must not reveal which half of the pair was wrong.
    let user = match user {
        Some(u) if auth::verify_password(&req.password, &u.password_hash) => u,
        _ => return Err(ApiError::Unauthorized("Incorrect email or password".into())),
    };

    send_token(&user, &state, StatusCode::OK)
}

/// POST /api/v1/users/forgot-password
///
/// Generates a single-use reset token (only its digest is stored), mails
/// the reset URL, and clears the token state again if the mail fails.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = db::find_active_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("There is no user with the given email address".into())
        })?;

    let (plain, digest) = auth::generate_reset_token();
    let expires = Utc::now().timestamp_millis() + auth::RESET_TOKEN_TTL_MS;
    db::set_reset_token(&state.db, user.id, &digest, expires).await?;

    let reset_url = format!(
        "{}/api/v1/users/reset-password/{plain}",
        state.config.base_url
    );
    let message = format!("Forgot your password? Reset it within 10 minutes: {reset_url}");

    if let Err(e) = state
        .mailer
        .send(&user.email, "Your password reset token", &message)
        .await
    {
        db::clear_reset_token(&state.db, user.id).await?;
        return Err(e);
    }

    Ok(super::success(json!({ "message": "Token sent to email" })))
}

/// PATCH /api/v1/users/reset-password/:token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    validate_password(&req.password, &req.password_confirm)?;

    let digest = auth::hash_reset_token(&token);
    let now = Utc::now().timestamp_millis();
    let user = db::find_user_by_reset_token(&state.db, &digest, now)
        .await?
        .ok_or_else(|| ApiError::validation("Token is invalid or has expired"))?;

    let password_hash = auth::hash_password(&req.password)?;
    // set_password also clears the token state, making it single-use
    db::set_password(&state.db, user.id, &password_hash, now).await?;

    let user = db::find_active_user_by_id(&state.db, user.id)
        .await?
        .ok_or_else(ApiError::user_not_found)?;
    send_token(&user, &state, StatusCode::OK)
}

/// PATCH /api/v1/users/update-my-password
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<Response, ApiError> {
    if !auth::verify_password(&req.password_current, &auth_user.user.password_hash) {
        return Err(ApiError::Unauthorized(
            "Please enter your correct current password".into(),
        ));
    }

    validate_password(&req.password, &req.password_confirm)?;

    let password_hash = auth::hash_password(&req.password)?;
    db::set_password(
        &state.db,
        auth_user.id(),
        &password_hash,
        Utc::now().timestamp_millis(),
    )
    .await?;

    let user = db::find_active_user_by_id(&state.db, auth_user.id())
        .await?
        .ok_or_else(ApiError::user_not_found)?;
    send_token(&user, &state, StatusCode::OK)
}

// ── Validation ─────────────────────────────────────────────────────────────

pub(crate) fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !well_formed {
        return Err(ApiError::validation("Please provide a correct email"));
    }
    Ok(email)
}

fn validate_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation(
            "Password should be at least 8 characters long",
        ));
    }
    if password != confirm {
        return Err(ApiError::validation(
            "Provided passwords should be the same",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{signup_request, test_state};
    use axum::extract::FromRequestParts;

    #[test]
    fn email_validation_normalizes_case() {
        assert_eq!(
            validate_email(" User@Example.COM ").unwrap(),
            "user@example.com"
        );
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("longenough", "longenough").is_ok());
        assert!(validate_password("short", "short").is_err());
        assert!(validate_password("longenough", "different").is_err());
    }

    #[tokio::test]
    async fn signup_then_login_round_trip() {
        let state = test_state().await;

        let resp = signup(State(state.clone()), Json(signup_request("rt@example.com")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "rt@example.com".into(),
                password: "correct horse".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "rt@example.com".into(),
                password: "wrong password".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_email_signup_is_a_conflict() {
        let state = test_state().await;

        signup(State(state.clone()), Json(signup_request("dup@example.com")))
            .await
            .unwrap();
        let err = signup(State(state), Json(signup_request("dup@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn password_change_invalidates_outstanding_tokens() {
        let state = test_state().await;
        signup(
            State(state.clone()),
            Json(signup_request("stale@example.com")),
        )
        .await
        .unwrap();
        let user = db::find_active_user_by_email(&state.db, "stale@example.com")
            .await
            .unwrap()
            .unwrap();

        // token issued at t0 (backdated so the later change is strictly newer)
        let iat = Utc::now().timestamp() - 100;
        let claims = auth::Claims {
            sub: user.id,
            iat,
            exp: iat + 86_400,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        )
        .unwrap();

        let request = |tok: &str| {
            axum::http::Request::builder()
                .header("authorization", format!("Bearer {tok}"))
                .body(())
                .unwrap()
                .into_parts()
                .0
        };

        // valid before the password change
        let mut parts = request(&token);
        assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_ok());

        // password changed at t1 > t0
        let new_hash = auth::hash_password("another password").unwrap();
        db::set_password(&state.db, user.id, &new_hash, Utc::now().timestamp_millis())
            .await
            .unwrap();

        let mut parts = request(&token);
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn reset_token_is_single_use_and_expires() {
        let state = test_state().await;
        signup(
            State(state.clone()),
            Json(signup_request("reset@example.com")),
        )
        .await
        .unwrap();
        let user = db::find_active_user_by_email(&state.db, "reset@example.com")
            .await
            .unwrap()
            .unwrap();

        let (plain, digest) = auth::generate_reset_token();
        let expires = Utc::now().timestamp_millis() + auth::RESET_TOKEN_TTL_MS;
        db::set_reset_token(&state.db, user.id, &digest, expires)
            .await
            .unwrap();

        let body = || {
            Json(ResetPasswordRequest {
                password: "brand new pass".into(),
                password_confirm: "brand new pass".into(),
            })
        };

        // first use succeeds
        let resp = reset_password(State(state.clone()), Path(plain.clone()), body())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // second use fails: the token state was cleared
        let err = reset_password(State(state.clone()), Path(plain), body())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // an expired token never matches
        let (plain2, digest2) = auth::generate_reset_token();
        db::set_reset_token(
            &state.db,
            user.id,
            &digest2,
            Utc::now().timestamp_millis() - 1,
        )
        .await
        .unwrap();
        let err = reset_password(State(state), Path(plain2), body())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let state = test_state().await;
        let err = forgot_password(
            State(state),
            Json(ForgotPasswordRequest {
                email: "ghost@example.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}

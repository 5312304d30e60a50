use crate::{
    auth::AuthUser,
    db,
    error::ApiError,
    models::{PublicUser, Role},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Explicit allowed-fields DTO for self-service profile updates. Password
/// fields are listed only so an attempt to smuggle them in is rejected
/// with a pointer at the password route instead of being silently dropped.
#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// GET /api/v1/users — active users, admin only.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let users: Vec<PublicUser> = db::find_active_users(&state.db)
        .await?
        .iter()
        .map(|u| u.public())
        .collect();

    Ok(super::success(json!({ "users": users })))
}

/// GET /api/v1/users/:id — one user with their links (weak reference:
/// links point back at the creator, the user row owns nothing).
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let user = db::find_active_user_by_id(&state.db, id)
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    let links = db::get_links_with_stats(&state.db, user.id).await?;

    Ok(super::success(json!({
        "user": user.public(),
        "links": links,
    })))
}

/// PATCH /api/v1/users/update-me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Response, ApiError> {
    if req.password.is_some() || req.password_confirm.is_some() {
        return Err(ApiError::validation(
            "This route is not for password updates. Please use the update-my-password route",
        ));
    }

    let name = match req.name.as_deref().map(str::trim) {
        Some(name) => {
            if name.is_empty() || name.len() > 100 {
                return Err(ApiError::validation(
                    "A user name must be between 1 and 100 characters",
                ));
            }
            Some(name.to_owned())
        }
        None => None,
    };

    let email = match req.email.as_deref() {
        Some(raw) => {
            let email = super::auth::validate_email(raw)?;
            if email != auth.user.email && db::email_exists(&state.db, &email).await? {
                return Err(ApiError::Conflict("Given email already in use".into()));
            }
            Some(email)
        }
        None => None,
    };

    let updated = db::update_user_profile(&state.db, auth.id(), name.as_deref(), email.as_deref())
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    Ok(super::success(json!({ "user": updated.public() })))
}

/// DELETE /api/v1/users/delete-me — soft-deactivate; the row survives so
/// links keep their creator reference, but every active-user lookup and
/// token check stops matching.
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    db::deactivate_user(&state.db, auth.id()).await?;
    tracing::info!("user {} deactivated their account", auth.id());
    Ok(super::success(json!(null)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_user, test_state};

    #[tokio::test]
    async fn listing_users_requires_the_admin_role() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "plain@example.com", "user").await;
        let admin = create_test_user(&state.db, "admin@example.com", "admin").await;

        let err = list_users(State(state.clone()), AuthUser { user })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        assert!(list_users(State(state), AuthUser { user: admin }).await.is_ok());
    }

    #[tokio::test]
    async fn update_me_rejects_password_fields() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "me@example.com", "user").await;

        let err = update_me(
            State(state),
            AuthUser { user },
            Json(UpdateMeRequest {
                name: None,
                email: None,
                password: Some("sneaky password".into()),
                password_confirm: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn update_me_changes_whitelisted_fields_only() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "rename@example.com", "user").await;
        let id = user.id;

        update_me(
            State(state.clone()),
            AuthUser { user },
            Json(UpdateMeRequest {
                name: Some("New Name".into()),
                email: None,
                password: None,
                password_confirm: None,
            }),
        )
        .await
        .unwrap();

        let stored = db::find_active_user_by_id(&state.db, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "New Name");
        assert_eq!(stored.email, "rename@example.com");
    }

    #[tokio::test]
    async fn update_me_refuses_taken_email() {
        let state = test_state().await;
        create_test_user(&state.db, "taken@example.com", "user").await;
        let user = create_test_user(&state.db, "second@example.com", "user").await;

        let err = update_me(
            State(state),
            AuthUser { user },
            Json(UpdateMeRequest {
                name: None,
                email: Some("taken@example.com".into()),
                password: None,
                password_confirm: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_me_soft_deactivates() {
        let state = test_state().await;
        let user = create_test_user(&state.db, "gone@example.com", "user").await;
        let id = user.id;

        delete_me(State(state.clone()), AuthUser { user }).await.unwrap();

        assert!(db::find_active_user_by_id(&state.db, id)
            .await
            .unwrap()
            .is_none());
        // the row itself survives for creator back-references
        assert!(db::email_exists(&state.db, "gone@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn fetching_a_deactivated_user_is_not_found() {
        let state = test_state().await;
        let viewer = create_test_user(&state.db, "viewer@example.com", "user").await;
        let target = create_test_user(&state.db, "target@example.com", "user").await;
        db::deactivate_user(&state.db, target.id).await.unwrap();

        let err = get_user(State(state), AuthUser { user: viewer }, Path(target.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}

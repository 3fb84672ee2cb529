use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::auth::CurrentUser;
use crate::db::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{RegisterReq, UpdateProfileReq, User, UserRole};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/me", get(me).put(update_me))
        .route("/api/users", get(list_users))
}

/// Create an account and hand back the bearer token the identity
/// collaborator minted for it. Credential management itself lives outside
/// this service.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if req.username.trim().is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".into()));
    }

    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
    )
    .bind(&req.username)
    .bind(&req.email)
    .fetch_one(&state.db)
    .await?;
    if taken {
        return Err(ApiError::Conflict("username or email already in use".into()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, full_name, role, bio)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&req.username)
    .bind(&req.email)
    .bind(&req.full_name)
    .bind(req.role)
    .bind(&req.bio)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user=%user.id, role=?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "user": user,
            "api_token": user.api_token,
            "message": "user registered successfully"
        })),
    ))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateProfileReq>,
) -> ApiResult<Json<User>> {
    if let Some(email) = &req.email {
        if !email.contains('@') {
            return Err(ApiError::Validation("a valid email is required".into()));
        }
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET full_name = COALESCE($2, full_name),
            email = COALESCE($3, email),
            bio = COALESCE($4, bio),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.full_name)
    .bind(req.email)
    .bind(req.bio)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(updated))
}

/// Admins see everyone; anyone else only sees themselves.
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<User>>> {
    let users = if user.role == UserRole::Admin {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&state.db)
            .await?
    } else {
        vec![user]
    };
    Ok(Json(users))
}

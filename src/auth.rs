use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::db::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserRole};

/// The authenticated caller, resolved from the bearer token minted at
/// registration. Handlers only ever see the user row, not the credential.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthorized)?;
        let token = Uuid::parse_str(bearer.token()).map_err(|_| ApiError::Unauthorized)?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE api_token = $1")
            .bind(token)
            .fetch_optional(&state.db)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    pub fn require_instructor(&self) -> ApiResult<()> {
        match self.0.role {
            UserRole::Instructor | UserRole::Admin => Ok(()),
            UserRole::Student => Err(ApiError::PermissionDenied(
                "instructor role required".into(),
            )),
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.0.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied("admin role required".into()))
        }
    }
}

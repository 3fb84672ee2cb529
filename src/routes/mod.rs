use axum::Router;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::db::{AppState, Db};
use crate::error::{ApiError, ApiResult};
use crate::models::{Course, Enrollment};

pub mod certificates;
pub mod courses;
pub mod enrollments;
pub mod quizzes;
pub mod users;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(courses::router())
        .merge(enrollments::router())
        .merge(quizzes::router())
        .merge(certificates::router())
        // static content (serves generated certificate documents)
        .nest_service("/content", ServeDir::new(state.data_dir.clone()))
        .with_state(state)
}

pub(crate) async fn fetch_course(db: &Db, course_id: Uuid) -> ApiResult<Course> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("course not found".into()))
}

pub(crate) async fn active_enrollment(
    db: &Db,
    student_id: Uuid,
    course_id: Uuid,
) -> ApiResult<Option<Enrollment>> {
    let found = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = $1 AND course_id = $2 AND is_active",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?;
    Ok(found)
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::AppState;
use crate::error::{ApiError, ApiResult};
use crate::grading;
use crate::issuer::CompletionEvent;
use crate::models::{Enrollment, Lesson, LessonProgress, MarkLessonCompleteReq};
use crate::routes::{active_enrollment, fetch_course};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/courses/:course_id/enroll", post(enroll))
        .route("/api/enrollments", get(my_enrollments))
        .route("/api/courses/:course_id/progress", get(course_progress))
        .route(
            "/api/courses/:course_id/lessons/:lesson_id/complete",
            post(mark_lesson_complete),
        )
}

async fn enroll(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let course = fetch_course(&state.db, course_id).await?;
    if !course.is_published {
        return Err(ApiError::NotFound("course not found".into()));
    }

    let already = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE student_id = $1 AND course_id = $2)",
    )
    .bind(user.0.id)
    .bind(course_id)
    .fetch_one(&state.db)
    .await?;
    if already {
        return Err(ApiError::Conflict("already enrolled in this course".into()));
    }

    if let Some(cap) = course.max_students {
        let enrolled = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND is_active",
        )
        .bind(course_id)
        .fetch_one(&state.db)
        .await?;
        if enrolled >= cap as i64 {
            return Err(ApiError::Conflict("course is full".into()));
        }
    }

    let amount_paid = if course.is_free { 0 } else { course.price_cents };
    // the unique (student, course) constraint turns a concurrent duplicate
    // into a rejected second insert
    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (student_id, course_id, amount_paid_cents)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(user.0.id)
    .bind(course_id)
    .bind(amount_paid)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(student=%user.0.id, course=%course_id, "enrolled");
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn my_enrollments(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Enrollment>>> {
    let enrollments = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = $1 AND is_active ORDER BY enrolled_at DESC",
    )
    .bind(user.0.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(enrollments))
}

async fn course_progress(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let enrollment = active_enrollment(&state.db, user.0.id, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("not enrolled in this course".into()))?;

    let lesson_progress = sqlx::query_as::<_, LessonProgress>(
        "SELECT * FROM lesson_progress WHERE enrollment_id = $1",
    )
    .bind(enrollment.id)
    .fetch_all(&state.db)
    .await?;
    let total_lessons =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(&state.db)
            .await?;
    let completed_lessons = lesson_progress.iter().filter(|p| p.is_completed).count();

    Ok(Json(serde_json::json!({
        "enrollment": enrollment,
        "lesson_progress": lesson_progress,
        "total_lessons": total_lessons,
        "completed_lessons": completed_lessons,
    })))
}

/// Idempotent lesson completion. The progress recomputation and enrollment
/// update commit together; the completion event goes out only after commit,
/// and only the first time progress reaches 100.
async fn mark_lesson_complete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<MarkLessonCompleteReq>>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(req) = body.unwrap_or_default();
    fetch_course(&state.db, course_id).await?;
    let lesson =
        sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = $1 AND course_id = $2")
            .bind(lesson_id)
            .bind(course_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("lesson not found".into()))?;
    let enrollment = active_enrollment(&state.db, user.0.id, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("not enrolled in this course".into()))?;
    let was_complete = enrollment.completed_at.is_some();

    let mut tx = state.db.begin().await?;

    // newly reported watch time adds onto whatever was already recorded;
    // the first completion timestamp is never moved
    let prior_watch = sqlx::query_scalar::<_, i32>(
        "SELECT watch_time_seconds FROM lesson_progress
         WHERE enrollment_id = $1 AND lesson_id = $2",
    )
    .bind(enrollment.id)
    .bind(lesson.id)
    .fetch_optional(&mut *tx)
    .await?;
    let watch_time = accumulate_watch_time(prior_watch, req.watch_time_seconds);
    sqlx::query(
        r#"
        INSERT INTO lesson_progress
            (enrollment_id, lesson_id, is_completed, completed_at, watch_time_seconds)
        VALUES ($1, $2, true, now(), $3)
        ON CONFLICT (enrollment_id, lesson_id) DO UPDATE
        SET is_completed = true,
            completed_at = COALESCE(lesson_progress.completed_at, now()),
            watch_time_seconds = $3
        "#,
    )
    .bind(enrollment.id)
    .bind(lesson.id)
    .bind(watch_time)
    .execute(&mut *tx)
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;
    let completed = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM lesson_progress lp
        JOIN lessons l ON l.id = lp.lesson_id
        WHERE lp.enrollment_id = $1 AND lp.is_completed AND l.course_id = $2
        "#,
    )
    .bind(enrollment.id)
    .bind(course_id)
    .fetch_one(&mut *tx)
    .await?;

    let pct = grading::progress_percent(completed, total);
    sqlx::query(
        r#"
        UPDATE enrollments
        SET progress_percentage = $2,
            completed_at = CASE WHEN $2 = 100 THEN COALESCE(completed_at, now())
                                ELSE completed_at END
        WHERE id = $1
        "#,
    )
    .bind(enrollment.id)
    .bind(pct)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if pct == 100 && !was_complete {
        let ev = CompletionEvent {
            enrollment_id: enrollment.id,
        };
        if state.events.send(ev).await.is_err() {
            tracing::warn!(enrollment=%enrollment.id, "completion event dropped, issuer worker gone");
        }
    }

    Ok(Json(serde_json::json!({
        "message": "lesson marked as completed",
        "progress_percentage": pct,
    })))
}

/// Watch time only ever grows; a negative report counts as zero.
fn accumulate_watch_time(existing: Option<i32>, reported: i32) -> i32 {
    existing.unwrap_or(0).saturating_add(reported.max(0))
}

#[cfg(test)]
mod tests {
    use super::accumulate_watch_time;

    #[test]
    fn watch_time_accumulates_across_reports() {
        assert_eq!(accumulate_watch_time(None, 120), 120);
        assert_eq!(accumulate_watch_time(Some(120), 45), 165);
        assert_eq!(accumulate_watch_time(Some(165), 0), 165);
    }

    #[test]
    fn negative_watch_time_never_shrinks_the_total() {
        assert_eq!(accumulate_watch_time(Some(300), -10), 300);
        assert_eq!(accumulate_watch_time(None, -1), 0);
    }
}

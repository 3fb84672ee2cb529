use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::AppState;
use crate::error::{ApiError, ApiResult};
use crate::grading::rate_percent;
use crate::models::{
    Category, Course, CourseFilter, CourseReview, CreateCategoryReq, CreateCourseReq,
    CreateLessonReq, CreateReviewReq, Lesson,
};
use crate::routes::{active_enrollment, fetch_course};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/instructor/courses", get(instructor_courses))
        .route(
            "/api/courses/:course_id",
            get(course_detail).put(update_course).delete(delete_course),
        )
        .route(
            "/api/courses/:course_id/lessons",
            get(list_lessons).post(create_lesson),
        )
        .route(
            "/api/courses/:course_id/lessons/:lesson_id",
            axum::routing::put(update_lesson).delete(delete_lesson),
        )
        .route(
            "/api/courses/:course_id/reviews",
            get(list_reviews).post(create_review),
        )
        .route("/api/courses/:course_id/analytics", get(course_analytics))
}

// --- categories ---

async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    let cats = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(cats))
}

async fn create_category(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(req): Json<CreateCategoryReq>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    let cat = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(req.name.trim())
    .bind(&req.description)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(cat)))
}

// --- catalog ---

async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> ApiResult<Json<Vec<Course>>> {
    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT c.* FROM courses c
        LEFT JOIN categories cat ON cat.id = c.category_id
        WHERE c.is_published
          AND ($1::text IS NULL OR cat.name ILIKE '%' || $1 || '%')
          AND ($2::text IS NULL OR c.difficulty = $2)
          AND ($3::bool IS NULL OR c.is_free = $3)
          AND ($4::text IS NULL
               OR c.title ILIKE '%' || $4 || '%'
               OR c.description ILIKE '%' || $4 || '%')
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(filter.category)
    .bind(filter.difficulty)
    .bind(filter.is_free)
    .bind(filter.search)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(courses))
}

async fn course_detail(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let course = fetch_course(&state.db, course_id).await?;
    if !course.is_published {
        return Err(ApiError::NotFound("course not found".into()));
    }

    let lesson_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(&state.db)
        .await?;
    let student_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND is_active",
    )
    .bind(course_id)
    .fetch_one(&state.db)
    .await?;
    let average_rating = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(rating)::float8 FROM course_reviews WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(serde_json::json!({
        "course": course,
        "lesson_count": lesson_count,
        "student_count": student_count,
        "average_rating": average_rating.unwrap_or(0.0),
    })))
}

/// Per-lesson completion and per-quiz pass statistics for the
/// instructor's own course.
async fn course_analytics(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let course = owned_course(&state, &user, course_id).await?;

    let student_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND is_active",
    )
    .bind(course_id)
    .fetch_one(&state.db)
    .await?;
    let completed_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND completed_at IS NOT NULL",
    )
    .bind(course_id)
    .fetch_one(&state.db)
    .await?;

    let lesson_rows = sqlx::query_as::<_, (Uuid, String, i64)>(
        "SELECT l.id, l.title, COUNT(lp.id) FILTER (WHERE lp.is_completed)
         FROM lessons l
         LEFT JOIN lesson_progress lp ON lp.lesson_id = l.id
         WHERE l.course_id = $1
         GROUP BY l.id, l.title, l.position
         ORDER BY l.position",
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;
    let lesson_statistics: Vec<serde_json::Value> = lesson_rows
        .into_iter()
        .map(|(id, title, completed)| {
            serde_json::json!({
                "lesson_id": id,
                "title": title,
                "completed_count": completed,
                "completion_rate": rate_percent(completed, student_count),
            })
        })
        .collect();

    let quiz_rows = sqlx::query_as::<_, (Uuid, String, i64, i64, Option<f64>)>(
        "SELECT q.id, q.title,
                COUNT(a.id),
                COUNT(a.id) FILTER (WHERE a.passed),
                AVG(a.score)::float8
         FROM quizzes q
         LEFT JOIN quiz_attempts a ON a.quiz_id = q.id AND a.completed_at IS NOT NULL
         WHERE q.course_id = $1
         GROUP BY q.id, q.title
         ORDER BY q.title",
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;
    let quiz_statistics: Vec<serde_json::Value> = quiz_rows
        .into_iter()
        .map(|(id, title, total, passed, avg)| {
            serde_json::json!({
                "quiz_id": id,
                "title": title,
                "total_attempts": total,
                "passed_attempts": passed,
                "pass_rate": rate_percent(passed, total),
                "average_score": avg.unwrap_or(0.0),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "course_id": course.id,
        "title": course.title,
        "student_count": student_count,
        "completed_count": completed_count,
        "completion_rate": rate_percent(completed_count, student_count),
        "lesson_statistics": lesson_statistics,
        "quiz_statistics": quiz_statistics,
    })))
}

async fn create_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateCourseReq>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    user.require_instructor()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if req.price_cents < 0 {
        return Err(ApiError::Validation("price may not be negative".into()));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses
            (title, description, instructor_id, category_id, price_cents, is_free,
             difficulty, is_published, max_students)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'beginner'), $8, $9)
        RETURNING *
        "#,
    )
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(user.0.id)
    .bind(req.category_id)
    .bind(req.price_cents)
    .bind(req.is_free)
    .bind(req.difficulty)
    .bind(req.is_published)
    .bind(req.max_students)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn instructor_courses(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Course>>> {
    user.require_instructor()?;
    let courses = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE instructor_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.0.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(courses))
}

async fn owned_course(state: &AppState, user: &CurrentUser, course_id: Uuid) -> ApiResult<Course> {
    let course = fetch_course(&state.db, course_id).await?;
    if course.instructor_id != user.0.id {
        return Err(ApiError::PermissionDenied(
            "only the course instructor may do this".into(),
        ));
    }
    Ok(course)
}

async fn update_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateCourseReq>,
) -> ApiResult<Json<Course>> {
    owned_course(&state, &user, course_id).await?;
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses
        SET title = $2, description = $3, category_id = $4, price_cents = $5,
            is_free = $6, difficulty = COALESCE($7, difficulty),
            is_published = $8, max_students = $9, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.category_id)
    .bind(req.price_cents)
    .bind(req.is_free)
    .bind(req.difficulty)
    .bind(req.is_published)
    .bind(req.max_students)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(course))
}

async fn delete_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_course(&state, &user, course_id).await?;
    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(course_id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- lessons ---

/// The instructor sees everything, an enrolled student sees everything,
/// everyone else only sees preview lessons.
async fn list_lessons(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Lesson>>> {
    let course = fetch_course(&state.db, course_id).await?;
    let full_access = course.instructor_id == user.0.id
        || active_enrollment(&state.db, user.0.id, course_id)
            .await?
            .is_some();

    let lessons = if full_access {
        sqlx::query_as::<_, Lesson>(
            "SELECT * FROM lessons WHERE course_id = $1 ORDER BY position",
        )
        .bind(course_id)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, Lesson>(
            "SELECT * FROM lessons WHERE course_id = $1 AND is_preview ORDER BY position",
        )
        .bind(course_id)
        .fetch_all(&state.db)
        .await?
    };
    Ok(Json(lessons))
}

async fn create_lesson(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLessonReq>,
) -> ApiResult<(StatusCode, Json<Lesson>)> {
    owned_course(&state, &user, course_id).await?;
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if req.position < 1 {
        return Err(ApiError::Validation("position must be >= 1".into()));
    }

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (course_id, title, description, position, duration_minutes, is_preview)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.position)
    .bind(req.duration_minutes)
    .bind(req.is_preview)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn update_lesson(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateLessonReq>,
) -> ApiResult<Json<Lesson>> {
    owned_course(&state, &user, course_id).await?;
    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        UPDATE lessons
        SET title = $3, description = $4, position = $5, duration_minutes = $6, is_preview = $7
        WHERE id = $1 AND course_id = $2
        RETURNING *
        "#,
    )
    .bind(lesson_id)
    .bind(course_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.position)
    .bind(req.duration_minutes)
    .bind(req.is_preview)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("lesson not found".into()))?;
    Ok(Json(lesson))
}

async fn delete_lesson(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    owned_course(&state, &user, course_id).await?;
    let res = sqlx::query("DELETE FROM lessons WHERE id = $1 AND course_id = $2")
        .bind(lesson_id)
        .bind(course_id)
        .execute(&state.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("lesson not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- reviews ---

async fn list_reviews(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CourseReview>>> {
    let reviews = sqlx::query_as::<_, CourseReview>(
        "SELECT * FROM course_reviews WHERE course_id = $1 ORDER BY created_at DESC",
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(reviews))
}

async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateReviewReq>,
) -> ApiResult<(StatusCode, Json<CourseReview>)> {
    fetch_course(&state.db, course_id).await?;
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::Validation("rating must be between 1 and 5".into()));
    }
    if active_enrollment(&state.db, user.0.id, course_id)
        .await?
        .is_none()
    {
        return Err(ApiError::PermissionDenied(
            "must be enrolled to review a course".into(),
        ));
    }

    let review = sqlx::query_as::<_, CourseReview>(
        r#"
        INSERT INTO course_reviews (course_id, student_id, rating, review_text)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(user.0.id)
    .bind(req.rating)
    .bind(&req.review_text)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

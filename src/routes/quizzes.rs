use std::collections::HashMap;

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
use crate::models::{
    Answer, AnswerPublic, CreateQuestionReq, CreateQuizReq, Question, QuestionKind, Quiz,
    QuizAttempt, QuizResponse, SubmitAttemptReq,
};
use crate::routes::{active_enrollment, fetch_course};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/courses/:course_id/quizzes",
            get(list_quizzes).post(create_quiz),
        )
        .route(
            "/api/courses/:course_id/quizzes/:quiz_id",
            get(quiz_detail).put(update_quiz).delete(delete_quiz),
        )
        .route(
            "/api/courses/:course_id/quizzes/:quiz_id/questions",
            post(create_question),
        )
        .route(
            "/api/courses/:course_id/quizzes/:quiz_id/questions/:question_id",
            axum::routing::put(update_question).delete(delete_question),
        )
        .route(
            "/api/courses/:course_id/quizzes/:quiz_id/attempts",
            get(course_quiz_attempts).post(start_attempt),
        )
        .route("/api/attempts", get(my_attempts))
        .route("/api/attempts/:attempt_id", get(attempt_detail))
        .route("/api/attempts/:attempt_id/submit", post(submit_attempt))
}

async fn fetch_quiz(state: &AppState, course_id: Uuid, quiz_id: Uuid) -> ApiResult<Quiz> {
    sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1 AND course_id = $2")
        .bind(quiz_id)
        .bind(course_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("quiz not found".into()))
}

/// The instructor sees every quiz; an enrolled student sees active ones;
/// everyone else sees nothing.
async fn list_quizzes(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Quiz>>> {
    let course = fetch_course(&state.db, course_id).await?;
    let quizzes = if course.instructor_id == user.0.id {
        sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE course_id = $1 ORDER BY title")
            .bind(course_id)
            .fetch_all(&state.db)
            .await?
    } else if active_enrollment(&state.db, user.0.id, course_id)
        .await?
        .is_some()
    {
        sqlx::query_as::<_, Quiz>(
            "SELECT * FROM quizzes WHERE course_id = $1 AND is_active ORDER BY title",
        )
        .bind(course_id)
        .fetch_all(&state.db)
        .await?
    } else {
        Vec::new()
    };
    Ok(Json(quizzes))
}

async fn create_quiz(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateQuizReq>,
) -> ApiResult<(StatusCode, Json<Quiz>)> {
    let course = fetch_course(&state.db, course_id).await?;
    if course.instructor_id != user.0.id {
        return Err(ApiError::PermissionDenied(
            "only the course instructor may do this".into(),
        ));
    }
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if let Some(score) = req.passing_score {
        if !(0..=100).contains(&score) {
            return Err(ApiError::Validation(
                "passing_score must be between 0 and 100".into(),
            ));
        }
    }
    if matches!(req.max_attempts, Some(n) if n < 1) {
        return Err(ApiError::Validation("max_attempts must be >= 1".into()));
    }

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes
            (course_id, title, description, time_limit_minutes, passing_score, max_attempts, is_active)
        VALUES ($1, $2, $3, $4, COALESCE($5, 70), COALESCE($6, 3), COALESCE($7, true))
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.time_limit_minutes)
    .bind(req.passing_score)
    .bind(req.max_attempts)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

async fn quiz_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    let course = fetch_course(&state.db, course_id).await?;
    let quiz = fetch_quiz(&state, course_id, quiz_id).await?;
    let is_instructor = course.instructor_id == user.0.id;
    if !is_instructor {
        let enrolled = active_enrollment(&state.db, user.0.id, course_id)
            .await?
            .is_some();
        if !enrolled || !quiz.is_active {
            return Err(ApiError::NotFound("quiz not found".into()));
        }
    }

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = $1 ORDER BY position",
    )
    .bind(quiz_id)
    .fetch_all(&state.db)
    .await?;
    let total_points: i32 = questions.iter().map(|q| q.points).sum();

    // correctness flags are instructor-only
    let questions_json: Vec<serde_json::Value> = if is_instructor {
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT a.* FROM answers a
            JOIN questions q ON q.id = a.question_id
            WHERE q.quiz_id = $1
            ORDER BY a.question_id, a.position
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&state.db)
        .await?;
        let mut by_question: HashMap<Uuid, Vec<Answer>> = HashMap::new();
        for a in answers {
            by_question.entry(a.question_id).or_default().push(a);
        }
        questions
            .iter()
            .map(|q| {
                serde_json::json!({
                    "question": q,
                    "answers": by_question.remove(&q.id).unwrap_or_default(),
                })
            })
            .collect()
    } else {
        let answers = sqlx::query_as::<_, AnswerPublic>(
            r#"
            SELECT a.id, a.question_id, a.answer_text, a.position FROM answers a
            JOIN questions q ON q.id = a.question_id
            WHERE q.quiz_id = $1
            ORDER BY a.question_id, a.position
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&state.db)
        .await?;
        let mut by_question: HashMap<Uuid, Vec<AnswerPublic>> = HashMap::new();
        for a in answers {
            by_question.entry(a.question_id).or_default().push(a);
        }
        questions
            .iter()
            .map(|q| {
                serde_json::json!({
                    "question": q,
                    "answers": by_question.remove(&q.id).unwrap_or_default(),
                })
            })
            .collect()
    };

    Ok(Json(serde_json::json!({
        "quiz": quiz,
        "question_count": questions.len(),
        "total_points": total_points,
        "questions": questions_json,
    })))
}

async fn owned_quiz(
    state: &AppState,
    user: &CurrentUser,
    course_id: Uuid,
    quiz_id: Uuid,
) -> ApiResult<Quiz> {
    let course = fetch_course(&state.db, course_id).await?;
    if course.instructor_id != user.0.id {
        return Err(ApiError::PermissionDenied(
            "only the course instructor may do this".into(),
        ));
    }
    fetch_quiz(state, course_id, quiz_id).await
}

async fn update_quiz(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateQuizReq>,
) -> ApiResult<Json<Quiz>> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        UPDATE quizzes
        SET title = $2, description = $3, time_limit_minutes = $4,
            passing_score = COALESCE($5, passing_score),
            max_attempts = COALESCE($6, max_attempts),
            is_active = COALESCE($7, is_active),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(quiz_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.time_limit_minutes)
    .bind(req.passing_score)
    .bind(req.max_attempts)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(quiz))
}

async fn delete_quiz(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_question_fields(req: &CreateQuestionReq) -> ApiResult<()> {
    if req.question_text.trim().is_empty() {
        return Err(ApiError::Validation("question_text is required".into()));
    }
    if req.position < 1 {
        return Err(ApiError::Validation("position must be >= 1".into()));
    }
    if matches!(req.points, Some(p) if p < 1) {
        return Err(ApiError::Validation("points must be >= 1".into()));
    }
    Ok(())
}

fn validate_question(req: &CreateQuestionReq) -> ApiResult<()> {
    validate_question_fields(req)?;
    if matches!(req.kind, QuestionKind::MultipleChoice | QuestionKind::TrueFalse)
        && !req.answers.iter().any(|a| a.is_correct)
    {
        return Err(ApiError::Validation(
            "choice questions need at least one correct answer".into(),
        ));
    }
    Ok(())
}

/// Create a question together with its answer choices in one transaction.
async fn create_question(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateQuestionReq>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    validate_question(&req)?;

    let mut tx = state.db.begin().await?;
    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (quiz_id, question_text, kind, points, position, explanation)
        VALUES ($1, $2, $3, COALESCE($4, 1), $5, $6)
        RETURNING *
        "#,
    )
    .bind(quiz_id)
    .bind(req.question_text.trim())
    .bind(req.kind)
    .bind(req.points)
    .bind(req.position)
    .bind(&req.explanation)
    .fetch_one(&mut *tx)
    .await?;

    let mut answers = Vec::with_capacity(req.answers.len());
    for a in &req.answers {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (question_id, answer_text, is_correct, position)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(question.id)
        .bind(&a.answer_text)
        .bind(a.is_correct)
        .bind(a.position)
        .fetch_one(&mut *tx)
        .await?;
        answers.push(answer);
    }
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "question": question, "answers": answers })),
    ))
}

/// Update a question; a non-empty `answers` list replaces the existing
/// choices in the same transaction.
async fn update_question(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id, question_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(req): Json<CreateQuestionReq>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    // an empty answer list keeps the stored choices, which already satisfy
    // the correct-answer rule
    if req.answers.is_empty() {
        validate_question_fields(&req)?;
    } else {
        validate_question(&req)?;
    }

    let mut tx = state.db.begin().await?;
    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions
        SET question_text = $3, kind = $4, points = COALESCE($5, points),
            position = $6, explanation = $7
        WHERE id = $1 AND quiz_id = $2
        RETURNING *
        "#,
    )
    .bind(question_id)
    .bind(quiz_id)
    .bind(req.question_text.trim())
    .bind(req.kind)
    .bind(req.points)
    .bind(req.position)
    .bind(&req.explanation)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("question not found".into()))?;

    let answers = if req.answers.is_empty() {
        sqlx::query_as::<_, Answer>(
            "SELECT * FROM answers WHERE question_id = $1 ORDER BY position",
        )
        .bind(question.id)
        .fetch_all(&mut *tx)
        .await?
    } else {
        sqlx::query("DELETE FROM answers WHERE question_id = $1")
            .bind(question.id)
            .execute(&mut *tx)
            .await?;
        let mut answers = Vec::with_capacity(req.answers.len());
        for a in &req.answers {
            let answer = sqlx::query_as::<_, Answer>(
                r#"
                INSERT INTO answers (question_id, answer_text, is_correct, position)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(question.id)
            .bind(&a.answer_text)
            .bind(a.is_correct)
            .bind(a.position)
            .fetch_one(&mut *tx)
            .await?;
            answers.push(answer);
        }
        answers
    };
    tx.commit().await?;

    Ok(Json(
        serde_json::json!({ "question": question, "answers": answers }),
    ))
}

async fn delete_question(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id, question_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    let res = sqlx::query("DELETE FROM questions WHERE id = $1 AND quiz_id = $2")
        .bind(question_id)
        .bind(quiz_id)
        .execute(&state.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("question not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- attempt lifecycle ---

async fn start_attempt(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let quiz = fetch_quiz(&state, course_id, quiz_id).await?;
    if !quiz.is_active {
        return Err(ApiError::NotFound("quiz not found".into()));
    }
    if active_enrollment(&state.db, user.0.id, course_id)
        .await?
        .is_none()
    {
        return Err(ApiError::PermissionDenied(
            "must be enrolled in course to take quiz".into(),
        ));
    }

    let prior = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1 AND student_id = $2",
    )
    .bind(quiz_id)
    .bind(user.0.id)
    .fetch_one(&state.db)
    .await?;
    if prior >= quiz.max_attempts as i64 {
        return Err(ApiError::Conflict("maximum attempts reached".into()));
    }

    // attempt_number = prior count + 1; the (quiz, student, attempt_number)
    // uniqueness constraint rejects the loser of a concurrent start
    let attempt = sqlx::query_as::<_, QuizAttempt>(
        r#"
        INSERT INTO quiz_attempts (quiz_id, student_id, attempt_number)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(quiz_id)
    .bind(user.0.id)
    .bind(prior as i32 + 1)
    .fetch_one(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "attempt": attempt,
            "message": "quiz attempt started",
            "time_limit_minutes": quiz.time_limit_minutes,
        })),
    ))
}

/// Record and grade every response, then finalize the attempt — all inside
/// one transaction so a failure never leaves a partially graded attempt.
async fn submit_attempt(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitAttemptReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let attempt = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE id = $1 AND student_id = $2",
    )
    .bind(attempt_id)
    .bind(user.0.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("attempt not found".into()))?;
    if attempt.is_completed {
        return Err(ApiError::Conflict("attempt already submitted".into()));
    }

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(attempt.quiz_id)
        .fetch_one(&state.db)
        .await?;
    let questions = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE quiz_id = $1")
        .bind(quiz.id)
        .fetch_all(&state.db)
        .await?;
    let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let points_possible: i32 = questions.iter().map(|q| q.points).sum();

    let mut tx = state.db.begin().await?;
    for resp in &req.responses {
        let question = by_id.get(&resp.question_id).copied().ok_or_else(|| {
            ApiError::Validation("question does not belong to this quiz".into())
        })?;

        let selected_is_correct = match resp.selected_answer_id {
            Some(answer_id) => {
                let answer = sqlx::query_as::<_, Answer>(
                    "SELECT * FROM answers WHERE id = $1 AND question_id = $2",
                )
                .bind(answer_id)
                .bind(question.id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    ApiError::Validation("answer does not belong to this question".into())
                })?;
                Some(answer.is_correct)
            }
            None => None,
        };

        let text = resp.text_answer.as_deref().unwrap_or("");
        let graded = grading::grade_response(question.kind, question.points, selected_is_correct, text);

        sqlx::query(
            r#"
            INSERT INTO quiz_responses
                (attempt_id, question_id, selected_answer_id, text_answer, is_correct, points_earned)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (attempt_id, question_id) DO UPDATE
            SET selected_answer_id = EXCLUDED.selected_answer_id,
                text_answer = EXCLUDED.text_answer,
                is_correct = EXCLUDED.is_correct,
                points_earned = EXCLUDED.points_earned,
                answered_at = now()
            "#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .bind(resp.selected_answer_id)
        .bind(text)
        .bind(graded.is_correct)
        .bind(graded.points_earned)
        .execute(&mut *tx)
        .await?;
    }

    let points_earned = sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(SUM(points_earned), 0)::int FROM quiz_responses WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_one(&mut *tx)
    .await?;

    let score = grading::score_percent(points_earned, points_possible);
    let passed = grading::is_passing(score, quiz.passing_score);

    let attempt = sqlx::query_as::<_, QuizAttempt>(
        r#"
        UPDATE quiz_attempts
        SET is_completed = true, completed_at = now(),
            score = $2, points_earned = $3, points_possible = $4, passed = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(attempt.id)
    .bind(score)
    .bind(points_earned)
    .bind(points_possible)
    .bind(passed)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(attempt=%attempt.id, score, passed, "quiz attempt graded");
    Ok(Json(serde_json::json!({
        "message": "quiz submitted successfully",
        "score": score,
        "passed": passed,
        "points_earned": points_earned,
        "points_possible": points_possible,
        "attempt": attempt,
    })))
}

async fn my_attempts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<QuizAttempt>>> {
    let attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE student_id = $1 ORDER BY started_at DESC",
    )
    .bind(user.0.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(attempts))
}

/// A student sees their own attempt; the instructor of the quiz's course
/// sees any attempt on it.
async fn attempt_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let attempt = sqlx::query_as::<_, QuizAttempt>("SELECT * FROM quiz_attempts WHERE id = $1")
        .bind(attempt_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("attempt not found".into()))?;

    if attempt.student_id != user.0.id {
        let instructor_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.instructor_id FROM courses c
            JOIN quizzes q ON q.course_id = c.id
            WHERE q.id = $1
            "#,
        )
        .bind(attempt.quiz_id)
        .fetch_one(&state.db)
        .await?;
        if instructor_id != user.0.id {
            return Err(ApiError::NotFound("attempt not found".into()));
        }
    }

    let responses = sqlx::query_as::<_, QuizResponse>(
        "SELECT * FROM quiz_responses WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(
        serde_json::json!({ "attempt": attempt, "responses": responses }),
    ))
}

async fn course_quiz_attempts(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, quiz_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<QuizAttempt>>> {
    owned_quiz(&state, &user, course_id, quiz_id).await?;
    let attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE quiz_id = $1 ORDER BY started_at DESC",
    )
    .bind(quiz_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateAnswerReq;

    fn choice_question() -> CreateQuestionReq {
        CreateQuestionReq {
            question_text: "What is 2 + 2?".into(),
            kind: QuestionKind::MultipleChoice,
            points: Some(5),
            position: 1,
            explanation: String::new(),
            answers: vec![
                CreateAnswerReq {
                    answer_text: "4".into(),
                    is_correct: true,
                    position: 1,
                },
                CreateAnswerReq {
                    answer_text: "5".into(),
                    is_correct: false,
                    position: 2,
                },
            ],
        }
    }

    #[test]
    fn well_formed_question_passes_validation() {
        assert!(validate_question(&choice_question()).is_ok());
    }

    #[test]
    fn blank_text_bad_position_and_bad_points_are_rejected() {
        let mut req = choice_question();
        req.question_text = "   ".into();
        assert!(matches!(
            validate_question(&req),
            Err(ApiError::Validation(_))
        ));

        let mut req = choice_question();
        req.position = 0;
        assert!(validate_question(&req).is_err());

        let mut req = choice_question();
        req.points = Some(0);
        assert!(validate_question(&req).is_err());
    }

    #[test]
    fn choice_question_needs_a_correct_answer() {
        let mut req = choice_question();
        for a in &mut req.answers {
            a.is_correct = false;
        }
        assert!(validate_question(&req).is_err());

        // short answers carry no choices at all
        req.kind = QuestionKind::ShortAnswer;
        req.answers.clear();
        assert!(validate_question(&req).is_ok());
    }

    #[test]
    fn field_checks_alone_accept_a_choice_question_without_answers() {
        // the update path keeps stored choices when none are resent
        let mut req = choice_question();
        req.answers.clear();
        assert!(validate_question(&req).is_err());
        assert!(validate_question_fields(&req).is_ok());
    }
}

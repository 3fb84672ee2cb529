use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub bio: String,
    #[serde(skip_serializing)]
    pub api_token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor_id: Uuid,
    pub category_id: Option<Uuid>,
    pub price_cents: i64,
    pub is_free: bool,
    pub difficulty: Difficulty,
    pub is_published: bool,
    pub max_students: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub position: i32,
    pub duration_minutes: i32,
    pub is_preview: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub is_active: bool,
    pub progress_percentage: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub amount_paid_cents: i64,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct LessonProgress {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub lesson_id: Uuid,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub watch_time_seconds: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub passing_score: i32,
    pub max_attempts: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub question_text: String,
    pub kind: QuestionKind,
    pub points: i32,
    pub position: i32,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub answer_text: String,
    pub is_correct: bool,
    pub position: i32,
}

/// Answer shape shown to students: the correctness flag stays instructor-only.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct AnswerPublic {
    pub id: Uuid,
    pub question_id: Uuid,
    pub answer_text: String,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: i32,
    pub points_earned: i32,
    pub points_possible: i32,
    pub is_completed: bool,
    pub passed: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct QuizResponse {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub selected_answer_id: Option<Uuid>,
    pub text_answer: String,
    pub is_correct: bool,
    pub points_earned: i32,
    pub answered_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Certificate {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
    pub final_score: i32,
    pub verification_code: String,
    pub document_path: Option<String>,
    pub is_verified: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CertificateTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub background_color: String,
    pub text_color: String,
    pub border_color: String,
    pub title_font_size: i32,
    pub body_font_size: i32,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificateTemplate {
    /// Built-in visual settings used when no default template row exists.
    pub fn fallback() -> Self {
        Self {
            id: Uuid::nil(),
            name: "Default Template".into(),
            description: String::new(),
            background_color: "#FFFFFF".into(),
            text_color: "#000000".into(),
            border_color: "#000000".into(),
            title_font_size: 24,
            body_font_size: 12,
            is_active: true,
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CourseReview {
    pub id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}

// --- request/response shapes ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub bio: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateProfileReq {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCategoryReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub is_free: bool,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub is_published: bool,
    pub max_students: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CourseFilter {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub is_free: Option<bool>,
    pub search: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateLessonReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub position: i32,
    #[serde(default)]
    pub duration_minutes: i32,
    #[serde(default)]
    pub is_preview: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateQuizReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub passing_score: Option<i32>,
    pub max_attempts: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateQuestionReq {
    pub question_text: String,
    pub kind: QuestionKind,
    pub points: Option<i32>,
    pub position: i32,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub answers: Vec<CreateAnswerReq>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateAnswerReq {
    pub answer_text: String,
    #[serde(default)]
    pub is_correct: bool,
    pub position: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitAttemptReq {
    pub responses: Vec<ResponseReq>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResponseReq {
    pub question_id: Uuid,
    pub selected_answer_id: Option<Uuid>,
    pub text_answer: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MarkLessonCompleteReq {
    #[serde(default)]
    pub watch_time_seconds: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateReviewReq {
    pub rating: i32,
    #[serde(default)]
    pub review_text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTemplateReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub border_color: Option<String>,
    pub title_font_size: Option<i32>,
    pub body_font_size: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyCertificateReq {
    pub certificate_id: Option<String>,
    pub verification_code: Option<String>,
}

/// Read-only projection returned by verification endpoints. Never exposes the
/// underlying row.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateVerification {
    pub valid: bool,
    pub student_name: String,
    pub course_title: String,
    pub completion_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub final_score: i32,
    pub verification_code: String,
}

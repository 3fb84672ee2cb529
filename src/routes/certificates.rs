use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::AppState;
use crate::error::{ApiError, ApiResult};
use crate::issuer;
use crate::models::{
    Certificate, CertificateTemplate, CertificateVerification, Course, CreateTemplateReq, User,
    VerifyCertificateReq,
};
use crate::render::HtmlRenderer;
use crate::verification::{self, CertificateRef};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/certificates", get(my_certificates))
        .route(
            "/api/instructor/certificates",
            get(instructor_certificates),
        )
        .route(
            "/api/courses/:course_id/certificates",
            get(course_certificates),
        )
        .route("/api/certificates/verify", post(verify))
        .route("/api/certificates/public/:certificate_id", get(public_view))
        .route("/api/certificates/:certificate_id", get(certificate_detail))
        .route("/api/certificates/:certificate_id/download", get(download))
        .route("/api/courses/:course_id/certificate", post(issue))
        .route(
            "/api/certificate-templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/api/certificate-templates/:template_id/make-default",
            post(make_default_template),
        )
}

async fn my_certificates(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Certificate>>> {
    let certs = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE student_id = $1 AND is_verified ORDER BY issued_at DESC",
    )
    .bind(user.0.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(certs))
}

/// Every certificate issued on a course the caller teaches.
async fn instructor_certificates(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Certificate>>> {
    user.require_instructor()?;
    let certs = sqlx::query_as::<_, Certificate>(
        "SELECT c.* FROM certificates c
         JOIN courses co ON co.id = c.course_id
         WHERE co.instructor_id = $1 AND c.is_verified
         ORDER BY c.issued_at DESC",
    )
    .bind(user.0.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(certs))
}

/// Certificates issued on one course. Anyone other than the course
/// instructor sees an empty list rather than an error.
async fn course_certificates(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Certificate>>> {
    let owns = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1 AND instructor_id = $2)",
    )
    .bind(course_id)
    .bind(user.0.id)
    .fetch_one(&state.db)
    .await?;
    if !owns {
        return Ok(Json(Vec::new()));
    }
    let certs = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE course_id = $1 AND is_verified ORDER BY issued_at DESC",
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(certs))
}

async fn certificate_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(certificate_id): Path<Uuid>,
) -> ApiResult<Json<Certificate>> {
    let cert = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE id = $1 AND student_id = $2 AND is_verified",
    )
    .bind(certificate_id)
    .bind(user.0.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("certificate not found".into()))?;
    Ok(Json(cert))
}

/// Explicit issuance for a completed enrollment. Idempotent: an existing
/// certificate comes back with 200 instead of an error.
async fn issue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let enrollment = sqlx::query_as::<_, crate::models::Enrollment>(
        r#"
        SELECT * FROM enrollments
        WHERE student_id = $1 AND course_id = $2 AND is_active AND progress_percentage = 100
        "#,
    )
    .bind(user.0.id)
    .bind(course_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::Validation("course not completed or not enrolled".into()))?;

    let existed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM certificates WHERE enrollment_id = $1)",
    )
    .bind(enrollment.id)
    .fetch_one(&state.db)
    .await?;

    let cert =
        issuer::issue_for_enrollment(&state.db, &HtmlRenderer, &state.data_dir, enrollment.id)
            .await?;

    if existed {
        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "certificate already exists",
                "certificate": cert,
            })),
        ))
    } else {
        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "certificate generated successfully",
                "certificate": cert,
            })),
        ))
    }
}

async fn download(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(certificate_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let cert = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE id = $1 AND student_id = $2 AND is_verified",
    )
    .bind(certificate_id)
    .bind(user.0.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("certificate not found".into()))?;

    // rendering may have failed at issue time; retry once on demand
    let cert = if cert.document_path.is_none() {
        issuer::render_document(&state.db, &HtmlRenderer, &state.data_dir, &cert).await?
    } else {
        cert
    };
    let rel_path = cert
        .document_path
        .ok_or_else(|| ApiError::NotFound("certificate document not available".into()))?;

    let bytes = tokio::fs::read(state.data_dir.join(&rel_path))
        .await
        .map_err(|_| ApiError::NotFound("certificate document not available".into()))?;

    let disposition = format!("attachment; filename=\"certificate_{}.html\"", cert.id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Public verification by certificate id or code. A malformed id is
/// rejected before any lookup.
async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyCertificateReq>,
) -> ApiResult<Json<CertificateVerification>> {
    let reference = verification::classify(
        req.certificate_id.as_deref(),
        req.verification_code.as_deref(),
    )?;

    let cert = match reference {
        CertificateRef::Id(id) => {
            sqlx::query_as::<_, Certificate>(
                "SELECT * FROM certificates WHERE id = $1 AND is_verified",
            )
            .bind(id)
            .fetch_optional(&state.db)
            .await?
        }
        CertificateRef::Code(code) => {
            sqlx::query_as::<_, Certificate>(
                "SELECT * FROM certificates WHERE verification_code = $1 AND is_verified",
            )
            .bind(code)
            .fetch_optional(&state.db)
            .await?
        }
    }
    .ok_or_else(|| ApiError::NotFound("certificate not found or invalid".into()))?;

    Ok(Json(projection(&state, cert).await?))
}

async fn public_view(
    State(state): State<AppState>,
    Path(certificate_id): Path<Uuid>,
) -> ApiResult<Json<CertificateVerification>> {
    let cert = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE id = $1 AND is_verified",
    )
    .bind(certificate_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("certificate not found".into()))?;
    Ok(Json(projection(&state, cert).await?))
}

async fn projection(state: &AppState, cert: Certificate) -> ApiResult<CertificateVerification> {
    let student = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(cert.student_id)
        .fetch_one(&state.db)
        .await?;
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(cert.course_id)
        .fetch_one(&state.db)
        .await?;
    Ok(CertificateVerification {
        valid: true,
        student_name: student.display_name().to_string(),
        course_title: course.title,
        completion_date: cert.completion_date,
        issued_at: cert.issued_at,
        final_score: cert.final_score,
        verification_code: cert.verification_code,
    })
}

// --- templates ---

async fn list_templates(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<CertificateTemplate>>> {
    let templates = sqlx::query_as::<_, CertificateTemplate>(
        "SELECT * FROM certificate_templates ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(templates))
}

async fn create_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateTemplateReq>,
) -> ApiResult<(StatusCode, Json<CertificateTemplate>)> {
    user.require_admin()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }

    let template = sqlx::query_as::<_, CertificateTemplate>(
        r#"
        INSERT INTO certificate_templates
            (name, description, background_color, text_color, border_color,
             title_font_size, body_font_size)
        VALUES ($1, $2, COALESCE($3, '#FFFFFF'), COALESCE($4, '#000000'),
                COALESCE($5, '#000000'), COALESCE($6, 24), COALESCE($7, 12))
        RETURNING *
        "#,
    )
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.background_color)
    .bind(req.text_color)
    .bind(req.border_color)
    .bind(req.title_font_size)
    .bind(req.body_font_size)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Atomically swap which template is the default. Explicit administrative
/// command, not a side effect of saving a template.
async fn make_default_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(template_id): Path<Uuid>,
) -> ApiResult<Json<CertificateTemplate>> {
    user.require_admin()?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE certificate_templates SET is_default = false WHERE is_default")
        .execute(&mut *tx)
        .await?;
    let template = sqlx::query_as::<_, CertificateTemplate>(
        r#"
        UPDATE certificate_templates
        SET is_default = true, updated_at = now()
        WHERE id = $1 AND is_active
        RETURNING *
        "#,
    )
    .bind(template_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("template not found".into()))?;
    tx.commit().await?;

    Ok(Json(template))
}

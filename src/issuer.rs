// Certification issuer. Enrollment completion is announced on an explicit
// channel; the worker consumes events and issues certificates best-effort,
// so a failed issuance never blocks the request that completed the course.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Certificate, CertificateTemplate, Course, Enrollment, User};
use crate::render::{CertificateFields, DocumentRenderer, HtmlRenderer};
use crate::verification;

#[derive(Debug, Clone, Copy)]
pub struct CompletionEvent {
    pub enrollment_id: Uuid,
}

pub fn spawn_worker(db: Db, data_dir: PathBuf) -> mpsc::Sender<CompletionEvent> {
    let (tx, mut rx) = mpsc::channel::<CompletionEvent>(64);
    tokio::spawn(async move {
        let renderer = HtmlRenderer;
        while let Some(ev) = rx.recv().await {
            match issue_for_enrollment(&db, &renderer, &data_dir, ev.enrollment_id).await {
                Ok(cert) => {
                    tracing::info!(certificate=%cert.id, enrollment=%ev.enrollment_id, "certificate issued");
                }
                Err(e) => {
                    tracing::warn!(error=%e, enrollment=%ev.enrollment_id, "certificate issuance failed");
                }
            }
        }
    });
    tx
}

/// Issue a certificate for a completed enrollment. Idempotent: an existing
/// certificate is returned as-is, never duplicated.
pub async fn issue_for_enrollment(
    db: &Db,
    renderer: &dyn DocumentRenderer,
    data_dir: &Path,
    enrollment_id: Uuid,
) -> ApiResult<Certificate> {
    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = $1")
        .bind(enrollment_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("enrollment not found".into()))?;

    if let Some(existing) =
        sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE enrollment_id = $1")
            .bind(enrollment_id)
            .fetch_optional(db)
            .await?
    {
        return Ok(existing);
    }

    let completed_at = match (enrollment.progress_percentage, enrollment.completed_at) {
        (100, Some(ts)) => ts,
        _ => return Err(ApiError::Validation("course not completed".into())),
    };

    let certificate_id = Uuid::new_v4();
    let code = pick_code(db, certificate_id).await?;

    let cert = sqlx::query_as::<_, Certificate>(
        r#"
        INSERT INTO certificates
            (id, enrollment_id, student_id, course_id, completion_date, final_score, verification_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(certificate_id)
    .bind(enrollment.id)
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(completed_at)
    .bind(enrollment.progress_percentage)
    .bind(&code)
    .fetch_one(db)
    .await?;

    // Rendering is best-effort: a failure leaves document_path empty and is
    // retried the next time the document is requested for download.
    match render_document(db, renderer, data_dir, &cert).await {
        Ok(cert) => Ok(cert),
        Err(e) => {
            tracing::warn!(error=%e, certificate=%cert.id, "document rendering failed");
            Ok(cert)
        }
    }
}

/// Sample random codes up to a fixed cap, then fall back to one derived from
/// the certificate id so issuance always terminates.
async fn pick_code(db: &Db, certificate_id: Uuid) -> ApiResult<String> {
    for _ in 0..verification::MAX_CODE_ATTEMPTS {
        let candidate = verification::random_code();
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM certificates WHERE verification_code = $1)",
        )
        .bind(&candidate)
        .fetch_one(db)
        .await?;
        if !taken {
            return Ok(candidate);
        }
    }
    Ok(verification::derived_code(certificate_id))
}

pub async fn render_document(
    db: &Db,
    renderer: &dyn DocumentRenderer,
    data_dir: &Path,
    cert: &Certificate,
) -> ApiResult<Certificate> {
    let student = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(cert.student_id)
        .fetch_one(db)
        .await?;
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(cert.course_id)
        .fetch_one(db)
        .await?;
    let instructor = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(course.instructor_id)
        .fetch_one(db)
        .await?;
    let template = default_template(db).await?;

    let fields = CertificateFields {
        certificate_id: cert.id,
        student_name: student.display_name().to_string(),
        course_title: course.title,
        instructor_name: instructor.display_name().to_string(),
        completion_date: cert.completion_date,
        issued_at: cert.issued_at,
        final_score: cert.final_score,
        verification_code: cert.verification_code.clone(),
    };
    let bytes = renderer.render(&fields, &template)?;

    let rel_path = format!("certificates/{}.{}", cert.id, renderer.extension());
    let out_path = data_dir.join(&rel_path);
    if let Some(parent) = out_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }
    tokio::fs::write(&out_path, bytes)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let updated = sqlx::query_as::<_, Certificate>(
        "UPDATE certificates SET document_path = $2 WHERE id = $1 RETURNING *",
    )
    .bind(cert.id)
    .bind(&rel_path)
    .fetch_one(db)
    .await?;
    Ok(updated)
}

pub async fn default_template(db: &Db) -> ApiResult<CertificateTemplate> {
    let found = sqlx::query_as::<_, CertificateTemplate>(
        "SELECT * FROM certificate_templates WHERE is_default AND is_active LIMIT 1",
    )
    .fetch_optional(db)
    .await?;
    Ok(found.unwrap_or_else(CertificateTemplate::fallback))
}

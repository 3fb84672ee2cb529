// Document rendering boundary. The issuer hands over the certificate's
// structured fields plus a template's visual settings and stores whatever
// bytes come back; it never interprets the blob.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::CertificateTemplate;

#[derive(Debug, Clone)]
pub struct CertificateFields {
    pub certificate_id: Uuid,
    pub student_name: String,
    pub course_title: String,
    pub instructor_name: String,
    pub completion_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub final_score: i32,
    pub verification_code: String,
}

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, fields: &CertificateFields, template: &CertificateTemplate) -> Result<Vec<u8>>;

    /// File extension for the blobs this renderer produces.
    fn extension(&self) -> &'static str;
}

/// Built-in renderer producing a self-contained HTML document.
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn render(&self, fields: &CertificateFields, template: &CertificateTemplate) -> Result<Vec<u8>> {
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Certificate of Completion</title>
  <style>
    body{{background:{bg};color:{fg};font-family:Georgia,serif;text-align:center;margin:0;padding:48px}}
    .frame{{border:3px solid {border};padding:8px}}
    .inner{{border:1px solid {border};padding:48px}}
    h1{{font-size:{title_px}px;letter-spacing:2px}}
    p{{font-size:{body_px}px;margin:10px 0}}
    .name{{font-size:{name_px}px;font-weight:bold}}
    .course{{font-size:{course_px}px;font-weight:bold}}
    .meta{{margin-top:36px;font-size:{body_px}px;opacity:.8}}
  </style>
</head>
<body>
<div class='frame'><div class='inner'>
  <h1>CERTIFICATE OF COMPLETION</h1>
  <p>This is to certify that</p>
  <p class='name'>{student}</p>
  <p>has successfully completed the course</p>
  <p class='course'>{course}</p>
  <p>Completed on: {completed}</p>
  <p>Final Score: {score}%</p>
  <p>Instructor: {instructor}</p>
  <div class='meta'>
    <p>Certificate ID: {cert_id}</p>
    <p>Verification Code: {code}</p>
    <p>Issued on: {issued}</p>
  </div>
</div></div>
</body>
</html>"#,
            bg = template.background_color,
            fg = template.text_color,
            border = template.border_color,
            title_px = template.title_font_size,
            body_px = template.body_font_size,
            name_px = template.body_font_size + 4,
            course_px = template.body_font_size + 2,
            student = fields.student_name,
            course = fields.course_title,
            completed = fields.completion_date.format("%B %d, %Y"),
            score = fields.final_score,
            instructor = fields.instructor_name,
            cert_id = fields.certificate_id,
            code = fields.verification_code,
            issued = fields.issued_at.format("%B %d, %Y"),
        );
        Ok(html.into_bytes())
    }

    fn extension(&self) -> &'static str {
        "html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CertificateTemplate;

    fn fields() -> CertificateFields {
        CertificateFields {
            certificate_id: Uuid::new_v4(),
            student_name: "Ada Lovelace".into(),
            course_title: "Analytical Engines 101".into(),
            instructor_name: "Charles Babbage".into(),
            completion_date: Utc::now(),
            issued_at: Utc::now(),
            final_score: 100,
            verification_code: "ABCDE12345".into(),
        }
    }

    #[test]
    fn document_carries_the_certificate_fields() {
        let bytes = HtmlRenderer
            .render(&fields(), &CertificateTemplate::fallback())
            .unwrap();
        let doc = String::from_utf8(bytes).unwrap();
        assert!(doc.contains("Ada Lovelace"));
        assert!(doc.contains("Analytical Engines 101"));
        assert!(doc.contains("ABCDE12345"));
        assert!(doc.contains("Final Score: 100%"));
    }

    #[test]
    fn template_colors_flow_into_the_document() {
        let mut template = CertificateTemplate::fallback();
        template.background_color = "#FAFAF0".into();
        let bytes = HtmlRenderer.render(&fields(), &template).unwrap();
        let doc = String::from_utf8(bytes).unwrap();
        assert!(doc.contains("#FAFAF0"));
    }
}

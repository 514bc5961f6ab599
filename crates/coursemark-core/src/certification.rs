//! Certification gate and the certificate rendering seam.
//!
//! The gate is a one-shot transition `NotIssued -> Issued` guarded by course
//! completion. It never renders anything: it hands a `CertificateRequest` to an
//! external `CertificateRenderer`, and a rendering failure does not take the
//! issued certificate back.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::CourseStructure;
use crate::progress::{Certificate, CertificateState, ProgressRecord};

/// Default prefix for verification codes.
pub const DEFAULT_CODE_PREFIX: &str = "CM";

/// Everything a renderer needs to produce the certificate artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub certificate_id: Uuid,
    pub verification_code: String,
    pub user_id: String,
    pub course_id: String,
    pub course_title: String,
    pub completed_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub hours: f64,
    pub grade: Option<f64>,
}

impl CertificateRequest {
    pub fn new(certificate: &Certificate, course: &CourseStructure) -> Self {
        Self {
            certificate_id: certificate.id,
            verification_code: certificate.verification_code.clone(),
            user_id: certificate.user_id.clone(),
            course_id: certificate.course_id.clone(),
            course_title: course.title.clone(),
            completed_at: certificate.completed_at,
            issued_at: certificate.issued_at,
            hours: certificate.hours,
            grade: certificate.grade,
        }
    }
}

/// External collaborator that turns an issued certificate into an artifact.
///
/// Implementations must be idempotent by certificate id: rendering the same
/// id twice should yield the same durable URL.
#[async_trait]
pub trait CertificateRenderer: Send + Sync {
    /// Render and return a durable URL for the artifact.
    async fn render(&self, request: &CertificateRequest) -> anyhow::Result<String>;
}

/// Build a verification code such as `CM-20260101-1A2B3C4D`.
pub fn verification_code(prefix: &str, id: Uuid, now: DateTime<Utc>) -> String {
    let simple = id.simple().to_string().to_uppercase();
    format!("{prefix}-{}-{}", now.format("%Y%m%d"), &simple[..8])
}

/// Mean percentage across graded activities.
///
/// Each exam lesson contributes its best attempt; each assignment lesson its
/// latest graded submission relative to the lesson's max grade. Quizzes are
/// practice and do not count.
pub fn certificate_grade(record: &ProgressRecord, course: &CourseStructure) -> Option<f64> {
    let mut scores = Vec::new();
    for lesson in &course.lessons {
        if let Some(best) = record.best_exam_attempt(&lesson.id) {
            scores.push(best.percentage_score);
        }
        if let (Some(max_grade), Some(latest)) =
            (lesson.max_grade(), record.latest_submission(&lesson.id))
        {
            if let Some(grade) = latest.grade.filter(|_| latest.graded) {
                scores.push(grade / max_grade * 100.0);
            }
        }
    }

    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Issue a certificate if the record is completed and has none yet.
///
/// Returns `None` when the course is not completed or a certificate was
/// already issued; the existing certificate stays on the record.
pub fn try_issue_certificate(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    code_prefix: &str,
    now: DateTime<Utc>,
) -> Option<Certificate> {
    if !record.is_completed() || record.certificate_state == CertificateState::Issued {
        return None;
    }

    let id = Uuid::new_v4();
    let certificate = Certificate {
        id,
        verification_code: verification_code(code_prefix, id, now),
        user_id: record.user_id.clone(),
        course_id: record.course_id.clone(),
        issued_at: now,
        completed_at: record.completed_at.unwrap_or(now),
        hours: f64::from(course.total_duration_minutes()) / 60.0,
        grade: certificate_grade(record, course),
        rendered_url: None,
    };

    record.certificate_state = CertificateState::Issued;
    record.certificate = Some(certificate.clone());
    tracing::info!(
        user_id = %record.user_id,
        course_id = %record.course_id,
        certificate_id = %id,
        "certificate issued"
    );
    Some(certificate)
}

/// Renderer for tests: returns `mock://certificates/<id>` or fails on demand.
#[derive(Default)]
pub struct MockRenderer {
    fail: AtomicBool,
    call_count: AtomicU32,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose calls fail until `set_failing(false)`.
    pub fn failing() -> Self {
        let renderer = Self::default();
        renderer.set_failing(true);
        renderer
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CertificateRenderer for MockRenderer {
    async fn render(&self, request: &CertificateRequest) -> anyhow::Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            anyhow::bail!("renderer unavailable");
        }
        Ok(format!("mock://certificates/{}", request.certificate_id))
    }
}

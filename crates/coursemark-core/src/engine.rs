//! Central progress engine.
//!
//! Ties the recorder, evaluator, and certification gate to a store and an
//! event sink. Each (user, course) record is the unit of mutual exclusion:
//! every mutation runs load → apply → evaluate → save under that record's
//! lock, while different records proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::certification::{
    try_issue_certificate, CertificateRenderer, CertificateRequest, DEFAULT_CODE_PREFIX,
};
use crate::error::{ProgressError, Result};
use crate::evaluator::evaluate;
use crate::events::{EventSink, ProgressEvent};
use crate::model::{CourseStructure, LessonContent, DEFAULT_PASSING_SCORE};
use crate::progress::{
    Answer, AssignmentSubmission, Certificate, DerivedState, ExamAttempt, ProgressRecord,
    ProgressSummary, QuizAttempt,
};
use crate::recorder;
use crate::store::ProgressStore;

/// Configuration for the progress engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Passing threshold for exams registered without one.
    pub default_passing_score: f64,
    /// Issue a certificate in the same mutation that completes the course.
    pub auto_issue_certificates: bool,
    /// Prefix for certificate verification codes.
    pub certificate_code_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_passing_score: DEFAULT_PASSING_SCORE,
            auto_issue_certificates: false,
            certificate_code_prefix: DEFAULT_CODE_PREFIX.to_string(),
        }
    }
}

/// Outcome of a mutating call.
#[derive(Debug, Clone)]
pub struct Recorded<T> {
    /// The recorded attempt, submission, or flag.
    pub value: T,
    /// Derived state after the mutation.
    pub state: DerivedState,
    /// `true` when this was a retry of an already recorded attempt id and
    /// `value` is the original result.
    pub duplicate: bool,
}

/// The central progress engine.
pub struct ProgressEngine {
    store: Arc<dyn ProgressStore>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
    courses: RwLock<HashMap<String, Arc<CourseStructure>>>,
    locks: StdMutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl ProgressEngine {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            courses: RwLock::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ----- Course structures -----

    /// Register or replace a course structure.
    ///
    /// Structures that fail `CourseStructure::check` are refused, so the
    /// engine never scores against a dataset that did not load cleanly.
    pub async fn register_course(&self, mut course: CourseStructure) -> Result<()> {
        course.check()?;
        for lesson in &mut course.lessons {
            if let LessonContent::Exam { passing_score, .. } = &mut lesson.content {
                passing_score.get_or_insert(self.config.default_passing_score);
            }
        }

        tracing::info!(
            course_id = %course.id,
            lessons = course.total_lessons(),
            "course registered"
        );
        self.courses
            .write()
            .await
            .insert(course.id.clone(), Arc::new(course));
        Ok(())
    }

    /// The registered structure for a course.
    pub async fn course(&self, course_id: &str) -> Result<Arc<CourseStructure>> {
        self.courses
            .read()
            .await
            .get(course_id)
            .cloned()
            .ok_or_else(|| ProgressError::UnknownCourse(course_id.to_string()))
    }

    // ----- Enrollment and reads -----

    /// Create the empty progress record for a new enrollment.
    pub async fn enroll(&self, user_id: &str, course_id: &str) -> Result<ProgressRecord> {
        self.course(course_id).await?;
        let record = ProgressRecord::new(user_id, course_id, Utc::now());
        self.store.insert(&record).await?;
        tracing::info!(%user_id, %course_id, "enrolled");
        Ok(record)
    }

    /// The full progress record, including attempt history.
    pub async fn record(&self, user_id: &str, course_id: &str) -> Result<ProgressRecord> {
        self.store
            .load(user_id, course_id)
            .await?
            .ok_or_else(|| ProgressError::NotEnrolled {
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
            })
    }

    pub async fn get_progress_summary(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<ProgressSummary> {
        let course = self.course(course_id).await?;
        let record = self.record(user_id, course_id).await?;
        Ok(record.summary(&course))
    }

    /// Summaries for every course the user is enrolled in.
    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressSummary>> {
        let records = self.store.list_for_user(user_id).await?;
        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            match self.course(&record.course_id).await {
                Ok(course) => summaries.push(record.summary(&course)),
                Err(_) => tracing::warn!(
                    course_id = %record.course_id,
                    "skipping progress for unregistered course"
                ),
            }
        }
        Ok(summaries)
    }

    pub async fn certificate(&self, user_id: &str, course_id: &str) -> Result<Option<Certificate>> {
        Ok(self.record(user_id, course_id).await?.certificate)
    }

    // ----- Mutations -----

    pub async fn record_quiz_attempt(
        &self,
        user_id: &str,
        course_id: &str,
        attempt_id: Uuid,
        lesson_id: &str,
        answers: &[Answer],
    ) -> Result<Recorded<QuizAttempt>> {
        self.mutate(
            user_id,
            course_id,
            true,
            |record, course, now| {
                recorder::record_quiz_attempt(record, course, attempt_id, lesson_id, answers, now)
            },
            |record| {
                record
                    .quiz_attempts
                    .iter()
                    .find(|a| a.id == attempt_id)
                    .cloned()
            },
        )
        .await
    }

    pub async fn record_exam_attempt(
        &self,
        user_id: &str,
        course_id: &str,
        attempt_id: Uuid,
        lesson_id: &str,
        answers: &[Answer],
        started_at: DateTime<Utc>,
    ) -> Result<Recorded<ExamAttempt>> {
        self.mutate(
            user_id,
            course_id,
            true,
            |record, course, now| {
                recorder::record_exam_attempt(
                    record, course, attempt_id, lesson_id, answers, started_at, now,
                )
            },
            |record| {
                record
                    .exam_attempts
                    .iter()
                    .find(|a| a.id == attempt_id)
                    .cloned()
            },
        )
        .await
    }

    pub async fn record_assignment_submission(
        &self,
        user_id: &str,
        course_id: &str,
        submission_id: Uuid,
        lesson_id: &str,
        text: &str,
        files: &[String],
    ) -> Result<Recorded<AssignmentSubmission>> {
        self.mutate(
            user_id,
            course_id,
            true,
            |record, course, now| {
                recorder::record_assignment_submission(
                    record,
                    course,
                    submission_id,
                    lesson_id,
                    text,
                    files,
                    now,
                )
            },
            |record| {
                record
                    .assignment_submissions
                    .iter()
                    .find(|s| s.id == submission_id)
                    .cloned()
            },
        )
        .await
    }

    /// Educator grading. Does not count as learner activity.
    pub async fn grade_assignment(
        &self,
        user_id: &str,
        course_id: &str,
        submission_id: Uuid,
        grade: f64,
        feedback: Option<String>,
    ) -> Result<Recorded<AssignmentSubmission>> {
        self.mutate(
            user_id,
            course_id,
            false,
            |record, course, now| {
                recorder::grade_assignment(record, course, submission_id, grade, feedback, now)
            },
            |_| None,
        )
        .await
    }

    /// Explicit completion of a video, text, or youtube lesson.
    ///
    /// `value` is `true` if the lesson was not marked before.
    pub async fn mark_lesson_complete(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
    ) -> Result<Recorded<bool>> {
        self.mutate(
            user_id,
            course_id,
            true,
            |record, course, _| recorder::mark_lesson_complete(record, course, lesson_id),
            |_| None,
        )
        .await
    }

    // ----- Certification -----

    /// Issue a certificate if the course is completed and none exists yet.
    ///
    /// Returns `None` otherwise; this is a no-op signal, never an error. Use
    /// [`ProgressEngine::certificate`] to fetch an already issued one.
    pub async fn try_issue_certificate(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<Certificate>> {
        let course = self.course(course_id).await?;
        let lock = self.record_lock(user_id, course_id);
        let _guard = lock.lock().await;

        let mut record = self.record(user_id, course_id).await?;
        let Some(certificate) = try_issue_certificate(
            &mut record,
            &course,
            &self.config.certificate_code_prefix,
            Utc::now(),
        ) else {
            return Ok(None);
        };

        self.store.save(&record).await?;
        self.sink.publish(&issued_event(&certificate));
        Ok(Some(certificate))
    }

    /// Render an issued certificate and store the artifact URL.
    ///
    /// Already rendered certificates are returned as is. A renderer failure
    /// is reported as `RenderFailed` and leaves the certificate issued, so the
    /// call can simply be retried.
    pub async fn render_certificate(
        &self,
        user_id: &str,
        course_id: &str,
        renderer: &dyn CertificateRenderer,
    ) -> Result<Certificate> {
        let course = self.course(course_id).await?;
        let record = self.record(user_id, course_id).await?;
        let certificate = record
            .certificate
            .ok_or_else(|| ProgressError::CertificateNotIssued {
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
            })?;
        if certificate.rendered_url.is_some() {
            return Ok(certificate);
        }

        // Rendering happens outside the record lock.
        let request = CertificateRequest::new(&certificate, &course);
        let url = renderer.render(&request).await.map_err(|e| {
            tracing::warn!(certificate_id = %certificate.id, "certificate rendering failed: {e:#}");
            ProgressError::RenderFailed {
                certificate_id: certificate.id,
                message: format!("{e:#}"),
            }
        })?;

        let lock = self.record_lock(user_id, course_id);
        let _guard = lock.lock().await;
        let mut record = self.record(user_id, course_id).await?;
        let stored = match record.certificate.as_mut() {
            Some(stored) if stored.id == certificate.id => stored,
            _ => {
                return Err(ProgressError::Storage(format!(
                    "certificate {} changed while rendering",
                    certificate.id
                )))
            }
        };
        stored.rendered_url = Some(url);
        let rendered = stored.clone();
        self.store.save(&record).await?;
        Ok(rendered)
    }

    // ----- Internals -----

    fn record_lock(&self, user_id: &str, course_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // An entry only the map points at has no holder and no waiter.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry((user_id.to_string(), course_id.to_string()))
                .or_default(),
        )
    }

    /// Apply `op` to a copy of the record and commit it atomically.
    ///
    /// `touch` marks the call as learner activity. A failing `op` leaves the
    /// stored record untouched. A duplicate attempt id is answered with the
    /// original result found by `original`.
    async fn mutate<T, F, O>(
        &self,
        user_id: &str,
        course_id: &str,
        touch: bool,
        op: F,
        original: O,
    ) -> Result<Recorded<T>>
    where
        F: FnOnce(&mut ProgressRecord, &CourseStructure, DateTime<Utc>) -> Result<T>,
        O: FnOnce(&ProgressRecord) -> Option<T>,
    {
        let course = self.course(course_id).await?;
        let lock = self.record_lock(user_id, course_id);
        let _guard = lock.lock().await;

        let current = self.record(user_id, course_id).await?;
        let now = Utc::now();
        let mut next = current.clone();

        let value = match op(&mut next, course.as_ref(), now) {
            Ok(value) => value,
            Err(ProgressError::DuplicateAttempt { attempt_id }) => {
                tracing::debug!(%user_id, %course_id, %attempt_id, "duplicate attempt");
                return match original(&current) {
                    Some(value) => Ok(Recorded {
                        value,
                        state: current.derived_state(&course),
                        duplicate: true,
                    }),
                    None => Err(ProgressError::DuplicateAttempt { attempt_id }),
                };
            }
            Err(e) => return Err(e),
        };

        if touch {
            next.last_accessed_at = next.last_accessed_at.max(now);
        }
        let mut events = Vec::new();
        events.extend(evaluate(&mut next, &course, now).completed);
        if self.config.auto_issue_certificates {
            if let Some(certificate) = try_issue_certificate(
                &mut next,
                &course,
                &self.config.certificate_code_prefix,
                now,
            ) {
                events.push(issued_event(&certificate));
            }
        }

        next.version = self.store.save(&next).await?;
        for event in &events {
            self.sink.publish(event);
        }

        Ok(Recorded {
            value,
            state: next.derived_state(&course),
            duplicate: false,
        })
    }
}

fn issued_event(certificate: &Certificate) -> ProgressEvent {
    ProgressEvent::CertificateIssued {
        user_id: certificate.user_id.clone(),
        course_id: certificate.course_id.clone(),
        certificate_id: certificate.id,
        issued_at: certificate.issued_at,
    }
}

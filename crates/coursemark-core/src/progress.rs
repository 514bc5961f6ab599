//! Per-enrollment progress records.
//!
//! A `ProgressRecord` is created empty at enrollment and is the durable audit
//! trail of a learner's work in one course. Attempts and submissions are only
//! ever appended; derived fields are recomputed by the evaluator.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::CourseStructure;

/// Whether the course has been finished. Never reverts once `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    #[default]
    InProgress,
    Completed,
}

/// Whether a certificate has been issued. `Issued` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateState {
    #[default]
    NotIssued,
    Issued,
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionState::InProgress => write!(f, "in_progress"),
            CompletionState::Completed => write!(f, "completed"),
        }
    }
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateState::NotIssued => write!(f, "not_issued"),
            CertificateState::Issued => write!(f, "issued"),
        }
    }
}

/// One submitted answer: which option was chosen for which question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Index of the question within the lesson.
    pub question: usize,
    /// Index of the selected option.
    pub selected: usize,
}

impl Answer {
    pub fn new(question: usize, selected: usize) -> Self {
        Self { question, selected }
    }
}

/// An answer after scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub question: usize,
    pub selected: usize,
    pub correct: bool,
    pub points_earned: u32,
}

/// A recorded quiz attempt. Quizzes have no pass bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub lesson_id: String,
    pub score: u32,
    pub total_questions: usize,
    pub answers: Vec<ScoredAnswer>,
    /// 1-based, per lesson.
    pub attempt_number: u32,
    pub completed_at: DateTime<Utc>,
}

/// A recorded exam attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub lesson_id: String,
    pub score: u32,
    pub total_points: u32,
    pub percentage_score: f64,
    pub passed: bool,
    pub answers: Vec<ScoredAnswer>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub time_spent_minutes: i64,
}

/// An assignment submission, graded in a second phase by an educator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    pub id: Uuid,
    pub lesson_id: String,
    pub text: String,
    #[serde(default)]
    pub files: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub graded: bool,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
}

/// An issued certificate. Only the reference to the rendered artifact is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub verification_code: String,
    pub user_id: String,
    pub course_id: String,
    pub issued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub hours: f64,
    /// Mean percentage across graded activities, if any.
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub rendered_url: Option<String>,
}

/// The persisted per-(user, course) progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub course_id: String,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_lesson_ids: BTreeSet<String>,
    #[serde(default)]
    pub quiz_attempts: Vec<QuizAttempt>,
    #[serde(default)]
    pub assignment_submissions: Vec<AssignmentSubmission>,
    #[serde(default)]
    pub exam_attempts: Vec<ExamAttempt>,
    #[serde(default)]
    pub total_points_earned: f64,
    #[serde(default)]
    pub completion_state: CompletionState,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certificate_state: CertificateState,
    #[serde(default)]
    pub certificate: Option<Certificate>,
    pub last_accessed_at: DateTime<Utc>,
    /// Every attempt and submission id ever recorded, including replaced ones.
    #[serde(default)]
    pub seen_attempt_ids: BTreeSet<Uuid>,
    /// Optimistic concurrency counter, bumped by the store on each save.
    #[serde(default)]
    pub version: u64,
}

/// Derived state returned with every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedState {
    pub percentage: f64,
    pub completion_state: CompletionState,
    pub certificate_state: CertificateState,
}

/// Read-only projection for listings and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub user_id: String,
    pub course_id: String,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub percentage: f64,
    pub completion_state: CompletionState,
    pub certificate_state: CertificateState,
    pub last_accessed_at: DateTime<Utc>,
}

/// Percentage of `completed` over `total`, 0 for an empty course.
pub fn completion_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

impl ProgressRecord {
    /// A fresh record, as created on enrollment.
    pub fn new(
        user_id: impl Into<String>,
        course_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            course_id: course_id.into(),
            enrolled_at: now,
            completed_lesson_ids: BTreeSet::new(),
            quiz_attempts: Vec::new(),
            assignment_submissions: Vec::new(),
            exam_attempts: Vec::new(),
            total_points_earned: 0.0,
            completion_state: CompletionState::InProgress,
            completed_at: None,
            certificate_state: CertificateState::NotIssued,
            certificate: None,
            last_accessed_at: now,
            seen_attempt_ids: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion_state == CompletionState::Completed
    }

    pub fn quiz_attempts_for<'a, 'b>(
        &'a self,
        lesson_id: &'b str,
    ) -> impl Iterator<Item = &'a QuizAttempt> + 'b
    where
        'a: 'b,
    {
        self.quiz_attempts
            .iter()
            .filter(move |a| a.lesson_id == lesson_id)
    }

    pub fn quiz_attempt_count(&self, lesson_id: &str) -> u32 {
        self.quiz_attempts_for(lesson_id).count() as u32
    }

    pub fn exam_attempts_for<'a, 'b>(
        &'a self,
        lesson_id: &'b str,
    ) -> impl Iterator<Item = &'a ExamAttempt> + 'b
    where
        'a: 'b,
    {
        self.exam_attempts
            .iter()
            .filter(move |a| a.lesson_id == lesson_id)
    }

    /// Highest-scoring exam attempt for a lesson.
    pub fn best_exam_attempt(&self, lesson_id: &str) -> Option<&ExamAttempt> {
        self.exam_attempts
            .iter()
            .filter(|a| a.lesson_id == lesson_id)
            .max_by(|a, b| a.percentage_score.total_cmp(&b.percentage_score))
    }

    /// Latest submission for a lesson by submission time.
    ///
    /// Ties keep the later entry in history order.
    pub fn latest_submission(&self, lesson_id: &str) -> Option<&AssignmentSubmission> {
        self.assignment_submissions
            .iter()
            .filter(|s| s.lesson_id == lesson_id)
            .max_by_key(|s| s.submitted_at)
    }

    /// Completed lessons that are still part of `course`.
    pub fn completed_in(&self, course: &CourseStructure) -> usize {
        self.completed_lesson_ids
            .iter()
            .filter(|id| course.lesson(id).is_some())
            .count()
    }

    pub fn derived_state(&self, course: &CourseStructure) -> DerivedState {
        DerivedState {
            percentage: completion_percentage(self.completed_in(course), course.total_lessons()),
            completion_state: self.completion_state,
            certificate_state: self.certificate_state,
        }
    }

    pub fn summary(&self, course: &CourseStructure) -> ProgressSummary {
        let completed_lessons = self.completed_in(course);
        let total_lessons = course.total_lessons();
        ProgressSummary {
            user_id: self.user_id.clone(),
            course_id: self.course_id.clone(),
            completed_lessons,
            total_lessons,
            percentage: completion_percentage(completed_lessons, total_lessons),
            completion_state: self.completion_state,
            certificate_state: self.certificate_state,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::four_lesson_course;
    use chrono::Duration;

    fn submission(lesson: &str, at: DateTime<Utc>, graded: bool) -> AssignmentSubmission {
        AssignmentSubmission {
            id: Uuid::new_v4(),
            lesson_id: lesson.into(),
            text: "done".into(),
            files: vec![],
            submitted_at: at,
            grade: graded.then_some(90.0),
            feedback: None,
            graded,
            graded_at: graded.then_some(at),
        }
    }

    #[test]
    fn percentage_guards_empty_course() {
        assert_eq!(completion_percentage(0, 0), 0.0);
        assert_eq!(completion_percentage(1, 4), 25.0);
        assert_eq!(completion_percentage(3, 3), 100.0);
    }

    #[test]
    fn new_record_is_empty() {
        let now = Utc::now();
        let record = ProgressRecord::new("ada", "rust-101", now);
        assert!(record.completed_lesson_ids.is_empty());
        assert_eq!(record.completion_state, CompletionState::InProgress);
        assert_eq!(record.certificate_state, CertificateState::NotIssued);
        assert_eq!(record.last_accessed_at, now);
        assert_eq!(record.summary(&four_lesson_course()).percentage, 0.0);
    }

    #[test]
    fn states_display_like_their_serde_names() {
        assert_eq!(CompletionState::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_string(&CertificateState::NotIssued).unwrap(),
            format!("\"{}\"", CertificateState::NotIssued)
        );
    }

    #[test]
    fn summary_ignores_lessons_outside_the_course() {
        let course = four_lesson_course();
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());
        record.completed_lesson_ids.insert("intro".into());
        record.completed_lesson_ids.insert("retired-lesson".into());

        let summary = record.summary(&course);
        assert_eq!(summary.completed_lessons, 1);
        assert_eq!(summary.total_lessons, 4);
        assert_eq!(summary.percentage, 25.0);
        assert_eq!(record.derived_state(&course).percentage, 25.0);
    }

    #[test]
    fn latest_submission_by_timestamp() {
        let now = Utc::now();
        let mut record = ProgressRecord::new("ada", "rust-101", now);
        record
            .assignment_submissions
            .push(submission("project", now + Duration::minutes(5), true));
        record
            .assignment_submissions
            .push(submission("project", now, false));
        record
            .assignment_submissions
            .push(submission("other", now + Duration::minutes(9), false));

        let latest = record.latest_submission("project").unwrap();
        assert!(latest.graded);
        assert!(record.latest_submission("missing").is_none());
    }

    fn exam(lesson: &str, percentage: f64) -> ExamAttempt {
        let now = Utc::now();
        ExamAttempt {
            id: Uuid::new_v4(),
            lesson_id: lesson.into(),
            score: percentage as u32,
            total_points: 100,
            percentage_score: percentage,
            passed: percentage >= 85.0,
            answers: vec![],
            started_at: now,
            completed_at: now,
            time_spent_minutes: 0,
        }
    }

    #[test]
    fn best_exam_attempt_outlives_the_lesson_id() {
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());
        record.exam_attempts.push(exam("final", 70.0));
        record.exam_attempts.push(exam("final", 90.0));
        record.exam_attempts.push(exam("final", 80.0));
        record.exam_attempts.push(exam("midterm", 100.0));

        let best = {
            let lesson_id = String::from("final");
            record.best_exam_attempt(&lesson_id)
        };
        assert_eq!(best.map(|a| a.percentage_score), Some(90.0));
        assert_eq!(record.exam_attempts_for("final").count(), 3);
        assert!(record.best_exam_attempt("missing").is_none());
    }

    #[test]
    fn record_serde_defaults() {
        let json = r#"{
            "user_id": "ada",
            "course_id": "rust-101",
            "enrolled_at": "2026-01-01T00:00:00Z",
            "last_accessed_at": "2026-01-01T00:00:00Z"
        }"#;
        let record: ProgressRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.version, 0);
        assert_eq!(record.completion_state, CompletionState::InProgress);
        assert!(record.certificate.is_none());
    }
}

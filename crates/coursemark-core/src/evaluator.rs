//! Completion evaluation.
//!
//! Derives which lessons count as done from the recorded work, then the
//! completion percentage and course completion state. Percentage is never
//! stored; it is recomputed from its inputs every time.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::events::ProgressEvent;
use crate::model::{CompletionRule, CourseStructure, LessonRef};
use crate::progress::{completion_percentage, CompletionState, ProgressRecord};

/// Result of re-evaluating a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub percentage: f64,
    /// Set only on the evaluation that moved the record to `Completed`.
    pub completed: Option<ProgressEvent>,
}

/// Whether a single lesson counts as done.
pub fn lesson_done(record: &ProgressRecord, lesson: &LessonRef) -> bool {
    match lesson.content_type().completion_rule() {
        CompletionRule::Marked => record.completed_lesson_ids.contains(&lesson.id),
        CompletionRule::AnyAttempt => record.quiz_attempt_count(&lesson.id) > 0,
        CompletionRule::LatestGraded => record
            .latest_submission(&lesson.id)
            .is_some_and(|s| s.graded),
        CompletionRule::AnyPassed => record.exam_attempts_for(&lesson.id).any(|a| a.passed),
    }
}

/// Recompute completed lessons and course completion against `course`.
///
/// Ids that are not lessons of `course` are dropped. Completion is one-way:
/// a record that reached `Completed` stays there even if the percentage later
/// drops.
pub fn evaluate(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    now: DateTime<Utc>,
) -> Evaluation {
    let done: BTreeSet<String> = course
        .lessons
        .iter()
        .filter(|lesson| lesson_done(record, lesson))
        .map(|lesson| lesson.id.clone())
        .collect();
    record.completed_lesson_ids = done;

    let completed_count = record.completed_lesson_ids.len();
    let total = course.total_lessons();
    let percentage = completion_percentage(completed_count, total);

    let mut completed = None;
    if total > 0 && completed_count == total && !record.is_completed() {
        record.completion_state = CompletionState::Completed;
        record.completed_at = Some(now);
        tracing::info!(
            user_id = %record.user_id,
            course_id = %record.course_id,
            "course completed"
        );
        completed = Some(ProgressEvent::CourseCompleted {
            user_id: record.user_id.clone(),
            course_id: record.course_id.clone(),
            completed_at: now,
        });
    }

    Evaluation {
        percentage,
        completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{four_lesson_course, lesson};
    use crate::model::LessonContent;
    use crate::progress::Answer;
    use crate::recorder::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn exam(record: &mut ProgressRecord, course: &CourseStructure, right: usize) -> bool {
        let answers: Vec<Answer> = (0..right).map(|q| Answer::new(q, 1)).collect();
        let now = Utc::now();
        record_exam_attempt(
            record,
            course,
            Uuid::new_v4(),
            "final",
            &answers,
            now - Duration::minutes(30),
            now,
        )
        .unwrap()
        .passed
    }

    #[test]
    fn empty_course_is_zero_percent_and_never_completes() {
        let course = CourseStructure {
            id: "empty".into(),
            title: "Empty".into(),
            description: String::new(),
            lessons: vec![],
        };
        let mut record = ProgressRecord::new("ada", "empty", Utc::now());
        let eval = evaluate(&mut record, &course, Utc::now());
        assert_eq!(eval.percentage, 0.0);
        assert!(eval.completed.is_none());
        assert!(!record.is_completed());
    }

    #[test]
    fn full_scenario_reaches_completion_once() {
        let course = four_lesson_course();
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());

        mark_lesson_complete(&mut record, &course, "intro").unwrap();
        assert_eq!(evaluate(&mut record, &course, Utc::now()).percentage, 25.0);

        record_quiz_attempt(&mut record, &course, Uuid::new_v4(), "quiz-1", &[], Utc::now())
            .unwrap();
        assert_eq!(evaluate(&mut record, &course, Utc::now()).percentage, 50.0);

        assert!(exam(&mut record, &course, 9));
        assert_eq!(evaluate(&mut record, &course, Utc::now()).percentage, 75.0);

        let id = Uuid::new_v4();
        record_assignment_submission(&mut record, &course, id, "project", "done", &[], Utc::now())
            .unwrap();
        assert_eq!(evaluate(&mut record, &course, Utc::now()).percentage, 75.0);

        grade_assignment(&mut record, &course, id, 80.0, None, Utc::now()).unwrap();
        let eval = evaluate(&mut record, &course, Utc::now());
        assert_eq!(eval.percentage, 100.0);
        assert!(matches!(
            eval.completed,
            Some(ProgressEvent::CourseCompleted { .. })
        ));
        assert!(record.is_completed());
        assert!(record.completed_at.is_some());

        let again = evaluate(&mut record, &course, Utc::now());
        assert!(again.completed.is_none());
    }

    #[test]
    fn failed_exam_never_completes_lesson() {
        let course = four_lesson_course();
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());
        mark_lesson_complete(&mut record, &course, "intro").unwrap();
        record_quiz_attempt(&mut record, &course, Uuid::new_v4(), "quiz-1", &[], Utc::now())
            .unwrap();

        assert!(!exam(&mut record, &course, 7));
        let eval = evaluate(&mut record, &course, Utc::now());
        assert_eq!(eval.percentage, 50.0);
        assert!(!record.completed_lesson_ids.contains("final"));

        assert!(exam(&mut record, &course, 9));
        let eval = evaluate(&mut record, &course, Utc::now());
        assert_eq!(eval.percentage, 75.0);
        assert_eq!(record.exam_attempts.len(), 2);
        assert!(!record.exam_attempts[0].passed);

        // A later failure does not undo the earlier pass.
        assert!(!exam(&mut record, &course, 2));
        evaluate(&mut record, &course, Utc::now());
        assert!(record.completed_lesson_ids.contains("final"));
    }

    #[test]
    fn assignment_follows_latest_submission() {
        let course = four_lesson_course();
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());
        let now = Utc::now();
        let first = Uuid::new_v4();
        record_assignment_submission(&mut record, &course, first, "project", "v1", &[], now)
            .unwrap();
        grade_assignment(&mut record, &course, first, 90.0, None, now).unwrap();
        evaluate(&mut record, &course, now);
        assert!(record.completed_lesson_ids.contains("project"));

        record_assignment_submission(
            &mut record,
            &course,
            Uuid::new_v4(),
            "project",
            "v2",
            &[],
            now + Duration::minutes(1),
        )
        .unwrap();
        evaluate(&mut record, &course, now);
        assert!(!record.completed_lesson_ids.contains("project"));
    }

    #[test]
    fn completion_is_monotonic_when_course_grows() {
        let mut course = CourseStructure {
            id: "short".into(),
            title: "Short".into(),
            description: String::new(),
            lessons: vec![lesson("only", LessonContent::Text)],
        };
        let mut record = ProgressRecord::new("ada", "short", Utc::now());
        mark_lesson_complete(&mut record, &course, "only").unwrap();
        assert!(evaluate(&mut record, &course, Utc::now()).completed.is_some());

        course.lessons.push(lesson("added", LessonContent::Video));
        let eval = evaluate(&mut record, &course, Utc::now());
        assert_eq!(eval.percentage, 50.0);
        assert!(record.is_completed());
    }

    #[test]
    fn removed_lessons_are_pruned() {
        let mut course = four_lesson_course();
        let mut record = ProgressRecord::new("ada", "rust-101", Utc::now());
        mark_lesson_complete(&mut record, &course, "intro").unwrap();
        course.lessons.retain(|l| l.id != "intro");

        let eval = evaluate(&mut record, &course, Utc::now());
        assert!(record.completed_lesson_ids.is_empty());
        assert_eq!(eval.percentage, 0.0);
    }
}

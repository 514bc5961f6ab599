//! Attempt recording and scoring.
//!
//! Every function here validates its whole input before touching the record,
//! so a rejected call leaves the record exactly as it was. Re-evaluating
//! completion is the caller's job (see `evaluator::evaluate`).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ProgressError, Result};
use crate::model::{CompletionRule, ContentType, CourseStructure, LessonRef, DEFAULT_PASSING_SCORE};
use crate::progress::{
    Answer, AssignmentSubmission, ExamAttempt, ProgressRecord, QuizAttempt, ScoredAnswer,
};

/// Resolve a lesson and check it has the expected content type.
fn resolve_lesson<'a>(
    course: &'a CourseStructure,
    lesson_id: &str,
    expected: ContentType,
) -> Result<&'a LessonRef> {
    let lesson = course
        .lesson(lesson_id)
        .ok_or_else(|| ProgressError::StaleCourseStructure {
            course_id: course.id.clone(),
            lesson_id: lesson_id.to_string(),
        })?;

    if lesson.content_type() != expected {
        return Err(ProgressError::InvalidSubmission(format!(
            "lesson '{lesson_id}' is a {} lesson, not {expected}",
            lesson.content_type()
        )));
    }
    Ok(lesson)
}

fn ensure_fresh(record: &ProgressRecord, attempt_id: Uuid) -> Result<()> {
    if record.seen_attempt_ids.contains(&attempt_id) {
        return Err(ProgressError::DuplicateAttempt { attempt_id });
    }
    Ok(())
}

/// Score answers against a quiz or exam lesson.
///
/// Each answer is correct when the selected option equals the stored correct
/// option. Unanswered questions earn nothing. Returns the scored answers in
/// question order together with the points earned.
pub fn score_answers(lesson: &LessonRef, answers: &[Answer]) -> Result<(Vec<ScoredAnswer>, u32)> {
    let questions = lesson.content.questions();
    let mut seen = HashSet::new();
    let mut scored = Vec::with_capacity(answers.len());

    for answer in answers {
        let question = questions.get(answer.question).ok_or_else(|| {
            ProgressError::InvalidSubmission(format!(
                "lesson '{}' has no question {}",
                lesson.id, answer.question
            ))
        })?;
        if answer.selected >= question.options.len() {
            return Err(ProgressError::InvalidSubmission(format!(
                "question {} has no option {}",
                answer.question, answer.selected
            )));
        }
        if !seen.insert(answer.question) {
            return Err(ProgressError::InvalidSubmission(format!(
                "question {} answered more than once",
                answer.question
            )));
        }

        let correct = answer.selected == question.correct_option;
        scored.push(ScoredAnswer {
            question: answer.question,
            selected: answer.selected,
            correct,
            points_earned: if correct { question.points } else { 0 },
        });
    }

    scored.sort_by_key(|a| a.question);
    let score = scored.iter().map(|a| a.points_earned).sum();
    Ok((scored, score))
}

/// Append a quiz attempt. Quizzes have no pass bar and keep every attempt.
pub fn record_quiz_attempt(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    attempt_id: Uuid,
    lesson_id: &str,
    answers: &[Answer],
    now: DateTime<Utc>,
) -> Result<QuizAttempt> {
    ensure_fresh(record, attempt_id)?;
    let lesson = resolve_lesson(course, lesson_id, ContentType::Quiz)?;
    let (answers, score) = score_answers(lesson, answers)?;

    let attempt = QuizAttempt {
        id: attempt_id,
        lesson_id: lesson.id.clone(),
        score,
        total_questions: lesson.content.questions().len(),
        answers,
        attempt_number: record.quiz_attempt_count(&lesson.id) + 1,
        completed_at: now,
    };

    tracing::debug!(
        user_id = %record.user_id,
        lesson_id = %lesson.id,
        score,
        attempt = attempt.attempt_number,
        "quiz attempt recorded"
    );

    record.seen_attempt_ids.insert(attempt_id);
    record.total_points_earned += f64::from(score);
    record.quiz_attempts.push(attempt.clone());
    Ok(attempt)
}

/// Append an exam attempt and decide whether it passed.
///
/// Timing is recorded, not enforced: a time limit on the lesson is left to
/// the caller's policy.
pub fn record_exam_attempt(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    attempt_id: Uuid,
    lesson_id: &str,
    answers: &[Answer],
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<ExamAttempt> {
    ensure_fresh(record, attempt_id)?;
    let lesson = resolve_lesson(course, lesson_id, ContentType::Exam)?;
    if started_at > now {
        return Err(ProgressError::InvalidSubmission(format!(
            "exam started in the future ({started_at})"
        )));
    }
    let (answers, score) = score_answers(lesson, answers)?;

    let total_points = lesson.total_points();
    let percentage_score = if total_points > 0 {
        f64::from(score) / f64::from(total_points) * 100.0
    } else {
        0.0
    };
    let passing_score = lesson.passing_score().unwrap_or(DEFAULT_PASSING_SCORE);

    let attempt = ExamAttempt {
        id: attempt_id,
        lesson_id: lesson.id.clone(),
        score,
        total_points,
        percentage_score,
        passed: percentage_score >= passing_score,
        answers,
        started_at,
        completed_at: now,
        time_spent_minutes: (now - started_at).num_minutes().max(0),
    };

    tracing::debug!(
        user_id = %record.user_id,
        lesson_id = %lesson.id,
        percentage = attempt.percentage_score,
        passed = attempt.passed,
        "exam attempt recorded"
    );

    record.seen_attempt_ids.insert(attempt_id);
    record.total_points_earned += f64::from(score);
    record.exam_attempts.push(attempt.clone());
    Ok(attempt)
}

/// Record a learner's assignment submission.
///
/// A pending (ungraded) latest submission for the lesson is replaced; once the
/// latest one is graded, a new ungraded entry is appended instead.
pub fn record_assignment_submission(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    submission_id: Uuid,
    lesson_id: &str,
    text: &str,
    files: &[String],
    now: DateTime<Utc>,
) -> Result<AssignmentSubmission> {
    ensure_fresh(record, submission_id)?;
    let lesson = resolve_lesson(course, lesson_id, ContentType::Assignment)?;
    if text.trim().is_empty() && files.is_empty() {
        return Err(ProgressError::InvalidSubmission(
            "submission has neither text nor files".into(),
        ));
    }

    let submission = AssignmentSubmission {
        id: submission_id,
        lesson_id: lesson.id.clone(),
        text: text.to_string(),
        files: files.to_vec(),
        submitted_at: now,
        grade: None,
        feedback: None,
        graded: false,
        graded_at: None,
    };

    let pending = record
        .latest_submission(&lesson.id)
        .filter(|s| !s.graded)
        .map(|s| s.id);
    match pending.and_then(|id| record.assignment_submissions.iter().position(|s| s.id == id)) {
        Some(index) => {
            tracing::debug!(lesson_id = %lesson.id, "replacing pending submission");
            record.assignment_submissions[index] = submission.clone();
        }
        None => record.assignment_submissions.push(submission.clone()),
    }

    record.seen_attempt_ids.insert(submission_id);
    Ok(submission)
}

/// Educator grading of a submission.
pub fn grade_assignment(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    submission_id: Uuid,
    grade: f64,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> Result<AssignmentSubmission> {
    let index = record
        .assignment_submissions
        .iter()
        .position(|s| s.id == submission_id)
        .ok_or(ProgressError::SubmissionNotFound(submission_id))?;

    let lesson_id = record.assignment_submissions[index].lesson_id.clone();
    let lesson = resolve_lesson(course, &lesson_id, ContentType::Assignment)?;
    let max_grade = lesson.max_grade().unwrap_or(100.0);

    if record.assignment_submissions[index].graded {
        return Err(ProgressError::InvalidSubmission(format!(
            "submission {submission_id} is already graded"
        )));
    }
    if !grade.is_finite() || !(0.0..=max_grade).contains(&grade) {
        return Err(ProgressError::InvalidSubmission(format!(
            "grade {grade} outside 0..={max_grade}"
        )));
    }

    let submission = &mut record.assignment_submissions[index];
    submission.grade = Some(grade);
    submission.feedback = feedback;
    submission.graded = true;
    submission.graded_at = Some(now);
    let graded = submission.clone();

    record.total_points_earned += grade;
    Ok(graded)
}

/// Explicit completion signal for non-assessed lessons.
///
/// Returns `true` if the lesson was not already marked.
pub fn mark_lesson_complete(
    record: &mut ProgressRecord,
    course: &CourseStructure,
    lesson_id: &str,
) -> Result<bool> {
    let lesson = course
        .lesson(lesson_id)
        .ok_or_else(|| ProgressError::StaleCourseStructure {
            course_id: course.id.clone(),
            lesson_id: lesson_id.to_string(),
        })?;

    if lesson.content_type().completion_rule() != CompletionRule::Marked {
        return Err(ProgressError::InvalidSubmission(format!(
            "{} lesson '{lesson_id}' is completed by submitting work, not by marking",
            lesson.content_type()
        )));
    }

    Ok(record.completed_lesson_ids.insert(lesson.id.clone()))
}

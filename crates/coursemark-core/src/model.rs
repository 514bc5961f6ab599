//! Course structure types.
//!
//! A `CourseStructure` is the read-only index of a course's ordered lessons
//! supplied by the authoring side. The engine never mutates it; lesson ids are
//! unique within a course and stable for its lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProgressError, Result};

/// Passing threshold applied to exams that do not set one.
pub const DEFAULT_PASSING_SCORE: f64 = 85.0;

/// An ordered, immutable snapshot of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseStructure {
    /// Unique identifier for this course.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Description of the course.
    #[serde(default)]
    pub description: String,
    /// Lessons in delivery order.
    #[serde(default)]
    pub lessons: Vec<LessonRef>,
}

/// One lesson inside a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRef {
    /// Identifier, unique within the course.
    pub id: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Expected study time, used for certificate hours.
    #[serde(default)]
    pub duration_minutes: u32,
    /// What the lesson delivers and how it is completed.
    pub content: LessonContent,
}

/// Lesson content, one completion rule per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LessonContent {
    Video,
    Text,
    Youtube,
    Quiz {
        #[serde(default)]
        questions: Vec<Question>,
    },
    Exam {
        #[serde(default)]
        questions: Vec<Question>,
        /// Minimum percentage for a passing attempt.
        #[serde(default)]
        passing_score: Option<f64>,
        /// Advisory only; enforcement belongs to the caller.
        #[serde(default)]
        time_limit_minutes: Option<u32>,
    },
    Assignment {
        #[serde(default = "default_max_grade")]
        max_grade: f64,
    },
}

fn default_max_grade() -> f64 {
    100.0
}

/// A single multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_option: usize,
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    1
}

/// Content type discriminant of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Text,
    Quiz,
    Youtube,
    Assignment,
    Exam,
}

/// How a lesson of a given content type becomes complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRule {
    /// Explicit "mark complete" signal, no scoring.
    Marked,
    /// At least one recorded attempt.
    AnyAttempt,
    /// The latest submission has been graded.
    LatestGraded,
    /// At least one attempt passed.
    AnyPassed,
}

impl ContentType {
    pub fn completion_rule(self) -> CompletionRule {
        match self {
            ContentType::Video | ContentType::Text | ContentType::Youtube => {
                CompletionRule::Marked
            }
            ContentType::Quiz => CompletionRule::AnyAttempt,
            ContentType::Assignment => CompletionRule::LatestGraded,
            ContentType::Exam => CompletionRule::AnyPassed,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Video => write!(f, "video"),
            ContentType::Text => write!(f, "text"),
            ContentType::Quiz => write!(f, "quiz"),
            ContentType::Youtube => write!(f, "youtube"),
            ContentType::Assignment => write!(f, "assignment"),
            ContentType::Exam => write!(f, "exam"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(ContentType::Video),
            "text" => Ok(ContentType::Text),
            "quiz" => Ok(ContentType::Quiz),
            "youtube" | "yt" => Ok(ContentType::Youtube),
            "assignment" => Ok(ContentType::Assignment),
            "exam" => Ok(ContentType::Exam),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

impl LessonContent {
    pub fn content_type(&self) -> ContentType {
        match self {
            LessonContent::Video => ContentType::Video,
            LessonContent::Text => ContentType::Text,
            LessonContent::Youtube => ContentType::Youtube,
            LessonContent::Quiz { .. } => ContentType::Quiz,
            LessonContent::Exam { .. } => ContentType::Exam,
            LessonContent::Assignment { .. } => ContentType::Assignment,
        }
    }

    /// Questions for quizzes and exams; empty for everything else.
    pub fn questions(&self) -> &[Question] {
        match self {
            LessonContent::Quiz { questions } | LessonContent::Exam { questions, .. } => {
                questions.as_slice()
            }
            _ => &[],
        }
    }
}

impl LessonRef {
    pub fn content_type(&self) -> ContentType {
        self.content.content_type()
    }

    /// Effective passing threshold for exam lessons.
    pub fn passing_score(&self) -> Option<f64> {
        match &self.content {
            LessonContent::Exam { passing_score, .. } => {
                Some(passing_score.unwrap_or(DEFAULT_PASSING_SCORE))
            }
            _ => None,
        }
    }

    /// Maximum grade for assignment lessons.
    pub fn max_grade(&self) -> Option<f64> {
        match self.content {
            LessonContent::Assignment { max_grade } => Some(max_grade),
            _ => None,
        }
    }

    /// Sum of question points for quizzes and exams.
    pub fn total_points(&self) -> u32 {
        self.content.questions().iter().map(|q| q.points).sum()
    }
}

impl CourseStructure {
    /// Look up a lesson by id.
    pub fn lesson(&self, id: &str) -> Option<&LessonRef> {
        self.lessons.iter().find(|l| l.id == id)
    }

    pub fn lesson_ids(&self) -> impl Iterator<Item = &str> {
        self.lessons.iter().map(|l| l.id.as_str())
    }

    pub fn total_lessons(&self) -> usize {
        self.lessons.len()
    }

    pub fn total_duration_minutes(&self) -> u32 {
        self.lessons.iter().map(|l| l.duration_minutes).sum()
    }

    /// Reject structures the engine cannot score against.
    ///
    /// Softer issues (empty quizzes, zero-point questions) are reported by
    /// `parser::validate_course` instead.
    pub fn check(&self) -> Result<()> {
        let invalid = |message: String| ProgressError::InvalidCourse {
            course_id: self.id.clone(),
            message,
        };

        let mut seen = HashSet::new();
        for lesson in &self.lessons {
            if !seen.insert(lesson.id.as_str()) {
                return Err(invalid(format!("duplicate lesson id: {}", lesson.id)));
            }

            for (i, q) in lesson.content.questions().iter().enumerate() {
                if q.correct_option >= q.options.len() {
                    return Err(invalid(format!(
                        "lesson '{}' question {i}: correct option {} out of range ({} options)",
                        lesson.id,
                        q.correct_option,
                        q.options.len()
                    )));
                }
            }

            match &lesson.content {
                LessonContent::Exam {
                    passing_score: Some(score),
                    ..
                } if !(0.0..=100.0).contains(score) => {
                    return Err(invalid(format!(
                        "lesson '{}': passing score {score} outside 0..=100",
                        lesson.id
                    )));
                }
                LessonContent::Assignment { max_grade } if *max_grade <= 0.0 => {
                    return Err(invalid(format!(
                        "lesson '{}': max grade must be positive",
                        lesson.id
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn question(correct_option: usize, points: u32) -> Question {
        Question {
            prompt: "Pick one".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option,
            points,
        }
    }

    pub fn lesson(id: &str, content: LessonContent) -> LessonRef {
        LessonRef {
            id: id.into(),
            title: id.into(),
            duration_minutes: 30,
            content,
        }
    }

    /// Video, quiz, assignment, and a 100-point exam passing at 85.
    pub fn four_lesson_course() -> CourseStructure {
        CourseStructure {
            id: "rust-101".into(),
            title: "Rust 101".into(),
            description: String::new(),
            lessons: vec![
                lesson("intro", LessonContent::Video),
                lesson(
                    "quiz-1",
                    LessonContent::Quiz {
                        questions: vec![question(0, 1), question(2, 1)],
                    },
                ),
                lesson("project", LessonContent::Assignment { max_grade: 100.0 }),
                lesson(
                    "final",
                    LessonContent::Exam {
                        questions: (0..10).map(|_| question(1, 10)).collect(),
                        passing_score: Some(85.0),
                        time_limit_minutes: Some(60),
                    },
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn content_type_display_and_parse() {
        assert_eq!(ContentType::Youtube.to_string(), "youtube");
        assert_eq!("EXAM".parse::<ContentType>().unwrap(), ContentType::Exam);
        assert_eq!("yt".parse::<ContentType>().unwrap(), ContentType::Youtube);
        assert!("podcast".parse::<ContentType>().is_err());
    }

    #[test]
    fn completion_rules_per_variant() {
        assert_eq!(ContentType::Text.completion_rule(), CompletionRule::Marked);
        assert_eq!(ContentType::Quiz.completion_rule(), CompletionRule::AnyAttempt);
        assert_eq!(
            ContentType::Assignment.completion_rule(),
            CompletionRule::LatestGraded
        );
        assert_eq!(ContentType::Exam.completion_rule(), CompletionRule::AnyPassed);
    }

    #[test]
    fn exam_passing_score_defaults_to_85() {
        let exam = lesson(
            "e",
            LessonContent::Exam {
                questions: vec![],
                passing_score: None,
                time_limit_minutes: None,
            },
        );
        assert_eq!(exam.passing_score(), Some(DEFAULT_PASSING_SCORE));
        assert_eq!(lesson("v", LessonContent::Video).passing_score(), None);
    }

    #[test]
    fn course_helpers() {
        let course = four_lesson_course();
        assert_eq!(course.total_lessons(), 4);
        assert_eq!(course.total_duration_minutes(), 120);
        assert_eq!(course.lesson("final").unwrap().total_points(), 100);
        assert!(course.lesson("missing").is_none());
        assert!(course.check().is_ok());
    }

    #[test]
    fn check_rejects_duplicate_ids() {
        let mut course = four_lesson_course();
        course.lessons.push(lesson("intro", LessonContent::Text));
        let err = course.check().unwrap_err();
        assert!(err.to_string().contains("duplicate lesson id"));
    }

    #[test]
    fn check_rejects_out_of_range_correct_option() {
        let mut course = four_lesson_course();
        course.lessons[1].content = LessonContent::Quiz {
            questions: vec![question(7, 1)],
        };
        assert!(matches!(
            course.check(),
            Err(ProgressError::InvalidCourse { .. })
        ));
    }

    #[test]
    fn lesson_content_serde_tagged() {
        let json = r#"{"id":"e","content":{"type":"exam","questions":[],"passing_score":70}}"#;
        let lesson: LessonRef = serde_json::from_str(json).unwrap();
        assert_eq!(lesson.content_type(), ContentType::Exam);
        assert_eq!(lesson.passing_score(), Some(70.0));
    }
}

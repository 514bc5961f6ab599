//! TOML course structure parser.
//!
//! Loads course structures from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ContentType, CourseStructure, LessonContent, LessonRef, Question};

/// Intermediate TOML structure for parsing course files.
#[derive(Debug, Deserialize)]
struct TomlCourseFile {
    course: TomlCourseHeader,
    #[serde(default)]
    lessons: Vec<TomlLesson>,
}

#[derive(Debug, Deserialize)]
struct TomlCourseHeader {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlLesson {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    duration_minutes: u32,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
    #[serde(default)]
    passing_score: Option<f64>,
    #[serde(default)]
    time_limit_minutes: Option<u32>,
    #[serde(default)]
    max_grade: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
    #[serde(default = "default_points")]
    points: u32,
}

fn default_points() -> u32 {
    1
}

/// Parse a single TOML file into a `CourseStructure`.
pub fn parse_course(path: &Path) -> Result<CourseStructure> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course file: {}", path.display()))?;

    parse_course_str(&content, path)
}

/// Parse a TOML string into a `CourseStructure` (useful for testing).
pub fn parse_course_str(content: &str, source_path: &Path) -> Result<CourseStructure> {
    let parsed: TomlCourseFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let lessons = parsed
        .lessons
        .into_iter()
        .map(|l| {
            let content_type: ContentType = l
                .content_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!("lesson '{}': {}", l.id, e))?;

            let questions = l
                .questions
                .into_iter()
                .map(|q| Question {
                    prompt: q.prompt,
                    options: q.options,
                    correct_option: q.correct_option,
                    points: q.points,
                })
                .collect();

            let content = match content_type {
                ContentType::Video => LessonContent::Video,
                ContentType::Text => LessonContent::Text,
                ContentType::Youtube => LessonContent::Youtube,
                ContentType::Quiz => LessonContent::Quiz { questions },
                ContentType::Exam => LessonContent::Exam {
                    questions,
                    passing_score: l.passing_score,
                    time_limit_minutes: l.time_limit_minutes,
                },
                ContentType::Assignment => LessonContent::Assignment {
                    max_grade: l.max_grade.unwrap_or(100.0),
                },
            };

            Ok(LessonRef {
                id: l.id,
                title: l.title,
                duration_minutes: l.duration_minutes,
                content,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CourseStructure {
        id: parsed.course.id,
        title: parsed.course.title,
        description: parsed.course.description,
        lessons,
    })
}

/// Recursively load all `.toml` course files from a directory.
pub fn load_course_directory(dir: &Path) -> Result<Vec<CourseStructure>> {
    let mut courses = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            courses.extend(load_course_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_course(&path) {
                Ok(course) => courses.push(course),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    courses.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(courses)
}

/// Load a single file or every course under a directory.
pub fn load_courses(path: &Path) -> Result<Vec<CourseStructure>> {
    if path.is_dir() {
        load_course_directory(path)
    } else {
        Ok(vec![parse_course(path)?])
    }
}

/// A warning from course validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The lesson ID (if applicable).
    pub lesson_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a course structure for common issues.
pub fn validate_course(course: &CourseStructure) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |lesson: &LessonRef, message: String| {
        warnings.push(ValidationWarning {
            lesson_id: Some(lesson.id.clone()),
            message,
        })
    };

    let mut seen_ids = HashSet::new();
    for lesson in &course.lessons {
        if !seen_ids.insert(&lesson.id) {
            warn(lesson, format!("duplicate lesson ID: {}", lesson.id));
        }

        let content_type = lesson.content_type();
        let questions = lesson.content.questions();
        if matches!(content_type, ContentType::Quiz | ContentType::Exam) && questions.is_empty() {
            warn(lesson, format!("{content_type} has no questions"));
        }

        for (i, q) in questions.iter().enumerate() {
            if q.options.len() < 2 {
                warn(lesson, format!("question {i} has fewer than 2 options"));
            }
            if q.correct_option >= q.options.len() {
                warn(
                    lesson,
                    format!("question {i}: correct_option {} out of range", q.correct_option),
                );
            }
            if q.points == 0 {
                warn(lesson, format!("question {i} is worth 0 points"));
            }
        }

        match &lesson.content {
            LessonContent::Exam {
                passing_score: Some(score),
                ..
            } if !(0.0..=100.0).contains(score) => {
                warn(lesson, format!("passing_score {score} outside 0..=100"));
            }
            LessonContent::Assignment { max_grade } if *max_grade <= 0.0 => {
                warn(lesson, "max_grade must be positive".into());
            }
            _ => {}
        }
    }

    if course.lessons.is_empty() {
        warnings.push(ValidationWarning {
            lesson_id: None,
            message: "course has no lessons and can never be completed".into(),
        });
    }

    warnings
}

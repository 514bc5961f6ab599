//! The `coursemark replay` command.
//!
//! Drives the engine from a TOML script of learner and educator actions and
//! reports the derived state after every step.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coursemark_core::certification::{CertificateRenderer, CertificateRequest};
use coursemark_core::config::load_config_from;
use coursemark_core::engine::ProgressEngine;
use coursemark_core::events::{CollectingSink, ProgressEvent};
use coursemark_core::parser::load_courses;
use coursemark_core::progress::{Answer, DerivedState, ProgressSummary};
use coursemark_core::store::{JsonDirStore, MemoryStore, ProgressStore};

use super::summary::summary_table;

#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Enroll,
    Mark,
    Quiz,
    Exam,
    Submit,
    Grade,
    Certify,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Enroll => "enroll",
            Action::Mark => "mark",
            Action::Quiz => "quiz",
            Action::Exam => "exam",
            Action::Submit => "submit",
            Action::Grade => "grade",
            Action::Certify => "certify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize)]
struct Step {
    action: Action,
    user: String,
    /// Needed only when more than one course is loaded.
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    lesson: Option<String>,
    /// `[question, option]` pairs.
    #[serde(default)]
    answers: Vec<(usize, usize)>,
    #[serde(default)]
    started_minutes_ago: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    grade: Option<f64>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    attempt_id: Option<Uuid>,
}

impl Step {
    fn lesson(&self) -> Result<&str> {
        self.lesson
            .as_deref()
            .with_context(|| format!("`{}` step needs a `lesson`", self.action))
    }

    fn answers(&self) -> Vec<Answer> {
        self.answers
            .iter()
            .map(|&(question, selected)| Answer::new(question, selected))
            .collect()
    }

    fn attempt_id(&self) -> Uuid {
        self.attempt_id.unwrap_or_else(Uuid::new_v4)
    }
}

#[derive(Debug, Serialize)]
struct StepOutcome {
    step: usize,
    action: Action,
    user: String,
    course_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lesson: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<DerivedState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    steps: Vec<StepOutcome>,
    summaries: Vec<ProgressSummary>,
    events: Vec<ProgressEvent>,
}

/// Writes a plain-text certificate per id under a directory.
struct FileRenderer {
    dir: PathBuf,
}

#[async_trait]
impl CertificateRenderer for FileRenderer {
    async fn render(&self, request: &CertificateRequest) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.dir.join(format!("{}.txt", request.certificate_id));
        let grade = request
            .grade
            .map(|g| format!("{g:.1}%"))
            .unwrap_or_else(|| "n/a".to_string());
        let body = format!(
            "Certificate of Completion\n\n\
             {user} completed \"{title}\" ({course}) on {date}.\n\n\
             Hours: {hours:.1}\n\
             Grade: {grade}\n\
             Verification code: {code}\n",
            user = request.user_id,
            title = request.course_title,
            course = request.course_id,
            date = request.completed_at.format("%Y-%m-%d"),
            hours = request.hours,
            code = request.verification_code,
        );
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(format!("file://{}", path.display()))
    }
}

fn parse_script(path: &Path) -> Result<ReplayScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse script: {}", path.display()))
}

pub async fn execute(
    course_path: PathBuf,
    script_path: PathBuf,
    store_dir: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let json = match format.as_str() {
        "text" => false,
        "json" => true,
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    };

    let config = load_config_from(config_path.as_deref())?;
    let courses = load_courses(&course_path)?;
    anyhow::ensure!(
        !courses.is_empty(),
        "no courses found in {}",
        course_path.display()
    );
    let script = parse_script(&script_path)?;
    tracing::info!(
        steps = script.steps.len(),
        script = %script_path.display(),
        "replaying script"
    );

    let store: Arc<dyn ProgressStore> = match &store_dir {
        Some(dir) => Arc::new(JsonDirStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };
    let sink = Arc::new(CollectingSink::new());
    let engine = ProgressEngine::new(store, sink.clone(), config.engine_config());

    let default_course = match courses.as_slice() {
        [only] => Some(only.id.clone()),
        _ => None,
    };
    for course in courses {
        let id = course.id.clone();
        engine
            .register_course(course)
            .await
            .with_context(|| format!("course '{id}' was refused"))?;
    }

    // Certificates are only rendered when progress is persisted.
    let renderer = store_dir.as_ref().map(|dir| FileRenderer {
        dir: dir.join("certificates"),
    });

    let mut outcomes = Vec::with_capacity(script.steps.len());
    let mut users: Vec<&str> = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        let course_id = step
            .course
            .clone()
            .or_else(|| default_course.clone())
            .with_context(|| {
                format!(
                    "step {}: `course` is required when several courses are loaded",
                    index + 1
                )
            })?;
        if !users.contains(&step.user.as_str()) {
            users.push(&step.user);
        }

        let mut outcome = StepOutcome {
            step: index + 1,
            action: step.action,
            user: step.user.clone(),
            course_id: course_id.clone(),
            lesson: step.lesson.clone(),
            detail: None,
            state: None,
            error: None,
        };
        match run_step(&engine, step, &course_id, renderer.as_ref()).await {
            Ok((detail, state)) => {
                outcome.detail = Some(detail);
                outcome.state = Some(state);
            }
            Err(e) => outcome.error = Some(format!("{e:#}")),
        }

        if !json {
            print_step(&outcome);
        }
        outcomes.push(outcome);
    }

    let mut summaries = Vec::new();
    for user in users {
        summaries.extend(engine.list_progress(user).await?);
    }
    let events = sink.events();

    if json {
        let report = ReplayReport {
            steps: outcomes,
            summaries,
            events,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", summary_table(&summaries));

    if !events.is_empty() {
        println!("\nEvents:");
        for event in &events {
            match event {
                ProgressEvent::CourseCompleted {
                    user_id,
                    course_id,
                    completed_at,
                } => println!("  course_completed  {user_id} {course_id} at {completed_at}"),
                ProgressEvent::CertificateIssued {
                    user_id,
                    course_id,
                    certificate_id,
                    ..
                } => println!("  certificate_issued  {user_id} {course_id} {certificate_id}"),
            }
        }
    }

    let rejected = outcomes.iter().filter(|o| o.error.is_some()).count();
    if rejected > 0 {
        println!("\n{rejected} step(s) rejected.");
    }

    Ok(())
}

async fn run_step(
    engine: &ProgressEngine,
    step: &Step,
    course_id: &str,
    renderer: Option<&FileRenderer>,
) -> Result<(String, DerivedState)> {
    let user = step.user.as_str();
    let retry = |duplicate: bool| if duplicate { " (retry, original kept)" } else { "" };

    let (detail, state) = match step.action {
        Action::Enroll => {
            let record = engine.enroll(user, course_id).await?;
            let course = engine.course(course_id).await?;
            ("enrolled".to_string(), record.derived_state(&course))
        }
        Action::Mark => {
            let marked = engine
                .mark_lesson_complete(user, course_id, step.lesson()?)
                .await?;
            let detail = if marked.value {
                "marked complete"
            } else {
                "already complete"
            };
            (detail.to_string(), marked.state)
        }
        Action::Quiz => {
            let recorded = engine
                .record_quiz_attempt(
                    user,
                    course_id,
                    step.attempt_id(),
                    step.lesson()?,
                    &step.answers(),
                )
                .await?;
            let attempt = &recorded.value;
            let detail = format!(
                "attempt #{} scored {} point(s) over {} question(s){}",
                attempt.attempt_number,
                attempt.score,
                attempt.total_questions,
                retry(recorded.duplicate)
            );
            (detail, recorded.state)
        }
        Action::Exam => {
            let started_at = Duration::try_minutes(step.started_minutes_ago)
                .and_then(|ago| Utc::now().checked_sub_signed(ago))
                .context("started_minutes_ago out of range")?;
            let recorded = engine
                .record_exam_attempt(
                    user,
                    course_id,
                    step.attempt_id(),
                    step.lesson()?,
                    &step.answers(),
                    started_at,
                )
                .await?;
            let attempt = &recorded.value;
            let detail = format!(
                "{}/{} points ({:.1}%) {} in {} min{}",
                attempt.score,
                attempt.total_points,
                attempt.percentage_score,
                if attempt.passed { "passed" } else { "failed" },
                attempt.time_spent_minutes,
                retry(recorded.duplicate)
            );
            (detail, recorded.state)
        }
        Action::Submit => {
            let recorded = engine
                .record_assignment_submission(
                    user,
                    course_id,
                    step.attempt_id(),
                    step.lesson()?,
                    &step.text,
                    &step.files,
                )
                .await?;
            let detail = format!(
                "submitted {}{}",
                recorded.value.id,
                retry(recorded.duplicate)
            );
            (detail, recorded.state)
        }
        Action::Grade => {
            let lesson = step.lesson()?;
            let grade = step.grade.context("`grade` step needs a `grade`")?;
            let record = engine.record(user, course_id).await?;
            let submission_id = record
                .latest_submission(lesson)
                .map(|s| s.id)
                .with_context(|| format!("no submission for lesson '{lesson}'"))?;
            let recorded = engine
                .grade_assignment(user, course_id, submission_id, grade, step.feedback.clone())
                .await?;
            (format!("graded {grade}"), recorded.state)
        }
        Action::Certify => certify(engine, user, course_id, renderer).await?,
    };

    Ok((detail, state))
}

async fn certify(
    engine: &ProgressEngine,
    user: &str,
    course_id: &str,
    renderer: Option<&FileRenderer>,
) -> Result<(String, DerivedState)> {
    let mut detail = match engine.try_issue_certificate(user, course_id).await? {
        Some(certificate) => format!("issued {}", certificate.verification_code),
        None => match engine.certificate(user, course_id).await? {
            Some(certificate) => format!("already issued {}", certificate.verification_code),
            None => "not eligible yet".to_string(),
        },
    };

    if let Some(renderer) = renderer {
        if engine.certificate(user, course_id).await?.is_some() {
            let rendered = engine
                .render_certificate(user, course_id, renderer)
                .await?;
            if let Some(url) = rendered.rendered_url {
                detail.push_str(&format!(", rendered to {url}"));
            }
        }
    }

    let course = engine.course(course_id).await?;
    let state = engine.record(user, course_id).await?.derived_state(&course);
    Ok((detail, state))
}

fn print_step(outcome: &StepOutcome) {
    let target = outcome
        .lesson
        .as_deref()
        .map(|lesson| format!("{}/{lesson}", outcome.course_id))
        .unwrap_or_else(|| outcome.course_id.clone());
    let head = format!(
        "[{}] {} {} {}",
        outcome.step, outcome.action, outcome.user, target
    );

    match (&outcome.detail, &outcome.state, &outcome.error) {
        (Some(detail), Some(state), _) => println!(
            "{head}: {detail} | {:.1}% {} certificate:{}",
            state.percentage, state.completion_state, state.certificate_state
        ),
        (_, _, Some(error)) => println!("{head}: REJECTED {error}"),
        _ => println!("{head}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_script_steps() {
        let script: ReplayScript = toml::from_str(
            r#"
[[steps]]
action = "enroll"
user = "ada"

[[steps]]
action = "exam"
user = "ada"
lesson = "final"
started_minutes_ago = 30
answers = [[0, 1], [1, 2]]
attempt_id = "6f9619ff-8b86-d011-b42d-00c04fc964ff"
"#,
        )
        .unwrap();

        assert_eq!(script.steps.len(), 2);
        assert!(script.steps[0].lesson().is_err());
        let exam = &script.steps[1];
        assert!(matches!(exam.action, Action::Exam));
        assert_eq!(exam.answers(), vec![Answer::new(0, 1), Answer::new(1, 2)]);
        assert_eq!(
            exam.attempt_id().to_string(),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result: Result<ReplayScript, _> =
            toml::from_str("[[steps]]\naction = \"teleport\"\nuser = \"ada\"\n");
        assert!(result.is_err());
    }
}

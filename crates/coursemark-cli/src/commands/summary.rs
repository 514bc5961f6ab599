//! The `coursemark summary` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use coursemark_core::config::load_config_from;
use coursemark_core::engine::ProgressEngine;
use coursemark_core::events::NoopSink;
use coursemark_core::parser::load_courses;
use coursemark_core::progress::ProgressSummary;
use coursemark_core::store::JsonDirStore;

pub async fn execute(
    user: String,
    courses_path: PathBuf,
    course_filter: Option<String>,
    store_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store_dir = store_dir.unwrap_or_else(|| config.store_dir.clone());
    anyhow::ensure!(
        store_dir.is_dir(),
        "store directory not found: {}",
        store_dir.display()
    );

    let store = Arc::new(JsonDirStore::open(&store_dir)?);
    let engine = ProgressEngine::new(store, Arc::new(NoopSink), config.engine_config());
    for course in load_courses(&courses_path)? {
        let id = course.id.clone();
        engine
            .register_course(course)
            .await
            .with_context(|| format!("course '{id}' was refused"))?;
    }

    let mut summaries = engine.list_progress(&user).await?;
    if let Some(course_id) = &course_filter {
        summaries.retain(|s| &s.course_id == course_id);
    }
    if summaries.is_empty() {
        println!("No progress found for user '{user}'.");
        return Ok(());
    }

    println!("{}", summary_table(&summaries));

    for summary in &summaries {
        if let Some(certificate) = engine.certificate(&user, &summary.course_id).await? {
            let rendered = certificate
                .rendered_url
                .map(|url| format!(", {url}"))
                .unwrap_or_default();
            println!(
                "Certificate {}: {} issued {}{rendered}",
                summary.course_id,
                certificate.verification_code,
                certificate.issued_at.format("%Y-%m-%d")
            );
        }
    }

    Ok(())
}

/// Progress table shared by `summary` and `replay`.
pub fn summary_table(summaries: &[ProgressSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "User",
        "Course",
        "Lessons",
        "Progress",
        "Status",
        "Certificate",
        "Last active",
    ]);

    for s in summaries {
        table.add_row(vec![
            Cell::new(&s.user_id),
            Cell::new(&s.course_id),
            Cell::new(format!("{}/{}", s.completed_lessons, s.total_lessons)),
            Cell::new(format!("{:.1}%", s.percentage)),
            Cell::new(s.completion_state),
            Cell::new(s.certificate_state),
            Cell::new(s.last_accessed_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    table
}

//! The `coursemark validate` command.

use std::path::PathBuf;

use anyhow::Result;

use coursemark_core::parser::{load_courses, validate_course};

pub fn execute(course_path: PathBuf) -> Result<()> {
    let courses = load_courses(&course_path)?;

    let mut total_warnings = 0;
    let mut total_errors = 0;

    for course in &courses {
        println!("Course: {} ({} lessons)", course.title, course.total_lessons());

        let warnings = validate_course(course);
        for w in &warnings {
            let prefix = w
                .lesson_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();

        if let Err(e) = course.check() {
            println!("  ERROR: {e}");
            total_errors += 1;
        }
    }

    if total_warnings == 0 {
        println!("All courses valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    anyhow::ensure!(
        total_errors == 0,
        "{total_errors} course(s) would be refused by the engine"
    );
    Ok(())
}

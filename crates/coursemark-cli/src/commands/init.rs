//! The `coursemark init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_once(Path::new("coursemark.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("courses")?;
    write_once(Path::new("courses/example.toml"), EXAMPLE_COURSE)?;

    std::fs::create_dir_all("scripts")?;
    write_once(Path::new("scripts/example.toml"), EXAMPLE_SCRIPT)?;

    println!("\nNext steps:");
    println!("  1. Run: coursemark validate --course courses/example.toml");
    println!(
        "  2. Run: coursemark replay --course courses/example.toml --script scripts/example.toml"
    );

    Ok(())
}

fn write_once(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# coursemark configuration

store_dir = "./coursemark-data"
default_passing_score = 85.0
auto_issue_certificates = false
certificate_code_prefix = "CM"
"#;

const EXAMPLE_COURSE: &str = r#"[course]
id = "example"
title = "Example Course"
description = "A short course to get started"

[[lessons]]
id = "welcome"
title = "Welcome"
type = "video"
duration_minutes = 10

[[lessons]]
id = "check"
title = "Quick check"
type = "quiz"
duration_minutes = 5

[[lessons.questions]]
prompt = "Which keyword declares an immutable binding?"
options = ["let", "mut", "static"]
correct_option = 0

[[lessons]]
id = "final"
title = "Final exam"
type = "exam"
duration_minutes = 15
passing_score = 50

[[lessons.questions]]
prompt = "Which macro prints a line to stdout?"
options = ["format!", "println!", "vec!"]
correct_option = 1

[[lessons.questions]]
prompt = "Which type holds an optional value?"
options = ["Option", "Result", "Box"]
correct_option = 0
"#;

const EXAMPLE_SCRIPT: &str = r#"[[steps]]
action = "enroll"
user = "learner"

[[steps]]
action = "mark"
user = "learner"
lesson = "welcome"

[[steps]]
action = "quiz"
user = "learner"
lesson = "check"
answers = [[0, 0]]

[[steps]]
action = "exam"
user = "learner"
lesson = "final"
started_minutes_ago = 10
answers = [[0, 1], [1, 0]]

[[steps]]
action = "certify"
user = "learner"
"#;

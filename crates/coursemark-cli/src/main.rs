//! coursemark CLI — validate courses and replay learner activity.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "coursemark",
    version,
    about = "Learner progress, assessment, and certification engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a script of learner and educator actions against a course
    Replay {
        /// Path to a course .toml file or directory
        #[arg(long)]
        course: PathBuf,

        /// Path to the replay script
        #[arg(long)]
        script: PathBuf,

        /// Persist progress in this directory instead of memory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a learner's progress from a store directory
    Summary {
        /// User id
        #[arg(long)]
        user: String,

        /// Path to a course .toml file or directory
        #[arg(long)]
        courses: PathBuf,

        /// Only show this course
        #[arg(long)]
        course: Option<String>,

        /// Store directory (defaults to `store_dir` from config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate course TOML files
    Validate {
        /// Path to course file or directory
        #[arg(long)]
        course: PathBuf,
    },

    /// Create starter config, example course, and replay script
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "coursemark=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            course,
            script,
            store,
            format,
            config,
        } => commands::replay::execute(course, script, store, format, config).await,
        Commands::Summary {
            user,
            courses,
            course,
            store,
            config,
        } => commands::summary::execute(user, courses, course, store, config).await,
        Commands::Validate { course } => commands::validate::execute(course),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

//! tracker CLI
//!
//! Maps commands onto the engine. Exit code 0 on success, 1 on any error;
//! errors print as one colored line on stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

use tracker_core::tracing_init::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "tracker", version, about = "Multi-project agent orchestrator")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a task (plan drafted later)
    Create {
        /// Task title
        title: String,
        /// Project directory (defaults to the current directory)
        #[arg(short = 'p', long = "project")]
        project: Option<PathBuf>,
        /// Free-text description
        #[arg(short = 'd', long)]
        description: Option<String>,
        /// Plan id this task depends on
        #[arg(long = "depends-on")]
        depends_on: Option<i64>,
    },
    /// Register an existing plan file
    Add {
        plan_path: PathBuf,
        project_dir: PathBuf,
    },
    /// List all plans grouped by project
    List,
    /// Manually set a plan's status
    Status { id: i64, status: String },
    /// Generate the plan document with the agent
    Plan { id: i64 },
    /// Run plans: serial per project, parallel across projects
    Work {
        /// Plan ids; empty means every unblocked open plan
        ids: Vec<i64>,
    },
    /// Check out a plan's branch (prints the worktree path when isolated)
    Checkout {
        id: i64,
        /// Print only the working directory path
        #[arg(long)]
        path_only: bool,
    },
    /// Resume a plan's worker conversation
    Resume { id: i64 },
    /// Merge an approved plan into main
    Complete {
        /// Plan id; inferred from the current branch when omitted
        id: Option<i64>,
        /// Update the record without touching the repository
        #[arg(long = "db-only")]
        db_only: bool,
    },
    /// Return a plan to open
    Reset {
        id: i64,
        /// Also delete the branch and worktree (required from completed)
        #[arg(long)]
        delete_branch: bool,
    },
    /// Delete a plan record and its branch
    Cancel { id: i64 },
    /// Remove orphaned worktrees and stale logs
    Cleanup,
    /// Make one plan depend on another
    SetDependency { id: i64, dep_id: i64 },
    /// Clear a plan's dependency
    ClearDependency { id: i64 },
    /// Show a plan's dependency chain and dependents
    ShowDeps { id: i64 },
    /// Read or write configuration keys
    Config {
        key: Option<String>,
        value: Option<String>,
    },
    /// Print (or install) the shell helper for jumping into worktrees
    InstallShellFunction {
        /// Append to the shell rc file instead of printing
        #[arg(long)]
        auto: bool,
        #[arg(long)]
        bash: bool,
        #[arg(long)]
        zsh: bool,
    },
    /// Serve the web dashboard
    Ui {
        /// Port to listen on (loopback only)
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("tracker=warn", false);
    let cli = Cli::parse();

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    let ctx = commands::Context::load().await?;

    match command {
        Commands::Create {
            title,
            project,
            description,
            depends_on,
        } => commands::task::create(&ctx, &title, project, description, depends_on).await,
        Commands::Add {
            plan_path,
            project_dir,
        } => commands::task::add(&ctx, &plan_path, &project_dir).await,
        Commands::List => commands::task::list(&ctx).await,
        Commands::Status { id, status } => commands::task::set_status(&ctx, id, &status).await,
        Commands::Plan { id } => commands::plan::generate(&ctx, id).await,
        Commands::Work { ids } => commands::work::run(&ctx, ids).await,
        Commands::Checkout { id, path_only } => {
            commands::work::checkout(&ctx, id, path_only).await
        }
        Commands::Resume { id } => commands::work::resume(&ctx, id).await,
        Commands::Complete { id, db_only } => {
            commands::lifecycle::complete(&ctx, id, db_only).await
        }
        Commands::Reset { id, delete_branch } => {
            commands::lifecycle::reset(&ctx, id, delete_branch).await
        }
        Commands::Cancel { id } => commands::lifecycle::cancel(&ctx, id).await,
        Commands::Cleanup => commands::lifecycle::cleanup(&ctx).await,
        Commands::SetDependency { id, dep_id } => {
            commands::deps::set(&ctx, id, Some(dep_id)).await
        }
        Commands::ClearDependency { id } => commands::deps::set(&ctx, id, None).await,
        Commands::ShowDeps { id } => commands::deps::show(&ctx, id).await,
        Commands::Config { key, value } => commands::config_cmd::run(&ctx, key, value),
        Commands::InstallShellFunction { auto, bash, zsh } => {
            commands::shell::install(auto, bash, zsh)
        }
        Commands::Ui { port } => commands::ui_cmd::serve(ctx, port).await,
    }
}

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use df_app::{project_service, AppResult, LogSink, RunOutcome, RunReport, Scheduler};
use df_core::{ChangeBatch, EntityId, MemoryDocument};
use df_graph::{compile, WorkspaceId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "df-cli")]
#[command(about = "Dynaflow CLI - run dataflow graph projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate project file syntax and structure
    Validate {
        /// Path to the project file (YAML or JSON)
        project_path: PathBuf,
    },
    /// List functions defined in a project
    Functions {
        /// Path to the project file (YAML or JSON)
        project_path: PathBuf,
    },
    /// Print the compiled expression of every output node
    Print {
        /// Path to the project file (YAML or JSON)
        project_path: PathBuf,
    },
    /// Evaluate the project against an empty in-memory document
    Run {
        /// Path to the project file (YAML or JSON)
        project_path: PathBuf,
        /// Evaluate on the mutation context and log each pass
        #[arg(long)]
        debug: bool,
        /// Entity ids to report as modified after the first pass
        #[arg(long, num_args = 1..)]
        modified: Vec<u64>,
        /// Entity ids to report as deleted after the first pass
        #[arg(long, num_args = 1..)]
        deleted: Vec<u64>,
        /// Write the project back after the run
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

/// Prints run output lines as they are produced.
struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn log_line(&self, line: &str) {
        println!("{}", line);
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Functions { project_path } => cmd_functions(&project_path),
        Commands::Print { project_path } => cmd_print(&project_path),
        Commands::Run {
            project_path,
            debug,
            modified,
            deleted,
            save,
        } => {
            let batch = ChangeBatch {
                modified: modified.into_iter().map(EntityId).collect(),
                deleted: deleted.into_iter().map(EntityId).collect(),
            };
            cmd_run(&project_path, debug, &batch, save.as_deref())
        }
    }
}

fn cmd_validate(project_path: &Path) -> AppResult<()> {
    println!("Validating project: {}", project_path.display());
    let project = project_service::load_project(project_path)?;
    project_service::validate_project(&project)?;
    println!("✓ Project is valid");
    Ok(())
}

fn cmd_functions(project_path: &Path) -> AppResult<()> {
    let project = project_service::load_project(project_path)?;
    let functions = project_service::list_functions(&project);

    if functions.is_empty() {
        println!("No functions found in project");
    } else {
        println!("Functions in project:");
        for f in functions {
            println!(
                "  {} ({}) [{}] - {} nodes",
                f.name,
                f.category,
                f.parameters.join(", "),
                f.node_count
            );
            if !f.description.is_empty() {
                println!("    {}", f.description);
            }
        }
    }
    Ok(())
}

fn cmd_print(project_path: &Path) -> AppResult<()> {
    let session = project_service::load_session(
        project_path,
        Arc::new(MemoryDocument::new()),
        Arc::new(ConsoleLog),
    )?;
    let ctx = session.build_context();

    for node in session.graph.home.nodes().filter(|n| n.is_sink()) {
        match compile(&session.graph, &WorkspaceId::Home, node.id, &ctx) {
            Ok(compiled) => println!("{}: {}", node.name, compiled.expr),
            Err(e) => println!("{}: ERROR: {}", node.name, e),
        }
    }
    Ok(())
}

fn cmd_run(
    project_path: &Path,
    debug: bool,
    batch: &ChangeBatch,
    save: Option<&Path>,
) -> AppResult<()> {
    println!("Running project: {}", project_path.display());

    let document = Arc::new(MemoryDocument::new());
    let mut session =
        project_service::load_session(project_path, document.clone(), Arc::new(ConsoleLog))?;
    session.config.debug |= debug;
    info!(
        project = %project_path.display(),
        nodes = session.graph.all_nodes().count(),
        debug = session.config.debug,
        "project loaded"
    );
    let scheduler = Scheduler::new(session)?;

    print_reports(&scheduler.run_blocking());

    if !batch.is_empty() {
        println!(
            "Delivering change batch: {} modified, {} deleted",
            batch.modified.len(),
            batch.deleted.len()
        );
        if scheduler.notify_changed(batch) {
            print_reports(&scheduler.run_blocking());
        } else {
            warn!(
                modified = ?batch.modified,
                deleted = ?batch.deleted,
                "change batch touched no watched entity"
            );
            println!("  No watched entity involved");
        }
    }
    println!("  Document entities: {}", document.entity_count());

    if let Some(path) = save {
        let name = project_service::load_project(project_path)?.name;
        scheduler.with_session(|session| project_service::save_session(path, session, &name))?;
        println!("✓ Saved to {}", path.display());
    }
    Ok(())
}

fn print_reports(reports: &[RunReport]) {
    for report in reports {
        let elapsed = report.finished_at - report.started_at;
        let status = match report.outcome {
            RunOutcome::Success => "✓ Run completed",
            RunOutcome::PartialFailure => "✗ Run finished with errors",
            RunOutcome::Cancelled => "✗ Run cancelled",
        };
        println!("{} in {} ms", status, elapsed.num_milliseconds());
        println!("  Evaluated: {}", report.evaluated.len());
        println!("  Compile errors: {}", report.compile_errors.len());
        println!("  Context: {:?}", report.context);
        println!(
            "  Transaction: {}",
            if report.committed {
                "committed"
            } else if report.rolled_back {
                "rolled back"
            } else {
                "none"
            }
        );
        if let Some(failure) = &report.failure {
            println!("  Failure: {}", failure);
        }
    }
}

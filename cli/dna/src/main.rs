//! DNA CLI: compose project modules and migrate them between versions.

mod commands;
mod logging;
mod manifest;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::compose::ComposeOptions;
use commands::migrate::{MigrateOptions, RunOptions};
use commands::{OutputFormat, Workspace};

/// Exit code for a composition or migration that ran but did not succeed.
const EXIT_UNSUCCESSFUL: i32 = 2;

#[derive(Parser)]
#[command(name = "dna", version, about = "Compose and migrate DNA project modules")]
struct Cli {
    /// Show debug logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, order, and validate a module set
    Compose {
        /// Module to include, as ID or ID@VERSION (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
        /// Target framework (defaults to project.framework)
        #[arg(long)]
        framework: Option<String>,
        /// Accept experimental modules
        #[arg(long)]
        allow_experimental: bool,
        /// Extra catalog path (repeatable)
        #[arg(long)]
        catalog: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the dependency tree of a composition
    Tree {
        /// Module to include, as ID or ID@VERSION (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
        /// Target framework (defaults to project.framework)
        #[arg(long)]
        framework: Option<String>,
        /// Extra catalog path (repeatable)
        #[arg(long)]
        catalog: Vec<PathBuf>,
    },
    /// Search the module catalog by id, name, description, or keyword
    Search {
        /// Search text
        query: String,
        /// Extra catalog path (repeatable)
        #[arg(long)]
        catalog: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Plan or run module migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Preview the steps between two versions
    Plan {
        /// Module id
        module: String,
        /// Current version
        #[arg(long)]
        from: String,
        /// Target version
        #[arg(long)]
        to: String,
        /// Extra migration file (repeatable)
        #[arg(long)]
        migrations: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Execute the steps between two versions
    Run {
        /// Module id
        module: String,
        /// Current version
        #[arg(long)]
        from: String,
        /// Target version
        #[arg(long)]
        to: String,
        /// Project directory (defaults to the directory holding dna.toml)
        #[arg(long)]
        project: Option<PathBuf>,
        /// Back up the project first and restore it on failure
        /// (default location: <project>/.dna-backup)
        #[arg(long)]
        backup: Option<Option<PathBuf>>,
        /// Simulate the steps without running anything
        #[arg(long)]
        dry_run: bool,
        /// Extra migration file (repeatable)
        #[arg(long)]
        migrations: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_UNSUCCESSFUL),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

/// Run a command. `Ok(false)` means it ran but did not succeed.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let cwd = std::env::current_dir()?;
    let workspace = Workspace::discover(&cwd)?;

    let filter = workspace
        .manifest
        .as_ref()
        .and_then(|m| m.logging.filter.as_deref());
    logging::init_logging(filter, cli.verbose);

    match cli.command {
        Commands::Compose {
            modules,
            framework,
            allow_experimental,
            catalog,
            format,
        } => {
            let options = ComposeOptions {
                modules,
                framework,
                allow_experimental,
                catalog,
            };
            commands::compose::run(&workspace, &options, format)
        }

        Commands::Tree {
            modules,
            framework,
            catalog,
        } => {
            let options = ComposeOptions {
                modules,
                framework,
                allow_experimental: false,
                catalog,
            };
            commands::compose::tree(&workspace, &options)
        }

        Commands::Search {
            query,
            catalog,
            format,
        } => {
            commands::catalog::search(&workspace, &query, &catalog, format)?;
            Ok(true)
        }

        Commands::Migrate { action } => match action {
            MigrateAction::Plan {
                module,
                from,
                to,
                migrations,
                format,
            } => {
                let options = MigrateOptions {
                    module,
                    from,
                    to,
                    migrations,
                };
                commands::migrate::plan(&workspace, &options, format)?;
                Ok(true)
            }
            MigrateAction::Run {
                module,
                from,
                to,
                project,
                backup,
                dry_run,
                migrations,
                format,
            } => {
                let options = MigrateOptions {
                    module,
                    from,
                    to,
                    migrations,
                };
                let run = RunOptions {
                    project,
                    backup,
                    dry_run,
                };
                commands::migrate::run(&workspace, &options, &run, format)
            }
        },
    }
}

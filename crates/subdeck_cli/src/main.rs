//! Operator entry point for subdeck maintenance.
//!
//! # Responsibility
//! - Parse one maintenance command and hand it to `subdeck_core`.
//! - Print one line per report, or JSON when asked.
//!
//! # Invariants
//! - File logging starts only when a log directory is configured.
//! - Exit status is non-zero when a request is rejected or an action fails.

use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use subdeck_core::db::open_db;
use subdeck_core::{
    default_log_level, init_logging, Maintenance, MaintenanceReport, MaintenanceRequest,
    DEFAULT_PRESERVE_LEVELS,
};

const EXIT_REJECTED: u8 = 2;

/// Tag notes by subdeck and flatten deep deck hierarchies.
#[derive(Parser, Debug)]
#[command(name = "subdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Collection database file
    #[arg(long, global = true, env = "SUBDECK_DB", default_value = "collection.db")]
    db: PathBuf,

    /// Directory for rotated log files; logging stays off when unset
    #[arg(long, global = true, env = "SUBDECK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "SUBDECK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every deck path in the collection
    Decks {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Tag notes under ROOT with the subdecks their cards live in
    Tag {
        root: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Move cards below the preserved levels up and remove emptied subdecks
    Flatten {
        root: String,

        /// Subdeck levels below ROOT to keep
        #[arg(long, short, default_value_t = DEFAULT_PRESERVE_LEVELS)]
        levels: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run any combination of tagging and flattening, tagging first
    Run {
        root: String,

        #[arg(long)]
        tag: bool,

        #[arg(long)]
        flatten: bool,

        /// Subdeck levels below ROOT to keep when flattening
        #[arg(long, short, default_value_t = DEFAULT_PRESERVE_LEVELS)]
        levels: u32,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct OutputArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = start_logging(cli.log_level.as_deref(), log_dir) {
            eprintln!("error: {err}");
            return ExitCode::from(EXIT_REJECTED);
        }
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn start_logging(level: Option<&str>, log_dir: &Path) -> Result<(), String> {
    let log_dir = std::path::absolute(log_dir)
        .map_err(|err| format!("cannot resolve log dir `{}`: {err}", log_dir.display()))?;
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| format!("log dir `{}` is not valid UTF-8", log_dir.display()))?;
    init_logging(level.unwrap_or_else(|| default_log_level()), log_dir)
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let conn = open_db(&cli.db)?;
    let maintenance = Maintenance::new(conn)?;
    info!(
        "event=cli_command module=cli status=start db={}",
        cli.db.display()
    );

    let (request, output) = match cli.command {
        Commands::Decks { output } => {
            let paths = maintenance.list_deck_paths()?;
            if output.json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else {
                for path in paths {
                    println!("{path}");
                }
            }
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Tag { root, output } => {
            let mut request = MaintenanceRequest::new(root);
            request.tag = true;
            (request, output)
        }
        Commands::Flatten {
            root,
            levels,
            output,
        } => {
            let mut request = MaintenanceRequest::new(root);
            request.flatten = true;
            request.preserve_levels = levels;
            (request, output)
        }
        Commands::Run {
            root,
            tag,
            flatten,
            levels,
            output,
        } => {
            let mut request = MaintenanceRequest::new(root);
            request.tag = tag;
            request.flatten = flatten;
            request.preserve_levels = levels;
            (request, output)
        }
    };

    let reports = match maintenance.run(&request) {
        Ok(reports) => reports,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };

    print_reports(&reports, output)?;
    if reports.iter().any(MaintenanceReport::is_failure) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_reports(reports: &[MaintenanceReport], output: OutputArgs) -> serde_json::Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!("{report}");
        if let MaintenanceReport::Succeeded { notices, .. } = report {
            for notice in notices {
                println!("  {notice}");
            }
        }
    }
    Ok(())
}

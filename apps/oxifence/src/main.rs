mod reporter;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info, warn};
use oxifence_core::{FileSystem, OsFileSystem, join, user_error};
use oxifence_rules::{Analyzer, ProjectDataOptions, verify_entry_points};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "oxifence")]
#[command(about = "Enforces module boundaries in TypeScript projects", long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file, relative to the root
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check dependency rules and encapsulation
    Verify {
        /// Entry point name or entry file (defaults to the configured entries)
        entry: Option<String>,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// List modules with their tags
    List {
        entry: Option<String>,
    },
    /// Print module, tags and imports of every file as JSON
    Export {
        entry: Option<String>,

        #[arg(long)]
        include_external: bool,

        /// Classify files without following imports
        #[arg(long)]
        skip_imports: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli.command);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            match user_error(&e) {
                Some(user) => eprintln!("{} [{}] {}", "error:".red().bold(), user.code(), user),
                None => eprintln!("{} {:#}", "error:".red().bold(), e),
            }
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // stdio is blocked by LineWriter, use a BufWriter to reduce syscalls.
    // See https://github.com/rust-lang/rust/issues/60673
    let mut stdout = BufWriter::new(std::io::stdout());

    let fs = OsFileSystem;
    let cwd = fs.cwd()?;
    let root = match &cli.root {
        Some(root) => join(&cwd, root),
        None => cwd.clone(),
    };
    let analyzer = Analyzer::load(&fs, &root, cli.config.as_deref())?;
    if !analyzer.config().plugins.is_empty() {
        warn!("Plugins are not supported, ignoring {:?}", analyzer.config().plugins);
    }

    let start = Instant::now();

    match cli.command {
        Commands::Verify { entry, json } => {
            let entries = analyzer.entries(entry.as_deref())?;
            let num_threads = rayon::current_num_threads();
            info!("Verifying {} entry points (using {} threads)", entries.len(), num_threads);

            let reports = verify_entry_points(&analyzer, &entries)?;
            let success = reports.iter().all(|r| r.success);

            if json {
                serde_json::to_writer_pretty(&mut stdout, &reports)?;
                writeln!(stdout)?;
            } else {
                for report in &reports {
                    reporter::print_report(&mut stdout, report, &root, &cwd)?;
                }
                let files: usize = reports.iter().map(|r| r.files_analyzed).sum();
                writeln!(
                    stdout,
                    "\n{} Finished in {}ms on {} files (using {} threads).",
                    "●".bright_blue(),
                    start.elapsed().as_millis().to_string().cyan(),
                    files.to_string().cyan(),
                    num_threads.to_string().cyan()
                )?;
            }
            stdout.flush()?;

            // Non-zero exit to fail CI
            Ok(if success { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Commands::List { entry } => {
            for entry in analyzer.entries(entry.as_deref())? {
                let data = analyzer.get_project_data(&entry, ProjectDataOptions::default())?;
                if let Some(name) = &entry.name {
                    writeln!(stdout, "{}", name.bold())?;
                }
                reporter::print_modules(&mut stdout, &data)?;
            }
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export { entry, include_external, skip_imports } => {
            let options = ProjectDataOptions {
                include_external_libraries: include_external,
                skip_import_resolution: skip_imports,
            };
            let entries = analyzer.entries(entry.as_deref())?;
            let mut exported = serde_json::Map::new();
            for entry in &entries {
                let data = analyzer.get_project_data(entry, options)?;
                let key = entry.name.clone().unwrap_or_else(|| entry.file.display().to_string());
                exported.insert(key, serde_json::to_value(data)?);
            }
            debug!("Exporting {} entry points", exported.len());

            // a single entry exports its data directly
            let value = if exported.len() == 1 {
                exported.into_iter().map(|(_, data)| data).next().unwrap_or_default()
            } else {
                serde_json::Value::Object(exported)
            };
            serde_json::to_writer_pretty(&mut stdout, &value)?;
            writeln!(stdout)?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

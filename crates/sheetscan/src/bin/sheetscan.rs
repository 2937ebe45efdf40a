//! sheetscan CLI: inspect algorithm configuration documents and run scan jobs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sheetscan::core::{CollectingSink, DiagnosticSink, LogSink};
use sheetscan::{run_scan, DiagnosticRecord, ParameterSet, ScanJobConfig, ScanReport};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheetscan")]
#[command(about = "Align bubble-sheet scans, find bubbles and classify them as filled or empty")]
#[command(version)]
struct Cli {
    /// Log level for the stderr logger (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log through `tracing-subscriber` instead of the stderr logger.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    tracing: bool,

    /// Emit tracing output as JSON (implies `--tracing`).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the names of every algorithm block in a document.
    List {
        /// Algorithm configuration document (XML).
        document: PathBuf,
    },

    /// Print one algorithm block and how each entry parses.
    Show {
        document: PathBuf,
        /// Name of the block.
        name: String,
    },

    /// Run a scan job described by a JSON file.
    Run {
        job: PathBuf,
        /// Override the report path from the job.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Include every diagnostic in the report.
        #[arg(long)]
        diagnostics: bool,
    },
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        if cli.tracing || cli.json {
            let _ = tracing_log::LogTracer::init();
            sheetscan::core::init_tracing(cli.json);
            return Ok(());
        }
    }
    sheetscan::core::init_with_level(sheetscan::core::level_from_str(&cli.log_level))?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("failed to initialise logging: {err}");
    }

    let result = match &cli.command {
        Commands::List { document } => run_list(document),
        Commands::Show { document, name } => run_show(document, name),
        Commands::Run {
            job,
            out,
            diagnostics,
        } => run_job(job, out.as_deref(), *diagnostics),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

// ── list ──────────────────────────────────────────────────────────────

fn run_list(document: &Path) -> CliResult<()> {
    for name in ParameterSet::filter_names_in_file(document, &LogSink)? {
        println!("{name}");
    }
    Ok(())
}

// ── show ──────────────────────────────────────────────────────────────

fn run_show(document: &Path, name: &str) -> CliResult<()> {
    let params = ParameterSet::from_file(document, name, &LogSink)?;
    print!("{params}");
    for key in params.entries().keys() {
        let verdict = |yes: bool| if yes { "true." } else { "false." };
        println!("is {key} a float? {}", verdict(params.is_float(key)));
        println!("is {key} an int? {}", verdict(params.is_int(key)));
    }
    Ok(())
}

// ── run ───────────────────────────────────────────────────────────────

fn run_job(job: &Path, out: Option<&Path>, diagnostics: bool) -> CliResult<()> {
    let mut cfg = ScanJobConfig::load_json(job)?;
    if let Some(dir) = job.parent() {
        cfg.resolve_relative_to(dir);
    }
    let out = out.map(Path::to_path_buf).unwrap_or_else(|| cfg.output_path());

    let collector = Arc::new(CollectingSink::new());
    let sink: Arc<dyn DiagnosticSink> = if diagnostics {
        collector.clone()
    } else {
        Arc::new(LogSink)
    };

    let result = run_scan(&cfg, job, sink);
    let mut report = match &result {
        Ok(report) => report.clone(),
        Err(err) => {
            let mut report = ScanReport::new(&cfg, job);
            report.set_error(err);
            report
        }
    };
    if diagnostics {
        let records = collector.records();
        for d in &records {
            LogSink.emit(d.clone());
        }
        report.diagnostics = records.iter().map(DiagnosticRecord::from).collect();
    }
    report.write_json(&out)?;
    log::info!("report written to {}", out.display());

    if let Ok(report) = &result {
        for bubble in &report.bubbles {
            let state = match (&bubble.state, &bubble.error) {
                (Some(state), _) => format!("{state:?}").to_lowercase(),
                (None, Some(err)) => format!("error: {err}"),
                (None, None) => "unknown".to_string(),
            };
            println!(
                "({:.4}, {:.4}, {:.4}) {state}",
                bubble.circle.x, bubble.circle.y, bubble.circle.r
            );
        }
        println!("{} of {} bubbles filled", report.filled_count(), report.bubbles.len());
    }
    result.map(|_| ()).map_err(Into::into)
}

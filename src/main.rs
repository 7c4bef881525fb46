//! Command-line front end for the pdfprobe scanner.
//!
//! Scans a single PDF or every PDF below a directory and prints one report
//! per file on stdout. Logs go to stderr and are controlled by `RUST_LOG`.

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use pdfprobe::{
    CancelToken, PdfScanner, ReportFormat, Reporter, ReporterConfig, ScanConfig, ScanSummary,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXIT_CLEAN: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CONCERNS: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "pdfprobe",
    version,
    about = "Scan PDF files for malicious content, structural corruption and hidden data"
)]
struct Cli {
    /// PDF file or directory to scan. Prompted for when omitted.
    path: Option<PathBuf>,

    /// Print one JSON document per file instead of the text report
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show every text span and full tool output
    #[arg(short, long)]
    verbose: bool,

    /// Structural checker program
    #[arg(long, value_name = "PROG", default_value = "qpdf")]
    qpdf: PathBuf,

    /// Signature listing program
    #[arg(long, value_name = "PROG", default_value = "pdfsig")]
    pdfsig: PathBuf,

    /// Seconds an external tool may run before it is killed (0 = no limit)
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    timeout: u64,

    /// Visit directory entries in file-system order instead of by name
    #[arg(long)]
    no_sort: bool,
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(summary) if summary.files_with_concerns > 0 => exit(EXIT_CONCERNS),
        Ok(_) => exit(EXIT_CLEAN),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit(EXIT_FAILURE);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ScanSummary> {
    let path = match cli.path {
        Some(path) => path,
        None => prompt_for_path()?,
    };

    let config = ScanConfig {
        qpdf_program: cli.qpdf,
        pdfsig_program: cli.pdfsig,
        tool_timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
        sort_entries: !cli.no_sort,
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            // Second Ctrl+C: stop waiting for the current file.
            exit(130);
        }
        eprintln!(
            "\n{} Received Ctrl+C, finishing the current file...",
            "⚠️".yellow()
        );
        handler_token.cancel();
    })
    .context("failed to install the Ctrl+C handler")?;

    let scanner = PdfScanner::new(config).with_cancel_token(cancel);
    let reporter = Reporter::new(ReporterConfig {
        format: if cli.json {
            ReportFormat::Json
        } else {
            ReportFormat::Text
        },
        color: !cli.no_color,
        verbose: cli.verbose,
    });

    let stdout = io::stdout();
    let mut render_error = None;
    let summary = scanner.run(&path, |set| {
        if render_error.is_some() {
            return;
        }
        let mut out = stdout.lock();
        if let Err(e) = reporter.render(&set, &mut out).and_then(|_| out.flush()) {
            render_error = Some(e);
        }
    })?;

    if let Some(e) = render_error {
        return Err(e).context("failed to write the report");
    }

    if !cli.json {
        eprintln!(
            "{} file(s) scanned, {} with suspicious findings{}",
            summary.files_scanned,
            summary.files_with_concerns,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }

    Ok(summary)
}

fn prompt_for_path() -> anyhow::Result<PathBuf> {
    print!("Enter the path to a PDF file or a directory: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read the path from stdin")?;

    let line = line.trim();
    if line.is_empty() {
        bail!("no path given");
    }
    Ok(PathBuf::from(line))
}

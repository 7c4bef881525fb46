//! # pdfprobe
//!
//! A Rust library for scanning PDF files for malicious content, structural
//! corruption, and hidden data.
//!
//! ## What this crate does
//!
//! Every file is run through six independent analyzers, in a fixed order:
//!
//! 1. **Byte stream probe**: SHA-256 digest plus raw marker checks (`%PDF-`,
//!    `ObjStm`, `/Encrypt`, `%%EOF`, risky keywords).
//! 2. **Structural validation**: runs `qpdf --check` in a child process.
//! 3. **Metadata**: reads the document-information dictionary.
//! 4. **Object inventory**: every image (with MD5 digest) and every text
//!    span (with font and size), page by page.
//! 5. **Script analysis**: finds embedded JavaScript, even in files that do
//!    not parse cleanly, and runs it through a [`ScriptEngine`].
//! 6. **Signatures**: runs `pdfsig` in a child process.
//!
//! Each analyzer yields exactly one [`Finding`]; failures are findings too.
//!
//! ## Quick example
//!
//! ```no_run
//! use pdfprobe::{PdfScanner, Reporter, ReporterConfig, ScanConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = PdfScanner::new(ScanConfig::default());
//! let reporter = Reporter::new(ReporterConfig::default());
//!
//! let summary = scanner.run("suspicious.pdf", |set| {
//!     let _ = reporter.render(&set, &mut std::io::stdout());
//! })?;
//! println!("{} file(s) scanned", summary.files_scanned);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod analyzer;
mod discovery;
mod finding;
mod metadata;
mod objects;
mod pdf_utils;
mod probe;
mod report;
mod scanner;
mod script;
mod signature;
mod structure;
mod tool;

pub use analyzer::Analyzer;
pub use discovery::{is_pdf_name, pdf_files_under};
pub use finding::{
    AnalyzerKind, BinaryMarkers, Finding, FindingResult, FindingSet, ImageEntry, KeywordCount,
    MetadataEntry, MetadataResult, ObjectInventory, ParseMode, ScriptEntry, ScriptVerdict,
    Severity, SignatureInfo, StructuralResult, TextSpanEntry,
};
pub use metadata::MetadataExtractor;
pub use objects::ObjectWalker;
pub use probe::ByteStreamProbe;
pub use report::{ReportFormat, Reporter, ReporterConfig};
pub use scanner::{CancelToken, PdfScanner, ResolvedInput, ScanSummary, ScanTarget};
pub use script::{HeuristicScriptEngine, ScriptAnalyzer, ScriptEngine};
pub use signature::SignatureChecker;
pub use structure::StructuralValidator;
pub use tool::{ExternalTool, ToolOutput};

// ── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration for [`PdfScanner`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Program used for structural checking, invoked as `<qpdf> --check <path>`.
    pub qpdf_program: PathBuf,

    /// Program used for signature listing, invoked as `<pdfsig> <path>`.
    pub pdfsig_program: PathBuf,

    /// Upper bound on how long an external tool may run. `None` waits forever.
    pub tool_timeout: Option<Duration>,

    /// When `true`, directory entries are visited in file-name order so that
    /// repeated runs over the same tree report files in the same order.
    pub sort_entries: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            qpdf_program: PathBuf::from("qpdf"),
            pdfsig_program: PathBuf::from("pdfsig"),
            tool_timeout: Some(Duration::from_secs(60)),
            sort_entries: true,
        }
    }
}

// ── Error types ──────────────────────────────────────────────────────────────

/// Errors that stop a whole scan run.
///
/// Anything that goes wrong *inside* an analyzer is an [`AnalyzerError`]
/// instead and ends up in the report as a failure [`Finding`].
#[derive(Error, Debug)]
pub enum ScanError {
    /// The input path is neither a non-empty `.pdf` file nor a directory.
    #[error("{}: {reason}", path.display())]
    InputResolution { path: PathBuf, reason: String },

    /// A filesystem I/O error occurred outside of any analyzer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single analyzer could not produce its regular result.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum AnalyzerError {
    /// The external program could not be found on this system.
    #[error("{tool} is not installed or not found in PATH")]
    ToolUnavailable { tool: String },

    /// The external program was killed after exceeding the configured timeout.
    #[error("{tool} did not finish within {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    /// The external program could not be started or waited on.
    #[error("{tool} could not be run: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// The document model could not be built from the file.
    #[error("PDF parse error: {reason}")]
    Parse { reason: String },

    /// The file could not be read.
    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for AnalyzerError {
    fn from(e: std::io::Error) -> Self {
        AnalyzerError::Io {
            reason: e.to_string(),
        }
    }
}

impl From<lopdf::Error> for AnalyzerError {
    fn from(e: lopdf::Error) -> Self {
        AnalyzerError::Parse {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ScanError>;

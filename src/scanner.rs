use crate::discovery::{is_pdf_name, pdf_files_under};
use crate::{
    Analyzer, ByteStreamProbe, Finding, FindingSet, MetadataExtractor, ObjectWalker, Result,
    ScanConfig, ScanError, ScriptAnalyzer, SignatureChecker, StructuralValidator,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── ScanTarget ────────────────────────────────────────────────────────────────

/// A path known to designate a single PDF file. Analyzers only ever read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    path: PathBuf,
}

impl ScanTarget {
    /// Wrap a path without checking it. Prefer [`PdfScanner::resolve_input`]
    /// for user-supplied paths.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What a user-supplied path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    SingleFile(ScanTarget),
    Directory(PathBuf),
}

// ── CancelToken ───────────────────────────────────────────────────────────────

/// Cooperative cancellation, checked between files of a directory walk.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Totals for one [`PdfScanner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_scanned: usize,
    /// Files with at least one [`crate::Severity::Suspicious`] finding.
    pub files_with_concerns: usize,
    /// The walk stopped early because the [`CancelToken`] fired.
    pub cancelled: bool,
}

// ── PdfScanner ────────────────────────────────────────────────────────────────

/// Runs an ordered list of analyzers over one file or a directory tree.
///
/// # Creating a scanner
///
/// ```no_run
/// use pdfprobe::{PdfScanner, ScanConfig, ScanTarget};
/// use std::time::Duration;
///
/// // The six standard analyzers
/// let scanner = PdfScanner::new(ScanConfig::default());
///
/// // With custom tool locations
/// let cfg = ScanConfig {
///     qpdf_program: "/opt/qpdf/bin/qpdf".into(),
///     tool_timeout: Some(Duration::from_secs(10)),
///     ..Default::default()
/// };
/// let scanner = PdfScanner::new(cfg);
///
/// let set = scanner.scan_file(&ScanTarget::new("invoice.pdf"));
/// assert_eq!(set.len(), 6);
/// ```
pub struct PdfScanner {
    config: ScanConfig,
    analyzers: Vec<Box<dyn Analyzer>>,
    cancel: CancelToken,
}

impl PdfScanner {
    /// Scanner with the standard analyzers in their fixed order: byte
    /// stream, structure, metadata, objects, script, signature.
    pub fn new(config: ScanConfig) -> Self {
        let analyzers: Vec<Box<dyn Analyzer>> = vec![
            Box::new(ByteStreamProbe::new()),
            Box::new(StructuralValidator::new(&config)),
            Box::new(MetadataExtractor::new()),
            Box::new(ObjectWalker::new()),
            Box::new(ScriptAnalyzer::new()),
            Box::new(SignatureChecker::new(&config)),
        ];
        Self::with_analyzers(config, analyzers)
    }

    /// Scanner with a caller-chosen analyzer list, run in the given order.
    pub fn with_analyzers(config: ScanConfig, analyzers: Vec<Box<dyn Analyzer>>) -> Self {
        Self {
            config,
            analyzers,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the cancellation token, e.g. with one wired to Ctrl+C.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Decide whether `path` is a single PDF or a directory.
    ///
    /// Missing paths, zero-byte files, and files not named `*.pdf` are
    /// rejected with [`ScanError::InputResolution`].
    pub fn resolve_input<P: AsRef<Path>>(path: P) -> Result<ResolvedInput> {
        let path = path.as_ref();
        let reject = |reason: &str| ScanError::InputResolution {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let meta = std::fs::metadata(path).map_err(|_| reject("no such file or directory"))?;
        if meta.is_dir() {
            return Ok(ResolvedInput::Directory(path.to_path_buf()));
        }
        if !meta.is_file() || !is_pdf_name(path) {
            return Err(reject("not a valid PDF file or directory"));
        }
        if meta.len() == 0 {
            return Err(reject("file is empty"));
        }
        Ok(ResolvedInput::SingleFile(ScanTarget::new(path)))
    }

    /// Run every analyzer against `target`.
    ///
    /// The returned set holds exactly one finding per analyzer: an analyzer
    /// error becomes a failure finding and the remaining analyzers still run.
    pub fn scan_file(&self, target: &ScanTarget) -> FindingSet {
        let mut set = FindingSet::new(target.path());

        for analyzer in &self.analyzers {
            let kind = analyzer.kind();
            debug!(analyzer = ?kind, path = %target.path().display(), "running analyzer");

            let finding = match analyzer.run(target) {
                Ok(finding) => finding,
                Err(e) => {
                    warn!(analyzer = ?kind, path = %target.path().display(), error = %e, "analyzer failed");
                    Finding::failure(kind, e)
                }
            };
            set.push(finding);
        }

        set
    }

    /// Resolve `path`, scan every PDF it designates, and hand each
    /// [`FindingSet`] to `sink` as soon as it is complete.
    ///
    /// Only an unusable input path is an error; everything that goes wrong
    /// per file or per analyzer is reported through the finding sets.
    pub fn run<P, F>(&self, path: P, mut sink: F) -> Result<ScanSummary>
    where
        P: AsRef<Path>,
        F: FnMut(FindingSet),
    {
        let mut summary = ScanSummary::default();

        match Self::resolve_input(path)? {
            ResolvedInput::SingleFile(target) => {
                self.scan_into(&target, &mut summary, &mut sink);
            }
            ResolvedInput::Directory(dir) => {
                info!(dir = %dir.display(), "walking directory");
                for file in pdf_files_under(&dir, self.config.sort_entries) {
                    if self.cancel.is_cancelled() {
                        summary.cancelled = true;
                        break;
                    }
                    self.scan_into(&ScanTarget::new(file), &mut summary, &mut sink);
                }
            }
        }

        info!(
            files = summary.files_scanned,
            concerns = summary.files_with_concerns,
            cancelled = summary.cancelled,
            "scan finished"
        );
        Ok(summary)
    }

    fn scan_into<F: FnMut(FindingSet)>(
        &self,
        target: &ScanTarget,
        summary: &mut ScanSummary,
        sink: &mut F,
    ) {
        let set = self.scan_file(target);
        summary.files_scanned += 1;
        if set.has_concerns() {
            summary.files_with_concerns += 1;
        }
        sink(set);
    }
}

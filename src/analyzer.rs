use crate::{AnalyzerError, AnalyzerKind, Finding, ScanTarget};

// ── Analyzer ──────────────────────────────────────────────────────────────────

/// One independent check run against a [`ScanTarget`].
///
/// Implementations must only read the target. They return `Err` for anything
/// that kept them from producing their regular result; [`crate::PdfScanner`]
/// turns that into a failure [`Finding`] so the scan always continues.
///
/// # Example
///
/// ```
/// use pdfprobe::{
///     Analyzer, AnalyzerError, AnalyzerKind, Finding, FindingResult, ScanTarget, Severity,
///     SignatureInfo,
/// };
///
/// /// Pretends every file carries one signature.
/// struct AlwaysSigned;
///
/// impl Analyzer for AlwaysSigned {
///     fn kind(&self) -> AnalyzerKind {
///         AnalyzerKind::Signature
///     }
///
///     fn run(&self, _target: &ScanTarget) -> Result<Finding, AnalyzerError> {
///         let info = SignatureInfo {
///             tool_succeeded: true,
///             signature_count: 1,
///             report: "Signature #1".into(),
///         };
///         Ok(Finding::new(self.kind(), FindingResult::Signature(info), Severity::Info))
///     }
/// }
/// ```
pub trait Analyzer: Send + Sync {
    /// Which analyzer this is; also the identity recorded on failure findings.
    fn kind(&self) -> AnalyzerKind;

    /// Run the check against `target`.
    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError>;
}

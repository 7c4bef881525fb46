use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, ExternalTool, Finding, FindingResult, ScanConfig,
    ScanTarget, Severity, SignatureInfo,
};

// ── SignatureChecker ──────────────────────────────────────────────────────────

/// Lists digital signatures by running `pdfsig <path>`.
///
/// Validity is whatever `pdfsig` prints; this analyzer only counts the
/// `Signature #N` entries and keeps the report text.
#[derive(Debug, Clone)]
pub struct SignatureChecker {
    tool: ExternalTool,
}

impl SignatureChecker {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            tool: ExternalTool::new(&config.pdfsig_program, config.tool_timeout),
        }
    }

    /// Count `Signature #N:` headings in `pdfsig` output.
    ///
    /// ```
    /// let report = "Digital Signature Info of: a.pdf\nSignature #1:\n  - Signer Certificate Common Name: Jane\nSignature #2:\n";
    /// assert_eq!(pdfprobe::SignatureChecker::count_signatures(report), 2);
    /// ```
    pub fn count_signatures(report: &str) -> usize {
        report
            .lines()
            .filter(|line| line.trim_start().starts_with("Signature #"))
            .count()
    }
}

impl Analyzer for SignatureChecker {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Signature
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let output = self.tool.run([target.path().as_os_str()])?;

        let info = if output.success() {
            SignatureInfo {
                tool_succeeded: true,
                signature_count: Self::count_signatures(&output.stdout),
                report: output.stdout.trim_end().to_string(),
            }
        } else {
            // pdfsig exits non-zero both for unsigned files and for files it
            // cannot read; only the diagnostics tell them apart.
            let diagnostics = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            SignatureInfo {
                tool_succeeded: false,
                signature_count: 0,
                report: diagnostics.trim_end().to_string(),
            }
        };

        Ok(Finding::new(
            self.kind(),
            FindingResult::Signature(info),
            Severity::Info,
        ))
    }
}

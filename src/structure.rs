use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, ExternalTool, Finding, FindingResult, ScanConfig,
    ScanTarget, Severity, StructuralResult,
};

// ── StructuralValidator ───────────────────────────────────────────────────────

/// Confirms the file is well-formed PDF syntax by running `qpdf --check`.
///
/// Exit status 0 means the checker found nothing wrong. Any other status is a
/// failing verdict, with the checker's diagnostics kept verbatim.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    tool: ExternalTool,
}

impl StructuralValidator {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            tool: ExternalTool::new(&config.qpdf_program, config.tool_timeout),
        }
    }
}

impl Analyzer for StructuralValidator {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Structure
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let output = self
            .tool
            .run([std::ffi::OsStr::new("--check"), target.path().as_os_str()])?;

        let passed = output.success();
        // qpdf reports most problems on stderr but a few only on stdout.
        let diagnostics = if output.stderr.trim().is_empty() && !passed {
            output.stdout
        } else {
            output.stderr
        };

        let result = StructuralResult {
            passed,
            exit_code: output.exit_code,
            diagnostics: diagnostics.trim_end().to_string(),
        };
        let severity = if passed {
            Severity::Info
        } else {
            Severity::Warning
        };
        Ok(Finding::new(
            self.kind(),
            FindingResult::Structural(result),
            severity,
        ))
    }
}

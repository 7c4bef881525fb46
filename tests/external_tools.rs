// Structural and signature analyzers against scripted stand-ins for qpdf and
// pdfsig. Unix only: the stand-ins are shell scripts.
//
// All scripts are written before anything is spawned; writing an executable
// while another thread forks can fail with ETXTBSY.

#![cfg(unix)]

mod common;

use common::{write_script, PdfFixture};
use pdfprobe::{
    Analyzer, AnalyzerError, AnalyzerKind, FindingResult, PdfScanner, ScanConfig, ScanTarget,
    Severity, SignatureChecker, StructuralValidator,
};
use std::time::Duration;

#[test]
fn tool_backed_analyzers() {
    let dir = tempfile::tempdir().unwrap();
    let tools = dir.path();
    let pdf = PdfFixture::new().write_to(tools, "doc.pdf");
    let target = ScanTarget::new(&pdf);

    let qpdf_ok = write_script(
        tools,
        "qpdf-ok",
        r#"[ "$1" = "--check" ] || exit 9
echo "checking $2"
echo "No syntax or stream encoding errors found; the file may still contain"
exit 0"#,
    );
    let qpdf_bad = write_script(
        tools,
        "qpdf-bad",
        r#"echo "checking $2"
echo "WARNING: $2: file is damaged" >&2
exit 2"#,
    );
    let qpdf_quiet_bad = write_script(
        tools,
        "qpdf-quiet-bad",
        r#"echo "xref table is broken"
exit 3"#,
    );
    let pdfsig_two = write_script(
        tools,
        "pdfsig-two",
        r#"echo "Digital Signature Info of: $1"
echo "Signature #1:"
echo "  - Signer Certificate Common Name: Alice"
echo "Signature #2:"
echo "  - Signer Certificate Common Name: Bob""#,
    );
    let pdfsig_none = write_script(
        tools,
        "pdfsig-none",
        r#"echo "File '$1' does not contain any signatures" >&2
exit 2"#,
    );
    let slow = write_script(tools, "slow", "exec sleep 5");

    let config = |qpdf: &std::path::Path, pdfsig: &std::path::Path| ScanConfig {
        qpdf_program: qpdf.to_path_buf(),
        pdfsig_program: pdfsig.to_path_buf(),
        ..Default::default()
    };

    // Passing structural check.
    let finding = StructuralValidator::new(&config(&qpdf_ok, &pdfsig_two))
        .run(&target)
        .unwrap();
    assert!(finding.success);
    assert_eq!(finding.severity, Severity::Info);
    match &finding.result {
        FindingResult::Structural(s) => {
            assert!(s.passed);
            assert_eq!(s.exit_code, Some(0));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Failing check: diagnostics come from stderr.
    let finding = StructuralValidator::new(&config(&qpdf_bad, &pdfsig_two))
        .run(&target)
        .unwrap();
    assert!(!finding.success);
    assert_eq!(finding.severity, Severity::Warning);
    match &finding.result {
        FindingResult::Structural(s) => {
            assert!(!s.passed);
            assert_eq!(s.exit_code, Some(2));
            assert!(s.diagnostics.contains("file is damaged"));
            assert!(!s.diagnostics.contains("checking"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Failing check with an empty stderr falls back to stdout.
    let finding = StructuralValidator::new(&config(&qpdf_quiet_bad, &pdfsig_two))
        .run(&target)
        .unwrap();
    match &finding.result {
        FindingResult::Structural(s) => assert!(s.diagnostics.contains("xref table is broken")),
        other => panic!("unexpected payload {other:?}"),
    }

    // Signatures are counted from the report.
    let finding = SignatureChecker::new(&config(&qpdf_ok, &pdfsig_two))
        .run(&target)
        .unwrap();
    assert!(finding.success);
    match &finding.result {
        FindingResult::Signature(s) => {
            assert!(s.tool_succeeded);
            assert_eq!(s.signature_count, 2);
            assert!(s.report.contains("Alice"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // A nonzero exit is a result, not an error.
    let finding = SignatureChecker::new(&config(&qpdf_ok, &pdfsig_none))
        .run(&target)
        .unwrap();
    assert!(!finding.success);
    match &finding.result {
        FindingResult::Signature(s) => {
            assert!(!s.tool_succeeded);
            assert_eq!(s.signature_count, 0);
            assert!(s.report.contains("does not contain any signatures"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // A hung tool is killed and reported as a timeout.
    let hung = ScanConfig {
        tool_timeout: Some(Duration::from_millis(300)),
        ..config(&slow, &slow)
    };
    let set = PdfScanner::new(hung).scan_file(&target);
    assert_eq!(set.len(), AnalyzerKind::ALL.len());
    for kind in [AnalyzerKind::Structure, AnalyzerKind::Signature] {
        assert!(matches!(
            set.get(kind).unwrap().error(),
            Some(AnalyzerError::ToolTimeout { .. })
        ));
    }

    // The full pipeline with both stand-ins succeeding.
    let set = PdfScanner::new(config(&qpdf_ok, &pdfsig_two)).scan_file(&target);
    assert!(set.iter().all(|f| f.success));
    assert!(!set.has_concerns());
}

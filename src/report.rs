use crate::{
    AnalyzerError, BinaryMarkers, Finding, FindingResult, FindingSet, MetadataResult,
    ObjectInventory, ParseMode, ScriptVerdict, Severity, SignatureInfo, StructuralResult,
};
use colored::{ColoredString, Colorize};
use std::io::{self, Write};

/// Text payloads longer than this are cut short unless `verbose` is set.
const BRIEF_CHARS: usize = 400;
/// Text spans listed per file unless `verbose` is set.
const BRIEF_SPANS: usize = 20;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    /// One compact JSON document per file, newline-terminated.
    Json,
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub format: ReportFormat,
    /// Use ANSI colors in text output.
    pub color: bool,
    /// Print every text span and full tool output.
    pub verbose: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Text,
            color: true,
            verbose: false,
        }
    }
}

/// Renders a [`FindingSet`]. Rendering never touches the scanned file.
///
/// ```
/// use pdfprobe::{FindingSet, ReportFormat, Reporter, ReporterConfig};
///
/// let reporter = Reporter::new(ReporterConfig {
///     format: ReportFormat::Json,
///     ..Default::default()
/// });
/// let mut out = Vec::new();
/// reporter.render(&FindingSet::new("a.pdf"), &mut out).unwrap();
/// assert!(String::from_utf8(out).unwrap().starts_with("{\"target\":\"a.pdf\""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    pub fn render<W: Write>(&self, set: &FindingSet, out: &mut W) -> io::Result<()> {
        match self.config.format {
            ReportFormat::Json => {
                serde_json::to_writer(&mut *out, set)?;
                writeln!(out)
            }
            ReportFormat::Text => self.render_text(set, out),
        }
    }

    fn render_text<W: Write>(&self, set: &FindingSet, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", "═".repeat(RULE_WIDTH))?;
        writeln!(
            out,
            "{} {}",
            self.paint("Scanning:", |s| s.bold()),
            set.target.display()
        )?;
        writeln!(out, "{}", "═".repeat(RULE_WIDTH))?;

        for finding in set.iter() {
            self.render_finding(finding, out)?;
        }

        writeln!(out, "{}", "─".repeat(RULE_WIDTH))?;
        let verdict = match set.max_severity() {
            Severity::Suspicious => self.paint("SUSPICIOUS", |s| s.red().bold()),
            Severity::Warning => self.paint("REVIEW", |s| s.yellow().bold()),
            Severity::Info => self.paint("CLEAN", |s| s.green().bold()),
        };
        writeln!(out, "Verdict: {verdict}")?;
        writeln!(out, "{}", "═".repeat(RULE_WIDTH))?;
        writeln!(out)
    }

    fn render_finding<W: Write>(&self, finding: &Finding, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "\n{} {}",
            self.severity_tag(finding.severity),
            self.paint(finding.analyzer.label(), |s| s.bold())
        )?;

        match &finding.result {
            FindingResult::BinaryMarkers(m) => self.render_markers(m, out),
            FindingResult::Structural(s) => self.render_structural(s, out),
            FindingResult::Metadata(m) => self.render_metadata(m, out),
            FindingResult::ObjectInventory(inv) => self.render_inventory(inv, out),
            FindingResult::Script(v) => self.render_script(v, out),
            FindingResult::Signature(s) => self.render_signature(s, out),
            FindingResult::Error(e) => self.render_error(e, out),
        }
    }

    fn render_markers<W: Write>(&self, m: &BinaryMarkers, out: &mut W) -> io::Result<()> {
        writeln!(out, "   SHA-256: {}", m.sha256)?;
        writeln!(out, "   Size: {} bytes", m.size)?;
        match (m.header_present, m.header_offset, &m.version) {
            (true, _, Some(v)) => writeln!(out, "   Header: %PDF-{v}")?,
            (true, _, None) => writeln!(out, "   Header: present")?,
            (false, Some(at), _) => writeln!(out, "   Header: displaced to offset {at}")?,
            (false, None, _) => writeln!(out, "   Header: missing")?,
        }
        writeln!(out, "   Object streams: {}", yes_no(m.object_stream))?;
        writeln!(out, "   Encrypted: {}", yes_no(m.encrypted))?;
        writeln!(
            out,
            "   %%EOF: {} ({} marker(s))",
            if m.eof_present { "at end" } else { "not at end" },
            m.eof_count
        )?;
        if !m.keywords.is_empty() {
            let list: Vec<String> = m
                .keywords
                .iter()
                .map(|k| format!("{} x{}", k.keyword, k.count))
                .collect();
            writeln!(out, "   Keywords: {}", list.join(", "))?;
        }
        Ok(())
    }

    fn render_structural<W: Write>(&self, s: &StructuralResult, out: &mut W) -> io::Result<()> {
        if s.passed {
            writeln!(out, "   No structural issues found")?;
        } else {
            match s.exit_code {
                Some(code) => writeln!(out, "   Issues reported (exit code {code})")?,
                None => writeln!(out, "   Issues reported (terminated by signal)")?,
            }
        }
        self.render_block(&s.diagnostics, out)
    }

    fn render_metadata<W: Write>(&self, m: &MetadataResult, out: &mut W) -> io::Result<()> {
        if m.is_empty() {
            writeln!(out, "   No document information found")?;
        }
        for entry in &m.entries {
            writeln!(out, "   {}: {}", entry.key, self.brief(&entry.value))?;
        }
        if m.xmp_present {
            match &m.conformance {
                Some(level) => writeln!(out, "   XMP: present, declares {level}")?,
                None => writeln!(out, "   XMP: present")?,
            }
        }
        Ok(())
    }

    fn render_inventory<W: Write>(&self, inv: &ObjectInventory, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "   {} page(s), {} image(s), {} text span(s)",
            inv.page_count,
            inv.images.len(),
            inv.text_spans.len()
        )?;

        for img in &inv.images {
            let dims = match (img.width, img.height) {
                (Some(w), Some(h)) => format!("{w}x{h}"),
                _ => "?x?".to_string(),
            };
            writeln!(
                out,
                "   [page {}] image {} {} R /{} {} {} {} bytes md5={}",
                img.page,
                img.object_id.0,
                img.object_id.1,
                img.name,
                img.format,
                dims,
                img.byte_len,
                img.md5
            )?;
        }

        let shown = if self.config.verbose {
            inv.text_spans.len()
        } else {
            BRIEF_SPANS.min(inv.text_spans.len())
        };
        for span in &inv.text_spans[..shown] {
            writeln!(
                out,
                "   [page {} b{} l{} s{}] {} {:.1}pt: {}",
                span.page,
                span.block,
                span.line,
                span.span,
                span.font,
                span.size,
                self.brief(&span.text)
            )?;
        }
        if shown < inv.text_spans.len() {
            writeln!(
                out,
                "   ... {} more span(s), use --verbose to list all",
                inv.text_spans.len() - shown
            )?;
        }
        Ok(())
    }

    fn render_script<W: Write>(&self, v: &ScriptVerdict, out: &mut W) -> io::Result<()> {
        match v.parse_mode {
            ParseMode::Strict => writeln!(out, "   Parsed: strict")?,
            ParseMode::Tolerant => writeln!(
                out,
                "   Parsed: tolerant ({})",
                v.parse_error.as_deref().unwrap_or("document model unavailable")
            )?,
        }

        if v.is_empty() {
            return writeln!(out, "   No JavaScript found");
        }

        for script in &v.scripts {
            let origin = match script.object_id {
                Some((num, generation)) => format!("object {num} {generation} R"),
                None => "unknown object".to_string(),
            };
            writeln!(out, "   Script in {origin}, {} bytes", script.length)?;
            if !script.signals.is_empty() {
                let signals = script.signals.join(", ");
                writeln!(out, "     Signals: {}", self.paint(&signals, |s| s.red()))?;
            }
            writeln!(out, "     Preview: {}", script.preview)?;
        }
        Ok(())
    }

    fn render_signature<W: Write>(&self, s: &SignatureInfo, out: &mut W) -> io::Result<()> {
        if s.tool_succeeded {
            writeln!(out, "   {} signature(s) listed", s.signature_count)?;
        } else {
            writeln!(out, "   No signatures or tool failed")?;
        }
        self.render_block(&s.report, out)
    }

    fn render_error<W: Write>(&self, e: &AnalyzerError, out: &mut W) -> io::Result<()> {
        writeln!(out, "   {}", self.paint(&e.to_string(), |s| s.yellow()))
    }

    fn render_block<W: Write>(&self, text: &str, out: &mut W) -> io::Result<()> {
        let text = self.brief(text.trim_end());
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            writeln!(out, "   | {line}")?;
        }
        Ok(())
    }

    fn severity_tag(&self, severity: Severity) -> ColoredString {
        match severity {
            Severity::Info => self.paint("[INFO]", |s| s.green()),
            Severity::Warning => self.paint("[WARN]", |s| s.yellow()),
            Severity::Suspicious => self.paint("[SUSPICIOUS]", |s| s.red().bold()),
        }
    }

    fn paint(&self, text: &str, style: impl Fn(ColoredString) -> ColoredString) -> ColoredString {
        if self.config.color {
            style(text.normal())
        } else {
            text.normal().clear()
        }
    }

    fn brief(&self, text: &str) -> String {
        if self.config.verbose {
            return text.to_string();
        }
        match text.char_indices().nth(BRIEF_CHARS) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalyzerKind, KeywordCount};

    fn plain() -> Reporter {
        Reporter::new(ReporterConfig {
            color: false,
            ..Default::default()
        })
    }

    fn sample_set() -> FindingSet {
        let mut set = FindingSet::new("doc.pdf");
        set.push(Finding::new(
            AnalyzerKind::ByteStream,
            FindingResult::BinaryMarkers(BinaryMarkers {
                sha256: "ab".repeat(32),
                size: 10,
                header_present: true,
                header_offset: None,
                version: Some("1.7".into()),
                object_stream: false,
                encrypted: false,
                eof_present: true,
                eof_count: 1,
                keywords: vec![KeywordCount {
                    keyword: "/JS".into(),
                    count: 2,
                }],
            }),
            Severity::Warning,
        ));
        set.push(Finding::failure(
            AnalyzerKind::Structure,
            AnalyzerError::ToolUnavailable {
                tool: "qpdf".into(),
            },
        ));
        set
    }

    fn render(reporter: &Reporter, set: &FindingSet) -> String {
        let mut out = Vec::new();
        reporter.render(set, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_report_lists_every_finding() {
        let text = render(&plain(), &sample_set());
        assert!(text.contains("Scanning: doc.pdf"));
        assert!(text.contains("[WARN] Binary structure"));
        assert!(text.contains("Header: %PDF-1.7"));
        assert!(text.contains("/JS x2"));
        assert!(text.contains("qpdf is not installed or not found in PATH"));
        assert!(text.contains("Verdict: REVIEW"));
    }

    #[test]
    fn plain_text_has_no_escape_codes() {
        assert!(!render(&plain(), &sample_set()).contains('\x1b'));
    }

    #[test]
    fn json_is_one_line_per_file() {
        let reporter = Reporter::new(ReporterConfig {
            format: ReportFormat::Json,
            ..Default::default()
        });
        let text = render(&reporter, &sample_set());
        assert_eq!(text.lines().count(), 1);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["findings"].as_array().unwrap().len(), 2);
        assert_eq!(value["findings"][0]["result"]["kind"], "binary_markers");
        assert_eq!(value["findings"][1]["result"]["error"], "tool_unavailable");
        assert_eq!(value["findings"][1]["success"], false);
    }

    #[test]
    fn long_values_are_shortened_unless_verbose() {
        let long = "x".repeat(BRIEF_CHARS + 50);
        assert!(plain().brief(&long).ends_with("..."));

        let verbose = Reporter::new(ReporterConfig {
            verbose: true,
            ..Default::default()
        });
        assert_eq!(verbose.brief(&long), long);
    }
}

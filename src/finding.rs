use crate::AnalyzerError;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ── AnalyzerKind ─────────────────────────────────────────────────────────────

/// Identity of the analyzer that produced a [`Finding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    ByteStream,
    Structure,
    Metadata,
    Objects,
    Script,
    Signature,
}

impl AnalyzerKind {
    /// Every analyzer, in execution order.
    pub const ALL: [AnalyzerKind; 6] = [
        AnalyzerKind::ByteStream,
        AnalyzerKind::Structure,
        AnalyzerKind::Metadata,
        AnalyzerKind::Objects,
        AnalyzerKind::Script,
        AnalyzerKind::Signature,
    ];

    /// Human-readable section title used by the text reporter.
    pub fn label(self) -> &'static str {
        match self {
            AnalyzerKind::ByteStream => "Binary structure",
            AnalyzerKind::Structure => "Structural check (qpdf)",
            AnalyzerKind::Metadata => "Metadata",
            AnalyzerKind::Objects => "Object inventory",
            AnalyzerKind::Script => "JavaScript",
            AnalyzerKind::Signature => "Digital signatures (pdfsig)",
        }
    }
}

// ── Severity ─────────────────────────────────────────────────────────────────

/// How much attention a finding deserves. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Suspicious,
}

// ── Finding ──────────────────────────────────────────────────────────────────

/// The single result one analyzer produced for one file.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub analyzer: AnalyzerKind,
    /// `false` when the analyzer failed or its check did not pass.
    pub success: bool,
    pub severity: Severity,
    pub result: FindingResult,
}

impl Finding {
    /// Build a finding from an analyzer result. The success flag follows
    /// from the payload.
    pub fn new(analyzer: AnalyzerKind, result: FindingResult, severity: Severity) -> Self {
        debug_assert!(result.kind().map_or(true, |k| k == analyzer));
        let success = match &result {
            FindingResult::Structural(s) => s.passed,
            FindingResult::Signature(s) => s.tool_succeeded,
            FindingResult::Error(_) => false,
            _ => true,
        };
        Self {
            analyzer,
            success,
            severity,
            result,
        }
    }

    /// Build the failure finding recorded when `analyzer` returned an error.
    pub fn failure(analyzer: AnalyzerKind, error: AnalyzerError) -> Self {
        Self {
            analyzer,
            success: false,
            severity: Severity::Warning,
            result: FindingResult::Error(error),
        }
    }

    /// Returns the error when this finding records an analyzer failure.
    pub fn error(&self) -> Option<&AnalyzerError> {
        match &self.result {
            FindingResult::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Analyzer-specific payload of a [`Finding`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingResult {
    BinaryMarkers(BinaryMarkers),
    Structural(StructuralResult),
    Metadata(MetadataResult),
    ObjectInventory(ObjectInventory),
    Script(ScriptVerdict),
    Signature(SignatureInfo),
    Error(AnalyzerError),
}

impl FindingResult {
    /// The analyzer a payload belongs to; `None` for [`FindingResult::Error`],
    /// which any analyzer may produce.
    pub fn kind(&self) -> Option<AnalyzerKind> {
        match self {
            FindingResult::BinaryMarkers(_) => Some(AnalyzerKind::ByteStream),
            FindingResult::Structural(_) => Some(AnalyzerKind::Structure),
            FindingResult::Metadata(_) => Some(AnalyzerKind::Metadata),
            FindingResult::ObjectInventory(_) => Some(AnalyzerKind::Objects),
            FindingResult::Script(_) => Some(AnalyzerKind::Script),
            FindingResult::Signature(_) => Some(AnalyzerKind::Signature),
            FindingResult::Error(_) => None,
        }
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Raw marker checks over the file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryMarkers {
    /// Lowercase hex SHA-256 of the whole file.
    pub sha256: String,
    pub size: u64,
    /// The file starts with `%PDF-`.
    pub header_present: bool,
    /// Offset of the first `%PDF-` when it is not at the start of the file.
    pub header_offset: Option<usize>,
    /// Version declared after `%PDF-`, e.g. `"1.7"`.
    pub version: Option<String>,
    pub object_stream: bool,
    pub encrypted: bool,
    /// The file ends in `%%EOF`, ignoring trailing whitespace.
    pub eof_present: bool,
    /// How many `%%EOF` markers the file contains; more than one means the
    /// file was incrementally updated.
    pub eof_count: usize,
    /// Risky keywords found at least once.
    pub keywords: Vec<KeywordCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// Verdict of the external structural checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralResult {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub diagnostics: String,
}

/// Contents of the document-information dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataResult {
    /// `false` when `/Info` is missing or has no entries.
    pub metadata_present: bool,
    /// Entries in dictionary order. Empty when there is no `/Info`.
    pub entries: Vec<MetadataEntry>,
    /// The catalog references an XMP `/Metadata` stream.
    pub xmp_present: bool,
    /// PDF/A conformance level declared in XMP, e.g. `"PDF/A-3B"`.
    pub conformance: Option<String>,
}

impl MetadataResult {
    /// `true` when the document has no document-information entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by key, e.g. `"Author"`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// Images and text spans found while walking the pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectInventory {
    pub page_count: usize,
    pub images: Vec<ImageEntry>,
    pub text_spans: Vec<TextSpanEntry>,
}

/// An embedded raster image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// 1-based page number.
    pub page: u32,
    /// `(object number, generation)` of the image stream.
    pub object_id: (u32, u16),
    /// Resource name the page uses for the image, e.g. `"Im0"`.
    pub name: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub color_space: Option<String>,
    pub bits_per_component: Option<i64>,
    pub filters: Vec<String>,
    /// `jpeg`, `jpx`, `jbig2`, `ccitt`, or `raw`.
    pub format: String,
    pub byte_len: usize,
    /// Lowercase hex MD5 of the image bytes.
    pub md5: String,
}

/// A run of text shown with one font at one size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpanEntry {
    pub page: u32,
    /// Page object the span was found on.
    pub object_id: (u32, u16),
    pub block: usize,
    pub line: usize,
    pub span: usize,
    pub font: String,
    pub size: f32,
    pub text: String,
}

/// How the script analyzer managed to read the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// The document model loaded completely.
    Strict,
    /// The document model failed; scripts were recovered from raw bytes.
    Tolerant,
}

/// What the script engine reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptVerdict {
    pub parse_mode: ParseMode,
    /// Reason the strict parse failed, when `parse_mode` is `Tolerant`.
    pub parse_error: Option<String>,
    pub scripts: Vec<ScriptEntry>,
}

impl ScriptVerdict {
    /// `true` when no script was found.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    /// Object holding the `/JS` entry, when known.
    pub object_id: Option<(u32, u16)>,
    pub length: usize,
    pub preview: String,
    pub signals: Vec<String>,
}

/// What the signature tool reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    /// The tool exited with status 0.
    pub tool_succeeded: bool,
    pub signature_count: usize,
    /// Tool stdout on success, diagnostics otherwise.
    pub report: String,
}

// ── FindingSet ───────────────────────────────────────────────────────────────

/// All findings for one scanned file, in analyzer execution order.
#[derive(Debug, Clone, Serialize)]
pub struct FindingSet {
    pub target: PathBuf,
    pub findings: Vec<Finding>,
}

impl FindingSet {
    pub fn new<P: AsRef<Path>>(target: P) -> Self {
        Self {
            target: target.as_ref().to_path_buf(),
            findings: Vec::with_capacity(AnalyzerKind::ALL.len()),
        }
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// The finding produced by `kind`, if that analyzer ran.
    pub fn get(&self, kind: AnalyzerKind) -> Option<&Finding> {
        self.findings.iter().find(|f| f.analyzer == kind)
    }

    /// Highest severity across all findings.
    pub fn max_severity(&self) -> Severity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Info)
    }

    /// `true` when any finding is [`Severity::Suspicious`].
    pub fn has_concerns(&self) -> bool {
        self.max_severity() == Severity::Suspicious
    }
}

use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, BinaryMarkers, Finding, FindingResult, KeywordCount,
    ScanTarget, Severity,
};
use sha2::{Digest, Sha256};

const HEADER: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";
const OBJECT_STREAM: &[u8] = b"ObjStm";
const ENCRYPT: &[u8] = b"/Encrypt";

/// Name keywords that commonly show up in weaponised documents. A hit is a
/// reason to look closer, not a verdict.
const RISKY_KEYWORDS: &[&str] = &[
    "/JS",
    "/JavaScript",
    "/OpenAction",
    "/AA",
    "/Launch",
    "/EmbeddedFile",
    "/RichMedia",
    "/XFA",
    "/AcroForm",
];

// ── ByteStreamProbe ───────────────────────────────────────────────────────────

/// Low-level inspection of the raw file bytes: content digest and marker
/// presence, without parsing anything.
#[derive(Debug, Clone, Default)]
pub struct ByteStreamProbe;

impl ByteStreamProbe {
    pub fn new() -> Self {
        Self
    }

    /// Compute markers for an in-memory buffer.
    ///
    /// ```
    /// let markers = pdfprobe::ByteStreamProbe::inspect(b"%PDF-1.4\n...\n%%EOF\n");
    /// assert!(markers.header_present);
    /// assert!(markers.eof_present);
    /// assert_eq!(markers.version.as_deref(), Some("1.4"));
    /// ```
    pub fn inspect(data: &[u8]) -> BinaryMarkers {
        let header_at = find(data, HEADER);

        BinaryMarkers {
            sha256: sha256_hex(data),
            size: data.len() as u64,
            header_present: header_at == Some(0),
            header_offset: header_at.filter(|&at| at > 0),
            version: header_at.and_then(|at| read_version(&data[at + HEADER.len()..])),
            object_stream: find(data, OBJECT_STREAM).is_some(),
            encrypted: find(data, ENCRYPT).is_some(),
            eof_present: trim_trailing_whitespace(data).ends_with(EOF_MARKER),
            eof_count: count_occurrences(data, EOF_MARKER),
            keywords: RISKY_KEYWORDS
                .iter()
                .map(|kw| KeywordCount {
                    keyword: (*kw).to_string(),
                    count: count_name(data, kw.as_bytes()),
                })
                .filter(|k| k.count > 0)
                .collect(),
        }
    }

    /// Severity for a set of markers. Object streams, encryption and risky
    /// keywords are common in legitimate files, so on their own they never
    /// go beyond a warning.
    pub fn severity(markers: &BinaryMarkers) -> Severity {
        if !markers.header_present {
            Severity::Suspicious
        } else if markers.object_stream
            || markers.encrypted
            || !markers.eof_present
            || !markers.keywords.is_empty()
        {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

impl Analyzer for ByteStreamProbe {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::ByteStream
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let data = std::fs::read(target.path())?;
        let markers = Self::inspect(&data);
        let severity = Self::severity(&markers);
        Ok(Finding::new(
            self.kind(),
            FindingResult::BinaryMarkers(markers),
            severity,
        ))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Count `name` occurrences that are whole PDF names, so `/JS` does not also
/// count every `/JavaScript`.
fn count_name(haystack: &[u8], name: &[u8]) -> usize {
    haystack
        .windows(name.len())
        .enumerate()
        .filter(|(at, w)| {
            *w == name
                && haystack
                    .get(at + name.len())
                    .map_or(true, |&next| !next.is_ascii_alphanumeric())
        })
        .count()
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace() && *b != 0)
        .map_or(0, |i| i + 1);
    &data[..end]
}

fn read_version(after_header: &[u8]) -> Option<String> {
    let len = after_header
        .iter()
        .take(8)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .count();
    (len > 0).then(|| String::from_utf8_lossy(&after_header[..len]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_count_ignores_longer_names() {
        let data = b"/JS (x) /JavaScript /JS\n";
        assert_eq!(count_name(data, b"/JS"), 2);
        assert_eq!(count_name(data, b"/JavaScript"), 1);
    }

    #[test]
    fn trailing_nul_and_whitespace_are_trimmed() {
        assert_eq!(trim_trailing_whitespace(b"%%EOF\r\n\0 "), b"%%EOF");
        assert_eq!(trim_trailing_whitespace(b"  \n"), b"");
    }
}

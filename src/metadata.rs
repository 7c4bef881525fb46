use crate::pdf_utils::{self, resolve_dict};
use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, Finding, FindingResult, MetadataEntry, MetadataResult,
    ScanTarget, Severity,
};
use lopdf::Document;

// ── MetadataExtractor ─────────────────────────────────────────────────────────

/// Reads the document-information dictionary (`/Info` in the trailer) and
/// the PDF/A identification from the XMP metadata stream, if any.
///
/// The `/Info` schema is open-ended: every key present is reported, in the
/// order the dictionary stores them.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Collect metadata from an already loaded document.
    pub fn extract(document: &Document) -> MetadataResult {
        let entries = Self::info_entries(document);
        let xmp = Self::read_xmp_metadata(document);

        MetadataResult {
            metadata_present: !entries.is_empty(),
            entries,
            xmp_present: xmp.is_some(),
            conformance: xmp.as_deref().and_then(Self::extract_conformance_level),
        }
    }

    fn info_entries(document: &Document) -> Vec<MetadataEntry> {
        let info = match document
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|v| resolve_dict(document, v))
        {
            Some(dict) => dict,
            None => return Vec::new(),
        };

        info.iter()
            .map(|(key, value)| {
                let value = pdf_utils::resolve(document, value).unwrap_or(value);
                MetadataEntry {
                    key: String::from_utf8_lossy(key).into_owned(),
                    value: pdf_utils::render_object(value),
                }
            })
            .collect()
    }

    /// Walk catalog → /Metadata → stream → decompressed bytes → UTF-8 string.
    fn read_xmp_metadata(document: &Document) -> Option<String> {
        let catalog = document.catalog().ok()?;
        let meta_id = catalog.get(b"Metadata").ok()?.as_reference().ok()?;
        let stream = document.get_object(meta_id).ok()?.as_stream().ok()?;
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Extract a human-readable conformance level string such as `"PDF/A-3B"`.
    ///
    /// XMP allows two serialisation forms:
    /// - attribute syntax  : `pdfaid:part="3"`
    /// - element syntax    : `<pdfaid:part>3</pdfaid:part>`
    fn extract_conformance_level(xmp: &str) -> Option<String> {
        let declares = |field: &str, value: &str| {
            xmp.contains(&format!(r#"pdfaid:{field}="{value}""#))
                || xmp.contains(&format!("<pdfaid:{field}>{value}</pdfaid:{field}>"))
        };

        let part = ["1", "2", "3", "4"].into_iter().find(|p| declares("part", p))?;
        match ["A", "B", "U", "E", "F"]
            .into_iter()
            .find(|l| declares("conformance", l))
        {
            Some(level) => Some(format!("PDF/A-{part}{level}")),
            None => Some(format!("PDF/A-{part}")),
        }
    }
}

impl Analyzer for MetadataExtractor {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Metadata
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let document = Document::load(target.path())?;
        let result = Self::extract(&document);
        Ok(Finding::new(
            self.kind(),
            FindingResult::Metadata(result),
            Severity::Info,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conformance_from_attribute_syntax() {
        let xmp = r#"<rdf:Description pdfaid:part="3" pdfaid:conformance="B"/>"#;
        assert_eq!(
            MetadataExtractor::extract_conformance_level(xmp).as_deref(),
            Some("PDF/A-3B")
        );
    }

    #[test]
    fn conformance_from_element_syntax_without_level() {
        let xmp = "<pdfaid:part>2</pdfaid:part>";
        assert_eq!(
            MetadataExtractor::extract_conformance_level(xmp).as_deref(),
            Some("PDF/A-2")
        );
    }

    #[test]
    fn no_pdfaid_means_no_conformance() {
        assert_eq!(MetadataExtractor::extract_conformance_level("<x:xmpmeta/>"), None);
    }
}

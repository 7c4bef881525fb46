use crate::pdf_utils::resolve;
use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, Finding, FindingResult, ParseMode, ScanTarget,
    ScriptEntry, ScriptVerdict, Severity,
};
use flate2::read::ZlibDecoder;
use lopdf::{Document, Object, ObjectId};
use std::io::Read;
use tracing::debug;

const PREVIEW_CHARS: usize = 120;

/// Decompressed scripts larger than this are truncated before analysis.
const MAX_SCRIPT_BYTES: usize = 4 * 1024 * 1024;

/// A single unbroken run of this many non-whitespace bytes is typical of
/// packed or encoded payloads and rare in hand-written code.
const LONG_RUN_THRESHOLD: usize = 1000;

/// Shannon entropy (bits per byte) above which a sizeable script is
/// considered encoded.
const HIGH_ENTROPY_THRESHOLD: f64 = 5.5;
const ENTROPY_MIN_LEN: usize = 256;

const SUSPICIOUS_APIS: &[&str] = &[
    "app.launchURL",
    "app.mailMsg",
    "app.setTimeOut",
    "util.printf",
    "util.printd",
    "this.getURL",
    "this.submitForm",
    "submitForm",
    "importDataObject",
    "exportDataObject",
    "this.exportDataObject",
    "media.newPlayer",
    "getAnnots",
    "syncAnnotScan",
    "Collab.collectEmailInfo",
    "Collab.getIcon",
    "spell.customDictionaryOpen",
    "app.plugIns",
    "app.viewerVersion",
];

// ── ScriptEngine ──────────────────────────────────────────────────────────────

/// Something that looks at one script and reports what it finds notable.
///
/// An empty result means "nothing suspicious". The analyzer treats the
/// engine as a black box and records its signals verbatim.
pub trait ScriptEngine: Send + Sync {
    fn analyze(&self, source: &[u8]) -> Vec<String>;
}

/// Static, token-based detection of obfuscation and risky Acrobat APIs. It
/// never executes the script.
///
/// ```
/// use pdfprobe::{HeuristicScriptEngine, ScriptEngine};
///
/// let signals = HeuristicScriptEngine.analyze(b"eval(unescape('%u9090%u9090'))");
/// assert!(signals.contains(&"eval".to_string()));
/// assert!(signals.contains(&"unescape".to_string()));
/// assert!(signals.contains(&"unicode_escapes".to_string()));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScriptEngine;

impl ScriptEngine for HeuristicScriptEngine {
    fn analyze(&self, source: &[u8]) -> Vec<String> {
        let mut signals = Vec::new();

        for word in ["eval", "unescape", "fromCharCode"] {
            if find_word(source, word.as_bytes()) {
                signals.push(word.to_string());
            }
        }
        if find_token(source, b"\\x") {
            signals.push("hex_escapes".to_string());
        }
        if find_token(source, b"\\u") || find_token(source, b"%u") {
            signals.push("unicode_escapes".to_string());
        }
        for api in SUSPICIOUS_APIS {
            if find_token(source, api.as_bytes()) {
                signals.push(format!("api:{api}"));
            }
        }
        if longest_token_run(source) >= LONG_RUN_THRESHOLD {
            signals.push("long_token_run".to_string());
        }
        if source.len() >= ENTROPY_MIN_LEN && shannon_entropy(source) > HIGH_ENTROPY_THRESHOLD {
            signals.push("high_entropy".to_string());
        }

        signals
    }
}

// ── ScriptAnalyzer ────────────────────────────────────────────────────────────

/// Finds embedded JavaScript and hands each script to a [`ScriptEngine`].
///
/// The document is first loaded with lopdf. The raw bytes are always scanned
/// for `/JS` entries as well: objects the cross-reference table does not list
/// are invisible to lopdf, and when loading fails the raw scan is all there is.
pub struct ScriptAnalyzer {
    engine: Box<dyn ScriptEngine>,
}

impl Default for ScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptAnalyzer {
    /// Analyzer backed by [`HeuristicScriptEngine`].
    pub fn new() -> Self {
        Self::with_engine(Box::new(HeuristicScriptEngine))
    }

    pub fn with_engine(engine: Box<dyn ScriptEngine>) -> Self {
        Self { engine }
    }

    /// Analyze an in-memory file.
    pub fn analyze_bytes(&self, data: &[u8]) -> ScriptVerdict {
        let (parse_mode, parse_error, raw) = match Document::load_mem(data) {
            Ok(document) => {
                let mut found = scripts_in_document(&document);
                merge_raw_scripts(&mut found, scripts_in_raw_bytes(data));
                (ParseMode::Strict, None, found)
            }
            Err(e) => {
                debug!(error = %e, "strict parse failed, scanning raw bytes for scripts");
                (ParseMode::Tolerant, Some(e.to_string()), scripts_in_raw_bytes(data))
            }
        };

        let scripts = raw
            .into_iter()
            .map(|(object_id, source)| ScriptEntry {
                object_id,
                length: source.len(),
                preview: preview(&source),
                signals: self.engine.analyze(&source),
            })
            .collect();

        ScriptVerdict {
            parse_mode,
            parse_error,
            scripts,
        }
    }

    /// Info when nothing was found, Suspicious when the engine flagged
    /// anything, Warning for scripts it found unremarkable.
    pub fn severity(verdict: &ScriptVerdict) -> Severity {
        if verdict.scripts.is_empty() {
            Severity::Info
        } else if verdict.scripts.iter().any(|s| !s.signals.is_empty()) {
            Severity::Suspicious
        } else {
            Severity::Warning
        }
    }
}

impl Analyzer for ScriptAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Script
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let data = std::fs::read(target.path())?;
        let verdict = self.analyze_bytes(&data);
        let severity = Self::severity(&verdict);
        Ok(Finding::new(self.kind(), FindingResult::Script(verdict), severity))
    }
}

// ── Strict extraction ─────────────────────────────────────────────────────────

/// Every object with a `/JS` entry: actions, name-tree leaves, annotations.
fn scripts_in_document(document: &Document) -> Vec<(Option<ObjectId>, Vec<u8>)> {
    let mut out = Vec::new();

    for (id, object) in &document.objects {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            Object::Stream(stream) => &stream.dict,
            _ => continue,
        };
        let value = match dict.get(b"JS").ok().and_then(|v| resolve(document, v)) {
            Some(value) => value,
            None => continue,
        };
        let source = match value {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
            _ => continue,
        };
        out.push((Some(*id), cap(source)));
    }

    out
}

/// Add raw-scan scripts the document model did not already yield. Entries
/// are matched by object id, or by source when the raw scan found no id.
fn merge_raw_scripts(
    found: &mut Vec<(Option<ObjectId>, Vec<u8>)>,
    raw: Vec<(Option<ObjectId>, Vec<u8>)>,
) {
    for (id, source) in raw {
        let known = match id {
            Some(_) => found.iter().any(|(known, _)| *known == id),
            None => found.iter().any(|(_, known)| *known == source),
        };
        if !known {
            debug!(object = ?id, "script found outside the document model");
            found.push((id, source));
        }
    }
}

// ── Tolerant extraction ───────────────────────────────────────────────────────

fn scripts_in_raw_bytes(data: &[u8]) -> Vec<(Option<ObjectId>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut from = 0;

    while let Some(rel) = find(&data[from..], b"/JS") {
        let at = from + rel;
        from = at + 3;
        // `/JSFoo` is a different name.
        if data.get(from).map_or(false, |b| b.is_ascii_alphanumeric()) {
            continue;
        }
        let value_at = skip_whitespace(data, from);
        let source = match data.get(value_at) {
            Some(b'(') => parse_literal_string(data, value_at),
            Some(b'<') if data.get(value_at + 1) != Some(&b'<') => parse_hex_string(data, value_at),
            Some(b) if b.is_ascii_digit() => parse_reference(data, value_at)
                .and_then(|(num, gen)| raw_stream_content(data, num, gen)),
            _ => None,
        };
        if let Some(source) = source {
            out.push((enclosing_object(data, at), cap(source)));
        }
    }

    out
}

fn skip_whitespace(data: &[u8], mut at: usize) -> usize {
    while data.get(at).map_or(false, |b| b.is_ascii_whitespace()) {
        at += 1;
    }
    at
}

/// Parse a `( ... )` literal string starting at `start`, honouring nested
/// parentheses and backslash escapes.
fn parse_literal_string(data: &[u8], start: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = start;

    while i < data.len() {
        let b = data[i];
        match b {
            b'(' => {
                if depth > 0 {
                    out.push(b);
                }
                depth += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
                out.push(b);
            }
            b'\\' => {
                i += 1;
                let next = *data.get(i)?;
                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'\r' => {
                        if data.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = 0u32;
                        let mut len = 0;
                        while len < 3 {
                            match data.get(i) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                    len += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                        continue;
                    }
                    other => out.push(other),
                }
            }
            _ => out.push(b),
        }
        i += 1;
    }

    // Unterminated: keep what we have, it is still evidence.
    (!out.is_empty()).then_some(out)
}

fn parse_hex_string(data: &[u8], start: usize) -> Option<Vec<u8>> {
    let end = start + find(&data[start..], b">")?;
    let digits: Vec<u8> = data[start + 1..end]
        .iter()
        .filter(|b| b.is_ascii_hexdigit())
        .copied()
        .collect();
    let nibble = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    Some(
        digits
            .chunks(2)
            .map(|pair| nibble(pair[0]) << 4 | pair.get(1).map_or(0, |&c| nibble(c)))
            .collect(),
    )
}

/// Parse `N G R` at `start`.
fn parse_reference(data: &[u8], start: usize) -> Option<(u32, u16)> {
    let (num, after_num) = parse_uint(data, start)?;
    let (gen, after_gen) = parse_uint(data, skip_whitespace(data, after_num))?;
    let r_at = skip_whitespace(data, after_gen);
    (data.get(r_at) == Some(&b'R')).then_some((num as u32, gen as u16))
}

fn parse_uint(data: &[u8], start: usize) -> Option<(u64, usize)> {
    let len = data[start.min(data.len())..]
        .iter()
        .take(10)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if len == 0 {
        return None;
    }
    let text = std::str::from_utf8(&data[start..start + len]).ok()?;
    Some((text.parse().ok()?, start + len))
}

/// Locate `num gen obj ... stream ... endstream` and return its content,
/// inflated when the dictionary names `/FlateDecode`.
fn raw_stream_content(data: &[u8], num: u32, gen: u16) -> Option<Vec<u8>> {
    let header = format!("{num} {gen} obj");
    let mut search = 0;
    let obj_at = loop {
        let at = search + find(&data[search..], header.as_bytes())?;
        // Reject `12 0 obj` matching inside `112 0 obj`.
        if at == 0 || !data[at - 1].is_ascii_digit() {
            break at;
        }
        search = at + header.len();
    };

    let body = &data[obj_at + header.len()..];
    let endobj = find(body, b"endobj").unwrap_or(body.len());
    let stream_kw = find(&body[..endobj], b"stream")?;
    let dict_part = &body[..stream_kw];

    let mut content_at = stream_kw + b"stream".len();
    if body.get(content_at) == Some(&b'\r') {
        content_at += 1;
    }
    if body.get(content_at) == Some(&b'\n') {
        content_at += 1;
    }
    let content_end = content_at + find(&body[content_at..], b"endstream")?;
    let content = &body[content_at..content_end];

    if find(dict_part, b"/FlateDecode").is_some() || find(dict_part, b"/Fl").is_some() {
        let mut inflated = Vec::new();
        let mut decoder = ZlibDecoder::new(content).take(MAX_SCRIPT_BYTES as u64);
        if decoder.read_to_end(&mut inflated).is_ok() || !inflated.is_empty() {
            return Some(inflated);
        }
    }
    Some(content.to_vec())
}

/// The `N G obj` header closest before `at`, if any.
fn enclosing_object(data: &[u8], at: usize) -> Option<ObjectId> {
    let obj_kw = rfind(&data[..at], b" obj")?;
    let before = &data[..obj_kw];
    let gen_start = before
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let gen: u16 = std::str::from_utf8(&before[gen_start..]).ok()?.parse().ok()?;
    let num_end = before[..gen_start]
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())?
        + 1;
    let num_start = before[..num_end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let num: u32 = std::str::from_utf8(&before[num_start..num_end])
        .ok()?
        .parse()
        .ok()?;
    Some((num, gen))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn find_token(data: &[u8], token: &[u8]) -> bool {
    data.windows(token.len()).any(|w| w.eq_ignore_ascii_case(token))
}

/// Like [`find_token`], but `token` must not be part of a longer identifier.
fn find_word(data: &[u8], token: &[u8]) -> bool {
    let is_ident = |b: &u8| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$';
    data.windows(token.len()).enumerate().any(|(at, w)| {
        w.eq_ignore_ascii_case(token)
            && !(at > 0 && is_ident(&data[at - 1]))
            && !data.get(at + token.len()).map_or(false, is_ident)
    })
}

fn cap(mut source: Vec<u8>) -> Vec<u8> {
    source.truncate(MAX_SCRIPT_BYTES);
    source
}

fn longest_token_run(data: &[u8]) -> usize {
    data.split(|b| b.is_ascii_whitespace())
        .map(<[u8]>::len)
        .max()
        .unwrap_or(0)
}

fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0usize; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    let len = data.len() as f64;
    freq.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn preview(source: &[u8]) -> String {
    String::from_utf8_lossy(source)
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn literal_string_with_nesting_and_escapes() {
        let data = br"/JS (app.alert\(1\); (x) \101\n)";
        let start = find(data, b"(").unwrap();
        let parsed = parse_literal_string(data, start).unwrap();
        assert_eq!(parsed, b"app.alert(1); (x) A\n");
    }

    #[test]
    fn hex_string_with_odd_digit_count() {
        assert_eq!(parse_hex_string(b"<6162 7>", 0).unwrap(), b"abp");
    }

    #[test]
    fn raw_scan_finds_literal_script_and_its_object() {
        let data = b"%PDF-1.4\n7 0 obj\n<< /S /JavaScript /JS (eval\\(x\\)) >>\nendobj\n";
        let scripts = scripts_in_raw_bytes(data);
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].0, Some((7, 0)));
        assert_eq!(scripts[0].1, b"eval(x)");
    }

    #[test]
    fn raw_scan_follows_reference_to_stream() {
        let data = b"1 0 obj << /JS 12 0 R >> endobj\n\
                     112 0 obj << /Length 3 >> stream\nbad\nendstream endobj\n\
                     12 0 obj << /Length 9 >> stream\nthis.go()\nendstream endobj\n";
        let scripts = scripts_in_raw_bytes(data);
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].1, b"this.go()\n".to_vec());
    }

    #[test]
    fn raw_scan_skips_javascript_name() {
        let data = b"<< /S /JavaScript >>";
        assert!(scripts_in_raw_bytes(data).is_empty());
    }

    #[test]
    fn plain_script_has_no_signals() {
        assert!(HeuristicScriptEngine
            .analyze(b"var total = 1 + 2; app.alert(total);")
            .is_empty());
    }

    #[test]
    fn packed_payload_is_flagged() {
        let payload = vec![b'A'; LONG_RUN_THRESHOLD + 10];
        let signals = HeuristicScriptEngine.analyze(&payload);
        assert!(signals.contains(&"long_token_run".to_string()));
    }

    #[test]
    fn raw_scan_inflates_flate_stream() {
        let source = b"app.launchURL('http://example.invalid/', true);";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(source).unwrap();
        let compressed = encoder.finish().unwrap();

        // No xref and no trailer: only the raw scan can read this.
        let mut data = b"%PDF-1.4\n1 0 obj << /S /JavaScript /JS 12 0 R >> endobj\n".to_vec();
        data.extend_from_slice(
            format!("12 0 obj << /Filter /FlateDecode /Length {} >> stream\n", compressed.len())
                .as_bytes(),
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream endobj\n");

        let verdict = ScriptAnalyzer::new().analyze_bytes(&data);
        assert_eq!(verdict.parse_mode, ParseMode::Tolerant);
        assert_eq!(verdict.scripts.len(), 1);
        assert_eq!(verdict.scripts[0].object_id, Some((1, 0)));
        assert_eq!(verdict.scripts[0].length, source.len());
        assert!(verdict.scripts[0].preview.starts_with("app.launchURL("));
        assert!(verdict.scripts[0]
            .signals
            .contains(&"api:app.launchURL".to_string()));
    }

    #[test]
    fn merge_keeps_scripts_the_document_model_missed() {
        let mut found = vec![(Some((8, 0)), b"app.alert(1)".to_vec())];
        merge_raw_scripts(
            &mut found,
            vec![
                (Some((8, 0)), b"app.alert(1)".to_vec()),
                (Some((99, 0)), b"eval(x)".to_vec()),
                (None, b"app.alert(1)".to_vec()),
                (None, b"this.go()".to_vec()),
            ],
        );
        let ids: Vec<_> = found.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![Some((8, 0)), Some((99, 0)), None]);
        assert_eq!(found[2].1, b"this.go()");
    }

    #[test]
    fn word_signals_ignore_longer_identifiers() {
        let signals =
            HeuristicScriptEngine.analyze(b"app.alert('Please evaluate the retrieval form');");
        assert!(signals.is_empty(), "unexpected signals {signals:?}");

        let signals = HeuristicScriptEngine.analyze(b"var evaluated = unescaped_text; myfromCharCode(1);");
        assert!(signals.is_empty(), "unexpected signals {signals:?}");

        let signals = HeuristicScriptEngine.analyze(b"x=eval(y);String.fromCharCode(65)");
        assert!(signals.contains(&"eval".to_string()));
        assert!(signals.contains(&"fromCharCode".to_string()));
    }
}

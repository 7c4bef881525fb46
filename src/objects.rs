use crate::pdf_utils::{decode_text_string, dict_entry, name_of, resolve, resolve_dict};
use crate::{
    Analyzer, AnalyzerError, AnalyzerKind, Finding, FindingResult, ImageEntry, ObjectInventory,
    ScanTarget, Severity, TextSpanEntry,
};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId, Stream};
use md5::{Digest, Md5};
use std::collections::{HashMap, HashSet};

/// How deep form XObjects may nest before we stop following them. Real
/// documents rarely go past two or three levels; cyclic ones never end.
const MAX_FORM_DEPTH: usize = 8;

/// `/Resources` and friends may be inherited through at most this many
/// `/Parent` links.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// `TJ` adjustments below this (in thousandths of text space) are treated as
/// a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

// ── ObjectWalker ──────────────────────────────────────────────────────────────

/// Walks every page and inventories its images and text spans.
#[derive(Debug, Clone, Default)]
pub struct ObjectWalker;

impl ObjectWalker {
    pub fn new() -> Self {
        Self
    }

    /// Inventory an already loaded document.
    ///
    /// Pages are visited in page order; within a page images come in
    /// resource order and text spans in content-stream order.
    pub fn walk(document: &Document) -> Result<ObjectInventory, AnalyzerError> {
        let pages = document.get_pages();
        let mut inventory = ObjectInventory {
            page_count: pages.len(),
            ..Default::default()
        };

        for (&page_no, &page_id) in &pages {
            let resources = page_resources(document, page_id);

            if let Some(resources) = resources {
                let mut seen = HashSet::new();
                collect_images(
                    document,
                    resources,
                    page_no,
                    &mut seen,
                    &mut inventory.images,
                    0,
                );
            }

            let content = document.get_page_content(page_id)?;
            let operations = Content::decode(&content)?.operations;
            let mut collector = TextCollector::new(document, page_no, page_id);
            collector.process(&operations, resources, 0);
            inventory.text_spans.extend(collector.finish());
        }

        Ok(inventory)
    }
}

impl Analyzer for ObjectWalker {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Objects
    }

    fn run(&self, target: &ScanTarget) -> Result<Finding, AnalyzerError> {
        let document = Document::load(target.path())?;
        let inventory = Self::walk(&document)?;
        Ok(Finding::new(
            self.kind(),
            FindingResult::ObjectInventory(inventory),
            Severity::Info,
        ))
    }
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// Find `key` on the page or the nearest ancestor in the page tree.
fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = document.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve_dict(document, parent)?;
    }
    None
}

fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    resolve_dict(document, inherited(document, page_id, b"Resources")?)
}

// ── Images ────────────────────────────────────────────────────────────────────

fn collect_images(
    document: &Document,
    resources: &Dictionary,
    page: u32,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<ImageEntry>,
    depth: usize,
) {
    let xobjects = match dict_entry(document, resources, b"XObject") {
        Some(dict) => dict,
        None => return,
    };

    for (name, value) in xobjects.iter() {
        let id = match value.as_reference() {
            Ok(id) => id,
            Err(_) => continue,
        };
        if !seen.insert(id) {
            continue;
        }
        let stream = match document.get_object(id).and_then(|o| o.as_stream()) {
            Ok(stream) => stream,
            Err(_) => continue,
        };

        match name_of(&stream.dict, b"Subtype").as_deref() {
            Some("Image") => out.push(image_entry(
                document,
                page,
                id,
                &String::from_utf8_lossy(name),
                stream,
            )),
            Some("Form") if depth < MAX_FORM_DEPTH => {
                if let Some(form_resources) = dict_entry(document, &stream.dict, b"Resources") {
                    collect_images(document, form_resources, page, seen, out, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn image_entry(
    document: &Document,
    page: u32,
    id: ObjectId,
    name: &str,
    stream: &Stream,
) -> ImageEntry {
    let dict = &stream.dict;
    let filters = filter_names(dict);
    let format = image_format(&filters);

    // Codec-encoded images are identified by the codec's own bytes (a DCT
    // image's payload *is* the JPEG file), so only the filters in front of
    // the codec are undone. Everything else is hashed fully decoded.
    let bytes = if format == "raw" {
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    } else {
        codec_payload(stream, filters.len())
    };

    ImageEntry {
        page,
        object_id: id,
        name: name.to_string(),
        width: integer(document, dict, b"Width"),
        height: integer(document, dict, b"Height"),
        color_space: dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|cs| color_space_name(document, cs)),
        bits_per_component: integer(document, dict, b"BitsPerComponent"),
        filters,
        format: format.to_string(),
        byte_len: bytes.len(),
        md5: format!("{:x}", Md5::digest(&bytes)),
    }
}

/// Undo every filter except the last one in the chain. Falls back to the
/// stored bytes when a leading filter cannot be decoded.
fn codec_payload(stream: &Stream, filter_count: usize) -> Vec<u8> {
    if filter_count < 2 {
        return stream.content.clone();
    }
    let leading: Vec<Object> = match stream.dict.get(b"Filter").and_then(Object::as_array) {
        Ok(items) => items[..filter_count - 1].to_vec(),
        Err(_) => return stream.content.clone(),
    };

    let mut dict = stream.dict.clone();
    dict.set("Filter", Object::Array(leading));
    if matches!(dict.get(b"DecodeParms"), Ok(Object::Array(_))) {
        dict.remove(b"DecodeParms");
    }
    Stream::new(dict, stream.content.clone())
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

fn integer(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    resolve(document, dict.get(key).ok()?)?.as_i64().ok()
}

fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// The codec is whatever the last filter in the chain decodes to.
fn image_format(filters: &[String]) -> &'static str {
    match filters.last().map(String::as_str) {
        Some("DCTDecode") | Some("DCT") => "jpeg",
        Some("JPXDecode") => "jpx",
        Some("JBIG2Decode") => "jbig2",
        Some("CCITTFaxDecode") | Some("CCF") => "ccitt",
        _ => "raw",
    }
}

/// `/DeviceRGB` → `DeviceRGB`; `[/ICCBased 5 0 R]` → `ICCBased`.
fn color_space_name(document: &Document, value: &Object) -> Option<String> {
    match resolve(document, value)? {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Array(items) => items
            .first()
            .and_then(|first| first.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

struct FontInfo<'a> {
    base_font: String,
    /// `None` when lopdf cannot tell how the font maps codes to text.
    encoding: Option<Encoding<'a>>,
}

/// Font resource names mapped to the font's `/BaseFont` and encoding.
fn font_names<'a>(
    document: &'a Document,
    resources: Option<&'a Dictionary>,
) -> HashMap<Vec<u8>, FontInfo<'a>> {
    let fonts = match resources.and_then(|r| dict_entry(document, r, b"Font")) {
        Some(dict) => dict,
        None => return HashMap::new(),
    };

    fonts
        .iter()
        .map(|(key, value)| {
            let font = resolve_dict(document, value);
            let info = FontInfo {
                base_font: font
                    .and_then(|font| name_of(font, b"BaseFont"))
                    .unwrap_or_else(|| String::from_utf8_lossy(key).into_owned()),
                encoding: font.and_then(|font| font.get_font_encoding(document).ok()),
            };
            (key.clone(), info)
        })
        .collect()
}

struct PendingSpan {
    font: String,
    size: f32,
    text: String,
}

/// Groups text-showing operators into blocks (`BT`..`ET`), lines (split at
/// text positioning) and spans (runs sharing font and size).
struct TextCollector<'a> {
    document: &'a Document,
    page: u32,
    page_id: ObjectId,

    fonts: HashMap<Vec<u8>, FontInfo<'a>>,
    /// Resource name selected by the last `Tf`.
    font_key: Vec<u8>,
    font: String,
    font_size: f32,
    /// Vertical scale of the text matrix.
    scale: f32,
    last_tm_y: Option<f32>,

    next_block: usize,
    block: Option<usize>,
    next_line: usize,
    line: Option<usize>,
    next_span: usize,
    pending: Option<PendingSpan>,

    spans: Vec<TextSpanEntry>,
}

impl<'a> TextCollector<'a> {
    fn new(document: &'a Document, page: u32, page_id: ObjectId) -> Self {
        Self {
            document,
            page,
            page_id,
            fonts: HashMap::new(),
            font_key: Vec::new(),
            font: String::new(),
            font_size: 0.0,
            scale: 1.0,
            last_tm_y: None,
            next_block: 0,
            block: None,
            next_line: 0,
            line: None,
            next_span: 0,
            pending: None,
            spans: Vec::new(),
        }
    }

    fn process(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) {
        let saved_fonts = std::mem::replace(&mut self.fonts, font_names(self.document, resources));

        for op in operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "BT" => self.begin_block(),
                "ET" => self.end_block(),
                "Tf" => {
                    self.flush_span();
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.font_key = name.to_vec();
                        self.font = self
                            .fonts
                            .get(name)
                            .map(|info| info.base_font.clone())
                            .unwrap_or_else(|| String::from_utf8_lossy(name).into_owned());
                    }
                    if let Some(size) = operands.get(1).and_then(|o| o.as_float().ok()) {
                        self.font_size = size;
                    }
                }
                "Td" | "TD" => {
                    let dy = operands.get(1).and_then(|o| o.as_float().ok()).unwrap_or(0.0);
                    if dy != 0.0 {
                        self.break_line();
                    }
                }
                "T*" => self.break_line(),
                "Tm" => {
                    let m: Vec<f32> = operands.iter().filter_map(|o| o.as_float().ok()).collect();
                    if m.len() == 6 {
                        self.flush_span();
                        self.scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
                        if self.last_tm_y.map_or(false, |y| y != m[5]) {
                            self.break_line();
                        }
                        self.last_tm_y = Some(m[5]);
                    }
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "'" => {
                    self.break_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "\"" => {
                    self.break_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let mut text = String::new();
                        for item in items {
                            match item {
                                Object::String(bytes, _) => text.push_str(&self.decode(bytes)),
                                other => {
                                    let gap = other.as_float().unwrap_or(0.0);
                                    if gap < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                                        text.push(' ');
                                    }
                                }
                            }
                        }
                        self.show(&text);
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.run_form(name, resources, depth);
                    }
                }
                _ => {}
            }
        }

        self.fonts = saved_fonts;
    }

    /// Text inside a form XObject belongs to the page that paints it.
    fn run_form(&mut self, name: &[u8], resources: Option<&'a Dictionary>, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            return;
        }
        let document = self.document;
        let stream = match resources
            .and_then(|r| dict_entry(document, r, b"XObject"))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|v| resolve(document, v))
            .and_then(|o| o.as_stream().ok())
        {
            Some(stream) => stream,
            None => return,
        };
        if name_of(&stream.dict, b"Subtype").as_deref() != Some("Form") {
            return;
        }

        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let operations = match Content::decode(&bytes) {
            Ok(content) => content.operations,
            Err(_) => return,
        };
        let form_resources = dict_entry(document, &stream.dict, b"Resources").or(resources);

        let (key, font, size, scale) = (
            self.font_key.clone(),
            self.font.clone(),
            self.font_size,
            self.scale,
        );
        self.process(&operations, form_resources, depth + 1);
        self.flush_span();
        self.font_key = key;
        self.font = font;
        self.font_size = size;
        self.scale = scale;
    }

    /// Decode a string operand through the current font's encoding, or as a
    /// plain text string when the font gives no usable encoding.
    fn decode(&self, bytes: &[u8]) -> String {
        self.fonts
            .get(&self.font_key)
            .and_then(|info| info.encoding.as_ref())
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| decode_text_string(bytes))
    }

    fn begin_block(&mut self) {
        self.flush_span();
        self.block = None;
        self.line = None;
        self.next_line = 0;
        self.scale = 1.0;
        self.last_tm_y = None;
    }

    fn end_block(&mut self) {
        self.flush_span();
        self.block = None;
        self.line = None;
    }

    fn break_line(&mut self) {
        self.flush_span();
        self.line = None;
    }

    fn show(&mut self, text: &str) {
        let text: String = text.chars().filter(|c| !c.is_control()).collect();
        if text.is_empty() {
            return;
        }
        let size = effective_size(self.font_size, self.scale);

        if let Some(span) = self.pending.as_mut() {
            if span.font == self.font && span.size == size {
                span.text.push_str(&text);
                return;
            }
        }
        self.flush_span();
        self.pending = Some(PendingSpan {
            font: self.font.clone(),
            size,
            text,
        });
    }

    /// Emit the pending span, numbering its block and line on first use so
    /// that blocks and lines without text take no index.
    fn flush_span(&mut self) {
        let span = match self.pending.take() {
            Some(span) => span,
            None => return,
        };

        let block = match self.block {
            Some(block) => block,
            None => {
                let block = self.next_block;
                self.next_block += 1;
                self.block = Some(block);
                block
            }
        };
        let line = match self.line {
            Some(line) => line,
            None => {
                let line = self.next_line;
                self.next_line += 1;
                self.next_span = 0;
                self.line = Some(line);
                line
            }
        };
        let index = self.next_span;
        self.next_span += 1;

        self.spans.push(TextSpanEntry {
            page: self.page,
            object_id: self.page_id,
            block,
            line,
            span: index,
            font: span.font,
            size: span.size,
            text: span.text,
        });
    }

    fn finish(mut self) -> Vec<TextSpanEntry> {
        self.flush_span();
        self.spans
    }
}

fn effective_size(font_size: f32, scale: f32) -> f32 {
    ((font_size * scale).abs() * 100.0).round() / 100.0
}

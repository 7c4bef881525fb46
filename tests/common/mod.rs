// Shared fixtures for the integration tests.
//
// PDFs are assembled by hand so every byte (and thus every digest) is known
// up front. Cross-reference offsets are computed while writing.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A tiny baseline JPEG: SOI, a JFIF APP0 segment, EOI. Viewers would reject
/// it but nothing here decodes image data.
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

pub const PAGE_TEXT: &str = "Hello PDF";

/// One-page document with a JPEG image, one line of Helvetica text, and an
/// `/Info` dictionary. Optionally carries an `/OpenAction` JavaScript.
#[derive(Debug, Clone, Default)]
pub struct PdfFixture {
    javascript: Option<String>,
    without_info: bool,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `source` as a JavaScript action run when the document opens.
    /// Parentheses in `source` must be balanced.
    pub fn with_javascript(mut self, source: &str) -> Self {
        self.javascript = Some(source.to_string());
        self
    }

    pub fn without_info(mut self) -> Self {
        self.without_info = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let content = format!("BT /F1 12 Tf 72 720 Td ({PAGE_TEXT}) Tj ET\nq 20 0 0 20 50 50 cm /Im0 Do Q\n");

        let catalog = match self.javascript {
            Some(_) => "<< /Type /Catalog /Pages 2 0 R /OpenAction 8 0 R >>".to_string(),
            None => "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        };

        let mut objects: Vec<Vec<u8>> = vec![
            catalog.into_bytes(),
            b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
              /Resources << /Font << /F1 5 0 R >> /XObject << /Im0 6 0 R >> >> \
              /Contents 4 0 R >>"
                .to_vec(),
            stream_object("", content.as_bytes()),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
            stream_object(
                "/Type /XObject /Subtype /Image /Width 2 /Height 2 /ColorSpace /DeviceRGB \
                 /BitsPerComponent 8 /Filter /DCTDecode",
                JPEG_BYTES,
            ),
            b"<< /Title (Quarterly report) /Author (Alice Example) /Producer (pdfprobe tests) >>"
                .to_vec(),
        ];
        if let Some(js) = &self.javascript {
            objects.push(format!("<< /Type /Action /S /JavaScript /JS ({js}) >>").into_bytes());
        }

        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }

        let info = if self.without_info { "" } else { " /Info 7 0 R" };
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R{info} >>\nstartxref\n{xref_at}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        out
    }

    /// Write the document to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn stream_object(extra_dict: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!("<< {extra_dict} /Length {} >>\nstream\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

/// Config whose external tools are guaranteed to be missing, so results do
/// not depend on what the test machine has installed.
pub fn config_without_tools() -> pdfprobe::ScanConfig {
    pdfprobe::ScanConfig {
        qpdf_program: "pdfprobe-test-missing-qpdf".into(),
        pdfsig_program: "pdfprobe-test-missing-pdfsig".into(),
        ..Default::default()
    }
}

/// Write an executable shell script. Unix only.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

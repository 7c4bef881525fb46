//! Shared lopdf helpers used by the analyzers that open the document model.

use lopdf::{Dictionary, Document, Object};

/// Follow `value` through one indirect reference, if it is one.
pub fn resolve<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Object> {
    match value {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resolve a value that might be an inline dictionary or a reference to one.
pub fn resolve_dict<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Dictionary> {
    match resolve(document, value)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Look up `key` in `dict` and resolve the result to a dictionary.
pub fn dict_entry<'a>(
    document: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    resolve_dict(document, dict.get(key).ok()?)
}

/// Read a name entry such as `/Subtype /Image` as a `String`.
pub fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

/// Decode a PDF text string: UTF-16BE when it carries a byte order mark,
/// UTF-8 when valid, Latin-1 otherwise.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Render any object as short human-readable text. References are shown
/// in `N G R` form rather than followed.
pub fn render_object(object: &Object) -> String {
    match object {
        Object::Null => "null".into(),
        Object::Boolean(b) => b.to_string(),
        Object::Integer(i) => i.to_string(),
        Object::Real(r) => r.to_string(),
        Object::Name(n) => format!("/{}", String::from_utf8_lossy(n)),
        Object::String(bytes, _) => decode_text_string(bytes),
        Object::Array(items) => {
            let inner: Vec<String> = items.iter().map(render_object).collect();
            format!("[{}]", inner.join(" "))
        }
        Object::Dictionary(dict) => format!("<<{} entries>>", dict.len()),
        Object::Stream(stream) => format!("<<stream, {} bytes>>", stream.content.len()),
        Object::Reference((num, gen)) => format!("{num} {gen} R"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_text_string_is_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_text_string(&bytes), "Hi");
    }

    #[test]
    fn latin1_fallback_keeps_every_byte() {
        assert_eq!(decode_text_string(&[b'c', 0xE9]), "c\u{e9}");
    }

    #[test]
    fn references_render_without_being_followed() {
        assert_eq!(render_object(&Object::Reference((12, 0))), "12 0 R");
        assert_eq!(render_object(&Object::Name(b"Image".to_vec())), "/Image");
    }
}

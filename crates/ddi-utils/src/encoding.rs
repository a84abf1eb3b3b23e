//! Character encoding detection for harvested XML documents.

use encoding_rs::Encoding;

/// Decode raw document bytes to a UTF-8 string.
///
/// Order: byte-order mark, then the encoding named in the XML declaration,
/// then strict UTF-8, then Windows-1252. Returns the text and the name of the
/// encoding that was used.
pub fn decode_document(bytes: &[u8]) -> (String, &'static str) {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(bytes);
        return (text.into_owned(), encoding.name());
    }

    if let Some(label) = detect_xml_encoding(bytes) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) if encoding != encoding_rs::UTF_8 => {
                let (text, _, had_errors) = encoding.decode(bytes);
                if had_errors {
                    log::debug!("Replacement characters while decoding as {}", encoding.name());
                }
                return (text.into_owned(), encoding.name());
            }
            Some(_) => {}
            None => log::debug!("Unknown XML declaration encoding: {}", label),
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), "UTF-8"),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            (text.into_owned(), "windows-1252")
        }
    }
}

/// Try to detect the encoding from an XML declaration.
/// Looks for `<?xml ... encoding="..." ?>`.
pub fn detect_xml_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(512)];
    let head_str = String::from_utf8_lossy(head);
    let decl_end = head_str.find("?>")?;
    let decl = &head_str[..decl_end];
    if !decl.trim_start().starts_with("<?xml") {
        return None;
    }

    let start = decl.find("encoding=")?;
    let rest = &decl[start + 9..];
    let quote = rest.chars().next()?;
    if quote == '"' || quote == '\'' {
        let rest = &rest[1..];
        if let Some(end) = rest.find(quote) {
            return Some(rest[..end].to_string());
        }
    }
    None
}

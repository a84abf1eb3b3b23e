//! XML text helpers: escaping, qualified names and attribute rendering.

/// Escape special characters in XML text content.
pub fn escape_xml_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape special characters in XML attribute values.
pub fn escape_xml_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Join a namespace prefix and a local name (`r:Citation`).
pub fn qualified_name(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}:{}", p, local),
        _ => local.to_string(),
    }
}

/// Render attribute pairs as `(key,value)(key,value)`.
///
/// This is the flat form used in the tabular exports for value ranges.
pub fn collect_attribs<'a, I>(attrs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (k, v) in attrs {
        out.push('(');
        out.push_str(k);
        out.push(',');
        out.push_str(v);
        out.push(')');
    }
    out
}

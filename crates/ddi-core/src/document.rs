//! Parsed DDI document tree.
//!
//! A read-only element tree built once from the raw bytes with quick-xml.
//! Element names are stored as local names (the namespace prefix is kept
//! separately), so `r:Citation` and `Citation` both answer to `"Citation"`.
//! Attribute keys keep their qualified form, e.g. `xml:lang`.
//!
//! There is no mutation API: disambiguating renames (summary statistics,
//! paragraph relabelling) are done by the callers as pure key mappings.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use ddi_utils::xml::{escape_xml_attr, escape_xml_text, qualified_name};

use crate::error::{DdiError, Result};
use crate::record::SchemaVersion;

/// A whole parsed document.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    encoding: &'static str,
}

impl Document {
    /// Decode raw bytes (BOM / XML declaration aware) and parse them.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let (text, encoding) = ddi_utils::encoding::decode_document(raw);
        let mut doc = Self::parse_str(&text)?;
        doc.encoding = encoding;
        Ok(doc)
    }

    /// Parse an already decoded XML string.
    pub fn parse_str(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => stack.push(Element::from_start(e)?),
                Ok(Event::Empty(ref e)) => {
                    let el = Element::from_start(e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::End(_)) => {
                    let mut el = stack
                        .pop()
                        .ok_or_else(|| DdiError::Xml("Unbalanced closing tag".to_string()))?;
                    el.trim_layout();
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = match e.unescape() {
                            Ok(t) => t.into_owned(),
                            Err(_) => String::from_utf8_lossy(e).into_owned(),
                        };
                        parent.push_text(text);
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_text(String::from_utf8_lossy(e).into_owned());
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DdiError::Xml(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DdiError::Xml(format!("Unclosed element <{}>", open.name)));
        }
        let root = root.ok_or_else(|| DdiError::Xml("Document has no root element".to_string()))?;
        Ok(Self {
            root,
            encoding: "UTF-8",
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Schema variant, decided by the root element's local name.
    pub fn schema(&self) -> Option<SchemaVersion> {
        SchemaVersion::from_root_tag(&self.root.name)
    }

    /// Encoding the raw bytes were decoded with.
    pub fn encoding(&self) -> &'static str {
        self.encoding
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(DdiError::Xml(format!(
            "Multiple root elements (second is <{}>)",
            el.name
        )))
    }
}

/// A child of an element: nested element or a run of text.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    /// Serialize this node back to XML markup.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(&escape_xml_text(text)),
            Node::Element(el) => el.write_xml(out),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    prefix: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let prefix = start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| DdiError::Xml(format!("Bad attribute in <{}>: {}", name, e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            prefix,
            attributes,
            children: Vec::new(),
        })
    }

    fn push_text(&mut self, text: String) {
        if let Some(Node::Text(prev)) = self.children.last_mut() {
            prev.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }

    /// Drop whitespace-only runs at the start and end of the content.
    /// Runs between two elements separate inline markup and are kept.
    fn trim_layout(&mut self) {
        let blank = |node: &Node| matches!(node, Node::Text(t) if t.trim().is_empty());
        if self.children.last().is_some_and(blank) {
            self.children.pop();
        }
        if self.children.first().is_some_and(blank) {
            self.children.remove(0);
        }
    }

    /// Local element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Attribute value by qualified key (`ID`, `xml:lang`).
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, ignoring empty and whitespace-only values.
    pub fn non_empty_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct element children, skipping text runs.
    pub fn element_children(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.element_children().filter(move |el| el.name == name)
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.element_children().find(|el| el.name == name)
    }

    /// All descendant elements in document order (self excluded).
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants::new(self)
    }

    /// First descendant with the given local name, in document order.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|el| el.name == name)
    }

    /// All descendants with the given local name, in document order.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.descendants().filter(move |el| el.name == name)
    }

    /// All descendants accepted by `pred`, in document order.
    pub fn find_all_matching<'a, P>(&'a self, mut pred: P) -> impl Iterator<Item = &'a Element>
    where
        P: FnMut(&Element) -> bool + 'a,
    {
        self.descendants().filter(move |el| pred(el))
    }

    /// Follow a chain of [`find`](Self::find) steps.
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |el, step| el.find(step))
    }

    /// Text of an element whose only content is a single text run,
    /// looking through a single wrapping child element.
    ///
    /// `<titl>Survey</titl>` and `<Creator><Name>A</Name></Creator>` both
    /// yield a value; mixed or multi-child content yields `None`.
    pub fn string(&self) -> Option<&str> {
        match self.children.as_slice() {
            [Node::Text(text)] => Some(text.as_str()),
            [Node::Element(el)] => el.string(),
            _ => None,
        }
    }

    /// [`string`](Self::string), trimmed, with empty values treated as absent.
    pub fn trimmed_string(&self) -> Option<&str> {
        self.string().map(str::trim).filter(|s| !s.is_empty())
    }

    /// All descendant text concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Serialize this element (and its subtree) back to XML markup.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let tag = qualified_name(self.prefix.as_deref(), &self.name);
        out.push('<');
        out.push_str(&tag);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape_xml_attr(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }
}

/// Pre-order walk over descendant elements, yielding each with its parent.
pub struct Descendants<'a> {
    stack: Vec<(&'a Element, &'a Element)>,
}

impl<'a> Descendants<'a> {
    fn new(root: &'a Element) -> Self {
        let stack = root.element_children().rev().map(|c| (root, c)).collect();
        Self { stack }
    }

    /// Yield `(parent, element)` pairs instead of bare elements.
    pub fn with_parent(self) -> impl Iterator<Item = (&'a Element, &'a Element)> {
        WithParent(self)
    }

    fn next_pair(&mut self) -> Option<(&'a Element, &'a Element)> {
        let (parent, el) = self.stack.pop()?;
        self.stack
            .extend(el.element_children().rev().map(|c| (el, c)));
        Some((parent, el))
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().map(|(_, el)| el)
    }
}

struct WithParent<'a>(Descendants<'a>);

impl<'a> Iterator for WithParent<'a> {
    type Item = (&'a Element, &'a Element);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_pair()
    }
}

/// First value that is present and not blank.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<codeBook xmlns="ddi:codebook:2_5" xml:lang="en">
  <stdyDscr>
    <citation>
      <titlStmt>
        <titl>Health &amp; Wellbeing</titl>
        <IDNo agency="FSD">1234</IDNo>
      </titlStmt>
    </citation>
    <stdyInfo>
      <abstract><p>First</p><p>Second <b>bold</b> tail</p></abstract>
    </stdyInfo>
  </stdyDscr>
</codeBook>"#;

    #[test]
    fn test_parse_and_navigate() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "codeBook");
        assert_eq!(root.attr("xml:lang"), Some("en"));
        assert_eq!(doc.schema(), Some(SchemaVersion::Codebook));

        let titl = root.find_path(&["stdyDscr", "citation", "titl"]).unwrap();
        assert_eq!(titl.string(), Some("Health & Wellbeing"));

        let idno = root.find("IDNo").unwrap();
        assert_eq!(idno.attr("agency"), Some("FSD"));
        assert!(root.child("IDNo").is_none());
        assert!(root.child("stdyDscr").is_some());
    }

    #[test]
    fn test_string_semantics() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        let abs = doc.root().find("abstract").unwrap();
        assert_eq!(abs.string(), None);
        let paras: Vec<_> = abs.find_all("p").collect();
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].string(), Some("First"));
        assert_eq!(paras[1].string(), None);
        assert_eq!(paras[1].text(), "Second bold tail");

        // Single wrapping child is looked through.
        let doc = Document::parse_str("<Creator><Name> Ann </Name></Creator>").unwrap();
        assert_eq!(doc.root().string(), Some(" Ann "));
        assert_eq!(doc.root().trimmed_string(), Some("Ann"));
    }

    #[test]
    fn test_descendants_order_and_parent() {
        let doc = Document::parse_str("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc.root().descendants().map(|e| e.name()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);

        let pairs: Vec<_> = doc
            .root()
            .descendants()
            .with_parent()
            .map(|(p, e)| (p.name(), e.name()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("b", "c"), ("a", "d")]);

        let matching: Vec<_> = doc
            .root()
            .find_all_matching(|e| matches!(e.name(), "c" | "d"))
            .map(|e| e.name())
            .collect();
        assert_eq!(matching, vec!["c", "d"]);
    }

    #[test]
    fn test_namespaced_names() {
        let xml = r#"<ddi:DDIInstance xmlns:ddi="ddi:instance:3_1" xmlns:r="ddi:reusable:3_1" id="inst-1">
  <r:Citation><r:Title xml:lang="en">Title</r:Title></r:Citation>
</ddi:DDIInstance>"#;
        let doc = Document::parse_str(xml).unwrap();
        assert_eq!(doc.schema(), Some(SchemaVersion::Lifecycle));
        let cit = doc.root().child("Citation").unwrap();
        assert_eq!(cit.prefix(), Some("r"));
        assert_eq!(cit.find("Title").unwrap().attr("xml:lang"), Some("en"));
    }

    #[test]
    fn test_to_xml_round_trip_markup() {
        let doc = Document::parse_str(r#"<Content>Line <xhtml:b class="x">one</xhtml:b> &amp; more</Content>"#).unwrap();
        let parts: Vec<String> = doc.root().children().iter().map(Node::to_xml).collect();
        assert_eq!(parts, vec!["Line ", r#"<xhtml:b class="x">one</xhtml:b>"#, " &amp; more"]);
    }

    #[test]
    fn test_inline_whitespace_kept() {
        let doc = Document::parse_str("<p>\n  <b>Health</b> <i>survey</i>\n</p>").unwrap();
        let root = doc.root();
        assert_eq!(root.text(), "Health survey");
        let parts: Vec<String> = root.children().iter().map(Node::to_xml).collect();
        assert_eq!(parts, vec!["<b>Health</b>", " ", "<i>survey</i>"]);

        let doc = Document::parse_str("<Creator>\n  <Name>Ann</Name>\n</Creator>").unwrap();
        assert_eq!(doc.root().string(), Some("Ann"));

        let doc = Document::parse_str("<Keyword>   </Keyword>").unwrap();
        assert!(doc.root().children().is_empty());
        assert_eq!(doc.root().string(), None);
    }

    #[test]
    fn test_child_with_borrowed_name() {
        let doc = Document::parse_str("<a><b/><c/></a>").unwrap();
        let name = String::from("c");
        let found = doc.root().child(&name).map(Element::name);
        drop(name);
        assert_eq!(found, Some("c"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Document::parse_str("").is_err());
        assert!(Document::parse_str("<a><b></a>").is_err());
        assert!(Document::parse_str("<a>").is_err());
    }

    #[test]
    fn test_from_bytes_with_declared_encoding() {
        let mut raw = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><codeBook><titl>".to_vec();
        raw.push(0xE4);
        raw.extend_from_slice(b"</titl></codeBook>");
        let doc = Document::from_bytes(&raw).unwrap();
        assert_eq!(doc.root().find("titl").unwrap().string(), Some("ä"));
        assert_eq!(doc.encoding(), "windows-1252");
    }

    #[test]
    fn test_first_non_empty() {
        assert_eq!(first_non_empty([None, Some("  "), Some(" x "), Some("y")]), Some("x"));
        assert_eq!(first_non_empty([None, Some("")]), None);
    }
}

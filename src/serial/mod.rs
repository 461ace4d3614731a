//! XML serialization.
//!
//! Writes a [`Document`] back out as XML text. Always emits an XML
//! declaration (defaulting to version 1.0) and a trailing newline.

use std::fmt::Write as _;
use std::io;

use crate::error::Result;
use crate::tree::{Document, NodeId, NodeKind};

/// Serialization options.
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Put element-only content on indented lines. Off by default.
    pub indent: bool,
    /// One level of indentation.
    pub indent_str: String,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: false,
            indent_str: "  ".to_string(),
        }
    }
}

impl SerializeOptions {
    /// Enables or disables indentation. Mixed content is never reindented.
    #[must_use]
    pub fn indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Sets the per-level indentation string.
    #[must_use]
    pub fn indent_str(mut self, s: &str) -> Self {
        self.indent_str = s.to_string();
        self
    }
}

/// Serializes a document with default options.
///
/// ```
/// use xmlwrap::TreeParser;
/// use xmlwrap::serial::serialize;
///
/// let parser = TreeParser::parse_memory(b"<a x='1'>t&amp;u</a>").unwrap();
/// let xml = serialize(parser.document().get().unwrap());
/// assert_eq!(xml, "<?xml version=\"1.0\"?>\n<a x=\"1\">t&amp;u</a>\n");
/// ```
#[must_use]
pub fn serialize(doc: &Document) -> String {
    serialize_with_options(doc, &SerializeOptions::default())
}

/// Serializes a document.
#[must_use]
pub fn serialize_with_options(doc: &Document, options: &SerializeOptions) -> String {
    let mut out = String::new();
    let _ = write!(out, "<?xml version=\"{}\"", doc.version.as_deref().unwrap_or("1.0"));
    if let Some(encoding) = &doc.encoding {
        let _ = write!(out, " encoding=\"{encoding}\"");
    }
    if let Some(standalone) = doc.standalone {
        let _ = write!(out, " standalone=\"{}\"", if standalone { "yes" } else { "no" });
    }
    out.push_str("?>\n");

    let mut writer = Writer {
        doc,
        options,
        out,
    };
    for child in doc.children(doc.root()) {
        writer.node(child, 0, false);
        if !matches!(doc.node(child).kind, NodeKind::Element { .. }) {
            writer.out.push('\n');
        }
    }
    let mut out = writer.out;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Serializes a document into `sink`.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if writing fails.
pub fn write_document(doc: &Document, options: &SerializeOptions, sink: &mut impl io::Write) -> Result<()> {
    sink.write_all(serialize_with_options(doc, options).as_bytes())?;
    sink.flush()?;
    Ok(())
}

struct Writer<'d> {
    doc: &'d Document,
    options: &'d SerializeOptions,
    out: String,
}

impl Writer<'_> {
    fn pad(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(&self.options.indent_str);
        }
    }

    fn element_only(&self, id: NodeId) -> bool {
        let mut saw_element = false;
        for child in self.doc.children(id) {
            match &self.doc.node(child).kind {
                NodeKind::Element { .. } => saw_element = true,
                NodeKind::Text { content } if !content.trim().is_empty() => return false,
                NodeKind::CData { .. } => return false,
                _ => {}
            }
        }
        saw_element
    }

    fn node(&mut self, id: NodeId, depth: usize, on_own_line: bool) {
        let doc = self.doc;
        let indented = self.options.indent && on_own_line;
        if indented && !matches!(doc.node(id).kind, NodeKind::Text { .. }) {
            self.pad(depth);
        }
        match &doc.node(id).kind {
            NodeKind::Element {
                name,
                prefix,
                attributes,
                ..
            } => {
                let qname = match prefix {
                    Some(p) => format!("{p}:{name}"),
                    None => name.clone(),
                };
                self.out.push('<');
                self.out.push_str(&qname);
                for attr in attributes {
                    let _ = write!(self.out, " {}=\"", attr.qualified_name());
                    escape_into(&mut self.out, &attr.value, true);
                    self.out.push('"');
                }
                if doc.first_child(id).is_none() {
                    self.out.push_str("/>");
                } else {
                    self.out.push('>');
                    let nested = self.options.indent && self.element_only(id);
                    if nested {
                        self.out.push('\n');
                    }
                    for child in doc.children(id) {
                        let blank_text = matches!(
                            &doc.node(child).kind,
                            NodeKind::Text { content } if content.trim().is_empty()
                        );
                        if nested && blank_text {
                            continue;
                        }
                        self.node(child, depth + 1, nested);
                    }
                    if nested {
                        self.pad(depth);
                    }
                    let _ = write!(self.out, "</{qname}>");
                }
            }
            NodeKind::Text { content } => escape_into(&mut self.out, content, false),
            NodeKind::CData { content } => {
                let _ = write!(self.out, "<![CDATA[{content}]]>");
            }
            NodeKind::Comment { content } => {
                let _ = write!(self.out, "<!--{content}-->");
            }
            NodeKind::ProcessingInstruction { target, data } => match data {
                Some(data) => {
                    let _ = write!(self.out, "<?{target} {data}?>");
                }
                None => {
                    let _ = write!(self.out, "<?{target}?>");
                }
            },
            NodeKind::Document => {}
        }
        if indented && !matches!(doc.node(id).kind, NodeKind::Text { .. }) {
            self.out.push('\n');
        }
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n') => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::TreeParser;
    use pretty_assertions::assert_eq;

    fn roundtrip(input: &str, options: &SerializeOptions) -> String {
        let parser = TreeParser::parse_memory(input.as_bytes()).unwrap();
        serialize_with_options(parser.document().get().unwrap(), options)
    }

    #[test]
    fn test_empty_element() {
        assert_eq!(
            roundtrip("<root/>", &SerializeOptions::default()),
            "<?xml version=\"1.0\"?>\n<root/>\n"
        );
    }

    #[test]
    fn test_declaration_fields_are_kept() {
        assert_eq!(
            roundtrip(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?><r/>",
                &SerializeOptions::default()
            ),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n<r/>\n"
        );
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            roundtrip("<r a='&quot;&lt;'>&lt;&amp;&gt;</r>", &SerializeOptions::default()),
            "<?xml version=\"1.0\"?>\n<r a=\"&quot;&lt;\">&lt;&amp;&gt;</r>\n"
        );
    }

    #[test]
    fn test_namespaces_comments_and_pis() {
        let xml = roundtrip(
            "<!--lead--><x:r xmlns:x='urn:x'><?pi data?><![CDATA[<raw>]]></x:r>",
            &SerializeOptions::default(),
        );
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n<!--lead-->\n<x:r xmlns:x=\"urn:x\"><?pi data?><![CDATA[<raw>]]></x:r>\n"
        );
    }

    #[test]
    fn test_indent_element_only_content() {
        let xml = roundtrip(
            "<a>\n<b><c/></b><d>text</d></a>",
            &SerializeOptions::default().indent(true),
        );
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n<a>\n  <b>\n    <c/>\n  </b>\n  <d>text</d>\n</a>\n"
        );
    }

    #[test]
    fn test_write_document_to_sink() {
        let parser = TreeParser::parse_memory(b"<a/>").unwrap();
        let mut sink = Vec::new();
        write_document(
            parser.document().get().unwrap(),
            &SerializeOptions::default(),
            &mut sink,
        )
        .unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "<?xml version=\"1.0\"?>\n<a/>\n");
    }
}

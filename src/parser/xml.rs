//! Event driver.
//!
//! Pulls events from a `quick_xml::Reader`, enforces the well-formedness
//! rules the reader leaves to its caller, and turns what survives into
//! calls on the context's callback table.

use std::borrow::Cow;

use quick_xml::errors::{IllFormedError, SyntaxError};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

use super::chars::{attributes_are_separated, first_invalid_char, is_name};
use super::dtd::{escape_message, Entities};
use super::namespace::{is_absolute_uri, split_qname, NamespaceScopes};
use super::{ParseOptions, ParserContext, XmlDeclaration};
use crate::encoding::decode_to_utf8;
use crate::error::{ErrorSeverity, SourceLocation};
use crate::tree::Attribute;

use ErrorSeverity::{Error, Fatal, Warning};

/// Runs a complete parse of `input` against `ctxt`.
pub(super) fn drive<T>(ctxt: &mut ParserContext<'_, T>, input: &[u8]) {
    let text = match decode_to_utf8(input) {
        Ok(text) => text,
        Err(err) => {
            ctxt.report(Fatal, format_args!("{}\n", err.message));
            return;
        }
    };
    let options = ctxt.options().clone();
    Driver::new(&text, options).run(ctxt);
}

#[derive(Debug)]
struct OpenElement {
    qname: String,
    local: String,
    prefix: Option<String>,
    namespace: Option<String>,
    line: u32,
}

/// Line/column bookkeeping over the decoded source.
struct LineTracker<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'s> LineTracker<'s> {
    fn new(src: &'s [u8]) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self, to: usize) {
        let to = to.min(self.src.len());
        if to <= self.pos {
            return;
        }
        for &b in &self.src[self.pos..to] {
            if b == b'\n' {
                self.line = self.line.saturating_add(1);
                self.column = 1;
            } else {
                self.column = self.column.saturating_add(1);
            }
        }
        self.pos = to;
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.pos,
        }
    }
}

struct Driver<'s> {
    reader: Reader<&'s [u8]>,
    lines: LineTracker<'s>,
    options: ParseOptions,
    open: Vec<OpenElement>,
    scopes: NamespaceScopes,
    preserve_space: Vec<bool>,
    entities: Entities,
    started: bool,
    seen_doctype: bool,
    seen_root: bool,
}

impl<'s> Driver<'s> {
    fn new(src: &'s str, options: ParseOptions) -> Self {
        let mut reader = Reader::from_str(src);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;
        Self {
            reader,
            lines: LineTracker::new(src.as_bytes()),
            options,
            open: Vec::new(),
            scopes: NamespaceScopes::new(),
            preserve_space: Vec::new(),
            entities: Entities::default(),
            started: false,
            seen_doctype: false,
            seen_root: false,
        }
    }

    fn position(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(usize::MAX)
    }

    fn run<T>(mut self, ctxt: &mut ParserContext<'_, T>) {
        loop {
            let start = self.position();
            self.lines.advance(start);
            ctxt.location = self.lines.location();

            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    ctxt.report(Fatal, format_args!("{}\n", reader_message(&err)));
                    return;
                }
            };

            match event {
                Event::Decl(decl) => self.declaration(ctxt, &decl, start),
                Event::Start(tag) => self.start_tag(ctxt, &tag, false),
                Event::Empty(tag) => self.start_tag(ctxt, &tag, true),
                Event::End(tag) => {
                    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                    self.end_tag(ctxt, &name);
                }
                Event::Text(text) => {
                    let raw = String::from_utf8_lossy(&text);
                    self.text(ctxt, &raw);
                }
                Event::CData(data) => {
                    let content = String::from_utf8_lossy(&data);
                    if self.open.is_empty() {
                        self.content_outside_root(ctxt);
                    } else if let Some(c) = first_invalid_char(&content) {
                        ctxt.report(Fatal, format_args!("PCDATA invalid Char value {}\n", u32::from(c)));
                    } else {
                        ctxt.cdata_block(&content);
                    }
                }
                Event::Comment(comment) => {
                    let content = String::from_utf8_lossy(&comment);
                    if content.contains("--") || content.ends_with('-') {
                        ctxt.report(Fatal, format_args!("Double hyphen within comment\n"));
                    } else if let Some(c) = first_invalid_char(&content) {
                        ctxt.report(
                            Fatal,
                            format_args!("xmlParseComment: invalid xmlChar value {}\n", u32::from(c)),
                        );
                    } else {
                        self.ensure_started(ctxt);
                        ctxt.comment(&content);
                    }
                }
                Event::PI(pi) => {
                    let raw = String::from_utf8_lossy(&pi);
                    self.processing_instruction(ctxt, &raw);
                }
                Event::DocType(doctype) => {
                    let content = String::from_utf8_lossy(&doctype);
                    self.doctype(ctxt, &content, start);
                }
                Event::Eof => {
                    self.finish(ctxt);
                    return;
                }
            }

            if ctxt.is_stopped() {
                tracing::trace!(location = %ctxt.location, "parse halted");
                return;
            }
        }
    }

    fn ensure_started<T>(&mut self, ctxt: &mut ParserContext<'_, T>) {
        if !self.started {
            self.started = true;
            ctxt.start_document();
        }
    }

    fn declaration<T>(&mut self, ctxt: &mut ParserContext<'_, T>, decl: &BytesDecl<'_>, start: usize) {
        if start != 0 || self.started {
            ctxt.report(
                Fatal,
                format_args!("XML declaration allowed only at the start of the document\n"),
            );
            return;
        }
        let version = match decl.version() {
            Ok(v) => String::from_utf8_lossy(&v).into_owned(),
            Err(_) => {
                ctxt.report(Fatal, format_args!("Malformed declaration expecting version\n"));
                return;
            }
        };
        let encoding = decl
            .encoding()
            .and_then(Result::ok)
            .map(|e| String::from_utf8_lossy(&e).into_owned());
        let standalone = match decl.standalone() {
            None => None,
            Some(Ok(value)) => match value.as_ref() {
                b"yes" => Some(true),
                b"no" => Some(false),
                _ => {
                    ctxt.report(Fatal, format_args!("standalone accepts only 'yes' or 'no'\n"));
                    return;
                }
            },
            Some(Err(_)) => {
                ctxt.report(Fatal, format_args!("Malformed declaration\n"));
                return;
            }
        };

        if version != "1.0" {
            ctxt.report(Warning, format_args!("Unsupported version '{version}'\n"));
        }
        ctxt.declaration = XmlDeclaration {
            version: Some(version),
            encoding,
            standalone,
        };
        self.ensure_started(ctxt);
    }

    /// Records the internal subset's entities. Only one declaration is
    /// allowed, and it must precede the root element.
    fn doctype<T>(&mut self, ctxt: &mut ParserContext<'_, T>, content: &str, start: usize) {
        if self.seen_root {
            ctxt.report(Fatal, format_args!("Extra content at the end of the document\n"));
            return;
        }
        let keyword = self
            .lines
            .src
            .get(start..)
            .is_some_and(|rest| rest.starts_with(b"<!DOCTYPE"));
        if self.seen_doctype || !keyword {
            ctxt.report(Fatal, format_args!("StartTag: invalid element name\n"));
            return;
        }
        self.seen_doctype = true;
        match Entities::from_doctype(content) {
            Ok(entities) => self.entities = entities,
            Err(message) => {
                ctxt.report(Fatal, format_args!("{message}\n"));
                return;
            }
        }
        self.ensure_started(ctxt);
    }

    fn start_tag<T>(&mut self, ctxt: &mut ParserContext<'_, T>, tag: &BytesStart<'_>, empty: bool) {
        if self.seen_root && self.open.is_empty() {
            ctxt.report(Fatal, format_args!("Extra content at the end of the document\n"));
            return;
        }
        let qname = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
        if !is_name(&qname) {
            ctxt.report(Fatal, format_args!("StartTag: invalid element name\n"));
            return;
        }
        let depth = self.open.len() + 1;
        if depth > self.options.max_depth as usize {
            ctxt.report(Fatal, format_args!("Excessive depth in document: {depth}\n"));
            return;
        }
        self.ensure_started(ctxt);

        let Some(raw_attrs) = self.read_attributes(ctxt, tag) else {
            return;
        };

        let inherited = self.preserve_space.last().copied().unwrap_or(false);
        let preserve = raw_attrs
            .iter()
            .find(|(name, _)| name == "xml:space")
            .map_or(inherited, |(_, value)| match value.as_str() {
                "preserve" => true,
                "default" => false,
                _ => inherited,
            });

        let (element, attributes) = if self.options.namespaces {
            self.scopes.push();
            self.resolve_namespaces(ctxt, &qname, raw_attrs)
        } else {
            let attributes: Vec<Attribute> = raw_attrs
                .into_iter()
                .map(|(name, value)| Attribute {
                    name,
                    value,
                    prefix: None,
                    namespace: None,
                })
                .collect();
            let element = OpenElement {
                local: qname.clone(),
                qname,
                prefix: None,
                namespace: None,
                line: 0,
            };
            (element, attributes)
        };
        if ctxt.is_stopped() {
            return;
        }

        let element = OpenElement {
            line: self.lines.line,
            ..element
        };
        self.seen_root = true;
        self.preserve_space.push(preserve);
        ctxt.start_element(
            &element.local,
            element.prefix.as_deref(),
            element.namespace.as_deref(),
            &attributes,
        );
        self.open.push(element);

        if empty && !ctxt.is_stopped() {
            self.close_current(ctxt);
        }
    }

    /// Reads `(qualified name, value)` pairs with references expanded and
    /// whitespace normalised. `None` means a fatal error was reported.
    fn read_attributes<T>(
        &self,
        ctxt: &mut ParserContext<'_, T>,
        tag: &BytesStart<'_>,
    ) -> Option<Vec<(String, String)>> {
        if !attributes_are_separated(tag.attributes_raw()) {
            ctxt.report(Fatal, format_args!("attributes construct error\n"));
            return None;
        }
        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in tag.attributes().with_checks(false) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(err) => {
                    ctxt.report(Fatal, format_args!("{}\n", attr_message(&err)));
                    return None;
                }
            };
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if !is_name(&name) {
                ctxt.report(Fatal, format_args!("error parsing attribute name\n"));
                return None;
            }
            let raw = String::from_utf8_lossy(&attr.value);
            if raw.contains('<') {
                ctxt.report(
                    Fatal,
                    format_args!("Unescaped '<' not allowed in attributes values\n"),
                );
                return None;
            }
            if first_invalid_char(&raw).is_some() {
                ctxt.report(Fatal, format_args!("invalid character in attribute value\n"));
                return None;
            }
            let normalized = raw.replace(['\t', '\n', '\r'], " ");
            let value = match self.entities.unescape(&normalized, true) {
                Ok(value) => value.into_owned(),
                Err(message) => {
                    ctxt.report(Fatal, format_args!("{message}\n"));
                    return None;
                }
            };
            if let Some(c) = first_invalid_char(&value) {
                ctxt.report(
                    Fatal,
                    format_args!("xmlParseCharRef: invalid xmlChar value {}\n", u32::from(c)),
                );
                return None;
            }
            if attrs.iter().any(|(existing, _)| *existing == name) {
                ctxt.report(Fatal, format_args!("Attribute {name} redefined\n"));
                return None;
            }
            attrs.push((name, value));
        }
        Some(attrs)
    }

    /// Binds this element's declarations and resolves its prefixes.
    /// Unbound prefixes are recoverable errors; the names stay as written.
    fn resolve_namespaces<T>(
        &mut self,
        ctxt: &mut ParserContext<'_, T>,
        qname: &str,
        raw_attrs: Vec<(String, String)>,
    ) -> (OpenElement, Vec<Attribute>) {
        for (name, value) in &raw_attrs {
            if name == "xmlns" {
                if !value.is_empty() && !is_absolute_uri(value) {
                    ctxt.report(Warning, format_args!("xmlns: URI {value} is not absolute\n"));
                }
                self.scopes.bind(None, value);
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                if value.is_empty() {
                    ctxt.report(
                        Error,
                        format_args!("xmlns:{prefix}: Empty XML namespace is not allowed\n"),
                    );
                    continue;
                }
                if !is_absolute_uri(value) {
                    ctxt.report(
                        Warning,
                        format_args!("xmlns:{prefix}: URI {value} is not absolute\n"),
                    );
                }
                self.scopes.bind(Some(prefix), value);
            }
        }

        let (prefix, local) = split_qname(qname);
        let namespace = self.scopes.resolve(prefix).map(String::from);
        if let (Some(p), None) = (prefix, &namespace) {
            ctxt.report(
                Error,
                format_args!("Namespace prefix {p} on {local} is not defined\n"),
            );
        }
        let element = OpenElement {
            qname: qname.to_string(),
            local: local.to_string(),
            prefix: prefix.map(String::from),
            namespace,
            line: 0,
        };

        let mut attributes: Vec<Attribute> = Vec::with_capacity(raw_attrs.len());
        for (name, value) in raw_attrs {
            let (attr_prefix, attr_local) = split_qname(&name);
            let namespace = match attr_prefix {
                Some("xmlns") | None => None,
                Some(p) => {
                    let uri = self.scopes.resolve(Some(p)).map(String::from);
                    if uri.is_none() {
                        ctxt.report(
                            Error,
                            format_args!(
                                "Namespace prefix {p} for {attr_local} on {local} is not defined\n"
                            ),
                        );
                    }
                    uri
                }
            };
            if let Some(ns) = &namespace {
                let clash = attributes
                    .iter()
                    .any(|a| a.name == attr_local && a.namespace.as_deref() == Some(ns.as_str()));
                if clash {
                    ctxt.report(
                        Fatal,
                        format_args!("Namespaced Attribute {attr_local} in '{ns}' redefined\n"),
                    );
                }
            }
            attributes.push(Attribute {
                name: attr_local.to_string(),
                prefix: attr_prefix.map(String::from),
                namespace,
                value,
            });
        }
        (element, attributes)
    }

    fn end_tag<T>(&mut self, ctxt: &mut ParserContext<'_, T>, name: &str) {
        let Some(top) = self.open.last() else {
            self.content_outside_root(ctxt);
            return;
        };
        if top.qname != name {
            ctxt.report(
                Fatal,
                format_args!(
                    "Opening and ending tag mismatch: {} line {} and {name}\n",
                    top.qname, top.line
                ),
            );
            return;
        }
        self.close_current(ctxt);
    }

    fn close_current<T>(&mut self, ctxt: &mut ParserContext<'_, T>) {
        let Some(element) = self.open.pop() else {
            return;
        };
        ctxt.end_element(
            &element.local,
            element.prefix.as_deref(),
            element.namespace.as_deref(),
        );
        if self.options.namespaces {
            self.scopes.pop();
        }
        self.preserve_space.pop();
    }

    fn text<T>(&mut self, ctxt: &mut ParserContext<'_, T>, raw: &str) {
        let blank = raw.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
        if self.open.is_empty() {
            if !blank {
                self.content_outside_root(ctxt);
            }
            return;
        }
        if blank {
            let preserve = self.preserve_space.last().copied().unwrap_or(false);
            if !self.options.keep_blanks && !preserve {
                ctxt.ignorable_whitespace(raw);
            } else {
                ctxt.characters(raw);
            }
            return;
        }
        if let Some(c) = first_invalid_char(raw) {
            ctxt.report(Fatal, format_args!("PCDATA invalid Char value {}\n", u32::from(c)));
            return;
        }
        if raw.contains("]]>") {
            ctxt.report(Fatal, format_args!("Sequence ']]>' not allowed in content\n"));
            return;
        }
        let content: Cow<'_, str> = match self.entities.unescape(raw, false) {
            Ok(content) => content,
            Err(message) => {
                ctxt.report(Fatal, format_args!("{message}\n"));
                return;
            }
        };
        if let Some(c) = first_invalid_char(&content) {
            ctxt.report(
                Fatal,
                format_args!("xmlParseCharRef: invalid xmlChar value {}\n", u32::from(c)),
            );
            return;
        }
        ctxt.characters(&content);
    }

    fn processing_instruction<T>(&mut self, ctxt: &mut ParserContext<'_, T>, raw: &str) {
        let (target, data) = match raw.find(|c: char| c.is_ascii_whitespace()) {
            Some(at) => {
                let data = raw[at..].trim_start();
                (&raw[..at], (!data.is_empty()).then_some(data))
            }
            None => (raw, None),
        };
        if !is_name(target) {
            ctxt.report(Fatal, format_args!("xmlParsePI : no target name\n"));
            return;
        }
        if let Some(c) = data.and_then(first_invalid_char) {
            ctxt.report(Fatal, format_args!("Char 0x{:X} out of allowed range\n", u32::from(c)));
            return;
        }
        if target.eq_ignore_ascii_case("xml") {
            ctxt.report(
                Fatal,
                format_args!("XML declaration allowed only at the start of the document\n"),
            );
            return;
        }
        self.ensure_started(ctxt);
        ctxt.processing_instruction(target, data);
    }

    fn content_outside_root<T>(&mut self, ctxt: &mut ParserContext<'_, T>) {
        if self.seen_root {
            ctxt.report(Fatal, format_args!("Extra content at the end of the document\n"));
        } else {
            ctxt.report(Fatal, format_args!("Start tag expected, '<' not found\n"));
        }
    }

    fn finish<T>(&mut self, ctxt: &mut ParserContext<'_, T>) {
        if let Some(top) = self.open.last() {
            ctxt.report(
                Fatal,
                format_args!("Premature end of data in tag {} line {}\n", top.qname, top.line),
            );
            return;
        }
        if !self.seen_root {
            ctxt.report(Fatal, format_args!("Document is empty\n"));
            return;
        }
        ctxt.end_document();
    }
}

/// libxml2's wording for the reader's syntax errors.
fn reader_message(err: &quick_xml::Error) -> String {
    use quick_xml::Error as E;
    let message = match err {
        E::Syntax(SyntaxError::InvalidBangMarkup) => "StartTag: invalid element name",
        E::Syntax(SyntaxError::UnclosedPIOrXmlDecl) => "ParsePI: PI never end ...",
        E::Syntax(SyntaxError::UnclosedComment) => "Comment not terminated",
        E::Syntax(SyntaxError::UnclosedDoctype) => "DOCTYPE improperly terminated",
        E::Syntax(SyntaxError::UnclosedCData) => "CData section not finished",
        E::Syntax(SyntaxError::UnclosedTag) => "Couldn't find end of Start Tag",
        E::IllFormed(IllFormedError::MissingDeclVersion(_)) => {
            "Malformed declaration expecting version"
        }
        E::IllFormed(IllFormedError::MissingDoctypeName) => {
            "xmlParseDocTypeDecl : no DOCTYPE name !"
        }
        E::IllFormed(IllFormedError::DoubleHyphenInComment) => "Double hyphen within comment",
        E::InvalidAttr(err) => return attr_message(err),
        E::Escape(err) => return escape_message("", err),
        other => return other.to_string(),
    };
    message.to_string()
}

fn attr_message(err: &AttrError) -> String {
    match err {
        AttrError::ExpectedValue(_) | AttrError::UnquotedValue(_) => {
            "AttValue: \" or ' expected".to_string()
        }
        AttrError::ExpectedQuote(_, quote) => format!("AttValue: {} expected", char::from(*quote)),
        AttrError::ExpectedEq(_) | AttrError::Duplicated(..) => {
            "attributes construct error".to_string()
        }
    }
}

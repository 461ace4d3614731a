//! SAX2 callback table.
//!
//! A [`SaxHandler`] is a table of optional plain function pointers, one per
//! event the parser context can raise. Every callback receives the
//! [`ParserContext`] itself; per-parse user state is reached through
//! [`ParserContext::private_mut`], the opaque back-pointer the caller wires
//! in. Unset entries are skipped.
//!
//! [`SaxHandler::default`] (equivalently [`init_default_sax_handler`])
//! installs the stock handlers: the structural ones build a [`Document`] in
//! `ctxt.my_doc`, and the diagnostic ones log through `tracing`. Callers
//! typically start from that table and override only what they need:
//!
//! ```
//! use std::fmt;
//! use xmlwrap::parser::ParserContext;
//! use xmlwrap::sax::SaxHandler;
//!
//! #[derive(Default)]
//! struct Counts {
//!     warnings: usize,
//! }
//!
//! fn count_warning(ctxt: &mut ParserContext<'_, Counts>, _msg: fmt::Arguments<'_>) {
//!     if let Some(counts) = ctxt.private_mut() {
//!         counts.warnings += 1;
//!     }
//! }
//!
//! let mut sax = SaxHandler::<Counts>::default();
//! sax.warning = Some(count_warning);
//!
//! let mut counts = Counts::default();
//! let mut ctxt = ParserContext::from_memory(b"<?xml version='1.1'?><a/>").unwrap();
//! ctxt.set_sax(sax);
//! ctxt.set_private(&mut counts);
//! assert_eq!(ctxt.parse_document(), 0);
//! assert!(ctxt.take_document().is_some());
//! drop(ctxt);
//! assert_eq!(counts.warnings, 1);
//! ```

use std::fmt;

use crate::parser::ParserContext;
use crate::tree::{Attribute, Document, NodeKind};

/// Document start/end callback.
pub type DocumentSax<T> = Option<fn(&mut ParserContext<'_, T>)>;

/// Element start callback: `(ctxt, local_name, prefix, namespace, attributes)`.
pub type StartElementSax<T> =
    Option<fn(&mut ParserContext<'_, T>, &str, Option<&str>, Option<&str>, &[Attribute])>;

/// Element end callback: `(ctxt, local_name, prefix, namespace)`.
pub type EndElementSax<T> = Option<fn(&mut ParserContext<'_, T>, &str, Option<&str>, Option<&str>)>;

/// Text-like callback (characters, whitespace, CDATA, comments).
pub type TextSax<T> = Option<fn(&mut ParserContext<'_, T>, &str)>;

/// Processing instruction callback: `(ctxt, target, data)`.
pub type ProcessingInstructionSax<T> = Option<fn(&mut ParserContext<'_, T>, &str, Option<&str>)>;

/// Diagnostic callback. The message usually ends with `'\n'`.
pub type MessageSax<T> = Option<fn(&mut ParserContext<'_, T>, fmt::Arguments<'_>)>;

/// The callback table consulted by a [`ParserContext`].
pub struct SaxHandler<T> {
    /// Fired once, after the XML declaration (if any) has been read.
    pub start_document: DocumentSax<T>,
    /// Fired once at the end of a parse that was not stopped.
    pub end_document: DocumentSax<T>,
    /// Fired for every start tag and empty-element tag.
    pub start_element: StartElementSax<T>,
    /// Fired for every end tag, and right after `start_element` for `<a/>`.
    pub end_element: EndElementSax<T>,
    /// Character data with references expanded.
    pub characters: TextSax<T>,
    /// Whitespace-only character data judged insignificant. Only raised when
    /// the context was configured with `keep_blanks(false)`; otherwise blank
    /// runs go to `characters`.
    pub ignorable_whitespace: TextSax<T>,
    /// Content of a CDATA section.
    pub cdata_block: TextSax<T>,
    /// Comment text.
    pub comment: TextSax<T>,
    /// Processing instruction.
    pub processing_instruction: ProcessingInstructionSax<T>,
    /// Non-fatal diagnostic; never affects well-formedness.
    pub warning: MessageSax<T>,
    /// Recoverable error (namespace problems). The document stays
    /// well-formed as far as the context is concerned.
    pub error: MessageSax<T>,
    /// Well-formedness error. The context halts afterwards.
    pub fatal_error: MessageSax<T>,
}

impl<T> SaxHandler<T> {
    /// A table with every entry unset.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            start_document: None,
            end_document: None,
            start_element: None,
            end_element: None,
            characters: None,
            ignorable_whitespace: None,
            cdata_block: None,
            comment: None,
            processing_instruction: None,
            warning: None,
            error: None,
            fatal_error: None,
        }
    }
}

impl<T> Default for SaxHandler<T> {
    fn default() -> Self {
        let mut hdlr = Self::empty();
        init_default_sax_handler(&mut hdlr);
        hdlr
    }
}

impl<T> Clone for SaxHandler<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SaxHandler<T> {}

impl<T> fmt::Debug for SaxHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaxHandler")
            .field("start_document", &self.start_document.is_some())
            .field("end_document", &self.end_document.is_some())
            .field("start_element", &self.start_element.is_some())
            .field("end_element", &self.end_element.is_some())
            .field("characters", &self.characters.is_some())
            .field("ignorable_whitespace", &self.ignorable_whitespace.is_some())
            .field("cdata_block", &self.cdata_block.is_some())
            .field("comment", &self.comment.is_some())
            .field(
                "processing_instruction",
                &self.processing_instruction.is_some(),
            )
            .field("warning", &self.warning.is_some())
            .field("error", &self.error.is_some())
            .field("fatal_error", &self.fatal_error.is_some())
            .finish()
    }
}

/// Resets `hdlr` to the stock tree-building table.
///
/// Note that the stock `ignorable_whitespace` entry is the same text builder
/// as `characters`, so blank runs still end up in the tree unless the entry
/// is overridden.
pub fn init_default_sax_handler<T>(hdlr: &mut SaxHandler<T>) {
    hdlr.start_document = Some(sax2_start_document);
    hdlr.end_document = Some(sax2_end_document);
    hdlr.start_element = Some(sax2_start_element);
    hdlr.end_element = Some(sax2_end_element);
    hdlr.characters = Some(sax2_characters);
    hdlr.ignorable_whitespace = Some(sax2_characters);
    hdlr.cdata_block = Some(sax2_cdata_block);
    hdlr.comment = Some(sax2_comment);
    hdlr.processing_instruction = Some(sax2_processing_instruction);
    hdlr.warning = Some(parser_warning);
    hdlr.error = Some(parser_error);
    hdlr.fatal_error = Some(parser_error);
}

// ---------------------------------------------------------------------------
// Stock tree builders
// ---------------------------------------------------------------------------

/// Creates `ctxt.my_doc`, copying the XML declaration fields into it.
pub fn sax2_start_document<T>(ctxt: &mut ParserContext<'_, T>) {
    let mut doc = Document::new();
    let decl = ctxt.declaration();
    doc.version = decl.version.clone();
    doc.encoding = decl.encoding.clone();
    doc.standalone = decl.standalone;
    ctxt.node_stack.clear();
    ctxt.my_doc = Some(doc);
}

/// Nothing left to do once the last element closed.
pub fn sax2_end_document<T>(ctxt: &mut ParserContext<'_, T>) {
    ctxt.node_stack.clear();
}

/// Appends an element under the current node and makes it current.
pub fn sax2_start_element<T>(
    ctxt: &mut ParserContext<'_, T>,
    name: &str,
    prefix: Option<&str>,
    namespace: Option<&str>,
    attributes: &[Attribute],
) {
    let Some(doc) = ctxt.my_doc.as_mut() else {
        return;
    };
    let parent = ctxt.node_stack.last().copied().unwrap_or_else(|| doc.root());
    let id = doc.create_node(NodeKind::Element {
        name: name.to_string(),
        prefix: prefix.map(String::from),
        namespace: namespace.map(String::from),
        attributes: attributes.to_vec(),
    });
    doc.append_child(parent, id);
    ctxt.node_stack.push(id);
}

/// Makes the parent of the current element current again.
pub fn sax2_end_element<T>(
    ctxt: &mut ParserContext<'_, T>,
    _name: &str,
    _prefix: Option<&str>,
    _namespace: Option<&str>,
) {
    ctxt.node_stack.pop();
}

/// Appends text under the current node, merging adjacent runs.
pub fn sax2_characters<T>(ctxt: &mut ParserContext<'_, T>, content: &str) {
    let Some(doc) = ctxt.my_doc.as_mut() else {
        return;
    };
    let parent = ctxt.node_stack.last().copied().unwrap_or_else(|| doc.root());
    doc.append_text(parent, content);
}

/// Appends a CDATA section under the current node.
pub fn sax2_cdata_block<T>(ctxt: &mut ParserContext<'_, T>, content: &str) {
    append_leaf(
        ctxt,
        NodeKind::CData {
            content: content.to_string(),
        },
    );
}

/// Appends a comment under the current node (or the document node).
pub fn sax2_comment<T>(ctxt: &mut ParserContext<'_, T>, content: &str) {
    append_leaf(
        ctxt,
        NodeKind::Comment {
            content: content.to_string(),
        },
    );
}

/// Appends a processing instruction under the current node.
pub fn sax2_processing_instruction<T>(
    ctxt: &mut ParserContext<'_, T>,
    target: &str,
    data: Option<&str>,
) {
    append_leaf(
        ctxt,
        NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.map(String::from),
        },
    );
}

fn append_leaf<T>(ctxt: &mut ParserContext<'_, T>, kind: NodeKind) {
    let Some(doc) = ctxt.my_doc.as_mut() else {
        return;
    };
    let parent = ctxt.node_stack.last().copied().unwrap_or_else(|| doc.root());
    let id = doc.create_node(kind);
    doc.append_child(parent, id);
}

// ---------------------------------------------------------------------------
// Stock diagnostics
// ---------------------------------------------------------------------------

fn parser_warning<T>(ctxt: &mut ParserContext<'_, T>, message: fmt::Arguments<'_>) {
    tracing::warn!(location = %ctxt.location(), "{}", message.to_string().trim_end());
}

fn parser_error<T>(ctxt: &mut ParserContext<'_, T>, message: fmt::Arguments<'_>) {
    tracing::error!(location = %ctxt.location(), "{}", message.to_string().trim_end());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<String>,
    }

    fn record(ctxt: &mut ParserContext<'_, Recorder>, event: String) {
        if let Some(rec) = ctxt.private_mut() {
            rec.events.push(event);
        }
    }

    fn recording_handler() -> SaxHandler<Recorder> {
        let mut sax = SaxHandler::empty();
        sax.start_document = Some(|c| record(c, "start_document".into()));
        sax.end_document = Some(|c| record(c, "end_document".into()));
        sax.start_element = Some(|c, name, prefix, ns, attrs| {
            use std::fmt::Write;
            let mut event = format!("start_element({name}");
            if let Some(p) = prefix {
                let _ = write!(event, ", prefix={p}");
            }
            if let Some(ns) = ns {
                let _ = write!(event, ", ns={ns}");
            }
            for a in attrs {
                let _ = write!(event, ", {}={}", a.qualified_name(), a.value);
            }
            event.push(')');
            record(c, event);
        });
        sax.end_element = Some(|c, name, _, _| record(c, format!("end_element({name})")));
        sax.characters = Some(|c, text| record(c, format!("characters({text})")));
        sax.ignorable_whitespace = Some(|c, text| record(c, format!("blank({})", text.len())));
        sax.cdata_block = Some(|c, text| record(c, format!("cdata({text})")));
        sax.comment = Some(|c, text| record(c, format!("comment({text})")));
        sax.processing_instruction = Some(|c, target, data| {
            record(c, format!("pi({target}, {})", data.unwrap_or("-")));
        });
        sax.warning = Some(|c, m| record(c, format!("warning({})", m.to_string().trim_end())));
        sax.error = Some(|c, m| record(c, format!("error({})", m.to_string().trim_end())));
        sax.fatal_error = Some(|c, m| record(c, format!("fatal({})", m.to_string().trim_end())));
        sax
    }

    fn events(input: &str) -> Vec<String> {
        let mut rec = Recorder::default();
        let mut ctxt = ParserContext::from_memory(input.as_bytes()).unwrap();
        ctxt.set_sax(recording_handler());
        ctxt.set_private(&mut rec);
        ctxt.parse_document();
        drop(ctxt);
        rec.events
    }

    #[test]
    fn test_empty_element_events() {
        assert_eq!(
            events("<root/>"),
            vec![
                "start_document",
                "start_element(root)",
                "end_element(root)",
                "end_document"
            ]
        );
    }

    #[test]
    fn test_mixed_content_events() {
        assert_eq!(
            events("<p>Hello <b>world</b>&amp;<![CDATA[x<y]]><!--c--><?t d?></p>"),
            vec![
                "start_document",
                "start_element(p)",
                "characters(Hello )",
                "start_element(b)",
                "characters(world)",
                "end_element(b)",
                "characters(&)",
                "cdata(x<y)",
                "comment(c)",
                "pi(t, d)",
                "end_element(p)",
                "end_document",
            ]
        );
    }

    #[test]
    fn test_namespace_events() {
        assert_eq!(
            events("<x:a xmlns:x=\"urn:x\" x:k=\"v\"/>"),
            vec![
                "start_document",
                "start_element(a, prefix=x, ns=urn:x, xmlns:x=urn:x, x:k=v)",
                "end_element(a)",
                "end_document",
            ]
        );
    }

    #[test]
    fn test_fatal_error_stops_events() {
        let evs = events("<a><b></a><c/>");
        assert_eq!(
            evs,
            vec![
                "start_document",
                "start_element(a)",
                "start_element(b)",
                "fatal(Opening and ending tag mismatch: b line 1 and a)",
            ]
        );
    }

    #[test]
    fn test_blank_runs_go_to_characters_by_default() {
        let evs = events("<a> <b/></a>");
        assert!(evs.contains(&"characters( )".to_string()));
    }

    #[test]
    fn test_stock_handler_builds_tree() {
        let mut ctxt = ParserContext::<()>::from_memory(b"<a x='1'><b>t</b><!--c--></a>").unwrap();
        assert_eq!(ctxt.parse_document(), 0);
        let doc = ctxt.take_document().unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.node_name(a), Some("a"));
        assert_eq!(doc.attribute(a, "x"), Some("1"));
        let kids: Vec<_> = doc.children(a).collect();
        assert_eq!(kids.len(), 2);
        assert_eq!(doc.text_content(kids[0]), "t");
        assert_eq!(doc.node_text(kids[1]), Some("c"));
    }

    #[test]
    fn test_debug_lists_installed_hooks() {
        let text = format!("{:?}", SaxHandler::<()>::empty());
        assert!(text.contains("characters: false"));
        let text = format!("{:?}", SaxHandler::<()>::default());
        assert!(text.contains("characters: true"));
    }
}

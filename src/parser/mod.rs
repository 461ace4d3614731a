//! Low-level parser context.
//!
//! A [`ParserContext`] is the per-parse record the SAX layer works against.
//! It holds the input, the callback table ([`SaxHandler`]), an opaque
//! back-pointer to caller state (`private`), the tree built by the stock
//! handlers (`my_doc`) and the well-formedness verdict. Events come from
//! `quick-xml`; this layer adds the checks the XML 1.0 well-formedness
//! rules require on top of it (single root, matching end tags, namespace
//! bindings, declared entities) and reports them with libxml2's wording.
//!
//! Two entry points mirror libxml2:
//!
//! - [`ParserContext::from_memory`] + [`ParserContext::parse_document`]
//!   give the caller full control over the table and back-pointer.
//! - [`sax_parse_file_with_data`] reads a file, runs a whole parse with the
//!   given table and user data, and returns the tree only if the document
//!   was well-formed.

mod chars;
mod dtd;
mod namespace;
mod xml;

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use crate::error::{ErrorSeverity, SourceLocation};
use crate::sax::SaxHandler;
use crate::tree::{Document, NodeId};

/// Default maximum element nesting depth.
pub const DEFAULT_MAX_DEPTH: u32 = 256;

/// Parse options.
///
/// ```
/// use xmlwrap::parser::ParseOptions;
///
/// let opts = ParseOptions::default().keep_blanks(false).max_depth(64);
/// assert!(!opts.keep_blanks);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Whether whitespace-only text counts as content (`true`, the default)
    /// or is routed to the `ignorable_whitespace` callback.
    pub keep_blanks: bool,
    /// Whether prefixes are resolved against `xmlns` declarations.
    pub namespaces: bool,
    /// Maximum element nesting depth.
    pub max_depth: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            keep_blanks: true,
            namespaces: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParseOptions {
    /// Keeps or routes away whitespace-only text.
    #[must_use]
    pub fn keep_blanks(mut self, yes: bool) -> Self {
        self.keep_blanks = yes;
        self
    }

    /// Enables or disables namespace processing.
    #[must_use]
    pub fn namespaces(mut self, yes: bool) -> Self {
        self.namespaces = yes;
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: u32) -> Self {
        self.max_depth = max;
        self
    }
}

/// A parser context could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError {
    /// Why creation failed.
    pub message: String,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ContextError {}

/// Fields of the XML declaration, as read by the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDeclaration {
    /// `version` pseudo-attribute.
    pub version: Option<String>,
    /// `encoding` pseudo-attribute.
    pub encoding: Option<String>,
    /// `standalone` pseudo-attribute.
    pub standalone: Option<bool>,
}

/// Per-parse state shared between the driver and the SAX callbacks.
///
/// `T` is the type of the caller state reachable through the back-pointer.
/// A context parses once; later calls to [`parse_document`] report failure
/// without raising any callbacks.
///
/// [`parse_document`]: ParserContext::parse_document
pub struct ParserContext<'a, T> {
    input: Cow<'a, [u8]>,
    /// The callback table. `None` parses without raising any events.
    pub sax: Option<SaxHandler<T>>,
    /// Opaque back-pointer to caller state.
    pub private: Option<&'a mut T>,
    /// The tree built by the stock handlers, if any.
    pub my_doc: Option<Document>,
    /// Cleared by the first well-formedness error.
    pub well_formed: bool,
    /// Cleared by the first namespace error.
    pub ns_well_formed: bool,
    options: ParseOptions,
    declaration: XmlDeclaration,
    location: SourceLocation,
    /// Open elements of the tree under construction.
    pub(crate) node_stack: Vec<NodeId>,
    disable_sax: bool,
    halted: bool,
    consumed: bool,
}

impl<'a, T> ParserContext<'a, T> {
    /// Creates a context over an in-memory buffer, with the stock callback
    /// table installed and no back-pointer.
    ///
    /// # Errors
    ///
    /// Returns `ContextError` for an empty buffer, or one larger than
    /// `i32::MAX` bytes.
    pub fn from_memory(data: &'a [u8]) -> Result<Self, ContextError> {
        if data.is_empty() {
            return Err(ContextError {
                message: "empty input buffer".to_string(),
            });
        }
        if i32::try_from(data.len()).is_err() {
            return Err(ContextError {
                message: format!("input buffer of {} bytes is too large", data.len()),
            });
        }
        Ok(Self::with_input(Cow::Borrowed(data)))
    }

    /// Creates a context over the contents of a file.
    ///
    /// # Errors
    ///
    /// Returns `ContextError` if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self, ContextError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self::with_input(Cow::Owned(bytes))),
            Err(err) => Err(ContextError {
                message: format!("failed to load external entity \"{}\": {err}", path.display()),
            }),
        }
    }

    fn with_input(input: Cow<'a, [u8]>) -> Self {
        Self {
            input,
            sax: Some(SaxHandler::default()),
            private: None,
            my_doc: None,
            well_formed: true,
            ns_well_formed: true,
            options: ParseOptions::default(),
            declaration: XmlDeclaration::default(),
            location: SourceLocation::default(),
            node_stack: Vec::new(),
            disable_sax: false,
            halted: false,
            consumed: false,
        }
    }

    /// Replaces the parse options.
    pub fn set_options(&mut self, options: ParseOptions) {
        self.options = options;
    }

    /// Returns the parse options.
    #[must_use]
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Installs a callback table.
    pub fn set_sax(&mut self, sax: SaxHandler<T>) {
        self.sax = Some(sax);
    }

    /// Detaches the callback table, returning it.
    pub fn take_sax(&mut self) -> Option<SaxHandler<T>> {
        self.sax.take()
    }

    /// Wires the caller state into the context.
    pub fn set_private(&mut self, data: &'a mut T) {
        self.private = Some(data);
    }

    /// Reaches the caller state, if any was wired in.
    pub fn private_mut(&mut self) -> Option<&mut T> {
        self.private.as_deref_mut()
    }

    /// Moves the built tree out of the context.
    pub fn take_document(&mut self) -> Option<Document> {
        self.my_doc.take()
    }

    /// Asks the parser to stop as soon as possible.
    ///
    /// No further structural events are raised. Diagnostics already being
    /// reported for the current markup may still arrive.
    pub fn stop(&mut self) {
        self.disable_sax = true;
        self.halted = true;
    }

    /// Returns true once [`stop`](Self::stop) was called or a fatal error
    /// halted the parse.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.halted
    }

    /// Location of the markup currently being processed.
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        self.location
    }

    /// The XML declaration read so far.
    #[must_use]
    pub fn declaration(&self) -> &XmlDeclaration {
        &self.declaration
    }

    /// Runs the parse to completion (or until stopped).
    ///
    /// Returns 0 if the document is well-formed and -1 otherwise.
    pub fn parse_document(&mut self) -> i32 {
        if self.consumed {
            return -1;
        }
        self.consumed = true;
        let input = std::mem::take(&mut self.input);
        tracing::debug!(bytes = input.len(), "parsing document");
        xml::drive(self, &input);
        if self.well_formed {
            0
        } else {
            -1
        }
    }

    // --- Dispatch ---------------------------------------------------------

    pub(crate) fn report(&mut self, severity: ErrorSeverity, message: fmt::Arguments<'_>) {
        let hook = match severity {
            ErrorSeverity::Warning => self.sax.and_then(|h| h.warning),
            ErrorSeverity::Error => {
                self.ns_well_formed = false;
                self.sax.and_then(|h| h.error)
            }
            ErrorSeverity::Fatal => {
                self.well_formed = false;
                self.sax.and_then(|h| h.fatal_error)
            }
        };
        if let Some(cb) = hook {
            cb(self, message);
        }
        if severity == ErrorSeverity::Fatal {
            self.stop();
        }
    }

    fn hooks(&self) -> Option<SaxHandler<T>> {
        if self.disable_sax {
            None
        } else {
            self.sax
        }
    }

    pub(crate) fn start_document(&mut self) {
        if let Some(cb) = self.hooks().and_then(|h| h.start_document) {
            cb(self);
        }
    }

    pub(crate) fn end_document(&mut self) {
        if let Some(cb) = self.hooks().and_then(|h| h.end_document) {
            cb(self);
        }
    }

    pub(crate) fn start_element(
        &mut self,
        name: &str,
        prefix: Option<&str>,
        namespace: Option<&str>,
        attributes: &[crate::tree::Attribute],
    ) {
        if let Some(cb) = self.hooks().and_then(|h| h.start_element) {
            cb(self, name, prefix, namespace, attributes);
        }
    }

    pub(crate) fn end_element(&mut self, name: &str, prefix: Option<&str>, namespace: Option<&str>) {
        if let Some(cb) = self.hooks().and_then(|h| h.end_element) {
            cb(self, name, prefix, namespace);
        }
    }

    pub(crate) fn characters(&mut self, content: &str) {
        if let Some(cb) = self.hooks().and_then(|h| h.characters) {
            cb(self, content);
        }
    }

    pub(crate) fn ignorable_whitespace(&mut self, content: &str) {
        if let Some(cb) = self.hooks().and_then(|h| h.ignorable_whitespace) {
            cb(self, content);
        }
    }

    pub(crate) fn cdata_block(&mut self, content: &str) {
        if let Some(cb) = self.hooks().and_then(|h| h.cdata_block) {
            cb(self, content);
        }
    }

    pub(crate) fn comment(&mut self, content: &str) {
        if let Some(cb) = self.hooks().and_then(|h| h.comment) {
            cb(self, content);
        }
    }

    pub(crate) fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        if let Some(cb) = self.hooks().and_then(|h| h.processing_instruction) {
            cb(self, target, data);
        }
    }
}

impl<T> fmt::Debug for ParserContext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserContext")
            .field("input_len", &self.input.len())
            .field("sax", &self.sax)
            .field("has_private", &self.private.is_some())
            .field("has_doc", &self.my_doc.is_some())
            .field("well_formed", &self.well_formed)
            .field("ns_well_formed", &self.ns_well_formed)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Parses a file with the given callback table and user data.
///
/// The user data is wired into the context before any event is raised.
/// Returns the tree built by the table's handlers if the document was
/// well-formed, and `None` otherwise, including when the file could not be
/// read (no callback fires in that case).
pub fn sax_parse_file_with_data<T>(
    sax: &SaxHandler<T>,
    path: impl AsRef<Path>,
    options: &ParseOptions,
    data: &mut T,
) -> Option<Document> {
    let path = path.as_ref();
    let mut ctxt = match ParserContext::from_file(path) {
        Ok(ctxt) => ctxt,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot create file parser context");
            return None;
        }
    };
    ctxt.set_options(options.clone());
    ctxt.set_sax(*sax);
    ctxt.set_private(data);
    ctxt.parse_document();

    let doc = ctxt.take_document();
    if ctxt.well_formed {
        doc
    } else {
        None
    }
}

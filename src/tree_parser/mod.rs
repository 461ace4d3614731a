//! Tree-building parser.
//!
//! [`TreeParser`] parses a whole document into a [`Document`] and reports
//! the outcome through a uniform query surface. Each construction owns one
//! short-lived parse session; the session's callbacks record the first
//! error, note whether any warning fired and stop the parser on error.
//!
//! Failure is all-or-nothing: a tree built before an error was flagged is
//! dropped, never exposed. With `allow_exceptions` set the constructors
//! return `Err(Error::Parse(..))`; without it they return a parser that
//! answers `failed() == true` and holds an empty document. A parser context
//! that cannot be created at all is always an error.
//!
//! ```
//! use xmlwrap::TreeParser;
//!
//! let parser = TreeParser::from_memory(b"<a><b/></a>", true).unwrap();
//! assert!(!parser.failed());
//! let doc = parser.document().get().unwrap();
//! let a = doc.root_element().unwrap();
//! assert_eq!(doc.children(a).count(), 1);
//!
//! let parser = TreeParser::from_memory(b"<a><b></a>", false).unwrap();
//! assert!(parser.failed());
//! assert_eq!(parser.error_message(), "Opening and ending tag mismatch: b line 1 and a");
//! ```

mod session;

pub use session::UNKNOWN_ERROR;

use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};
use crate::parser::{sax_parse_file_with_data, ParseOptions, ParserContext};
use crate::tree::DocumentHandle;

use session::ParseSession;

/// Result of parsing one document into a tree.
///
/// The parser owns its document handle and is not `Clone`:
///
/// ```compile_fail
/// let parser = xmlwrap::TreeParser::parse_memory(b"<a/>").unwrap();
/// let copy = parser.clone();
/// ```
#[derive(Debug)]
pub struct TreeParser {
    document: DocumentHandle,
    error_message: String,
    had_warnings: bool,
    failed: bool,
}

impl TreeParser {
    /// Parses a file, returning an error if the document is unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the file cannot be read or is malformed.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(path, true)
    }

    /// Parses an in-memory document, returning an error if it is unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextCreation`] for an empty buffer and
    /// [`Error::Parse`] for malformed input.
    pub fn parse_memory(data: &[u8]) -> Result<Self> {
        Self::from_memory(data, true)
    }

    /// Parses a file with default options.
    ///
    /// # Errors
    ///
    /// See [`from_file_with_options`](Self::from_file_with_options).
    pub fn from_file(path: impl AsRef<Path>, allow_exceptions: bool) -> Result<Self> {
        Self::from_file_with_options(path, &ParseOptions::default(), allow_exceptions)
    }

    /// Parses a file.
    ///
    /// If the parse fails without recording any message, the file is opened
    /// once more to tell a missing or unreadable file apart from an unknown
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on failure when `allow_exceptions` is set.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        options: &ParseOptions,
        allow_exceptions: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut session = ParseSession::new(options);
        let callbacks = session.callbacks;
        session.success = true;

        match sax_parse_file_with_data(&callbacks, path, options, &mut session) {
            Some(doc) if session.success => session.document = Some(doc),
            Some(partial) => {
                tracing::debug!(nodes = partial.node_count(), "discarding partially built tree");
                drop(partial);
            }
            None => {
                session.success = false;
                if session.last_error == UNKNOWN_ERROR && File::open(path).is_err() {
                    session.last_error = format!("failed to open file \"{}\"", path.display());
                }
            }
        }

        tracing::debug!(path = %path.display(), success = session.success, "file parse finished");
        Self::finish(session, allow_exceptions)
    }

    /// Parses an in-memory document with default options.
    ///
    /// # Errors
    ///
    /// See [`from_memory_with_options`](Self::from_memory_with_options).
    pub fn from_memory(data: &[u8], allow_exceptions: bool) -> Result<Self> {
        Self::from_memory_with_options(data, &ParseOptions::default(), allow_exceptions)
    }

    /// Parses an in-memory document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextCreation`] if no parser context can be created
    /// for `data` (empty, or longer than `i32::MAX` bytes), regardless of
    /// `allow_exceptions`. Returns [`Error::Parse`] on a parse failure when
    /// `allow_exceptions` is set.
    pub fn from_memory_with_options(
        data: &[u8],
        options: &ParseOptions,
        allow_exceptions: bool,
    ) -> Result<Self> {
        let mut session = ParseSession::new(options);
        let callbacks = session.callbacks;

        let mut ctxt = ParserContext::from_memory(data).map_err(|err| {
            tracing::warn!(error = %err, "cannot create memory parser context");
            Error::ContextCreation(err.message)
        })?;
        ctxt.set_options(options.clone());
        ctxt.take_sax();
        ctxt.set_sax(callbacks);
        session.success = true;
        ctxt.set_private(&mut session);

        let status = ctxt.parse_document();
        let well_formed = ctxt.well_formed;
        let tree = ctxt.take_document();
        ctxt.take_sax();
        drop(ctxt);

        match tree {
            Some(doc) if well_formed && status == 0 && session.success => {
                session.document = Some(doc);
            }
            partial => {
                if partial.is_some() {
                    tracing::debug!("discarding partially built tree");
                }
                session.success = false;
            }
        }

        tracing::debug!(bytes = data.len(), success = session.success, "memory parse finished");
        Self::finish(session, allow_exceptions)
    }

    fn finish(session: ParseSession, allow_exceptions: bool) -> Result<Self> {
        let ParseSession {
            document,
            last_error,
            had_warnings,
            success,
            ..
        } = session;

        match document {
            Some(doc) if success => Ok(Self {
                document: DocumentHandle::new(doc),
                error_message: last_error,
                had_warnings,
                failed: false,
            }),
            _ if allow_exceptions => Err(Error::Parse(last_error)),
            _ => Ok(Self {
                document: DocumentHandle::default(),
                error_message: last_error,
                had_warnings,
                failed: true,
            }),
        }
    }

    /// Returns true if the parse did not produce a tree.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// The first error recorded during the parse, or [`UNKNOWN_ERROR`].
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Returns true if any warning was raised during the parse.
    #[must_use]
    pub fn had_warnings(&self) -> bool {
        self.had_warnings
    }

    /// The parsed tree; an empty document if the parse failed.
    #[must_use]
    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    /// Mutable access to the tree, e.g. to release it to another owner.
    pub fn document_mut(&mut self) -> &mut DocumentHandle {
        &mut self.document
    }

    /// Consumes the parser, keeping only its document handle.
    #[must_use]
    pub fn into_document(self) -> DocumentHandle {
        self.document
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_success() {
        let parser = TreeParser::from_memory(b"<a><b/></a>", true).unwrap();
        assert!(!parser.failed());
        assert!(!parser.had_warnings());
        let doc = parser.document().get().unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.node_name(a), Some("a"));
        let kids: Vec<_> = doc.children(a).collect();
        assert_eq!(kids.len(), 1);
        assert_eq!(doc.node_name(kids[0]), Some("b"));
    }

    #[test]
    fn test_memory_failure_raises() {
        let err = TreeParser::from_memory(b"<a><b></a>", true).unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m != UNKNOWN_ERROR));
    }

    #[test]
    fn test_memory_failure_without_exceptions() {
        let parser = TreeParser::from_memory(b"<a><b></a>", false).unwrap();
        assert!(parser.failed());
        assert_ne!(parser.error_message(), UNKNOWN_ERROR);
        assert!(parser.document().get().unwrap().is_empty());
    }

    #[test]
    fn test_empty_buffer_always_errors() {
        let err = TreeParser::from_memory(b"", false).unwrap_err();
        assert!(matches!(err, Error::ContextCreation(_)));
    }

    #[test]
    fn test_namespace_error_discards_tree() {
        let parser = TreeParser::from_memory(b"<p:a/>", false).unwrap();
        assert!(parser.failed());
        assert_eq!(parser.error_message(), "Namespace prefix p on a is not defined");
        assert!(parser.document().get().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_diagnostic() {
        let parser = TreeParser::from_file("missing.xml", false).unwrap();
        assert!(parser.failed());
        assert_eq!(parser.error_message(), "failed to open file \"missing.xml\"");
    }

    #[test]
    fn test_keep_blanks_off_drops_whitespace() {
        let opts = ParseOptions::default().keep_blanks(false);
        let parser = TreeParser::from_memory_with_options(b"<a>\n  <b/>\n</a>", &opts, true).unwrap();
        let doc = parser.document().get().unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.children(a).count(), 1);
    }
}

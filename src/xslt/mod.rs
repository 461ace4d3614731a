//! Stylesheet application seam.
//!
//! A [`Stylesheet`] owns a compiled stylesheet together with the document
//! it was compiled from, and forwards parameters and errors between the
//! caller and a pluggable [`TransformEngine`]. Engines report problems
//! through [`TransformContext::error`]; any reported error makes the whole
//! application fail, even when the engine still produced a result.
//!
//! ```
//! use xmlwrap::tree::{Document, DocumentHandle};
//! use xmlwrap::xslt::{Stylesheet, TransformContext, TransformEngine};
//! use xmlwrap::TreeParser;
//!
//! /// Copies the input unchanged.
//! struct Identity;
//!
//! impl TransformEngine for Identity {
//!     type Compiled = ();
//!
//!     fn compile(&self, _: &Document, _: &mut TransformContext) -> Option<()> {
//!         Some(())
//!     }
//!
//!     fn apply(
//!         &self,
//!         _: &(),
//!         input: &Document,
//!         _: &[(&str, &str)],
//!         _: &mut TransformContext,
//!     ) -> Option<Document> {
//!         Some(input.clone())
//!     }
//! }
//!
//! let mut style = TreeParser::parse_memory(b"<identity/>").unwrap();
//! let mut sheet = Stylesheet::from_document(style.document_mut(), Identity).unwrap();
//! assert!(style.document().is_released());
//!
//! let input = TreeParser::parse_memory(b"<a/>").unwrap();
//! let out = sheet.apply(input.document()).unwrap();
//! assert_eq!(sheet.save_to_string(&out), "<?xml version=\"1.0\"?>\n<a/>\n");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::serial;
use crate::tree::{Document, DocumentHandle};
use crate::util::format_message;
use crate::TreeParser;

/// Message used when compilation fails without any diagnostic.
pub const UNKNOWN_PARSER_ERROR: &str = "unknown XSLT parser error";

/// Message used when application fails without any diagnostic.
pub const UNKNOWN_TRANSFORM_ERROR: &str = "unknown XSLT transformation error";

/// Run state of one compilation or application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformState {
    /// Running normally.
    #[default]
    Ok,
    /// The engine hit an error it could not recover from.
    Error,
    /// A stop was requested; the engine should return as soon as possible.
    Stopped,
}

/// Error channel handed to a [`TransformEngine`] for one operation.
#[derive(Debug, Default)]
pub struct TransformContext {
    state: TransformState,
    errors_occurred: bool,
    message: String,
}

impl TransformContext {
    /// Creates a context in the [`TransformState::Ok`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports an error. Requests a stop if the context is still running
    /// and appends the message, newline-separated, to the text collected so
    /// far.
    pub fn error(&mut self, args: fmt::Arguments<'_>) {
        self.errors_occurred = true;
        if self.state == TransformState::Ok {
            self.state = TransformState::Stopped;
        }

        let mut text = String::new();
        format_message(&mut text, args);
        if text.is_empty() {
            return;
        }
        tracing::debug!(message = %text, "transformation error");
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(&text);
    }

    /// Marks the run as failed without a message.
    pub fn fail(&mut self) {
        self.errors_occurred = true;
        self.state = TransformState::Error;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransformState {
        self.state
    }

    /// Returns true once a stop was requested or the run failed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state != TransformState::Ok
    }

    /// Returns true if any error was reported.
    #[must_use]
    pub fn errors_occurred(&self) -> bool {
        self.errors_occurred
    }

    /// Messages collected so far.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn into_message_or(self, fallback: &str) -> String {
        if self.message.is_empty() {
            fallback.to_string()
        } else {
            self.message
        }
    }
}

/// A transformation engine.
pub trait TransformEngine {
    /// A compiled stylesheet.
    type Compiled;

    /// Compiles a parsed stylesheet. Returning `None`, or reporting an error
    /// through `ctxt`, fails the compilation.
    fn compile(&self, stylesheet: &Document, ctxt: &mut TransformContext) -> Option<Self::Compiled>;

    /// Applies a compiled stylesheet to `input`. `params` are
    /// `(name, value)` pairs in name order.
    fn apply(
        &self,
        compiled: &Self::Compiled,
        input: &Document,
        params: &[(&str, &str)],
        ctxt: &mut TransformContext,
    ) -> Option<Document>;
}

/// A compiled stylesheet bound to its engine.
pub struct Stylesheet<E: TransformEngine> {
    engine: E,
    compiled: E::Compiled,
    source: Document,
    error: String,
}

impl<E: TransformEngine> Stylesheet<E> {
    /// Parses and compiles a stylesheet file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the file is not usable XML and
    /// [`Error::Transform`] if compilation fails.
    pub fn from_file(path: impl AsRef<Path>, engine: E) -> Result<Self> {
        let mut parser = TreeParser::parse_file(path)?;
        Self::from_document(parser.document_mut(), engine)
    }

    /// Compiles the stylesheet held by `handle`. On success the tree is
    /// released from the handle and owned by the stylesheet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentReleased`] if the handle is empty and
    /// [`Error::Transform`] if compilation fails; the handle keeps its tree
    /// in that case.
    pub fn from_document(handle: &mut DocumentHandle, engine: E) -> Result<Self> {
        let mut ctxt = TransformContext::new();
        let compiled = engine.compile(handle.get()?, &mut ctxt);
        let compiled = match compiled {
            Some(compiled) if !ctxt.errors_occurred() => compiled,
            _ => return Err(Error::Transform(ctxt.into_message_or(UNKNOWN_PARSER_ERROR))),
        };
        let source = handle.release()?;
        tracing::debug!(nodes = source.node_count(), "stylesheet compiled");
        Ok(Self {
            engine,
            compiled,
            source,
            error: String::new(),
        })
    }

    /// Applies the stylesheet without parameters.
    ///
    /// # Errors
    ///
    /// See [`apply_with_params`](Self::apply_with_params).
    pub fn apply(&mut self, input: &DocumentHandle) -> Result<Document> {
        self.apply_with_params(input, &BTreeMap::new())
    }

    /// Applies the stylesheet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentReleased`] if `input` was released, and
    /// [`Error::Transform`] if the engine reported an error or produced no
    /// result.
    pub fn apply_with_params(
        &mut self,
        input: &DocumentHandle,
        params: &BTreeMap<String, String>,
    ) -> Result<Document> {
        let doc = input.get()?;
        let params: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let mut ctxt = TransformContext::new();
        let result = self.engine.apply(&self.compiled, doc, &params, &mut ctxt);
        match result {
            Some(out) if !ctxt.errors_occurred() => {
                self.error.clear();
                Ok(out)
            }
            discarded => {
                if discarded.is_some() {
                    tracing::debug!("discarding result produced despite errors");
                }
                self.error = ctxt.into_message_or(UNKNOWN_TRANSFORM_ERROR);
                Err(Error::Transform(self.error.clone()))
            }
        }
    }

    /// Applies the stylesheet and stores the result in `output`. Returns
    /// false on failure, leaving `output` untouched; the reason is then
    /// available from [`error_message`](Self::error_message).
    pub fn apply_into(&mut self, input: &DocumentHandle, output: &mut DocumentHandle) -> bool {
        self.apply_into_with_params(input, output, &BTreeMap::new())
    }

    /// [`apply_into`](Self::apply_into) with parameters.
    pub fn apply_into_with_params(
        &mut self,
        input: &DocumentHandle,
        output: &mut DocumentHandle,
        params: &BTreeMap<String, String>,
    ) -> bool {
        match self.apply_with_params(input, params) {
            Ok(doc) => {
                output.set(doc);
                true
            }
            Err(Error::Transform(_)) => false,
            Err(err) => {
                self.error = err.to_string();
                false
            }
        }
    }

    /// The error text of the last failed application; empty after a
    /// successful one.
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error
    }

    /// The stylesheet tree this stylesheet was compiled from.
    #[must_use]
    pub fn source(&self) -> &Document {
        &self.source
    }

    /// Serializes a transformation result.
    #[must_use]
    pub fn save_to_string(&self, result: &Document) -> String {
        serial::serialize(result)
    }
}

impl<E: TransformEngine> fmt::Debug for Stylesheet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stylesheet")
            .field("source_nodes", &self.source.node_count())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_appends_with_separator() {
        let mut ctxt = TransformContext::new();
        ctxt.error(format_args!("first\n"));
        ctxt.error(format_args!("second {}\n", 2));
        assert_eq!(ctxt.message(), "first\nsecond 2");
        assert!(ctxt.errors_occurred());
        assert_eq!(ctxt.state(), TransformState::Stopped);
    }

    #[test]
    fn test_error_keeps_failed_state() {
        let mut ctxt = TransformContext::new();
        ctxt.fail();
        ctxt.error(format_args!("late"));
        assert_eq!(ctxt.state(), TransformState::Error);
        assert!(ctxt.is_stopped());
    }

    #[test]
    fn test_empty_message_only_sets_flag() {
        let mut ctxt = TransformContext::new();
        ctxt.error(format_args!(""));
        assert!(ctxt.errors_occurred());
        assert_eq!(ctxt.message(), "");
        assert_eq!(ctxt.into_message_or(UNKNOWN_TRANSFORM_ERROR), UNKNOWN_TRANSFORM_ERROR);
    }
}

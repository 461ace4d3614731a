//! Error types and diagnostics.
//!
//! Two layers live here. The low-level parser context reports problems as a
//! severity plus a formatted message through its SAX callback table, with a
//! [`SourceLocation`] available on the context for the stock handlers. The
//! public façade (tree parser, document handle, stylesheet) surfaces a single
//! [`Error`] type whose `Display` is the human-readable message.

use std::fmt;

/// Severity of a diagnostic raised by the parser context, matching libxml2's
/// `xmlErrorLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// A non-fatal issue that doesn't affect well-formedness.
    Warning,
    /// A recoverable error (for example a namespace error). The document may
    /// still be well-formed, but the result should not be trusted.
    Error,
    /// A well-formedness violation. The parser stops.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset into the decoded input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Result alias used throughout the public API.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type surfaced by the tree parser, document handles and
/// stylesheets.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input was malformed, or a file could not be read. The payload is
    /// the message recorded during the parse.
    #[error("{0}")]
    Parse(String),

    /// A parser context could not be created at all. Raised even when the
    /// caller asked for non-throwing construction, since there is no parser
    /// object to hand back.
    #[error("unable to create parser context: {0}")]
    ContextCreation(String),

    /// A document handle was read or released after its tree had already
    /// been handed to another owner.
    #[error("document has already been released")]
    DocumentReleased,

    /// A stylesheet could not be compiled or applied.
    #[error("{0}")]
    Transform(String),

    /// I/O failure outside of parsing (e.g. writing serialized output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation {
            line: 10,
            column: 5,
            byte_offset: 42,
        };
        assert_eq!(loc.to_string(), "10:5");
    }

    #[test]
    fn test_error_severity_display() {
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
        assert_eq!(ErrorSeverity::Error.to_string(), "error");
        assert_eq!(ErrorSeverity::Fatal.to_string(), "fatal error");
    }

    #[test]
    fn test_parse_error_displays_message_verbatim() {
        let err = Error::Parse("Document is empty".to_string());
        assert_eq!(err.to_string(), "Document is empty");
    }

    #[test]
    fn test_context_creation_display() {
        let err = Error::ContextCreation("empty input buffer".to_string());
        assert_eq!(
            err.to_string(),
            "unable to create parser context: empty input buffer"
        );
    }

    #[test]
    fn test_released_display() {
        assert_eq!(
            Error::DocumentReleased.to_string(),
            "document has already been released"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        let _: &dyn std::error::Error = &err;
    }
}

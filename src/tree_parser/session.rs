//! Per-parse state and the callbacks that update it.
//!
//! The callbacks reach the session through the context's back-pointer.
//! Each body runs inside [`guarded`], so a panic never unwinds through the
//! driver's frames; it is swallowed and the diagnostic is lost.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::parser::{ParseOptions, ParserContext};
use crate::sax::SaxHandler;
use crate::tree::Document;
use crate::util::format_message;

/// Message kept when a parse fails without any diagnostic being recorded.
pub const UNKNOWN_ERROR: &str = "unknown XML parsing error";

/// Scratch state for one parse attempt.
pub(crate) struct ParseSession {
    /// The finished tree, set only once the parse is known to have succeeded.
    pub document: Option<Document>,
    /// First error recorded, or [`UNKNOWN_ERROR`].
    pub last_error: String,
    pub had_warnings: bool,
    pub success: bool,
    pub callbacks: SaxHandler<ParseSession>,
}

impl ParseSession {
    /// Creates a session whose callback table is the stock tree builder
    /// with the diagnostic hooks (and, without `keep_blanks`, the
    /// ignorable-whitespace hook) replaced.
    pub fn new(options: &ParseOptions) -> Self {
        let mut callbacks = SaxHandler::default();
        callbacks.warning = Some(on_warning);
        callbacks.error = Some(on_error);
        callbacks.fatal_error = Some(on_error);
        if !options.keep_blanks {
            callbacks.ignorable_whitespace = Some(on_ignorable_whitespace);
        }
        Self {
            document: None,
            last_error: UNKNOWN_ERROR.to_string(),
            had_warnings: false,
            success: false,
            callbacks,
        }
    }

    fn record_error(&mut self, message: fmt::Arguments<'_>) {
        if !self.success {
            return;
        }
        self.success = false;
        format_message(&mut self.last_error, message);
    }
}

impl fmt::Debug for ParseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseSession")
            .field("has_document", &self.document.is_some())
            .field("last_error", &self.last_error)
            .field("had_warnings", &self.had_warnings)
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}

/// Runs `body`, discarding any panic it raises.
pub(crate) fn guarded(body: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(body)).is_err() {
        tracing::error!("panic inside a parser callback was discarded");
    }
}

fn on_error(ctxt: &mut ParserContext<'_, ParseSession>, message: fmt::Arguments<'_>) {
    guarded(|| {
        let Some(session) = ctxt.private_mut() else {
            return;
        };
        session.record_error(message);
        ctxt.stop();
    });
}

fn on_warning(ctxt: &mut ParserContext<'_, ParseSession>, _message: fmt::Arguments<'_>) {
    guarded(|| {
        if let Some(session) = ctxt.private_mut() {
            session.had_warnings = true;
        }
    });
}

fn on_ignorable_whitespace(_ctxt: &mut ParserContext<'_, ParseSession>, _content: &str) {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_session_holds_sentinel() {
        let session = ParseSession::new(&ParseOptions::default());
        assert_eq!(session.last_error, UNKNOWN_ERROR);
        assert!(!session.had_warnings);
        assert!(session.document.is_none());
    }

    #[test]
    fn test_whitespace_hook_installed_only_without_keep_blanks() {
        let kept = ParseSession::new(&ParseOptions::default());
        let stripped = ParseSession::new(&ParseOptions::default().keep_blanks(false));
        let noop: fn(&mut ParserContext<'_, ParseSession>, &str) = on_ignorable_whitespace;
        assert!(kept.callbacks.ignorable_whitespace.is_some());
        assert_eq!(
            stripped.callbacks.ignorable_whitespace.map(|f| f as usize),
            Some(noop as usize)
        );
        assert_ne!(
            kept.callbacks.ignorable_whitespace.map(|f| f as usize),
            Some(noop as usize)
        );
    }

    #[test]
    fn test_first_error_wins() {
        let mut session = ParseSession::new(&ParseOptions::default());
        session.success = true;
        session.record_error(format_args!("first problem\n"));
        session.record_error(format_args!("second problem\n"));
        assert!(!session.success);
        assert_eq!(session.last_error, "first problem");
    }

    #[test]
    fn test_callbacks_without_back_pointer_are_noops() {
        let mut ctxt = ParserContext::<ParseSession>::from_memory(b"<a").unwrap();
        on_error(&mut ctxt, format_args!("ignored"));
        on_warning(&mut ctxt, format_args!("ignored"));
        assert!(!ctxt.is_stopped());
    }

    #[test]
    fn test_error_callback_stops_the_parser() {
        let mut session = ParseSession::new(&ParseOptions::default());
        session.success = true;
        let mut ctxt = ParserContext::from_memory(b"<a/>").unwrap();
        ctxt.set_private(&mut session);
        on_error(&mut ctxt, format_args!("Namespace prefix {} on {} is not defined\n", "p", "a"));
        assert!(ctxt.is_stopped());
        drop(ctxt);
        assert_eq!(session.last_error, "Namespace prefix p on a is not defined");
    }

    #[test]
    fn test_warning_only_sets_flag() {
        let mut session = ParseSession::new(&ParseOptions::default());
        session.success = true;
        let mut ctxt = ParserContext::from_memory(b"<a/>").unwrap();
        ctxt.set_private(&mut session);
        on_warning(&mut ctxt, format_args!("Unsupported version '1.1'\n"));
        on_warning(&mut ctxt, format_args!("another\n"));
        assert!(!ctxt.is_stopped());
        drop(ctxt);
        assert!(session.had_warnings);
        assert!(session.success);
        assert_eq!(session.last_error, UNKNOWN_ERROR);
    }

    #[test]
    fn test_guarded_swallows_panics() {
        let mut reached = false;
        guarded(|| panic!("callback failure"));
        guarded(|| reached = true);
        assert!(reached);
    }
}

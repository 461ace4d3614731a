//! Bounded message formatting for callback diagnostics.
//!
//! Parser and transformation callbacks receive their message as a template
//! plus arguments. [`format_message`] renders that into a fixed-size buffer
//! and drops the trailing newline libxml2-style messages carry.

use std::fmt::{self, Write};

/// Size of the formatting buffer, terminator included. At most
/// `MESSAGE_BUFFER_SIZE - 1` bytes of text survive formatting.
pub const MESSAGE_BUFFER_SIZE: usize = 512;

/// Formats `args` into `out`.
///
/// The rendered text is truncated to `MESSAGE_BUFFER_SIZE - 1` bytes on a
/// UTF-8 character boundary, and a single trailing `'\n'` is stripped. If
/// formatting produces no text at all, `out` is left untouched, so callers
/// should initialise it beforehand (to an empty string or a sentinel).
///
/// # Examples
///
/// ```
/// use xmlwrap::util::format_message;
///
/// let mut msg = String::from("unknown");
/// format_message(&mut msg, format_args!("tag mismatch: {}\n", "b"));
/// assert_eq!(msg, "tag mismatch: b");
///
/// format_message(&mut msg, format_args!(""));
/// assert_eq!(msg, "tag mismatch: b");
/// ```
pub fn format_message(out: &mut String, args: fmt::Arguments<'_>) {
    let mut buffer = BoundedBuffer::new(MESSAGE_BUFFER_SIZE - 1);
    // BoundedBuffer never fails; a failing Display impl just leaves a prefix.
    let _ = buffer.write_fmt(args);

    let mut text = buffer.into_inner();
    if text.is_empty() {
        return;
    }
    if text.ends_with('\n') {
        text.pop();
    }
    *out = text;
}

/// A `fmt::Write` sink that silently stops accepting text once full.
struct BoundedBuffer {
    buf: String,
    limit: usize,
    full: bool,
}

impl BoundedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::with_capacity(limit.min(128)),
            limit,
            full: false,
        }
    }

    fn into_inner(self) -> String {
        self.buf
    }
}

impl Write for BoundedBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.full {
            return Ok(());
        }
        let remaining = self.limit - self.buf.len();
        if s.len() <= remaining {
            self.buf.push_str(s);
            return Ok(());
        }
        let mut end = remaining;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        self.full = true;
        Ok(())
    }
}

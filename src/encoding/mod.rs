//! Input decoding for the parser context.
//!
//! The event reader only understands UTF-8, so every buffer handed to a
//! parser context goes through [`decode_to_utf8`] first:
//!
//! 1. A Byte Order Mark picks UTF-8 or UTF-16 and is skipped.
//! 2. Without a BOM the input is taken as UTF-8, unless the XML declaration
//!    names another ASCII-compatible encoding, in which case `encoding_rs`
//!    transcodes it.
//! 3. Line endings are normalised (`\r\n` and lone `\r` become `\n`), as
//!    XML 1.0 §2.11 requires before any markup is seen.

use std::borrow::Cow;
use std::fmt;

/// An error raised while detecting or transcoding the input encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    /// Human-readable message, already phrased as a parser diagnostic.
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EncodingError {}

/// Inspects the Byte Order Mark.
///
/// Returns the encoding it selects and how many bytes it occupies. Input
/// without a BOM is reported as UTF-8 with nothing to skip.
///
/// ```
/// use xmlwrap::encoding::detect_encoding;
///
/// assert_eq!(detect_encoding(b"\xEF\xBB\xBF<a/>"), ("UTF-8", 3));
/// assert_eq!(detect_encoding(b"\xFF\xFE<\x00"), ("UTF-16LE", 2));
/// assert_eq!(detect_encoding(b"<a/>"), ("UTF-8", 0));
/// ```
#[must_use]
pub fn detect_encoding(bytes: &[u8]) -> (&'static str, usize) {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => ("UTF-8", 3),
        [0xFE, 0xFF, ..] => ("UTF-16BE", 2),
        [0xFF, 0xFE, ..] => ("UTF-16LE", 2),
        _ => ("UTF-8", 0),
    }
}

/// Decodes raw XML bytes into normalised UTF-8 text.
///
/// Valid UTF-8 input without `\r` is returned borrowed.
///
/// # Errors
///
/// Returns `EncodingError` when the bytes are not valid in the detected
/// encoding, or when the declared encoding is unknown or contradicts the
/// actual byte layout.
pub fn decode_to_utf8(bytes: &[u8]) -> Result<Cow<'_, str>, EncodingError> {
    let (bom_encoding, skip) = detect_encoding(bytes);
    let content = &bytes[skip..];

    let text = if bom_encoding == "UTF-8" {
        match declared_encoding(content) {
            Some(label) if !is_utf8_compatible(&label) => {
                if label.to_ascii_uppercase().starts_with("UTF-16") {
                    return Err(EncodingError::new(
                        "Document labelled UTF-16 but has UTF-8 content",
                    ));
                }
                Cow::Owned(transcode(content, &label)?)
            }
            _ => match std::str::from_utf8(content) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => {
                    return Err(EncodingError::new(
                        "Input is not proper UTF-8, indicate encoding !",
                    ))
                }
            },
        }
    } else {
        Cow::Owned(transcode(content, bom_encoding)?)
    };

    Ok(normalize_line_endings(text))
}

/// Transcodes `bytes` from the encoding named by `label` into UTF-8.
///
/// # Errors
///
/// Returns `EncodingError` if `encoding_rs` doesn't know the label or the
/// input contains malformed sequences.
pub fn transcode(bytes: &[u8], label: &str) -> Result<String, EncodingError> {
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| EncodingError::new(format!("Unsupported encoding {label}")))?;
    let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(EncodingError::new(format!(
            "input conversion failed due to input error, bytes are not valid {label}"
        )));
    }
    Ok(decoded.into_owned())
}

fn normalize_line_endings(text: Cow<'_, str>) -> Cow<'_, str> {
    if !text.contains('\r') {
        return text;
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Reads the `encoding="..."` pseudo-attribute of the XML declaration
/// straight from the bytes. The declaration is ASCII in every encoding this
/// path handles, so no decoding is needed to find it.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let scan = &bytes[..bytes.len().min(256)];
    if !scan.starts_with(b"<?xml") {
        return None;
    }
    let end = scan.windows(2).position(|w| w == b"?>")?;
    let decl = &scan[..end];

    let needle = b"encoding";
    let pos = decl.windows(needle.len()).position(|w| w == needle)?;
    let rest = skip_ascii_whitespace(&decl[pos + needle.len()..]);
    let rest = skip_ascii_whitespace(rest.strip_prefix(b"=")?);

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &rest[1..];
    let close = value.iter().position(|&b| b == quote)?;
    let label = &value[..close];
    label
        .is_ascii()
        .then(|| String::from_utf8_lossy(label).into_owned())
}

fn skip_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let n = bytes
        .iter()
        .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    &bytes[n..]
}

/// Labels whose byte layout is already valid UTF-8 for XML input.
fn is_utf8_compatible(label: &str) -> bool {
    matches!(
        label.to_ascii_uppercase().as_str(),
        "UTF-8" | "UTF8" | "US-ASCII" | "ASCII"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_utf8_is_borrowed() {
        let decoded = decode_to_utf8(b"<root/>").unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "<root/>");
    }

    #[test]
    fn test_utf8_bom_is_skipped() {
        let decoded = decode_to_utf8(b"\xEF\xBB\xBF<root/>").unwrap();
        assert_eq!(decoded, "<root/>");
    }

    #[test]
    fn test_utf16le_with_bom() {
        let bytes = b"\xFF\xFE<\x00a\x00/\x00>\x00";
        assert_eq!(decode_to_utf8(bytes).unwrap(), "<a/>");
    }

    #[test]
    fn test_utf16be_with_bom() {
        let bytes = b"\xFE\xFF\x00<\x00a\x00/\x00>";
        assert_eq!(decode_to_utf8(bytes).unwrap(), "<a/>");
    }

    #[test]
    fn test_declared_latin1_is_transcoded() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p>caf\xE9</p>";
        let decoded = decode_to_utf8(bytes).unwrap();
        assert!(decoded.ends_with("<p>caf\u{e9}</p>"));
    }

    #[test]
    fn test_transcode_by_label() {
        assert_eq!(transcode(b"na\xEFve", "windows-1252").unwrap(), "na\u{ef}ve");
        let err = transcode(b"ok\xFF", "utf-8").unwrap_err();
        assert!(err.message.contains("bytes are not valid utf-8"));
        assert!(transcode(b"x", "klingon").is_err());
    }

    #[test]
    fn test_declared_ascii_stays_utf8() {
        let bytes = b"<?xml version='1.0' encoding='us-ascii'?><p/>";
        let decoded = decode_to_utf8(bytes).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_unknown_declared_encoding() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"x-no-such\"?><p/>";
        let err = decode_to_utf8(bytes).unwrap_err();
        assert_eq!(err.message, "Unsupported encoding x-no-such");
    }

    #[test]
    fn test_utf16_label_without_bom() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"UTF-16\"?><p/>";
        assert!(decode_to_utf8(bytes).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode_to_utf8(b"<p>\xFF\xFE\xFD</p>").unwrap_err();
        assert!(err.message.contains("not proper UTF-8"));
    }

    #[test]
    fn test_line_endings_normalised() {
        let decoded = decode_to_utf8(b"<a>\r\n<b/>\r</a>").unwrap();
        assert_eq!(decoded, "<a>\n<b/>\n</a>");
    }

    #[test]
    fn test_declared_encoding_single_quotes() {
        assert_eq!(
            declared_encoding(b"<?xml version='1.0' encoding = 'latin1'?>"),
            Some("latin1".to_string())
        );
        assert_eq!(declared_encoding(b"<?xml version='1.0'?>"), None);
        assert_eq!(declared_encoding(b"<root/>"), None);
    }
}

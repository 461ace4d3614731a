//! C API.
//!
//! Exposes tree parsing and document release to C callers. All symbols use
//! the `xmlwrap_` prefix.
//!
//! # Error Handling
//!
//! Functions that can fail return null. The reason is kept in thread-local
//! storage and can be read with [`xmlwrap_last_error`].
//!
//! # Ownership
//!
//! Parsers, documents and strings returned here are caller-owned and must
//! be freed with [`xmlwrap_tree_parser_free`],
//! [`xmlwrap_free_document`](document::xmlwrap_free_document) and
//! [`xmlwrap_free_string`](strings::xmlwrap_free_string) respectively.

#![allow(unsafe_code, clippy::missing_safety_doc)]

pub mod document;
pub mod strings;

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::Error;
use crate::tree::Document;
use crate::TreeParser;

use strings::to_c_string;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Returns the last error message on this thread, or null.
///
/// The string is owned by the library and stays valid until the next call
/// into this API on the same thread.
#[no_mangle]
pub extern "C" fn xmlwrap_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        let borrow = cell.borrow();
        borrow.as_ref().map_or(std::ptr::null(), |cs| cs.as_ptr())
    })
}

fn into_raw_parser(result: Result<TreeParser, Error>) -> *mut TreeParser {
    match result {
        Ok(parser) => {
            if parser.failed() {
                set_last_error(parser.error_message());
            }
            Box::into_raw(Box::new(parser))
        }
        Err(err) => {
            set_last_error(&err.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Parses a file into a tree.
///
/// With `allow_exceptions` a failed parse returns null. Without it the
/// parser is returned anyway and must be checked with
/// [`xmlwrap_tree_parser_failed`].
///
/// # Safety
///
/// `path` must be a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_from_file(
    path: *const c_char,
    allow_exceptions: bool,
) -> *mut TreeParser {
    clear_last_error();
    if path.is_null() {
        set_last_error("null path pointer");
        return std::ptr::null_mut();
    }
    // SAFETY: null-checked; the caller guarantees a valid C string.
    let path = unsafe { CStr::from_ptr(path) };
    let path = match path.to_str() {
        Ok(path) => path,
        Err(e) => {
            set_last_error(&format!("invalid UTF-8: {e}"));
            return std::ptr::null_mut();
        }
    };
    into_raw_parser(TreeParser::from_file(path, allow_exceptions))
}

/// Parses `len` bytes at `data` into a tree.
///
/// Returns null if no parser context could be created (null or empty
/// input), whatever `allow_exceptions` says.
///
/// # Safety
///
/// `data` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_from_memory(
    data: *const u8,
    len: usize,
    allow_exceptions: bool,
) -> *mut TreeParser {
    clear_last_error();
    if data.is_null() {
        set_last_error("null data pointer");
        return std::ptr::null_mut();
    }
    // SAFETY: null-checked; the caller guarantees `len` readable bytes.
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    into_raw_parser(TreeParser::from_memory(bytes, allow_exceptions))
}

/// Returns true if the parse failed. A null parser counts as failed.
///
/// # Safety
///
/// `parser` must come from one of the `xmlwrap_tree_parser_from_*`
/// functions, or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_failed(parser: *const TreeParser) -> bool {
    // SAFETY: the caller guarantees a valid pointer or null.
    unsafe { parser.as_ref() }.map_or(true, TreeParser::failed)
}

/// Returns true if any warning fired during the parse.
///
/// # Safety
///
/// As for [`xmlwrap_tree_parser_failed`].
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_had_warnings(parser: *const TreeParser) -> bool {
    // SAFETY: the caller guarantees a valid pointer or null.
    unsafe { parser.as_ref() }.is_some_and(TreeParser::had_warnings)
}

/// Returns a copy of the parse error message, or null for a null parser.
///
/// # Safety
///
/// As for [`xmlwrap_tree_parser_failed`].
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_error_message(parser: *const TreeParser) -> *mut c_char {
    // SAFETY: the caller guarantees a valid pointer or null.
    match unsafe { parser.as_ref() } {
        Some(parser) => to_c_string(parser.error_message()),
        None => std::ptr::null_mut(),
    }
}

/// Moves the parsed tree out of the parser.
///
/// Returns null (and sets the last error) on the second call. The document
/// must be freed with [`xmlwrap_free_document`](document::xmlwrap_free_document).
///
/// # Safety
///
/// `parser` must come from one of the `xmlwrap_tree_parser_from_*`
/// functions, or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_release_document(parser: *mut TreeParser) -> *mut Document {
    clear_last_error();
    // SAFETY: the caller guarantees a valid pointer or null.
    let Some(parser) = (unsafe { parser.as_mut() }) else {
        set_last_error("null parser pointer");
        return std::ptr::null_mut();
    };
    match parser.document_mut().release() {
        Ok(doc) => Box::into_raw(Box::new(doc)),
        Err(err) => {
            set_last_error(&err.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Frees a parser. Passing null does nothing.
///
/// # Safety
///
/// `parser` must come from one of the `xmlwrap_tree_parser_from_*`
/// functions and not have been freed yet, or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_tree_parser_free(parser: *mut TreeParser) {
    if !parser.is_null() {
        // SAFETY: created by `Box::into_raw` in `into_raw_parser`.
        unsafe {
            drop(Box::from_raw(parser));
        }
    }
}

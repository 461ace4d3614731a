//! Released documents.

use std::os::raw::c_char;

use crate::serial::serialize;
use crate::tree::Document;

use super::strings::to_c_string;

/// Returns the root element's name, or null for an empty document.
///
/// # Safety
///
/// `doc` must come from
/// [`xmlwrap_tree_parser_release_document`](super::xmlwrap_tree_parser_release_document),
/// or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_document_root_name(doc: *const Document) -> *mut c_char {
    // SAFETY: the caller guarantees a valid pointer or null.
    let Some(doc) = (unsafe { doc.as_ref() }) else {
        return std::ptr::null_mut();
    };
    doc.root_element()
        .and_then(|root| doc.node_name(root))
        .map_or(std::ptr::null_mut(), to_c_string)
}

/// Serializes the document to a caller-owned string.
///
/// # Safety
///
/// As for [`xmlwrap_document_root_name`].
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_document_to_string(doc: *const Document) -> *mut c_char {
    // SAFETY: the caller guarantees a valid pointer or null.
    match unsafe { doc.as_ref() } {
        Some(doc) => to_c_string(&serialize(doc)),
        None => std::ptr::null_mut(),
    }
}

/// Frees a released document. Passing null does nothing.
///
/// # Safety
///
/// `doc` must come from
/// [`xmlwrap_tree_parser_release_document`](super::xmlwrap_tree_parser_release_document)
/// and not have been freed yet, or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_free_document(doc: *mut Document) {
    if !doc.is_null() {
        // SAFETY: created by `Box::into_raw` when the document was released.
        unsafe {
            drop(Box::from_raw(doc));
        }
    }
}

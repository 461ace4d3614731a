//! Caller-owned C strings.

use std::ffi::CString;
use std::os::raw::c_char;

/// Copies `s` into a caller-owned C string; null if `s` contains NUL.
pub(crate) fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s).map_or(std::ptr::null_mut(), CString::into_raw)
}

/// Frees a string returned by this API. Passing null does nothing.
///
/// # Safety
///
/// `ptr` must have been returned by an `xmlwrap_` function and not freed
/// yet, or be null.
#[no_mangle]
pub unsafe extern "C" fn xmlwrap_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        // SAFETY: produced by `CString::into_raw` in `to_c_string`.
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

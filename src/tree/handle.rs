//! Ownership-aware document handle.
//!
//! A [`DocumentHandle`] owns one [`Document`] until the tree is released to
//! another owner (a stylesheet, a C caller). Release happens at most once:
//! afterwards every read, write or second release returns
//! [`Error::DocumentReleased`] instead of touching a tree that now belongs
//! to someone else.

use crate::error::{Error, Result};

use super::Document;

/// Owns a parsed tree, or remembers that it gave the tree away.
///
/// The default handle holds an empty document, which is what a failed
/// [`TreeParser`](crate::TreeParser) exposes.
///
/// ```
/// use xmlwrap::tree::{Document, DocumentHandle};
///
/// let mut handle = DocumentHandle::new(Document::new());
/// assert!(handle.get().is_ok());
///
/// let doc = handle.release().unwrap();
/// assert!(doc.is_empty());
/// assert!(handle.get().is_err());
/// assert!(handle.release().is_err());
/// ```
///
/// A handle cannot be duplicated, so a tree has a single owner:
///
/// ```compile_fail
/// let handle = xmlwrap::DocumentHandle::default();
/// let second_owner = handle.clone();
/// ```
#[derive(Debug)]
pub struct DocumentHandle {
    doc: Option<Document>,
}

impl DocumentHandle {
    /// Wraps a completed tree.
    #[must_use]
    pub fn new(doc: Document) -> Self {
        Self { doc: Some(doc) }
    }

    /// Takes ownership of a completed tree, dropping whatever the handle
    /// held before. A released handle becomes usable again.
    pub fn set(&mut self, doc: Document) {
        self.doc = Some(doc);
    }

    /// Borrows the tree for inspection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentReleased`] if the tree was released.
    pub fn get(&self) -> Result<&Document> {
        self.doc.as_ref().ok_or(Error::DocumentReleased)
    }

    /// Borrows the tree for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentReleased`] if the tree was released.
    pub fn get_mut(&mut self) -> Result<&mut Document> {
        self.doc.as_mut().ok_or(Error::DocumentReleased)
    }

    /// Hands the tree to a new owner. The handle is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentReleased`] on the second and later calls.
    pub fn release(&mut self) -> Result<Document> {
        let doc = self.doc.take().ok_or(Error::DocumentReleased)?;
        tracing::trace!(nodes = doc.node_count(), "document released");
        Ok(doc)
    }

    /// Returns true once the tree has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.doc.is_none()
    }
}

impl Default for DocumentHandle {
    fn default() -> Self {
        Self::new(Document::new())
    }
}

impl From<Document> for DocumentHandle {
    fn from(doc: Document) -> Self {
        Self::new(doc)
    }
}

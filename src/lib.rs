//! # xmlwrap
//!
//! RAII XML document trees, a libxml2-style SAX callback table and a tree
//! parser with an explicit error and ownership protocol.
//!
//! The layers, bottom-up:
//!
//! - [`parser`] and [`sax`]: a parser context driven by `quick-xml` events
//!   that dispatches to a table of plain function pointers. The stock table
//!   builds a [`Document`].
//! - [`tree_parser`]: [`TreeParser`] installs its own diagnostic callbacks
//!   on top of the stock table, runs one parse and keeps the tree only if
//!   nothing went wrong.
//! - [`tree`]: the arena tree and [`DocumentHandle`], which hands a tree
//!   over to another owner at most once.
//! - [`xslt`]: error forwarding and parameter marshalling around a
//!   pluggable transformation engine.
//!
//! ## Quick Start
//!
//! ```
//! use xmlwrap::TreeParser;
//!
//! let parser = TreeParser::from_memory(b"<root><child>Hello</child></root>", true).unwrap();
//! let doc = parser.document().get().unwrap();
//! let root = doc.root_element().unwrap();
//! assert_eq!(doc.node_name(root), Some("root"));
//! assert_eq!(doc.text_content(root), "Hello");
//! ```

pub mod encoding;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod parser;
pub mod sax;
pub mod serial;
pub mod tree;
pub mod tree_parser;
pub mod util;
pub mod xslt;

pub use error::{Error, Result};
pub use parser::ParseOptions;
pub use tree::{Attribute, Document, DocumentHandle, NodeId, NodeKind};
pub use tree_parser::TreeParser;

//! Node payloads.

use super::Attribute;

/// The kind of a node and its payload.
///
/// Navigation links live in [`NodeData`](super::NodeData), not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. Exactly one per `Document`.
    Document,

    /// An element, e.g. `<svg:rect width="3">`.
    Element {
        /// Local name (`rect`).
        name: String,
        /// Namespace prefix (`svg`), if any.
        prefix: Option<String>,
        /// Namespace URI the prefix resolved to, if any.
        namespace: Option<String>,
        /// Attributes in document order, namespace declarations included.
        attributes: Vec<Attribute>,
    },

    /// Character data with references already expanded.
    Text {
        /// The decoded text.
        content: String,
    },

    /// A `<![CDATA[...]]>` section.
    CData {
        /// Raw section content.
        content: String,
    },

    /// A `<!-- ... -->` comment.
    Comment {
        /// Comment text without delimiters.
        content: String,
    },

    /// A `<?target data?>` processing instruction.
    ProcessingInstruction {
        /// The PI target.
        target: String,
        /// Everything after the target, if anything.
        data: Option<String>,
    },
}

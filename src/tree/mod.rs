//! Arena-based XML document tree.
//!
//! All nodes live in a `Vec<NodeData>` owned by the [`Document`] and are
//! referenced by [`NodeId`], a newtype over `NonZeroU32`. Dropping the
//! `Document` frees the whole tree at once, which is what lets a tree parser
//! discard a half-built tree with a plain `drop`.
//!
//! Only what tree construction, serialisation and inspection need is here;
//! ownership hand-off lives in [`handle`].

pub mod handle;
mod node;

pub use handle::DocumentHandle;
pub use node::NodeKind;

use std::num::NonZeroU32;

/// A typed index into the document's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new(index as u32).expect("NodeId index must be non-zero"))
    }

    fn as_index(self) -> usize {
        self.0.get() as usize
    }
}

/// Storage for one node: its payload plus navigation links.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What the node is.
    pub kind: NodeKind,
    /// Parent node; `None` for the document node and detached nodes.
    pub parent: Option<NodeId>,
    /// First child.
    pub first_child: Option<NodeId>,
    /// Last child, kept for O(1) append.
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Local name (`lang` for `xml:lang`).
    pub name: String,
    /// Value with references expanded and whitespace normalised.
    pub value: String,
    /// Prefix (`xml` for `xml:lang`), if any.
    pub prefix: Option<String>,
    /// Namespace URI the prefix resolved to, if any.
    pub namespace: Option<String>,
}

impl Attribute {
    /// Returns the qualified name as written in the source.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// An XML document.
///
/// A freshly created document holds only its document node; such a document
/// is what an empty [`DocumentHandle`] and a failed tree parser expose.
///
/// ```
/// use xmlwrap::tree::{Document, NodeKind};
///
/// let mut doc = Document::new();
/// let root = doc.create_element("greeting");
/// doc.append_child(doc.root(), root);
/// assert_eq!(doc.root_element(), Some(root));
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    /// Index 0 is an unused placeholder so `NodeId` can be non-zero.
    nodes: Vec<NodeData>,
    root: NodeId,
    /// `version` from the XML declaration.
    pub version: Option<String>,
    /// `encoding` from the XML declaration.
    pub encoding: Option<String>,
    /// `standalone` from the XML declaration.
    pub standalone: Option<bool>,
}

impl Document {
    /// Creates an empty document containing only the document node.
    #[must_use]
    pub fn new() -> Self {
        let nodes = vec![
            NodeData::new(NodeKind::Document),
            NodeData::new(NodeKind::Document),
        ];
        Self {
            nodes,
            root: NodeId::from_index(1),
            version: None,
            encoding: None,
            standalone: None,
        }
    }

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the top-level element, if the document has one.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| matches!(self.node(id).kind, NodeKind::Element { .. }))
    }

    /// Returns true if the document has no top-level element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root_element().is_none()
    }

    /// Returns the storage for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Returns the local name of an element or the target of a PI.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::ProcessingInstruction { target: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the namespace URI of an element.
    #[must_use]
    pub fn node_namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    /// Returns the content of a text, CDATA or comment node, or a PI's data.
    #[must_use]
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content }
            | NodeKind::CData { content }
            | NodeKind::Comment { content } => Some(content),
            NodeKind::ProcessingInstruction { data, .. } => data.as_deref(),
            _ => None,
        }
    }

    /// Concatenates the text and CDATA content below `id`.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, buf: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text { content } | NodeKind::CData { content } => buf.push_str(content),
            NodeKind::Comment { .. } | NodeKind::ProcessingInstruction { .. } => {}
            NodeKind::Document | NodeKind::Element { .. } => {
                for child in self.children(id) {
                    self.collect_text(child, buf);
                }
            }
        }
    }

    /// Returns the attributes of an element (empty for other nodes).
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Looks up an attribute value by local name.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Allocates a detached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    /// Allocates a detached element with no namespace and no attributes.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.create_node(NodeKind::Element {
            name: name.to_string(),
            prefix: None,
            namespace: None,
            attributes: Vec::new(),
        })
    }

    /// Appends `child` to the end of `parent`'s child list.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(
            self.node(child).parent.is_none(),
            "child already has a parent"
        );

        self.node_mut(child).parent = Some(parent);
        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
        } else {
            self.node_mut(parent).first_child = Some(child);
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Appends text to `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(last) = self.last_child(parent) {
            if let NodeKind::Text { content } = &mut self.node_mut(last).kind {
                content.push_str(text);
                return;
            }
        }
        let id = self.create_node(NodeKind::Text {
            content: text.to_string(),
        });
        self.append_child(parent, id);
    }

    /// Number of allocated nodes, the document node included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

//! In-memory document tree backed by an index arena.
//!
//! All nodes live in one `Vec` slab and refer to each other by [`NodeId`];
//! dropping the [`Doc`] frees the whole tree in one deallocation without
//! walking it. Adjacent text siblings are merged at build time so the tree
//! holds at most one text node between any two elements.

use crate::error::PrevoError;

/// Index of a node inside its owning [`Doc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
pub enum NodeKind {
    Element {
        name: String,
        /// Attribute key/value pairs in document order.
        atts: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    Text(String),
}

#[derive(Debug)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub struct Doc {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Doc {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Element name, or `None` for text nodes.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId, tag: &str) -> bool {
        self.name(id) == Some(tag)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn attribute<'a>(&'a self, id: NodeId, key: &str) -> Option<&'a str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { atts, .. } => atts
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { children, .. } => children,
            NodeKind::Text(_) => &[],
        }
    }

    /// First child element with the given tag name.
    pub fn child_element(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.is_element(child, tag))
    }

    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        tag: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&child| self.is_element(child, tag))
    }

    pub fn child_element_count(&self, id: NodeId, tag: &str) -> usize {
        self.child_elements(id, tag).count()
    }

    /// First element with the given tag name in a depth-first walk of the
    /// subtree rooted at `id` (the root itself included).
    pub fn find_element(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        if self.is_element(id, tag) {
            return Some(id);
        }
        for &child in self.children(id) {
            if let Some(found) = self.find_element(child, tag) {
                return Some(found);
            }
        }
        None
    }

    /// Appends all text under `id` into `buf`, skipping whole subtrees of
    /// elements whose names are in `exclude`.
    pub fn append_text(&self, id: NodeId, buf: &mut String, exclude: &[&str]) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => buf.push_str(text),
            NodeKind::Element { children, .. } => {
                for &child in children {
                    if let Some(name) = self.name(child) {
                        if exclude.contains(&name) {
                            continue;
                        }
                    }
                    self.append_text(child, buf, exclude);
                }
            }
        }
    }

    /// Whether any ancestor of `id` (excluding `id` itself) is an element
    /// with the given tag name.
    pub fn has_ancestor(&self, id: NodeId, tag: &str) -> bool {
        let mut cur = self.parent(id);
        while let Some(node) = cur {
            if self.is_element(node, tag) {
                return true;
            }
            cur = self.parent(node);
        }
        false
    }
}

/// Incremental tree builder driven by XML events.
#[derive(Debug, Default)]
pub struct DocBuilder {
    nodes: Vec<Node>,
    stack: Vec<NodeId>,
    root: Option<NodeId>,
}

impl DocBuilder {
    pub fn new() -> DocBuilder {
        DocBuilder::default()
    }

    pub fn start_element(&mut self, name: String, atts: Vec<(String, String)>) {
        let parent = self.stack.last().copied();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            kind: NodeKind::Element {
                name,
                atts,
                children: Vec::new(),
            },
        });

        if let Some(parent) = parent {
            self.push_child(parent, id);
        } else if self.root.is_none() {
            self.root = Some(id);
        }

        self.stack.push(id);
    }

    pub fn end_element(&mut self) {
        self.stack.pop();
    }

    pub fn text(&mut self, data: &str) {
        let Some(&parent) = self.stack.last() else {
            // Whitespace between the prolog and the root element
            return;
        };

        // Merge with a preceding text sibling rather than growing the tree
        let last_child = match &self.nodes[parent.0].kind {
            NodeKind::Element { children, .. } => children.last().copied(),
            NodeKind::Text(_) => None,
        };
        if let Some(last) = last_child {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(data);
                return;
            }
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            kind: NodeKind::Text(data.to_string()),
        });
        self.push_child(parent, id);
    }

    pub fn finish(self) -> Result<Doc, PrevoError> {
        let root = self
            .root
            .ok_or_else(|| PrevoError::BadFormat("Document has no root element".to_string()))?;
        Ok(Doc {
            nodes: self.nodes,
            root,
        })
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
            children.push(child);
        }
    }
}

//! Live document the interpreter mutates.
//!
//! Nodes live in a blitz [`BaseDocument`] and every structural change goes
//! through [`DocumentMutator`]. This wrapper only adds what blitz does not
//! model: detached fragments, placeholder markers, comment payloads and the
//! set of installed root listeners. Nodes are detached, never dropped, so the
//! operand stack and the template registry can keep referring to them.

mod serialize;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use blitz_dom::node::NodeData;
use blitz_dom::{ns, DocumentConfig, DocumentMutator, LocalName, QualName};
use blitz_html::HtmlDocument;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BLANK_PAGE: &str = "<!DOCTYPE html><html><head></head><body></body></html>";

/// Blitz node id of a live node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub usize);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("missing node {0}")]
    MissingNode(NodeHandle),
    #[error("node {0} cannot hold children")]
    NotAContainer(NodeHandle),
    #[error("inserting {child} under {parent} would break the tree")]
    HierarchyRequest {
        parent: NodeHandle,
        child: NodeHandle,
    },
    #[error("node {0} has no parent")]
    Detached(NodeHandle),
    #[error("node {0} has the wrong kind for this operation")]
    WrongNodeKind(NodeHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Fragment,
    Element,
    Text,
    Comment,
    /// Empty marker standing in for content that is not rendered yet.
    Placeholder,
}

impl NodeKind {
    fn holds_children(self) -> bool {
        matches!(
            self,
            NodeKind::Document | NodeKind::Fragment | NodeKind::Element
        )
    }
}

/// Owned view of one element attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

pub struct Document {
    inner: HtmlDocument,
    body: NodeHandle,
    fragments: HashSet<usize>,
    placeholders: HashSet<usize>,
    comments: HashMap<usize, String>,
    root_listeners: BTreeSet<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Blank page: `#document > html > (head, body)`.
    pub fn new() -> Self {
        let mut inner = HtmlDocument::from_html(BLANK_PAGE, DocumentConfig::default());
        let root = inner.root_node().id;
        let body = match find_element(&inner, root, "body") {
            Some(body) => body,
            None => {
                let mut mutator = DocumentMutator::new(&mut inner);
                let body = mutator.create_element(element_name("body", None), Vec::new());
                mutator.append_children(root, &[body]);
                body
            }
        };
        Self {
            inner,
            body: NodeHandle(body),
            fragments: HashSet::new(),
            placeholders: HashSet::new(),
            comments: HashMap::new(),
            root_listeners: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> NodeHandle {
        NodeHandle(self.inner.root_node().id)
    }

    pub fn body(&self) -> NodeHandle {
        self.body
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.inner.get_node(node.0).is_some()
    }

    pub fn kind(&self, node: NodeHandle) -> Result<NodeKind, DomError> {
        if self.placeholders.contains(&node.0) {
            return Ok(NodeKind::Placeholder);
        }
        if self.fragments.contains(&node.0) {
            return Ok(NodeKind::Fragment);
        }
        Ok(match self.data(node)? {
            NodeData::Document => NodeKind::Document,
            NodeData::Element(_) | NodeData::AnonymousBlock(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment => NodeKind::Comment,
        })
    }

    pub fn tag_name(&self, node: NodeHandle) -> Option<&str> {
        self.qualified_name(node).map(|name| &*name.local)
    }

    /// Namespace URI of an element outside the HTML namespace.
    pub fn namespace(&self, node: NodeHandle) -> Option<String> {
        self.qualified_name(node)
            .filter(|name| name.ns != ns!(html))
            .map(|name| name.ns.to_string())
    }

    pub fn attribute(&self, node: NodeHandle, name: &str) -> Option<&str> {
        let Ok(NodeData::Element(data)) = self.data(node) else {
            return None;
        };
        data.attrs
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| &*attr.value)
    }

    pub fn attributes(&self, node: NodeHandle) -> Vec<Attribute> {
        let Ok(NodeData::Element(data)) = self.data(node) else {
            return Vec::new();
        };
        data.attrs
            .iter()
            .map(|attr| Attribute {
                name: attr.name.local.to_string(),
                namespace: (attr.name.ns != ns!()).then(|| attr.name.ns.to_string()),
                value: attr.value.to_string(),
            })
            .collect()
    }

    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.inner.get_node(node.0)?.parent.map(NodeHandle)
    }

    pub fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.inner
            .get_node(node.0)
            .map(|record| record.children.iter().copied().map(NodeHandle).collect())
            .unwrap_or_default()
    }

    /// Parents of `node`, nearest first. `node` itself is not included.
    pub fn ancestors(&self, node: NodeHandle) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.parent(node),
        }
    }

    pub fn is_connected(&self, node: NodeHandle) -> bool {
        let root = self.root();
        node == root || self.ancestors(node).any(|ancestor| ancestor == root)
    }

    pub fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeHandle {
        let name = element_name(tag, namespace);
        NodeHandle(self.mutator().create_element(name, Vec::new()))
    }

    pub fn create_text(&mut self, text: &str) -> NodeHandle {
        NodeHandle(self.mutator().create_text_node(text))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeHandle {
        let node = self.mutator().create_comment_node();
        self.comments.insert(node, text.to_string());
        NodeHandle(node)
    }

    pub fn create_placeholder(&mut self) -> NodeHandle {
        let node = self.mutator().create_comment_node();
        self.placeholders.insert(node);
        NodeHandle(node)
    }

    /// Detached container whose children move out when it is inserted.
    pub fn create_fragment(&mut self) -> NodeHandle {
        let node = self
            .mutator()
            .create_element(element_name("fragment", None), Vec::new());
        self.fragments.insert(node);
        NodeHandle(node)
    }

    pub fn append_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<(), DomError> {
        self.append_children(parent, &[child])
    }

    pub fn append_children(
        &mut self,
        parent: NodeHandle,
        children: &[NodeHandle],
    ) -> Result<(), DomError> {
        let ids = self.prepare_insert(parent, children)?;
        self.mutator().append_children(parent.0, &ids);
        Ok(())
    }

    /// Inserts `nodes` as siblings immediately before `reference`, in order.
    pub fn insert_before(
        &mut self,
        reference: NodeHandle,
        nodes: &[NodeHandle],
    ) -> Result<(), DomError> {
        let parent = self.attached_parent(reference, nodes)?;
        let ids = self.prepare_insert(parent, nodes)?;
        self.mutator().insert_nodes_before(reference.0, &ids);
        Ok(())
    }

    /// Inserts `nodes` as siblings immediately after `reference`, in order.
    pub fn insert_after(
        &mut self,
        reference: NodeHandle,
        nodes: &[NodeHandle],
    ) -> Result<(), DomError> {
        let parent = self.attached_parent(reference, nodes)?;
        let ids = self.prepare_insert(parent, nodes)?;
        let siblings = self.children(parent);
        let next = siblings
            .iter()
            .position(|sibling| *sibling == reference)
            .and_then(|index| siblings.get(index + 1))
            .copied();
        let mut mutator = self.mutator();
        match next {
            Some(next) => mutator.insert_nodes_before(next.0, &ids),
            None => mutator.append_children(parent.0, &ids),
        }
        Ok(())
    }

    /// Puts `nodes` where `old` was and detaches `old`.
    pub fn replace_with(&mut self, old: NodeHandle, nodes: &[NodeHandle]) -> Result<(), DomError> {
        let parent = self.attached_parent(old, nodes)?;
        let ids = self.prepare_insert(parent, nodes)?;
        self.mutator().replace_node_with(old.0, &ids);
        Ok(())
    }

    /// Removes `node` from its parent. Returns `false` if it was already detached.
    pub fn detach(&mut self, node: NodeHandle) -> Result<bool, DomError> {
        self.data(node)?;
        if self.parent(node).is_none() {
            return Ok(false);
        }
        self.mutator().remove_node(node.0);
        Ok(true)
    }

    pub fn set_text(&mut self, node: NodeHandle, text: &str) -> Result<(), DomError> {
        match self.kind(node)? {
            NodeKind::Placeholder => Err(DomError::WrongNodeKind(node)),
            NodeKind::Comment => {
                self.comments.insert(node.0, text.to_string());
                Ok(())
            }
            NodeKind::Text => {
                self.mutator().set_node_text(node.0, text);
                Ok(())
            }
            NodeKind::Document | NodeKind::Fragment | NodeKind::Element => {
                let children = self.children(node);
                let mut mutator = self.mutator();
                for child in children {
                    mutator.remove_node(child.0);
                }
                if !text.is_empty() {
                    let text_node = mutator.create_text_node(text);
                    mutator.append_children(node.0, &[text_node]);
                }
                Ok(())
            }
        }
    }

    pub fn set_attribute(
        &mut self,
        node: NodeHandle,
        name: &str,
        namespace: Option<&str>,
        value: &str,
    ) -> Result<(), DomError> {
        self.ensure_element(node)?;
        self.mutator()
            .set_attribute(node.0, attribute_name(name, namespace), value);
        Ok(())
    }

    /// Returns whether an attribute was actually removed.
    pub fn remove_attribute(
        &mut self,
        node: NodeHandle,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<bool, DomError> {
        self.ensure_element(node)?;
        let present = self
            .attributes(node)
            .iter()
            .any(|attr| attr.name == name && attr.namespace.as_deref() == namespace);
        if present {
            self.mutator()
                .clear_attribute(node.0, attribute_name(name, namespace));
        }
        Ok(present)
    }

    pub fn text_content(&self, node: NodeHandle) -> String {
        match self.kind(node) {
            Ok(NodeKind::Comment) | Ok(NodeKind::Placeholder) | Err(_) => String::new(),
            Ok(_) => self
                .inner
                .get_node(node.0)
                .map(|record| record.text_content())
                .unwrap_or_default(),
        }
    }

    /// Copies the structure under `node` into fresh, detached nodes.
    pub fn deep_clone(&mut self, node: NodeHandle) -> Result<NodeHandle, DomError> {
        self.data(node)?;
        let clone = NodeHandle(self.mutator().deep_clone_node(node.0));
        self.copy_markers(node, clone);
        Ok(clone)
    }

    pub fn structurally_equal(&self, a: NodeHandle, b: NodeHandle) -> bool {
        let (Ok(left), Ok(right)) = (self.kind(a), self.kind(b)) else {
            return false;
        };
        if left != right {
            return false;
        }
        let same_node = match left {
            NodeKind::Element => {
                let mut left_attrs = self.attributes(a);
                let mut right_attrs = self.attributes(b);
                left_attrs.sort();
                right_attrs.sort();
                self.qualified_name(a) == self.qualified_name(b) && left_attrs == right_attrs
            }
            NodeKind::Text => self.text_content(a) == self.text_content(b),
            NodeKind::Comment => self.comments.get(&a.0) == self.comments.get(&b.0),
            NodeKind::Document | NodeKind::Fragment | NodeKind::Placeholder => true,
        };
        let (left_children, right_children) = (self.children(a), self.children(b));
        same_node
            && left_children.len() == right_children.len()
            && left_children
                .iter()
                .zip(right_children.iter())
                .all(|(l, r)| self.structurally_equal(*l, *r))
    }

    /// Connected element whose HTML `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.descendants(self.root())
            .into_iter()
            .find(|node| self.attribute(*node, "id") == Some(id))
    }

    /// Follows child indices downward from `from`.
    pub fn node_at_path(&self, from: NodeHandle, path: &[usize]) -> Option<NodeHandle> {
        let mut current = from;
        for index in path {
            current = *self.children(current).get(*index)?;
        }
        Some(current)
    }

    /// Pre-order walk including `node`.
    pub fn descendants(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut collected = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            collected.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        collected
    }

    /// Returns `true` when the listener was not installed before.
    pub fn install_root_listener(&mut self, event_name: &str) -> bool {
        self.root_listeners.insert(event_name.to_string())
    }

    /// Returns `true` when a listener was actually removed.
    pub fn uninstall_root_listener(&mut self, event_name: &str) -> bool {
        self.root_listeners.remove(event_name)
    }

    pub fn has_root_listener(&self, event_name: &str) -> bool {
        self.root_listeners.contains(event_name)
    }

    pub fn root_listener_count(&self) -> usize {
        self.root_listeners.len()
    }

    fn mutator(&mut self) -> DocumentMutator<'_> {
        DocumentMutator::new(&mut self.inner)
    }

    fn data(&self, node: NodeHandle) -> Result<&NodeData, DomError> {
        self.inner
            .get_node(node.0)
            .map(|record| &record.data)
            .ok_or(DomError::MissingNode(node))
    }

    fn qualified_name(&self, node: NodeHandle) -> Option<&QualName> {
        if self.fragments.contains(&node.0) {
            return None;
        }
        match self.data(node).ok()? {
            NodeData::Element(data) | NodeData::AnonymousBlock(data) => Some(&data.name),
            _ => None,
        }
    }

    fn ensure_element(&self, node: NodeHandle) -> Result<(), DomError> {
        match self.kind(node)? {
            NodeKind::Element => Ok(()),
            _ => Err(DomError::WrongNodeKind(node)),
        }
    }

    /// Parent of `reference`, which must not be one of the nodes being moved.
    fn attached_parent(
        &self,
        reference: NodeHandle,
        nodes: &[NodeHandle],
    ) -> Result<NodeHandle, DomError> {
        self.data(reference)?;
        let parent = self.parent(reference).ok_or(DomError::Detached(reference))?;
        if nodes.contains(&reference) {
            return Err(DomError::HierarchyRequest {
                parent,
                child: reference,
            });
        }
        Ok(parent)
    }

    /// Validates `nodes` for insertion under `parent`, dissolves fragments and
    /// detaches every node from its current parent.
    fn prepare_insert(
        &mut self,
        parent: NodeHandle,
        nodes: &[NodeHandle],
    ) -> Result<Vec<usize>, DomError> {
        if !self.kind(parent)?.holds_children() {
            return Err(DomError::NotAContainer(parent));
        }
        let mut flattened = Vec::with_capacity(nodes.len());
        for &node in nodes {
            if self.kind(node)? == NodeKind::Fragment {
                flattened.extend(self.children(node));
            } else {
                flattened.push(node);
            }
        }
        for &node in &flattened {
            if self.kind(node)? == NodeKind::Document
                || node == parent
                || self.ancestors(parent).any(|ancestor| ancestor == node)
            {
                return Err(DomError::HierarchyRequest {
                    parent,
                    child: node,
                });
            }
        }

        let attached: Vec<usize> = flattened
            .iter()
            .filter(|node| self.parent(**node).is_some())
            .map(|node| node.0)
            .collect();
        let mut mutator = self.mutator();
        for node in attached {
            mutator.remove_node(node);
        }
        Ok(flattened.into_iter().map(|node| node.0).collect())
    }

    /// Carries fragment, placeholder and comment markers over to a clone.
    fn copy_markers(&mut self, source: NodeHandle, clone: NodeHandle) {
        if self.fragments.contains(&source.0) {
            self.fragments.insert(clone.0);
        }
        if self.placeholders.contains(&source.0) {
            self.placeholders.insert(clone.0);
        }
        if let Some(payload) = self.comments.get(&source.0).cloned() {
            self.comments.insert(clone.0, payload);
        }
        for (source_child, clone_child) in self.children(source).into_iter().zip(self.children(clone)) {
            self.copy_markers(source_child, clone_child);
        }
    }
}

fn element_name(tag: &str, namespace: Option<&str>) -> QualName {
    let local = LocalName::from(tag);
    match namespace {
        Some(uri) if !uri.eq_ignore_ascii_case("http://www.w3.org/1999/xhtml") => {
            QualName::new(None, uri.into(), local)
        }
        _ => QualName::new(None, ns!(html), local),
    }
}

fn attribute_name(name: &str, namespace: Option<&str>) -> QualName {
    let local = LocalName::from(name);
    match namespace {
        Some(uri) => QualName::new(None, uri.into(), local),
        None => QualName::new(None, ns!(), local),
    }
}

fn find_element(document: &HtmlDocument, from: usize, tag: &str) -> Option<usize> {
    let node = document.get_node(from)?;
    if let NodeData::Element(data) = &node.data {
        if &*data.name.local == tag {
            return Some(from);
        }
    }
    node.children
        .iter()
        .find_map(|child| find_element(document, *child, tag))
}

pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<NodeHandle>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.document.parent(current);
        Some(current)
    }
}

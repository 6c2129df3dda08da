//! Canonical template fragments, stamped by deep clone.

use std::collections::HashMap;

use super::error::EditError;
use crate::dom::{Document, NodeHandle, NodeKind};

#[derive(Debug)]
struct Template {
    fragment: NodeHandle,
    /// Placeholder positions relative to the fragment, in document order.
    slots: Vec<Vec<usize>>,
}

/// A fresh copy of a registered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub fragment: NodeHandle,
    pub roots: Vec<NodeHandle>,
    pub slots: Vec<NodeHandle>,
}

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `fragment` as the canonical copy of `name`.
    ///
    /// Returns `false` when an identical template was already registered, in
    /// which case `fragment` is left untouched and unused.
    pub fn register(
        &mut self,
        document: &Document,
        name: &str,
        fragment: NodeHandle,
    ) -> Result<bool, EditError> {
        if let Some(existing) = self.templates.get(name) {
            if document.structurally_equal(existing.fragment, fragment) {
                return Ok(false);
            }
            return Err(EditError::TemplateRedefinition(name.to_string()));
        }
        let mut slots = Vec::new();
        collect_slots(document, fragment, &mut Vec::new(), &mut slots);
        tracing::debug!(
            target: "interpreter",
            template = name,
            roots = document.children(fragment).len(),
            slots = slots.len(),
            "registered template"
        );
        self.templates
            .insert(name.to_string(), Template { fragment, slots });
        Ok(true)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn canonical(&self, name: &str) -> Result<NodeHandle, EditError> {
        self.get(name).map(|template| template.fragment)
    }

    pub fn stamp(&self, document: &mut Document, name: &str) -> Result<Stamp, EditError> {
        let template = self.get(name)?;
        let fragment = document.deep_clone(template.fragment)?;
        let slots = template
            .slots
            .iter()
            .filter_map(|path| document.node_at_path(fragment, path))
            .collect();
        Ok(Stamp {
            fragment,
            roots: document.children(fragment),
            slots,
        })
    }

    /// Clones only the root at `index`, detached and ready to attach.
    pub fn stamp_root(
        &self,
        document: &mut Document,
        name: &str,
        index: usize,
    ) -> Result<NodeHandle, EditError> {
        let template = self.get(name)?;
        let root = document
            .children(template.fragment)
            .get(index)
            .copied()
            .ok_or_else(|| EditError::TemplateRootOutOfRange {
                name: name.to_string(),
                index,
            })?;
        Ok(document.deep_clone(root)?)
    }

    /// Whether `node` belongs to a canonical copy.
    pub fn owns(&self, document: &Document, node: NodeHandle) -> bool {
        std::iter::once(node)
            .chain(document.ancestors(node))
            .any(|candidate| {
                self.templates
                    .values()
                    .any(|template| template.fragment == candidate)
            })
    }

    fn get(&self, name: &str) -> Result<&Template, EditError> {
        self.templates
            .get(name)
            .ok_or_else(|| EditError::UnknownTemplate(name.to_string()))
    }
}

fn collect_slots(
    document: &Document,
    node: NodeHandle,
    path: &mut Vec<usize>,
    slots: &mut Vec<Vec<usize>>,
) {
    if document.kind(node) == Ok(NodeKind::Placeholder) {
        slots.push(path.clone());
    }
    for (index, child) in document.children(node).into_iter().enumerate() {
        path.push(index);
        collect_slots(document, child, path, slots);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(document: &mut Document) -> NodeHandle {
        let fragment = document.create_fragment();
        let article = document.create_element("article", None);
        let heading = document.create_element("h2", None);
        let slot = document.create_placeholder();
        document.append_children(article, &[heading, slot]).unwrap();
        document.append_child(fragment, article).unwrap();
        fragment
    }

    #[test]
    fn stamps_are_distinct_clones() {
        let mut document = Document::new();
        let mut registry = TemplateRegistry::new();
        let fragment = card(&mut document);
        assert!(registry.register(&document, "card", fragment).unwrap());

        let first = registry.stamp(&mut document, "card").unwrap();
        let second = registry.stamp(&mut document, "card").unwrap();
        assert_ne!(first.roots, second.roots);
        assert_eq!(first.slots.len(), 1);

        let heading = document.children(first.roots[0])[0];
        document.set_text(heading, "changed").unwrap();
        assert!(document.structurally_equal(fragment, second.fragment));
        assert!(!document.structurally_equal(fragment, first.fragment));
        assert_eq!(registry.canonical("card").unwrap(), fragment);
        assert!(registry.owns(&document, heading_of(&document, fragment)));
        assert!(!registry.owns(&document, heading));
    }

    fn heading_of(document: &Document, fragment: NodeHandle) -> NodeHandle {
        let article = document.children(fragment)[0];
        document.children(article)[0]
    }

    #[test]
    fn registration_is_idempotent_for_identical_structure() {
        let mut document = Document::new();
        let mut registry = TemplateRegistry::new();
        let original = card(&mut document);
        let again = card(&mut document);
        registry.register(&document, "card", original).unwrap();
        assert!(!registry.register(&document, "card", again).unwrap());
        assert_eq!(registry.len(), 1);

        let different = document.create_fragment();
        let span = document.create_element("span", None);
        document.append_child(different, span).unwrap();
        assert_eq!(
            registry.register(&document, "card", different),
            Err(EditError::TemplateRedefinition("card".into()))
        );
    }

    #[test]
    fn unknown_templates_and_roots_are_errors() {
        let mut document = Document::new();
        let mut registry = TemplateRegistry::new();
        assert_eq!(
            registry.stamp(&mut document, "missing"),
            Err(EditError::UnknownTemplate("missing".into()))
        );
        let fragment = card(&mut document);
        registry.register(&document, "card", fragment).unwrap();
        assert!(matches!(
            registry.stamp_root(&mut document, "card", 3),
            Err(EditError::TemplateRootOutOfRange { index: 3, .. })
        ));
        let root = registry.stamp_root(&mut document, "card", 0).unwrap();
        assert_eq!(document.tag_name(root), Some("article"));
        assert_eq!(document.parent(root), None);
    }
}

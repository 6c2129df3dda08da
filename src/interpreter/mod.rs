//! Stack machine that applies engine edit batches to the live document.

mod edit;
mod error;
mod node_table;
mod stack;
mod templates;

use serde::Serialize;

use crate::config::InterpreterConfig;
use crate::dom::{Document, NodeHandle};
use crate::events::{Delegator, DispatchOutcome, NativeEvent};
use crate::value::BoundaryValue;

pub use edit::DomEdit;
pub use error::{BatchError, EditError};
pub use node_table::{NodeId, NodeTable};
pub use stack::OperandStack;
pub use templates::{Stamp, TemplateRegistry};

/// Counts for one successfully applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchSummary {
    pub applied: usize,
    pub created: usize,
    pub removed: usize,
}

pub struct Interpreter {
    document: Document,
    table: NodeTable,
    stack: OperandStack,
    templates: TemplateRegistry,
    delegator: Delegator,
    strict_stack: bool,
    batches: u64,
}

impl Interpreter {
    pub fn new(document: Document, config: &InterpreterConfig) -> Self {
        Self {
            document,
            table: NodeTable::new(),
            stack: OperandStack::new(),
            templates: TemplateRegistry::new(),
            delegator: Delegator::new(),
            strict_stack: config.strict_stack,
            batches: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn node_table(&self) -> &NodeTable {
        &self.table
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn delegator(&self) -> &Delegator {
        &self.delegator
    }

    /// Live node currently bound to `id`.
    pub fn node(&self, id: NodeId) -> Option<NodeHandle> {
        self.table.lookup(id).ok()
    }

    /// Applies `edits` in order. The first failure aborts the batch and leaves
    /// every earlier edit applied.
    pub fn apply_batch(&mut self, edits: &[DomEdit]) -> Result<BatchSummary, BatchError> {
        self.batches += 1;
        let batch = self.batches;
        let mut summary = BatchSummary::default();

        for (index, edit) in edits.iter().enumerate() {
            if let Err(source) = self.apply(edit, &mut summary) {
                tracing::warn!(
                    target: "interpreter",
                    batch,
                    index,
                    opcode = edit.opcode(),
                    error = %source,
                    "edit batch aborted"
                );
                self.stack.clear();
                return Err(BatchError {
                    index,
                    opcode: edit.opcode(),
                    source,
                });
            }
            summary.applied += 1;
        }

        if self.strict_stack {
            let depth = self.stack.unconsumed();
            let parents = self.stack.len() - depth;
            self.stack.clear();
            if depth > 0 {
                tracing::warn!(
                    target: "interpreter",
                    batch,
                    depth,
                    "operand stack holds unconsumed nodes at end of batch"
                );
                return Err(BatchError {
                    index: edits.len(),
                    opcode: "end_of_batch",
                    source: EditError::ResidualStack { depth },
                });
            }
            if parents > 0 {
                tracing::trace!(target: "interpreter", batch, parents, "dropped parent context");
            }
        }

        tracing::debug!(
            target: "interpreter",
            batch,
            applied = summary.applied,
            created = summary.created,
            removed = summary.removed,
            "applied edit batch"
        );
        Ok(summary)
    }

    /// Routes a native event through the delegation table.
    pub fn dispatch_event(&self, event: &NativeEvent) -> DispatchOutcome {
        self.delegator.dispatch(&self.document, &self.table, event)
    }

    fn apply(&mut self, edit: &DomEdit, summary: &mut BatchSummary) -> Result<(), EditError> {
        match edit {
            DomEdit::CreateElement { tag, id } => {
                let node = self.document.create_element(tag, None);
                self.bind_and_push(*id, node)?;
                summary.created += 1;
            }
            DomEdit::CreateElementNs { tag, id, namespace } => {
                let node = self.document.create_element(tag, Some(namespace));
                self.bind_and_push(*id, node)?;
                summary.created += 1;
            }
            DomEdit::CreateTextNode { text, id } => {
                let node = self.document.create_text(text);
                self.bind_and_push(*id, node)?;
                summary.created += 1;
            }
            DomEdit::CreatePlaceholder { id } => {
                let node = self.document.create_placeholder();
                self.bind_and_push(*id, node)?;
                summary.created += 1;
            }
            DomEdit::SetNode { id, value } => self.set_node(*id, value)?,
            DomEdit::PushRoot { id } => {
                let node = self.table.lookup(*id)?;
                self.stack.push(node);
            }
            DomEdit::PopRoot => {
                self.stack.pop_one()?;
            }
            DomEdit::AppendChildren { count } => {
                let children = self.stack.pop_many(*count)?;
                let parent = self.stack.top()?;
                self.document.append_children(parent, &children)?;
                self.stack.mark_parent_context();
            }
            DomEdit::ReplaceWith { id, count } => {
                let nodes = self.stack.pop_many(*count)?;
                let old = self.table.lookup(*id)?;
                self.document.replace_with(old, &nodes)?;
                self.release(*id);
                summary.removed += 1;
            }
            DomEdit::InsertAfter { id, count } => {
                let nodes = self.stack.pop_many(*count)?;
                let reference = self.table.lookup(*id)?;
                self.document.insert_after(reference, &nodes)?;
            }
            DomEdit::InsertBefore { id, count } => {
                let nodes = self.stack.pop_many(*count)?;
                let reference = self.table.lookup(*id)?;
                self.document.insert_before(reference, &nodes)?;
            }
            DomEdit::Remove { id } => {
                let Some(node) = self.release(*id) else {
                    tracing::debug!(target: "interpreter", id = %id, "remove of unbound id");
                    return Ok(());
                };
                if self.document.detach(node)? {
                    summary.removed += 1;
                }
            }
            DomEdit::SetText { id, text } => {
                let node = self.resolve_target(*id)?;
                self.document.set_text(node, text)?;
            }
            DomEdit::SetAttribute {
                id,
                name,
                value,
                namespace,
            } => {
                let node = self.resolve_target(*id)?;
                match attribute_text(value)? {
                    Some(text) => {
                        self.document
                            .set_attribute(node, name, namespace.as_deref(), &text)?
                    }
                    None => {
                        self.document
                            .remove_attribute(node, name, namespace.as_deref())?;
                    }
                }
            }
            DomEdit::RemoveAttribute {
                id,
                name,
                namespace,
            } => {
                let node = self.resolve_target(*id)?;
                self.document
                    .remove_attribute(node, name, namespace.as_deref())?;
            }
            DomEdit::NewEventListener { name, id, handler } => {
                self.table.lookup(*id)?;
                self.delegator
                    .add_listener(&mut self.document, *id, name, handler.clone());
            }
            DomEdit::RemoveEventListener { id, name } => {
                self.delegator.remove_listener(&mut self.document, *id, name);
            }
            DomEdit::SaveTemplate { name, count } => {
                let roots = self.stack.pop_many(*count)?;
                let fragment = self.document.create_fragment();
                self.document.append_children(fragment, &roots)?;
                let inside = self.document.descendants(fragment);
                let unbound = self.table.unbind_where(|node| inside.contains(&node));
                for id in &unbound {
                    self.delegator.forget(&mut self.document, *id);
                }
                if !unbound.is_empty() {
                    tracing::debug!(
                        target: "interpreter",
                        template = %name,
                        unbound = unbound.len(),
                        "released ids captured by template"
                    );
                }
                self.templates.register(&self.document, name, fragment)?;
            }
            DomEdit::LoadTemplate { name, index, id } => {
                let node = self.templates.stamp_root(&mut self.document, name, *index)?;
                self.bind_and_push(*id, node)?;
                summary.created += 1;
            }
            DomEdit::AssignId { path, id } => {
                let node = self.node_at_path(path)?;
                self.table.bind(*id, node)?;
            }
            DomEdit::ReplacePlaceholder { path, count } => {
                let nodes = self.stack.pop_many(*count)?;
                let placeholder = self.node_at_path(path)?;
                self.document.replace_with(placeholder, &nodes)?;
            }
        }
        Ok(())
    }

    /// Unbinds `id` and drops whatever listener interest it carried.
    fn release(&mut self, id: NodeId) -> Option<NodeHandle> {
        let node = self.table.unbind(id)?;
        self.delegator.forget(&mut self.document, id);
        Some(node)
    }

    fn bind_and_push(&mut self, id: NodeId, node: NodeHandle) -> Result<(), EditError> {
        self.table.bind(id, node)?;
        self.stack.push(node);
        Ok(())
    }

    /// Id 0 addresses the node on top of the stack.
    fn resolve_target(&self, id: NodeId) -> Result<NodeHandle, EditError> {
        if id.is_sentinel() {
            self.stack.top()
        } else {
            self.table.lookup(id)
        }
    }

    fn node_at_path(&self, path: &[usize]) -> Result<NodeHandle, EditError> {
        let root = self.stack.top()?;
        self.document
            .node_at_path(root, path)
            .ok_or_else(|| EditError::InvalidPath(path.to_vec()))
    }

    fn set_node(&mut self, id: NodeId, value: &BoundaryValue) -> Result<(), EditError> {
        let node = match value {
            BoundaryValue::Handle(_) => value
                .as_handle()
                .filter(|node| self.document.contains(*node))
                .ok_or(EditError::InvalidBoundaryValue("handle"))?,
            BoundaryValue::Text(element_id) => self
                .document
                .element_by_id(element_id)
                .ok_or(EditError::InvalidBoundaryValue("text"))?,
            other => return Err(EditError::InvalidBoundaryValue(other.kind())),
        };
        if self.templates.owns(&self.document, node) {
            return Err(EditError::TemplateNode(node));
        }
        if self.table.contains(id) {
            let previous = self.table.rebind(id, node)?;
            if previous != node {
                self.delegator.forget(&mut self.document, id);
            }
        } else {
            self.table.bind(id, node)?;
        }
        tracing::debug!(target: "interpreter", id = %id, node = %node, "seeded node");
        Ok(())
    }
}

fn attribute_text(value: &BoundaryValue) -> Result<Option<String>, EditError> {
    match value {
        BoundaryValue::Null => Ok(None),
        BoundaryValue::Text(text) => Ok(Some(text.clone())),
        BoundaryValue::Bool(flag) => Ok(Some(flag.to_string())),
        BoundaryValue::Number(number) => Ok(Some(format_number(*number))),
        BoundaryValue::Handle(_) => Err(EditError::InvalidBoundaryValue("handle")),
    }
}

fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::new(Document::new(), &InterpreterConfig::default())
    }

    #[test]
    fn sentinel_targets_stack_top() {
        let mut interp = interpreter();
        interp
            .apply_batch(&[
                DomEdit::CreateElement {
                    tag: "p".into(),
                    id: NodeId(5),
                },
                DomEdit::SetAttribute {
                    id: NodeId::SENTINEL,
                    name: "tabindex".into(),
                    value: BoundaryValue::Number(3.0),
                    namespace: None,
                },
                DomEdit::SetText {
                    id: NodeId::SENTINEL,
                    text: "body".into(),
                },
                DomEdit::PopRoot,
            ])
            .unwrap();
        let node = interp.node(NodeId(5)).unwrap();
        assert_eq!(interp.document().attribute(node, "tabindex"), Some("3"));
        assert_eq!(interp.document().text_content(node), "body");
    }

    #[test]
    fn set_node_seeds_and_rebinds() {
        let mut interp = interpreter();
        let body = interp.document().body();
        interp
            .apply_batch(&[DomEdit::SetNode {
                id: NodeId(1),
                value: BoundaryValue::from(body),
            }])
            .unwrap();
        assert_eq!(interp.node(NodeId(1)), Some(body));

        let root = interp.document().root();
        interp
            .apply_batch(&[DomEdit::SetNode {
                id: NodeId(1),
                value: BoundaryValue::from(root),
            }])
            .unwrap();
        assert_eq!(interp.node(NodeId(1)), Some(root));
        assert_eq!(interp.node_table().id_of(body), None);

        interp
            .apply_batch(&[DomEdit::SetNode {
                id: NodeId(3),
                value: BoundaryValue::from(root),
            }])
            .unwrap();
        assert_eq!(interp.node(NodeId(1)), Some(root), "aliases stay bound");
        assert_eq!(interp.node(NodeId(3)), Some(root));

        let err = interp
            .apply_batch(&[DomEdit::SetNode {
                id: NodeId(2),
                value: BoundaryValue::Bool(true),
            }])
            .unwrap_err();
        assert_eq!(err.source, EditError::InvalidBoundaryValue("bool"));
    }

    #[test]
    fn failed_edit_clears_the_stack() {
        let mut interp = interpreter();
        let err = interp
            .apply_batch(&[
                DomEdit::CreateElement {
                    tag: "div".into(),
                    id: NodeId(1),
                },
                DomEdit::PushRoot { id: NodeId(9) },
            ])
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.opcode, "push_root");
        assert_eq!(err.source, EditError::UnknownNode(NodeId(9)));
        assert!(interp.stack().is_empty());
        assert!(interp.node(NodeId(1)).is_some());
    }

    #[test]
    fn relaxed_stack_allows_residue() {
        let config = InterpreterConfig {
            strict_stack: false,
            ..InterpreterConfig::default()
        };
        let mut interp = Interpreter::new(Document::new(), &config);
        interp
            .apply_batch(&[DomEdit::CreatePlaceholder { id: NodeId(1) }])
            .unwrap();
        assert_eq!(interp.stack().len(), 1);
    }

    #[test]
    fn template_nodes_cannot_be_seeded() {
        let mut interp = interpreter();
        interp
            .apply_batch(&[
                DomEdit::CreateElement {
                    tag: "li".into(),
                    id: NodeId(1),
                },
                DomEdit::SaveTemplate {
                    name: "row".into(),
                    count: 1,
                },
            ])
            .unwrap();
        let canonical = interp.templates().canonical("row").unwrap();
        let row = interp.document().children(canonical)[0];

        let err = interp
            .apply_batch(&[DomEdit::SetNode {
                id: NodeId(2),
                value: BoundaryValue::from(row),
            }])
            .unwrap_err();
        assert_eq!(err.source, EditError::TemplateNode(row));
        assert!(!interp.node_table().contains(NodeId(2)));
    }

    #[test]
    fn numbers_format_like_attribute_text() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(1e21), "1000000000000000000000");
    }
}

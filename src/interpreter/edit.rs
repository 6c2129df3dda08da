use serde::{Deserialize, Serialize};

use super::node_table::NodeId;
use crate::value::BoundaryValue;

/// One instruction of the inbound edit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomEdit {
    CreateElement {
        tag: String,
        id: NodeId,
    },
    CreateElementNs {
        tag: String,
        id: NodeId,
        namespace: String,
    },
    CreateTextNode {
        text: String,
        id: NodeId,
    },
    CreatePlaceholder {
        id: NodeId,
    },
    SetNode {
        id: NodeId,
        value: BoundaryValue,
    },
    PushRoot {
        id: NodeId,
    },
    PopRoot,
    AppendChildren {
        count: usize,
    },
    ReplaceWith {
        id: NodeId,
        count: usize,
    },
    InsertAfter {
        id: NodeId,
        count: usize,
    },
    InsertBefore {
        id: NodeId,
        count: usize,
    },
    Remove {
        id: NodeId,
    },
    SetText {
        id: NodeId,
        text: String,
    },
    SetAttribute {
        id: NodeId,
        name: String,
        #[serde(default)]
        value: BoundaryValue,
        #[serde(default)]
        namespace: Option<String>,
    },
    RemoveAttribute {
        id: NodeId,
        name: String,
        #[serde(default)]
        namespace: Option<String>,
    },
    NewEventListener {
        name: String,
        id: NodeId,
        #[serde(default)]
        handler: BoundaryValue,
    },
    RemoveEventListener {
        id: NodeId,
        name: String,
    },
    SaveTemplate {
        name: String,
        count: usize,
    },
    LoadTemplate {
        name: String,
        index: usize,
        id: NodeId,
    },
    AssignId {
        path: Vec<usize>,
        id: NodeId,
    },
    ReplacePlaceholder {
        path: Vec<usize>,
        count: usize,
    },
}

impl DomEdit {
    /// Wire name of the instruction, used in diagnostics.
    pub fn opcode(&self) -> &'static str {
        match self {
            DomEdit::CreateElement { .. } => "create_element",
            DomEdit::CreateElementNs { .. } => "create_element_ns",
            DomEdit::CreateTextNode { .. } => "create_text_node",
            DomEdit::CreatePlaceholder { .. } => "create_placeholder",
            DomEdit::SetNode { .. } => "set_node",
            DomEdit::PushRoot { .. } => "push_root",
            DomEdit::PopRoot => "pop_root",
            DomEdit::AppendChildren { .. } => "append_children",
            DomEdit::ReplaceWith { .. } => "replace_with",
            DomEdit::InsertAfter { .. } => "insert_after",
            DomEdit::InsertBefore { .. } => "insert_before",
            DomEdit::Remove { .. } => "remove",
            DomEdit::SetText { .. } => "set_text",
            DomEdit::SetAttribute { .. } => "set_attribute",
            DomEdit::RemoveAttribute { .. } => "remove_attribute",
            DomEdit::NewEventListener { .. } => "new_event_listener",
            DomEdit::RemoveEventListener { .. } => "remove_event_listener",
            DomEdit::SaveTemplate { .. } => "save_template",
            DomEdit::LoadTemplate { .. } => "load_template",
            DomEdit::AssignId { .. } => "assign_id",
            DomEdit::ReplacePlaceholder { .. } => "replace_placeholder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_instructions() {
        let edits: Vec<DomEdit> = serde_json::from_str(
            r#"[
                {"type":"create_element","tag":"div","id":1},
                {"type":"set_attribute","id":1,"name":"class","value":{"kind":"text","value":"active"}},
                {"type":"set_attribute","id":1,"name":"hidden"},
                {"type":"pop_root"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            edits[0],
            DomEdit::CreateElement {
                tag: "div".into(),
                id: NodeId(1)
            }
        );
        assert_eq!(edits[1].opcode(), "set_attribute");
        assert!(matches!(
            &edits[2],
            DomEdit::SetAttribute { value, namespace: None, .. } if value.is_null()
        ));
        assert_eq!(edits[3], DomEdit::PopRoot);
    }
}

use blitz_dom::node::NodeData;
use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{Document, NodeHandle};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Document {
    pub fn outer_html(&self, node: NodeHandle) -> String {
        let mut output = String::new();
        self.serialize_node(node, &mut output);
        output
    }

    pub fn inner_html(&self, node: NodeHandle) -> String {
        let mut output = String::new();
        self.serialize_children(node, &mut output);
        output
    }

    fn serialize_children(&self, node: NodeHandle, output: &mut String) {
        for child in self.children(node) {
            self.serialize_node(child, output);
        }
    }

    fn serialize_node(&self, node: NodeHandle, output: &mut String) {
        if self.placeholders.contains(&node.0) {
            output.push_str("<!--placeholder-->");
            return;
        }
        if self.fragments.contains(&node.0) {
            self.serialize_children(node, output);
            return;
        }
        let Some(record) = self.inner.get_node(node.0) else {
            return;
        };
        match &record.data {
            NodeData::Document | NodeData::AnonymousBlock(_) => {
                self.serialize_children(node, output)
            }
            NodeData::Element(data) => {
                let tag: &str = &data.name.local;
                output.push('<');
                output.push_str(tag);
                for attr in data.attrs.iter() {
                    output.push(' ');
                    output.push_str(&attr.name.local);
                    output.push_str("=\"");
                    output.push_str(&encode_double_quoted_attribute(&*attr.value));
                    output.push('"');
                }
                output.push('>');
                if self.namespace(node).is_none() && VOID_ELEMENTS.contains(&tag) {
                    return;
                }
                self.serialize_children(node, output);
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeData::Text(text) => output.push_str(&encode_text(&text.content)),
            NodeData::Comment => {
                output.push_str("<!--");
                if let Some(payload) = self.comments.get(&node.0) {
                    output.push_str(payload);
                }
                output.push_str("-->");
            }
        }
    }
}

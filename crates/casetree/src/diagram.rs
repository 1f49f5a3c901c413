//! Generic diagram export and Mermaid rendering.
//!
//! The export shape is what external visualizers consume: an ID, a display
//! label, an open-ended conditions map, and children. [`Tree::to_mermaid`]
//! renders the same structure as a Mermaid flowchart for embedding in
//! Markdown docs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tree::{NodeId, Tree};

/// A render-ready view of one node, decoupled from the generic tree types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiagramNode>,
}

impl<Q, R, C, V> Tree<Q, R, C, V> {
    /// Export the tree in the generic diagram shape. The label falls back
    /// from description to ID; tags become a `tags` condition.
    pub fn to_diagram(&self) -> DiagramNode {
        self.diagram_node(self.root_id())
    }

    fn diagram_node(&self, at: NodeId) -> DiagramNode {
        let node = self.node(at);
        let label = if node.description().is_empty() {
            node.id().to_string()
        } else {
            node.description().to_string()
        };

        let mut conditions = BTreeMap::new();
        if !node.tags().is_empty() {
            conditions.insert("tags".to_string(), Value::from(node.tags().to_vec()));
        }

        DiagramNode {
            id: node.id().to_string(),
            label,
            conditions,
            children: node
                .children
                .iter()
                .map(|&child| self.diagram_node(child))
                .collect(),
        }
    }

    /// Render a Mermaid flowchart (top-down) of the tree.
    ///
    /// The root is drawn rounded, leaves as rectangles and interior nodes
    /// as diamonds. Node IDs are sanitized for Mermaid; nodes without an ID
    /// get a positional one.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        self.mermaid_node(self.root_id(), None, &mut out);
        out
    }

    fn mermaid_node(&self, at: NodeId, parent: Option<&str>, out: &mut String) {
        let node = self.node(at);
        let mermaid_id = if node.id().is_empty() {
            format!("node_{}", at.0)
        } else {
            node.id().replace([' ', '-'], "_")
        };
        let label = escape_label(&node_label(node.id(), node.description()));

        if parent.is_none() {
            out.push_str(&format!("    {mermaid_id}(\"{label}\");\n"));
        } else if node.children.is_empty() {
            out.push_str(&format!("    {mermaid_id}[\"{label}\"];\n"));
        } else {
            out.push_str(&format!("    {mermaid_id}{{\"{label}\"}};\n"));
        }

        if let Some(parent) = parent {
            out.push_str(&format!("    {parent} --> {mermaid_id};\n"));
        }

        for &child in &node.children {
            self.mermaid_node(child, Some(&mermaid_id), out);
        }
    }
}

/// Label with both ID and description when available; the description is
/// HTML-escaped and italicized (Mermaid supports HTML in labels).
fn node_label(id: &str, description: &str) -> String {
    if description.is_empty() && id.is_empty() {
        "Node".to_string()
    } else if description.is_empty() {
        id.to_string()
    } else if id.is_empty() {
        description.to_string()
    } else {
        format!("{id}<br><i>{}</i>", html_escape(description))
    }
}

fn escape_label(label: &str) -> String {
    // Quotes would terminate the Mermaid label; HTML tags stay as-is.
    label.replace('"', "\\\"")
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

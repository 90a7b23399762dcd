//! Codegen module
//!
//! Renders an AST back into markup. Output is the surface inverse of the Tree
//! Builder: identities are re-emitted (`data-node-id` on elements, a `<!--nid:ID-->`
//! marker before text runs) so reprocessing recovers the same nodes.

use crate::parse::IDENTITY_MARKER_PREFIX;
use crate::validate::{AstNode, IDENTITY_ATTR};

/// Elements that never have children or a closing tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Render a tree to markup.
pub fn serialize(tree: &[AstNode]) -> String {
    let mut out = String::new();
    for node in tree {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &AstNode) {
    if node.is_text() {
        if let Some(id) = &node.id {
            out.push_str("<!--");
            out.push_str(IDENTITY_MARKER_PREFIX);
            out.push_str(id);
            out.push_str("-->");
        }
        out.push_str(&escape_text(node.text.as_deref().unwrap_or_default()));
        return;
    }

    out.push('<');
    out.push_str(&node.tag);
    for (name, value) in &node.attrs {
        write_attr(out, name, value);
    }
    if let Some(id) = &node.id {
        write_attr(out, IDENTITY_ATTR, id);
    }
    out.push('>');

    if is_void_tag(&node.tag) {
        return;
    }

    for child in &node.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&node.tag);
    out.push('>');
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

fn escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

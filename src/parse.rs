//! Parse Module
//!
//! HTML5-compliant parsing of markup fragments via html5ever. The parser always
//! builds a full document, so the `html`/`head`/`body` wrappers it synthesizes are
//! flattened away and the fragment's own top-level nodes are returned.

use html5ever::parse_document;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use tendril::TendrilSink;

use crate::validate::{CompilerError, ERR_NO_ROOT, ERR_PARSE};

lazy_static! {
    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap();
    static ref STYLE_RE: Regex = Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap();
}

/// Comment prefix carrying the identity of the text run that follows it.
pub const IDENTITY_MARKER_PREFIX: &str = "nid:";

/// Characters that render as nothing and only confuse editors.
const INVISIBLE_CHARS: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Remove every `<script>` block. Scripts never become part of a pane.
pub fn strip_scripts(markup: &str) -> String {
    SCRIPT_RE.replace_all(markup, "").to_string()
}

/// Pull `<style>` blocks out of the markup.
/// Returns the markup without them and their contents in document order.
pub fn extract_style_blocks(markup: &str) -> (String, Vec<String>) {
    let blocks = STYLE_RE
        .captures_iter(markup)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|block| !block.is_empty())
        .collect();
    (STYLE_RE.replace_all(markup, "").to_string(), blocks)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strip invisible characters, collapse whitespace runs, trim.
pub fn normalize_text(raw: &str) -> String {
    let visible: String = raw.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect();
    visible.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity carried by a `<!--nid:ID-->` marker comment.
pub fn identity_marker(comment: &str) -> Option<&str> {
    comment
        .trim()
        .strip_prefix(IDENTITY_MARKER_PREFIX)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOM ACCESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Attributes of an element handle in document order. Empty for non-elements.
pub fn element_attrs(handle: &Handle) -> Vec<(String, String)> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn element_name(handle: &Handle) -> Option<String> {
    match &handle.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed fragment. Handles are only populated while the owning document lives:
/// dropping an `RcDom` empties the children of every node it ever held.
pub struct ParsedFragment {
    _dom: RcDom,
    nodes: Vec<Handle>,
}

impl ParsedFragment {
    /// Top-level nodes of the fragment, wrappers flattened.
    pub fn nodes(&self) -> &[Handle] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Parse a markup fragment and return its top-level nodes with their document.
pub fn parse_fragment(markup: &str) -> Result<ParsedFragment, CompilerError> {
    let cleaned = strip_scripts(markup);

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut cleaned.as_bytes())
        .map_err(|e| {
            CompilerError::new(ERR_PARSE, &format!("Failed to parse markup: {}", e))
        })?;

    if !dom.errors.is_empty() {
        tracing::debug!(count = dom.errors.len(), "markup parsed with recoverable errors");
    }

    let html = dom
        .document
        .children
        .borrow()
        .iter()
        .find(|child| element_name(child).as_deref() == Some("html"))
        .cloned()
        .ok_or_else(|| CompilerError::new(ERR_NO_ROOT, "Parsed document has no <html> root"))?;

    let mut nodes = Vec::new();
    let mut has_body = false;

    for wrapper in html.children.borrow().iter() {
        match element_name(wrapper).as_deref() {
            Some("head") => nodes.extend(wrapper.children.borrow().iter().cloned()),
            Some("body") => {
                has_body = true;
                nodes.extend(wrapper.children.borrow().iter().cloned());
            }
            _ => nodes.push(wrapper.clone()),
        }
    }

    if !has_body {
        return Err(CompilerError::with_details(
            ERR_NO_ROOT,
            "Parsed document has no <body> to host the fragment",
            None,
            vec!["Frameset documents cannot be compiled into a pane.".to_string()],
        ));
    }

    Ok(ParsedFragment { _dom: dom, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(nodes: &[Handle]) -> Vec<String> {
        nodes.iter().filter_map(element_name).collect()
    }

    #[test]
    fn test_fragment_wrappers_are_flattened() {
        let fragment = parse_fragment("<div><p>Hi</p></div><img src=\"/a.png\">").unwrap();
        assert_eq!(tags(fragment.nodes()), vec!["div", "img"]);
    }

    #[test]
    fn test_nested_nodes_outlive_parse() {
        let fragment = parse_fragment("<div><p>Hello</p><img src=\"/a\"></div>").unwrap();
        let div = &fragment.nodes()[0];
        let kids: Vec<Handle> = div.children.borrow().iter().cloned().collect();
        assert_eq!(tags(&kids), vec!["p", "img"]);

        let text = kids[0].children.borrow()[0].clone();
        match &text.data {
            NodeData::Text { contents } => assert_eq!(contents.borrow().to_string(), "Hello"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_scripts_are_removed() {
        let fragment = parse_fragment("<script>alert(1)</script><p>ok</p>").unwrap();
        assert_eq!(tags(fragment.nodes()), vec!["p"]);
    }

    #[test]
    fn test_attribute_order_preserved() {
        let fragment = parse_fragment("<div class=\"a\" id=\"x\" style=\"color:red\"></div>").unwrap();
        let names: Vec<String> = element_attrs(&fragment.nodes()[0]).into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["class", "id", "style"]);
    }

    #[test]
    fn test_extract_style_blocks() {
        let (markup, blocks) =
            extract_style_blocks("<style>.a{color:red}</style><p>x</p><STYLE media=\"all\">.b{}</STYLE>");
        assert_eq!(markup, "<p>x</p>");
        assert_eq!(blocks, vec![".a{color:red}".to_string(), ".b{}".to_string()]);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello \n\t world\u{200B} "), "Hello world");
        assert_eq!(normalize_text("\u{FEFF} \u{200D}"), "");
        assert_eq!(normalize_text("a\u{00A0}b"), "a\u{00A0}b");
    }

    #[test]
    fn test_identity_marker() {
        assert_eq!(identity_marker("nid:abc"), Some("abc"));
        assert_eq!(identity_marker(" nid: abc "), Some("abc"));
        assert_eq!(identity_marker("nid:"), None);
        assert_eq!(identity_marker("just a comment"), None);
    }

    #[test]
    fn test_empty_markup_yields_no_nodes() {
        assert!(parse_fragment("").unwrap().is_empty());
    }

    #[test]
    fn test_frameset_has_no_body() {
        let err = parse_fragment("<frameset></frameset>").err().unwrap();
        assert_eq!(err.code, ERR_NO_ROOT);
    }
}

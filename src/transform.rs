//! Tree Builder
//!
//! Walks parsed markup depth-first and lowers it into AST nodes plus an asset table.
//!
//! ## Invariants
//!
//! 1. **No raw styling**: author `class` tokens are replaced by the hashes a
//!    [`ClassResolver`] returns, and inline `style` never reaches the AST.
//! 2. **Allow-listed attributes only**: everything else is dropped.
//! 3. **Stable identity**: an element or text run that arrives with an identity keeps
//!    it. New identities are minted only for text-editable elements, assets and text
//!    runs under a text-editable ancestor.
//! 4. **Unique identity**: an identity seen twice in one walk is re-minted the second
//!    time (duplicated markup).
//! 5. **Trusted identity**: with [`TreeBuilder::keep_embedded_identity`], an element
//!    that arrives with an identity keeps it even when nothing classifies it. Used for
//!    already-compiled markup, whose class backgrounds cannot be re-derived.

use markup5ever_rcdom::{Handle, NodeData};
use std::collections::HashSet;
use uuid::Uuid;

use crate::capability::{
    extract_capability, is_text_editable, BackgroundLookup, ElementView, NoBackgroundLookup,
};
use crate::parse::{element_attrs, identity_marker, normalize_text};
use crate::style::StyleRegistry;
use crate::validate::{is_allowed_attr, AssetTable, AstNode, IDENTITY_ATTR};

/// Elements whose content never becomes part of a pane.
const SKIPPED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Mint a globally unique, time-sortable node identity.
pub fn mint_node_id() -> String {
    Uuid::now_v7().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASS RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// How a walk turns author styling into class tokens.
pub trait ClassResolver: BackgroundLookup {
    /// Map a raw `class` attribute to the tokens the AST keeps.
    fn resolve_classes(&mut self, raw: &str) -> Vec<String>;

    /// Turn an inline `style` body into a class token, if this resolver can.
    fn resolve_inline_style(&mut self, declarations: &str) -> Option<String>;
}

impl ClassResolver for StyleRegistry {
    fn resolve_classes(&mut self, raw: &str) -> Vec<String> {
        self.resolve_class_attr(raw)
    }

    fn resolve_inline_style(&mut self, declarations: &str) -> Option<String> {
        self.register_inline_style(declarations)
    }
}

/// Resolver for markup that was already compiled: tokens are kept as-is and inline
/// styles cannot be registered anywhere.
pub struct VerbatimClasses;

impl BackgroundLookup for VerbatimClasses {
    fn background_for_class(&self, class: &str) -> Option<String> {
        NoBackgroundLookup.background_for_class(class)
    }
}

impl ClassResolver for VerbatimClasses {
    fn resolve_classes(&mut self, raw: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        raw.split_ascii_whitespace()
            .filter(|token| seen.insert(*token))
            .map(str::to_string)
            .collect()
    }

    fn resolve_inline_style(&mut self, _declarations: &str) -> Option<String> {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TreeBuilder<'r, R: ClassResolver> {
    resolver: &'r mut R,
    assets: AssetTable,
    seen_ids: HashSet<String>,
    keep_embedded_identity: bool,
}

impl<'r, R: ClassResolver> TreeBuilder<'r, R> {
    pub fn new(resolver: &'r mut R) -> Self {
        TreeBuilder {
            resolver,
            assets: AssetTable::new(),
            seen_ids: HashSet::new(),
            keep_embedded_identity: false,
        }
    }

    pub fn keep_embedded_identity(mut self, keep: bool) -> Self {
        self.keep_embedded_identity = keep;
        self
    }

    /// Lower the top-level nodes of a fragment.
    pub fn build(mut self, nodes: &[Handle]) -> (Vec<AstNode>, AssetTable) {
        let tree = self.build_children(nodes, false);
        (tree, self.assets)
    }

    fn claim_id(&mut self, existing: Option<&str>) -> String {
        if let Some(id) = existing.map(str::trim).filter(|id| !id.is_empty()) {
            if self.seen_ids.insert(id.to_string()) {
                return id.to_string();
            }
            tracing::debug!(id, "duplicate identity in markup, minting a new one");
        }
        let id = mint_node_id();
        self.seen_ids.insert(id.clone());
        id
    }

    fn build_children(&mut self, handles: &[Handle], in_editable: bool) -> Vec<AstNode> {
        let mut out = Vec::new();
        let mut pending_id: Option<String> = None;

        for handle in handles {
            match &handle.data {
                NodeData::Comment { contents } => {
                    if let Some(id) = identity_marker(contents) {
                        pending_id = Some(id.to_string());
                    }
                }
                NodeData::Text { contents } => {
                    let text = normalize_text(&contents.borrow());
                    let marker = pending_id.take();
                    if text.is_empty() {
                        continue;
                    }
                    let id = if in_editable {
                        Some(self.claim_id(marker.as_deref()))
                    } else {
                        None
                    };
                    out.push(AstNode::text(&text, id));
                }
                NodeData::Element { .. } => {
                    pending_id = None;
                    if let Some(node) = self.build_element(handle, in_editable) {
                        out.push(node);
                    }
                }
                _ => {}
            }
        }

        out
    }

    fn build_element(&mut self, handle: &Handle, in_editable: bool) -> Option<AstNode> {
        let tag = match &handle.data {
            NodeData::Element { name, .. } => name.local.to_string().to_ascii_lowercase(),
            _ => return None,
        };
        if SKIPPED_TAGS.contains(&tag.as_str()) {
            return None;
        }

        let raw_attrs = element_attrs(handle);
        let attr = |name: &str| {
            raw_attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let mut classes = attr("class")
            .map(|raw| self.resolver.resolve_classes(raw))
            .unwrap_or_default();
        if let Some(style) = attr("style").filter(|s| !s.trim().is_empty()) {
            if let Some(hash) = self.resolver.resolve_inline_style(style) {
                if !classes.contains(&hash) {
                    classes.push(hash);
                }
            }
        }

        let view = ElementView {
            tag: &tag,
            attrs: &raw_attrs,
            classes: &classes,
        };
        let asset = extract_capability(&view, &*self.resolver);
        let editable = is_text_editable(&tag);

        let mut node = AstNode::element(&tag);
        for (name, value) in &raw_attrs {
            if name != "class" && is_allowed_attr(name) {
                node.attrs.insert(name.clone(), value.clone());
            }
        }
        if !classes.is_empty() {
            node.attrs.insert("class".to_string(), classes.join(" "));
        }

        let embedded = attr(IDENTITY_ATTR).filter(|id| !id.trim().is_empty());
        let trusted = self.keep_embedded_identity && embedded.is_some();
        if editable || asset.is_some() || trusted {
            let id = self.claim_id(embedded);
            if let Some(asset) = asset {
                self.assets.insert(id.clone(), asset);
            }
            node.id = Some(id);
        }

        let children: Vec<Handle> = handle.children.borrow().iter().cloned().collect();
        node.children = self.build_children(&children, in_editable || editable);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_fragment;
    use crate::validate::AssetKind;

    fn build_with(registry: &mut StyleRegistry, markup: &str) -> (Vec<AstNode>, AssetTable) {
        let fragment = parse_fragment(markup).unwrap();
        TreeBuilder::new(registry).build(fragment.nodes())
    }

    #[test]
    fn test_classes_replaced_by_hashes() {
        let mut registry = StyleRegistry::new();
        registry.ingest(".box{display:flex}\n@media (min-width: 801px){.box{display:grid}}");
        let (tree, _) = build_with(&mut registry, "<div class=\"box unknown box\"></div>");

        assert_eq!(tree[0].attrs.get("class"), Some(&registry.lookup_class("box")));
        assert_eq!(tree[0].classes().len(), 2);
        assert!(tree[0].id.is_none());
    }

    #[test]
    fn test_inline_style_becomes_class() {
        let mut registry = StyleRegistry::new();
        let (tree, _) = build_with(&mut registry, "<div style=\"color: red\" title=\"x\"></div>");
        let node = &tree[0];
        assert!(node.attrs.get("style").is_none());
        assert!(node.attrs.get("title").is_none());
        let class = node.attrs.get("class").unwrap();
        assert_eq!(registry.declarations_for(class), Some("color:red".to_string()));
    }

    #[test]
    fn test_editable_text_gets_identity() {
        let mut registry = StyleRegistry::new();
        let (tree, assets) = build_with(&mut registry, "<div><p>  Hello\n  <b>bold</b> </p>plain</div>");
        let div = &tree[0];
        assert!(div.id.is_none());

        let p = &div.children[0];
        assert!(p.id.is_some());
        assert_eq!(p.children[0].text.as_deref(), Some("Hello"));
        assert!(p.children[0].id.is_some());

        let b = &p.children[1];
        assert!(b.id.is_none());
        assert!(b.children[0].id.is_some(), "text under an editable ancestor");

        let plain = &div.children[1];
        assert_eq!(plain.text.as_deref(), Some("plain"));
        assert!(plain.id.is_none());
        assert!(assets.is_empty());
    }

    #[test]
    fn test_existing_identity_preserved() {
        let mut registry = StyleRegistry::new();
        let (tree, assets) = build_with(
            &mut registry,
            "<img data-node-id=\"img-1\" src=\"/a.png\"><p data-node-id=\"p-1\"><!--nid:t-1-->Hi</p>",
        );
        assert_eq!(tree[0].id.as_deref(), Some("img-1"));
        assert_eq!(assets.get("img-1").map(|a| a.kind()), Some(AssetKind::Image));
        assert_eq!(tree[1].id.as_deref(), Some("p-1"));
        assert_eq!(tree[1].children[0].id.as_deref(), Some("t-1"));
        assert!(tree[0].attrs.get(IDENTITY_ATTR).is_none());
    }

    #[test]
    fn test_duplicate_identity_reminted() {
        let mut registry = StyleRegistry::new();
        let (tree, _) = build_with(
            &mut registry,
            "<p data-node-id=\"same\">a</p><p data-node-id=\"same\">b</p>",
        );
        assert_eq!(tree[0].id.as_deref(), Some("same"));
        assert_ne!(tree[1].id.as_deref(), Some("same"));
    }

    #[test]
    fn test_identity_on_plain_element_dropped() {
        let mut registry = StyleRegistry::new();
        let (tree, _) = build_with(&mut registry, "<div data-node-id=\"d\"></div>");
        assert!(tree[0].id.is_none());
    }

    #[test]
    fn test_class_background_asset() {
        let mut registry = StyleRegistry::new();
        registry.ingest(".hero{background-image:url(/hero.jpg)}");
        let (tree, assets) = build_with(&mut registry, "<section class=\"hero\"></section>");
        let id = tree[0].id.clone().unwrap();
        assert!(assets[&id].is_css_background());
    }

    #[test]
    fn test_verbatim_resolver_keeps_tokens() {
        let fragment = parse_fragment("<div class=\"sabc sabc sdef\" style=\"color:red\"></div>").unwrap();
        let mut resolver = VerbatimClasses;
        let (tree, _) = TreeBuilder::new(&mut resolver).build(fragment.nodes());
        assert_eq!(tree[0].attrs.get("class").map(String::as_str), Some("sabc sdef"));
        assert!(tree[0].attrs.get("style").is_none());
    }

    #[test]
    fn test_embedded_identity_kept_when_trusted() {
        let fragment = parse_fragment("<div data-node-id=\"d\"></div><div></div>").unwrap();
        let mut resolver = VerbatimClasses;
        let (tree, assets) = TreeBuilder::new(&mut resolver)
            .keep_embedded_identity(true)
            .build(fragment.nodes());
        assert_eq!(tree[0].id.as_deref(), Some("d"));
        assert!(tree[1].id.is_none());
        assert!(assets.is_empty());
    }
}

//! Patch-and-Regenerate
//!
//! An edit to one asset is applied to a copy of the tree, the copy is serialized, and
//! the whole pipeline runs again. Nothing is mutated in place, so every payload the
//! caller holds stays valid.
//!
//! ## Ordering
//!
//! 1. Attributes on the target node (hints always, kind-specific fields only when the
//!    update's kind matches the node's existing asset kind).
//! 2. Background URL substitution in the compiled style text.
//! 3. Full recompile of the patched markup.
//! 4. Update fields overlaid on the fresh metadata entry. The overlay wins even when
//!    step 2 found nothing to substitute.

use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::codegen;
use crate::compiler::Compiler;
use crate::css;
use crate::validate::{
    AssetHints, AssetKind, AssetMetadata, AssetTable, AstNode, BackgroundAsset, ButtonAsset,
    ButtonPayload, CompilerError, CreativePanePayload, ImageAsset, LinkAsset,
};

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// What to do with one asset hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum HintChange {
    #[default]
    Keep,
    Set(String),
    Clear,
}

impl HintChange {
    fn apply(&self, current: &mut Option<String>) {
        match self {
            HintChange::Keep => {}
            HintChange::Set(value) => *current = Some(value.clone()),
            HintChange::Clear => *current = None,
        }
    }

    fn apply_attr(&self, node: &mut AstNode, attr: &str) {
        match self {
            HintChange::Keep => {}
            HintChange::Set(value) => {
                node.attrs.insert(attr.to_string(), value.clone());
            }
            HintChange::Clear => {
                node.attrs.remove(attr);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HintsUpdate {
    pub file_id: HintChange,
    pub collection: HintChange,
    pub image_key: HintChange,
}

impl HintsUpdate {
    fn apply(&self, hints: &mut AssetHints) {
        self.file_id.apply(&mut hints.file_id);
        self.collection.apply(&mut hints.collection);
        self.image_key.apply(&mut hints.image_key);
    }

    fn apply_attrs(&self, node: &mut AstNode) {
        self.file_id.apply_attr(node, "data-file-id");
        self.collection.apply_attr(node, "data-collection");
        self.image_key.apply_attr(node, "data-image-key");
    }
}

/// Button fields to merge; `None` leaves the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ButtonPatch {
    pub callback: Option<String>,
    pub is_external: Option<bool>,
    pub video: Option<String>,
}

impl ButtonPatch {
    fn apply(&self, button: &mut ButtonPayload) {
        if let Some(callback) = &self.callback {
            button.callback = Some(callback.clone()).filter(|c| !c.is_empty());
        }
        if let Some(external) = self.is_external {
            button.is_external = external;
        }
        if let Some(video) = &self.video {
            button.video = Some(video.clone()).filter(|v| !v.is_empty());
        }
    }

    fn apply_attrs(&self, node: &mut AstNode) {
        set_or_remove(node, "data-callback", self.callback.as_deref());
        if let Some(external) = self.is_external {
            node.attrs
                .insert("data-external".to_string(), external.to_string());
        }
        set_or_remove(node, "data-video", self.video.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AssetUpdate {
    Image {
        #[serde(default)]
        src: Option<String>,
        #[serde(default, rename = "srcSet")]
        src_set: Option<String>,
        #[serde(default)]
        alt: Option<String>,
        #[serde(default)]
        hints: HintsUpdate,
    },
    Link {
        #[serde(default)]
        href: Option<String>,
        #[serde(default)]
        button: ButtonPatch,
        #[serde(default)]
        hints: HintsUpdate,
    },
    Button {
        #[serde(default)]
        button: ButtonPatch,
        #[serde(default)]
        hints: HintsUpdate,
    },
    CssBackground {
        url: String,
        #[serde(default)]
        hints: HintsUpdate,
    },
}

impl AssetUpdate {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetUpdate::Image { .. } => AssetKind::Image,
            AssetUpdate::Link { .. } => AssetKind::Link,
            AssetUpdate::Button { .. } => AssetKind::Button,
            AssetUpdate::CssBackground { .. } => AssetKind::CssBackground,
        }
    }

    pub fn hints(&self) -> &HintsUpdate {
        match self {
            AssetUpdate::Image { hints, .. }
            | AssetUpdate::Link { hints, .. }
            | AssetUpdate::Button { hints, .. }
            | AssetUpdate::CssBackground { hints, .. } => hints,
        }
    }

    /// An empty asset of this update's kind, used when the target has no entry.
    fn blank_asset(&self, tag_name: String) -> AssetMetadata {
        match self {
            AssetUpdate::Image { .. } => AssetMetadata::Image(ImageAsset {
                tag_name,
                src: None,
                src_set: None,
                alt: None,
                hints: AssetHints::default(),
            }),
            AssetUpdate::Link { .. } => AssetMetadata::Link(LinkAsset {
                tag_name,
                href: None,
                button: ButtonPayload::default(),
                hints: AssetHints::default(),
            }),
            AssetUpdate::Button { .. } => AssetMetadata::Button(ButtonAsset {
                tag_name,
                button: ButtonPayload::default(),
                hints: AssetHints::default(),
            }),
            AssetUpdate::CssBackground { url, .. } => AssetMetadata::CssBackground(BackgroundAsset {
                tag_name,
                background_image: url.clone(),
                hints: AssetHints::default(),
            }),
        }
    }
}

fn default_tag(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Image => "img",
        AssetKind::Link => "a",
        AssetKind::Button => "button",
        AssetKind::CssBackground => "div",
    }
}

fn set_or_remove(node: &mut AstNode, attr: &str, value: Option<&str>) {
    match value {
        Some("") => {
            node.attrs.remove(attr);
        }
        Some(value) => {
            node.attrs.insert(attr.to_string(), value.to_string());
        }
        None => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATION
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) async fn patch(
    compiler: &Compiler,
    payload: &CreativePanePayload,
    target_id: &str,
    update: &AssetUpdate,
) -> Result<CreativePanePayload, CompilerError> {
    let previous = payload.asset_metadata.get(target_id);
    let mut arena = NodeArena::from_tree(&payload.tree);
    let mut style_text = payload.compiled_style_text.clone();
    let mut target_tag = None;

    match arena.find(target_id) {
        Some(idx) => {
            let node = arena.get_mut(idx);
            target_tag = Some(node.tag.clone());
            patch_node(node, previous.map(AssetMetadata::kind), update);

            if let AssetUpdate::CssBackground { url, .. } = update {
                if previous.map(AssetMetadata::kind) == Some(AssetKind::CssBackground) {
                    let classes: Vec<String> = node.classes().iter().map(|c| c.to_string()).collect();
                    match substitute_background(&style_text, &classes, url) {
                        Some(text) => style_text = text,
                        None => tracing::warn!(
                            target_id,
                            "no background rule on the target's classes, keeping style text"
                        ),
                    }
                }
            }
        }
        None => tracing::warn!(target_id, "patch target not found in tree"),
    }

    let markup = codegen::serialize(&arena.into_tree());
    let mut regenerated = compiler.compile(&markup, &style_text).await?;
    overlay(
        &mut regenerated.asset_metadata,
        target_id,
        previous,
        target_tag.as_deref(),
        update,
    );
    Ok(regenerated)
}

/// Write the update into the node's attributes.
fn patch_node(node: &mut AstNode, existing: Option<AssetKind>, update: &AssetUpdate) {
    update.hints().apply_attrs(node);

    if existing != Some(update.kind()) {
        tracing::debug!(?existing, update = ?update.kind(), "update kind does not match asset, attributes skipped");
        return;
    }

    match update {
        AssetUpdate::Image { src, src_set, alt, .. } => {
            set_or_remove(node, "src", src.as_deref());
            set_or_remove(node, "srcset", src_set.as_deref());
            if let Some(alt) = alt {
                node.attrs.insert("alt".to_string(), alt.clone());
            }
        }
        AssetUpdate::Link { href, button, .. } => {
            set_or_remove(node, "href", href.as_deref());
            button.apply_attrs(node);
        }
        AssetUpdate::Button { button, .. } => button.apply_attrs(node),
        AssetUpdate::CssBackground { .. } => {}
    }
}

/// Replace the URL in the first background rule selected by one of `classes`.
/// Returns `None` when no such rule exists.
pub fn substitute_background(style_text: &str, classes: &[String], url: &str) -> Option<String> {
    let mut sheet = css::parse_stylesheet(style_text);
    let replaced = sheet.rules_mut().any(|(_, rule)| {
        let selected = rule.selectors.iter().any(|selector| {
            css::split_class_selector(selector).is_some_and(|(name, _)| classes.contains(&name))
        });
        selected && css::replace_background_url(&mut rule.declarations, url)
    });
    replaced.then(|| sheet.to_string())
}

/// Lay the update over the target's metadata entry, creating it if needed.
///
/// A created entry copies the previous entry of the same kind when there is one.
/// Otherwise its tag is the target node's tag, or the kind's default tag when the
/// target is not in the tree.
fn overlay(
    table: &mut AssetTable,
    target_id: &str,
    previous: Option<&AssetMetadata>,
    target_tag: Option<&str>,
    update: &AssetUpdate,
) {
    if let Some(entry) = table.get_mut(target_id) {
        overlay_entry(entry, update);
        return;
    }

    let mut entry = match previous.filter(|p| p.kind() == update.kind()) {
        Some(p) => p.clone(),
        None => {
            let tag = target_tag.unwrap_or_else(|| default_tag(update.kind()));
            update.blank_asset(tag.to_string())
        }
    };
    overlay_entry(&mut entry, update);
    table.insert(target_id.to_string(), entry);
}

fn overlay_entry(entry: &mut AssetMetadata, update: &AssetUpdate) {
    update.hints().apply(entry.hints_mut());

    match (entry, update) {
        (AssetMetadata::Image(image), AssetUpdate::Image { src, src_set, alt, .. }) => {
            if let Some(src) = src {
                image.src = Some(src.clone()).filter(|s| !s.is_empty());
            }
            if let Some(src_set) = src_set {
                image.src_set = Some(src_set.clone()).filter(|s| !s.is_empty());
            }
            if let Some(alt) = alt {
                image.alt = Some(alt.clone());
            }
        }
        (AssetMetadata::Link(link), AssetUpdate::Link { href, button, .. }) => {
            if let Some(href) = href {
                link.href = Some(href.clone()).filter(|h| !h.is_empty());
            }
            button.apply(&mut link.button);
        }
        (AssetMetadata::Button(asset), AssetUpdate::Button { button, .. }) => {
            button.apply(&mut asset.button);
        }
        (AssetMetadata::CssBackground(bg), AssetUpdate::CssBackground { url, .. }) => {
            bg.background_image = url.clone();
        }
        _ => {}
    }
}

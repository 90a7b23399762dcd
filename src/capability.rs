//! Capability extraction: decides whether an element is an editable asset.
//!
//! Classification order is fixed and tag detection always wins:
//! 1. `<img>`    → image
//! 2. `<a>`      → link (href + button payload)
//! 3. `<button>` → button (button payload only)
//! 4. background image, inline `style` first, then resolved classes in attribute order
//! 5. anything else is plain structure

use crate::css;
use crate::style::StyleRegistry;
use crate::validate::{
    AssetHints, AssetMetadata, BackgroundAsset, ButtonAsset, ButtonPayload, ImageAsset, LinkAsset,
};

/// Tags whose text content is directly editable.
const TEXT_EDITABLE_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "li"];

pub fn is_text_editable(tag: &str) -> bool {
    TEXT_EDITABLE_TAGS.contains(&tag)
}

/// Resolves background images declared through registry classes.
pub trait BackgroundLookup {
    fn background_for_class(&self, class: &str) -> Option<String>;
}

impl BackgroundLookup for StyleRegistry {
    fn background_for_class(&self, class: &str) -> Option<String> {
        self.background_image_for(class)
    }
}

/// Lookup used when no registry exists; only inline declarations are recoverable.
pub struct NoBackgroundLookup;

impl BackgroundLookup for NoBackgroundLookup {
    fn background_for_class(&self, _class: &str) -> Option<String> {
        None
    }
}

/// The parts of a parsed element the extractor needs.
#[derive(Debug, Clone, Copy)]
pub struct ElementView<'a> {
    pub tag: &'a str,
    /// Source attributes in document order.
    pub attrs: &'a [(String, String)],
    /// Resolved class tokens in attribute order.
    pub classes: &'a [String],
}

impl<'a> ElementView<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn non_empty_attr(&self, name: &str) -> Option<String> {
        self.attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

pub fn extract_capability<L>(view: &ElementView<'_>, lookup: &L) -> Option<AssetMetadata>
where
    L: BackgroundLookup + ?Sized,
{
    let tag_name = view.tag.to_string();
    let hints = extract_hints(view);

    match view.tag {
        "img" => Some(AssetMetadata::Image(ImageAsset {
            tag_name,
            src: view.non_empty_attr("src"),
            src_set: view.non_empty_attr("srcset"),
            alt: view.attr("alt").map(str::to_string),
            hints,
        })),
        "a" => Some(AssetMetadata::Link(LinkAsset {
            tag_name,
            href: view.non_empty_attr("href"),
            button: extract_button_payload(view),
            hints,
        })),
        "button" => Some(AssetMetadata::Button(ButtonAsset {
            tag_name,
            button: extract_button_payload(view),
            hints,
        })),
        _ => find_background_image(view, lookup).map(|background_image| {
            AssetMetadata::CssBackground(BackgroundAsset {
                tag_name,
                background_image,
                hints,
            })
        }),
    }
}

fn find_background_image<L>(view: &ElementView<'_>, lookup: &L) -> Option<String>
where
    L: BackgroundLookup + ?Sized,
{
    if let Some(style) = view.attr("style") {
        if let Some(url) = css::background_url(&css::parse_declarations(style)) {
            return Some(url);
        }
    }
    view.classes
        .iter()
        .find_map(|class| lookup.background_for_class(class))
}

pub fn extract_hints(view: &ElementView<'_>) -> AssetHints {
    AssetHints {
        file_id: view.non_empty_attr("data-file-id"),
        collection: view.non_empty_attr("data-collection"),
        image_key: view.non_empty_attr("data-image-key"),
    }
}

pub fn extract_button_payload(view: &ElementView<'_>) -> ButtonPayload {
    ButtonPayload {
        callback: view.non_empty_attr("data-callback"),
        is_external: view
            .attr("data-external")
            .map(|v| !matches!(v.trim(), "false" | "0"))
            .unwrap_or(false),
        video: view.non_empty_attr("data-video"),
    }
}

//! # Creative Pane Compiler
//!
//! Turns author markup plus style text into a [`CreativePanePayload`]: a sanitized
//! tree, content-addressed style rules, per-viewport style snapshots and a table of
//! editable assets keyed by node identity.
//!
//! ## Payload Invariants
//!
//! 1. **Hashed classes only**: every `class` token in a compiled tree names a rule in
//!    `compiled_style_text`. Author class names and inline `style` never survive.
//!
//! 2. **Content addressing**: a rule's hash is a pure function of its declarations,
//!    class name and selector suffix. Equal content always lands on the same hash.
//!
//! 3. **Stable identity**: a `data-node-id` (or `<!--nid:ID-->` marker before a text
//!    run) present in the input is carried through compile, serialize, rehydrate and
//!    patch unchanged. Identities are unique within a tree.
//!
//! 4. **Cascade-resolved snapshots**: `viewport_snapshots.{xs,md,xl}` hold, per
//!    `(class, suffix)`, only the rules of the last breakpoint layer that applies at
//!    that width.
//!
//! 5. **Asset table ⊆ tree**: every `asset_metadata` key is the identity of an element
//!    classified as image, link, button or background. A patch overlay is the one
//!    exception: it records the update even when its target has vanished.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod arena;
mod capability;
mod codegen;
mod compiler;
mod css;
mod expand;
mod parse;
mod patch;
mod rehydrate;
mod style;
mod transform;
mod validate;

#[cfg(test)]
mod patch_tests;

pub use arena::{NodeArena, NodeIdx};
pub use capability::{extract_capability, is_text_editable, BackgroundLookup, ElementView};
pub use codegen::serialize;
pub use compiler::{compile_with_expanded, CompileOptions, Compiler};
pub use expand::{ClassExpander, ExpandError, HttpClassExpander, NoExpansion};
pub use patch::{substitute_background, AssetUpdate, ButtonPatch, HintChange, HintsUpdate};
pub use rehydrate::rehydrate;
pub use style::{rewrite_viewport_units, StyleRegistry, ViewportBreakpoints};
pub use transform::mint_node_id;
pub use validate::*;

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[cfg(feature = "napi")]
#[napi]
pub fn serialize_native(tree: serde_json::Value) -> napi::Result<String> {
    let tree: Vec<AstNode> = serde_json::from_value(tree).map_err(to_napi_error)?;
    Ok(serialize(&tree))
}

#[cfg(feature = "napi")]
#[napi]
pub fn rehydrate_native(markup: String) -> napi::Result<serde_json::Value> {
    let (tree, asset_metadata) = rehydrate(&markup).map_err(to_napi_error)?;
    Ok(serde_json::json!({
        "tree": tree,
        "assetMetadata": asset_metadata,
    }))
}

/// Compile without a class-expansion service; `options` is a JSON `CompileOptions`.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_static_native(
    markup: String,
    authored_style: String,
    options: Option<String>,
) -> napi::Result<serde_json::Value> {
    let options = match options {
        Some(json) => CompileOptions::from_json(&json).map_err(to_napi_error)?,
        None => CompileOptions::default(),
    };
    let payload =
        compile_with_expanded(&markup, "", &authored_style, &options).map_err(to_napi_error)?;
    serde_json::to_value(payload).map_err(to_napi_error)
}

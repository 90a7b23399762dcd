//! Compiler facade.
//!
//! `compile_with_expanded` is the synchronous pipeline: registry → markup parse →
//! tree walk → validation → payload. [`Compiler`] wraps it with the asynchronous
//! class-expansion step and exposes the rest of the public surface.

use serde::Deserialize;
use std::sync::Arc;

use crate::codegen;
use crate::expand::{ClassExpander, NoExpansion};
use crate::parse::{extract_style_blocks, parse_fragment};
use crate::patch::{self, AssetUpdate};
use crate::rehydrate;
use crate::style::{StyleRegistry, ViewportBreakpoints};
use crate::transform::TreeBuilder;
use crate::validate::{
    validate_tree, AssetTable, AstNode, CompilerError, CreativePanePayload, ERR_PARSE,
};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    pub viewports: ViewportBreakpoints,
    /// Map `vw`/`vh` lengths to percentages in viewport snapshots.
    pub rewrite_viewport_units: bool,
    /// Register `<style>` blocks embedded in the markup.
    pub extract_style_blocks: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            viewports: ViewportBreakpoints::default(),
            rewrite_viewport_units: true,
            extract_style_blocks: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, CompilerError> {
        serde_json::from_str(json).map_err(|e| {
            CompilerError::with_details(
                ERR_PARSE,
                "Compile options are not valid JSON",
                Some(e.to_string()),
                vec!["Keys are camelCase: viewports, rewriteViewportUnits, extractStyleBlocks".into()],
            )
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile markup against style text that has already been expanded.
///
/// Style text is registered in cascade order: expanded utility classes, then the
/// authored sheet, then `<style>` blocks found in the markup.
pub fn compile_with_expanded(
    markup: &str,
    expanded_style: &str,
    authored_style: &str,
    options: &CompileOptions,
) -> Result<CreativePanePayload, CompilerError> {
    let mut registry = StyleRegistry::new().with_viewport_unit_rewrite(options.rewrite_viewport_units);
    registry.ingest(expanded_style);
    registry.ingest(authored_style);

    let (markup, embedded) = if options.extract_style_blocks {
        extract_style_blocks(markup)
    } else {
        (markup.to_string(), Vec::new())
    };
    for block in &embedded {
        registry.ingest(block);
    }
    tracing::debug!(
        rules = registry.len(),
        embedded_blocks = embedded.len(),
        "style registry populated"
    );

    let fragment = parse_fragment(&markup)?;
    let (tree, asset_metadata) = TreeBuilder::new(&mut registry).build(fragment.nodes());
    validate_tree(&tree)?;

    Ok(CreativePanePayload {
        compiled_style_text: registry.compiled_css(),
        viewport_snapshots: registry.viewport_css(&options.viewports),
        tree,
        asset_metadata,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Compiler {
    expander: Arc<dyn ClassExpander>,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(expander: impl ClassExpander + 'static) -> Self {
        Compiler {
            expander: Arc::new(expander),
            options: CompileOptions::default(),
        }
    }

    /// A compiler that never contacts an expansion service.
    pub fn offline() -> Self {
        Self::new(NoExpansion)
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile markup plus authored style text into a payload.
    ///
    /// Expansion is best-effort; a failing service only costs the utility classes it
    /// would have contributed.
    #[tracing::instrument(skip_all, fields(markup_len = markup.len()))]
    pub async fn compile(
        &self,
        markup: &str,
        authored_style: &str,
    ) -> Result<CreativePanePayload, CompilerError> {
        let expanded = match self.expander.expand(markup).await {
            Ok(css) => css,
            Err(err) => {
                tracing::warn!(error = %err, "class expansion failed, continuing without it");
                String::new()
            }
        };
        let payload = compile_with_expanded(markup, &expanded, authored_style, &self.options)?;
        tracing::debug!(
            nodes = payload.tree.len(),
            assets = payload.asset_metadata.len(),
            "compiled pane"
        );
        Ok(payload)
    }

    pub fn rehydrate(&self, markup: &str) -> Result<(Vec<AstNode>, AssetTable), CompilerError> {
        rehydrate::rehydrate(markup)
    }

    pub fn serialize(&self, tree: &[AstNode]) -> String {
        codegen::serialize(tree)
    }

    /// Apply an asset update to one node and regenerate the payload.
    #[tracing::instrument(skip_all, fields(target_id = %target_id))]
    pub async fn patch(
        &self,
        payload: &CreativePanePayload,
        target_id: &str,
        update: &AssetUpdate,
    ) -> Result<CreativePanePayload, CompilerError> {
        patch::patch(self, payload, target_id, update).await
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

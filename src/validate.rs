use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "CP-ERR-PARSE";
pub const ERR_NO_ROOT: &str = "CP-ERR-ROOT";
pub const INV_DUPLICATE_IDENTITY: &str = "INV001";
pub const INV_ATTRIBUTE_NOT_ALLOWED: &str = "INV002";
pub const INV_TEXT_WITH_CHILDREN: &str = "INV003";
pub const INV_EMPTY_IDENTITY: &str = "INV004";

/// Attribute that carries a node's identity in serialized markup.
pub const IDENTITY_ATTR: &str = "data-node-id";

/// Tag sentinel for text runs.
pub const TEXT_TAG: &str = "text";

/// Attributes an AST node may retain. Everything else is dropped during compilation.
pub const ALLOWED_ATTRS: &[&str] = &[
    "class",
    "src",
    "srcset",
    "alt",
    "href",
    "target",
    "type",
    "value",
    "placeholder",
    "data-file-id",
    "data-collection",
    "data-image-key",
    "data-callback",
    "data-external",
    "data-video",
];

pub fn is_allowed_attr(name: &str) -> bool {
    ALLOWED_ATTRS.contains(&name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "Markup is readable as an HTML5 fragment.",
        ERR_NO_ROOT => "Every fragment is hosted by a document body.",
        INV_DUPLICATE_IDENTITY => "Each node identity appears at most once in a tree.",
        INV_ATTRIBUTE_NOT_ALLOWED => {
            "AST nodes only retain allow-listed attributes; raw style never survives."
        }
        INV_TEXT_WITH_CHILDREN => "Text runs are leaves.",
        INV_EMPTY_IDENTITY => "Assigned identities are non-empty.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "napi", napi_derive::napi(object))]
#[error("[{code}] {message}")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str) -> Self {
        Self::with_details(code, message, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            context,
            hints,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A node of the Abstract Structure Tree.
///
/// Elements carry their tag, allow-listed attributes and children. Text runs use the
/// `"text"` tag sentinel and carry their content in `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AstNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl AstNode {
    pub fn element(tag: &str) -> Self {
        AstNode {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            text: None,
            children: Vec::new(),
            id: None,
        }
    }

    pub fn text(value: &str, id: Option<String>) -> Self {
        AstNode {
            tag: TEXT_TAG.to_string(),
            attrs: BTreeMap::new(),
            text: Some(value.to_string()),
            children: Vec::new(),
            id,
        }
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    /// Class tokens in attribute order.
    pub fn classes(&self) -> Vec<&str> {
        self.attrs
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Foreign keys into an external asset library. Never resolved here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default)]
    pub is_external: bool,
    /// Embedded video trigger, kept as the raw `data-video` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub tag_name: String,
    pub src: Option<String>,
    pub src_set: Option<String>,
    pub alt: Option<String>,
    #[serde(flatten)]
    pub hints: AssetHints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAsset {
    pub tag_name: String,
    pub href: Option<String>,
    pub button: ButtonPayload,
    #[serde(flatten)]
    pub hints: AssetHints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonAsset {
    pub tag_name: String,
    pub button: ButtonPayload,
    #[serde(flatten)]
    pub hints: AssetHints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundAsset {
    pub tag_name: String,
    pub background_image: String,
    #[serde(flatten)]
    pub hints: AssetHints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Image,
    Link,
    Button,
    CssBackground,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AssetMetadata {
    Image(ImageAsset),
    Link(LinkAsset),
    Button(ButtonAsset),
    CssBackground(BackgroundAsset),
}

impl AssetMetadata {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetMetadata::Image(_) => AssetKind::Image,
            AssetMetadata::Link(_) => AssetKind::Link,
            AssetMetadata::Button(_) => AssetKind::Button,
            AssetMetadata::CssBackground(_) => AssetKind::CssBackground,
        }
    }

    pub fn tag_name(&self) -> &str {
        match self {
            AssetMetadata::Image(a) => &a.tag_name,
            AssetMetadata::Link(a) => &a.tag_name,
            AssetMetadata::Button(a) => &a.tag_name,
            AssetMetadata::CssBackground(a) => &a.tag_name,
        }
    }

    pub fn hints(&self) -> &AssetHints {
        match self {
            AssetMetadata::Image(a) => &a.hints,
            AssetMetadata::Link(a) => &a.hints,
            AssetMetadata::Button(a) => &a.hints,
            AssetMetadata::CssBackground(a) => &a.hints,
        }
    }

    pub fn hints_mut(&mut self) -> &mut AssetHints {
        match self {
            AssetMetadata::Image(a) => &mut a.hints,
            AssetMetadata::Link(a) => &mut a.hints,
            AssetMetadata::Button(a) => &mut a.hints,
            AssetMetadata::CssBackground(a) => &mut a.hints,
        }
    }

    /// True when the asset was derived from a background-image rule rather than its tag.
    pub fn is_css_background(&self) -> bool {
        matches!(self, AssetMetadata::CssBackground(_))
    }
}

pub type AssetTable = BTreeMap<String, AssetMetadata>;

// ═══════════════════════════════════════════════════════════════════════════════
// PAYLOAD
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSnapshots {
    pub xs: String,
    pub md: String,
    pub xl: String,
}

/// The compiled artifact for one creative pane. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativePanePayload {
    pub compiled_style_text: String,
    pub viewport_snapshots: ViewportSnapshots,
    pub tree: Vec<AstNode>,
    pub asset_metadata: AssetTable,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Check the structural invariants every released tree must satisfy.
pub fn validate_tree(tree: &[AstNode]) -> Result<(), CompilerError> {
    let mut seen = HashSet::new();
    for node in tree {
        validate_node(node, &mut seen)?;
    }
    Ok(())
}

fn validate_node<'a>(node: &'a AstNode, seen: &mut HashSet<&'a str>) -> Result<(), CompilerError> {
    if let Some(id) = &node.id {
        if id.is_empty() {
            return Err(CompilerError::new(
                INV_EMPTY_IDENTITY,
                &format!("<{}> carries an empty identity", node.tag),
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(CompilerError::with_details(
                INV_DUPLICATE_IDENTITY,
                &format!("Identity \"{}\" is assigned to more than one node", id),
                Some(node.tag.clone()),
                vec!["Copy-pasted markup must drop its data-node-id attributes.".to_string()],
            ));
        }
    }

    if let Some(name) = node.attrs.keys().find(|k| !is_allowed_attr(k)) {
        return Err(CompilerError::with_details(
            INV_ATTRIBUTE_NOT_ALLOWED,
            &format!("Attribute \"{}\" is not allowed on <{}>", name, node.tag),
            None,
            vec![],
        ));
    }

    if node.is_text() && !node.children.is_empty() {
        return Err(CompilerError::new(
            INV_TEXT_WITH_CHILDREN,
            "Text run has children",
        ));
    }

    for child in &node.children {
        validate_node(child, seen)?;
    }
    Ok(())
}

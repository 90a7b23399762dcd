//! Rehydration of previously serialized markup.
//!
//! Loaded content has no live style registry. Class tokens are trusted as the hashes
//! they already are, identities are trusted as embedded, and asset metadata is
//! re-extracted from each element's own attributes. Backgrounds are only recoverable
//! from inline declarations on this path, so an element whose asset came from a class
//! rule keeps its identity but not its metadata entry.

use crate::parse::parse_fragment;
use crate::transform::{TreeBuilder, VerbatimClasses};
use crate::validate::{validate_tree, AssetTable, AstNode, CompilerError};

pub fn rehydrate(markup: &str) -> Result<(Vec<AstNode>, AssetTable), CompilerError> {
    let fragment = parse_fragment(markup)?;
    let mut resolver = VerbatimClasses;
    let (tree, assets) = TreeBuilder::new(&mut resolver)
        .keep_embedded_identity(true)
        .build(fragment.nodes());
    validate_tree(&tree)?;
    Ok((tree, assets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::AssetMetadata;

    #[test]
    fn test_embedded_identity_trusted() {
        let (tree, assets) = rehydrate(
            "<a class=\"s1\" href=\"/go\" data-callback=\"cb\" data-node-id=\"l1\"><!--nid:t9-->Go</a>",
        )
        .unwrap();
        assert_eq!(tree[0].id.as_deref(), Some("l1"));
        assert_eq!(tree[0].attrs.get("class").map(String::as_str), Some("s1"));
        // Text outside an editable ancestor never carries identity.
        assert!(tree[0].children[0].id.is_none());
        match &assets["l1"] {
            AssetMetadata::Link(link) => {
                assert_eq!(link.href.as_deref(), Some("/go"));
                assert_eq!(link.button.callback.as_deref(), Some("cb"));
            }
            other => panic!("expected link, got {:?}", other),
        }
    }

    #[test]
    fn test_asset_without_identity_gets_one() {
        let (tree, assets) = rehydrate("<img src=\"/a.png\">").unwrap();
        let id = tree[0].id.clone().unwrap();
        assert!(assets.contains_key(&id));
    }

    #[test]
    fn test_inline_background_recovered() {
        let (tree, assets) =
            rehydrate("<div style=\"background-image:url(/bg.png)\" data-node-id=\"d1\"></div>").unwrap();
        assert!(tree[0].attrs.get("style").is_none());
        match &assets["d1"] {
            AssetMetadata::CssBackground(bg) => assert_eq!(bg.background_image, "/bg.png"),
            other => panic!("expected background, got {:?}", other),
        }
    }

    #[test]
    fn test_class_background_not_recoverable() {
        let (tree, assets) = rehydrate("<div class=\"sdeadbeef\"></div>").unwrap();
        assert!(tree[0].id.is_none());
        assert!(assets.is_empty());

        let (tree, assets) =
            rehydrate("<div class=\"sdeadbeef\" data-node-id=\"bg1\"></div>").unwrap();
        assert_eq!(tree[0].id.as_deref(), Some("bg1"));
        assert!(assets.is_empty());
    }
}

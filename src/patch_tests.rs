use crate::compile_tests::StaticExpander;
use crate::compiler::Compiler;
use crate::patch::{AssetUpdate, ButtonPatch, HintChange, HintsUpdate};
use crate::rehydrate::rehydrate;
use crate::validate::{AssetMetadata, BackgroundAsset, CreativePanePayload};

fn only_id(payload: &CreativePanePayload) -> String {
    assert_eq!(payload.asset_metadata.len(), 1);
    payload.asset_metadata.keys().next().cloned().unwrap()
}

#[tokio::test]
async fn test_patch_image_attributes_and_hints() {
    let compiler = Compiler::offline();
    let payload = compiler
        .compile(
            "<p>Caption</p><img class=\"thumb\" src=\"/a.png\" data-collection=\"c1\">",
            ".thumb{width:100%}",
        )
        .await
        .unwrap();
    let id = only_id(&payload);
    let caption_text_id = payload.tree[0].children[0].id.clone();

    let update = AssetUpdate::Image {
        src: Some("/b.png".to_string()),
        src_set: None,
        alt: Some("B".to_string()),
        hints: HintsUpdate {
            file_id: HintChange::Set("f2".to_string()),
            collection: HintChange::Clear,
            image_key: HintChange::Keep,
        },
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    let img = &patched.tree[1];
    assert_eq!(img.id.as_deref(), Some(id.as_str()));
    assert_eq!(img.attrs.get("src").map(String::as_str), Some("/b.png"));
    assert_eq!(img.attrs.get("alt").map(String::as_str), Some("B"));
    assert_eq!(img.attrs.get("data-file-id").map(String::as_str), Some("f2"));
    assert!(img.attrs.get("data-collection").is_none());
    assert_eq!(patched.tree[0].children[0].id, caption_text_id);

    match &patched.asset_metadata[&id] {
        AssetMetadata::Image(image) => {
            assert_eq!(image.src.as_deref(), Some("/b.png"));
            assert_eq!(image.hints.file_id.as_deref(), Some("f2"));
            assert!(image.hints.collection.is_none());
        }
        other => panic!("expected image, got {:?}", other),
    }

    // The input payload is never touched.
    assert_eq!(payload.tree[1].attrs.get("src").map(String::as_str), Some("/a.png"));
}

#[tokio::test]
async fn test_patch_background_rewrites_style_text() {
    let compiler = Compiler::offline();
    let payload = compiler
        .compile(
            "<section class=\"hero\"></section>",
            ".hero{background-image:url(/a.jpg);background-size:cover}",
        )
        .await
        .unwrap();
    let id = only_id(&payload);

    let update = AssetUpdate::CssBackground {
        url: "/b.jpg".to_string(),
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    assert!(patched.compiled_style_text.contains("url(\"/b.jpg\")"));
    assert!(!patched.compiled_style_text.contains("/a.jpg"));
    assert!(patched.compiled_style_text.contains("background-size:cover"));
    assert_eq!(patched.tree[0].id.as_deref(), Some(id.as_str()));
    match &patched.asset_metadata[&id] {
        AssetMetadata::CssBackground(bg) => assert_eq!(bg.background_image, "/b.jpg"),
        other => panic!("expected background, got {:?}", other),
    }
}

#[tokio::test]
async fn test_overlay_wins_when_substitution_fails() {
    // The background rule only exists in expanded text, so the compiled style text
    // has nothing to substitute and recompilation re-derives the old URL.
    let compiler = Compiler::new(StaticExpander(".sbg{background-image:url(/old.png)}"));
    let (tree, _) = rehydrate("<div class=\"sbg\" data-node-id=\"bg1\"></div>").unwrap();
    let mut payload = CreativePanePayload {
        tree,
        ..CreativePanePayload::default()
    };
    payload.asset_metadata.insert(
        "bg1".to_string(),
        AssetMetadata::CssBackground(BackgroundAsset {
            tag_name: "div".to_string(),
            background_image: "/old.png".to_string(),
            hints: Default::default(),
        }),
    );

    let update = AssetUpdate::CssBackground {
        url: "/new.png".to_string(),
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, "bg1", &update).await.unwrap();

    assert!(patched.compiled_style_text.contains("/old.png"));
    match &patched.asset_metadata["bg1"] {
        AssetMetadata::CssBackground(bg) => assert_eq!(bg.background_image, "/new.png"),
        other => panic!("expected background, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mismatched_update_fields_ignored() {
    let compiler = Compiler::offline();
    let payload = compiler.compile("<img src=\"/a.png\">", "").await.unwrap();
    let id = only_id(&payload);

    let update = AssetUpdate::Link {
        href: Some("/elsewhere".to_string()),
        button: ButtonPatch::default(),
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    assert!(patched.tree[0].attrs.get("href").is_none());
    assert_eq!(patched.asset_metadata, payload.asset_metadata);
}

#[tokio::test]
async fn test_link_button_fields_merged() {
    let compiler = Compiler::offline();
    let payload = compiler
        .compile("<a href=\"/x\" data-callback=\"old\" data-video=\"v1\">Go</a>", "")
        .await
        .unwrap();
    let id = only_id(&payload);

    let update = AssetUpdate::Link {
        href: None,
        button: ButtonPatch {
            callback: Some("openModal".to_string()),
            is_external: Some(true),
            video: None,
        },
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    let a = &patched.tree[0];
    assert_eq!(a.attrs.get("href").map(String::as_str), Some("/x"));
    assert_eq!(a.attrs.get("data-callback").map(String::as_str), Some("openModal"));
    assert_eq!(a.attrs.get("data-external").map(String::as_str), Some("true"));
    match &patched.asset_metadata[&id] {
        AssetMetadata::Link(link) => {
            assert_eq!(link.href.as_deref(), Some("/x"));
            assert_eq!(link.button.callback.as_deref(), Some("openModal"));
            assert!(link.button.is_external);
            assert_eq!(link.button.video.as_deref(), Some("v1"));
        }
        other => panic!("expected link, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_target_leaves_tree_and_records_update() {
    let compiler = Compiler::offline();
    let payload = compiler.compile("<button>Buy</button>", "").await.unwrap();

    let update = AssetUpdate::Button {
        button: ButtonPatch {
            callback: Some("buy".to_string()),
            ..ButtonPatch::default()
        },
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, "missing", &update).await.unwrap();

    assert_eq!(patched.tree, payload.tree);
    assert_eq!(patched.asset_metadata.len(), 2);
    match &patched.asset_metadata["missing"] {
        AssetMetadata::Button(button) => {
            assert_eq!(button.tag_name, "button");
            assert_eq!(button.button.callback.as_deref(), Some("buy"));
        }
        other => panic!("expected button, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unrelated_patch_keeps_style_output() {
    let compiler = Compiler::offline();
    let payload = compiler
        .compile(
            "<div class=\"a\">Sale</div><img src=\"/a.png\">",
            ".a{color:red}\n@media (min-width: 801px){.a{color:blue}}",
        )
        .await
        .unwrap();
    let id = only_id(&payload);

    let update = AssetUpdate::Image {
        src: Some("/b.png".to_string()),
        src_set: None,
        alt: None,
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    assert_eq!(patched.compiled_style_text, payload.compiled_style_text);
    assert_eq!(patched.viewport_snapshots, payload.viewport_snapshots);
    assert!(patched.viewport_snapshots.md.contains("color:blue"));
    assert!(!patched.viewport_snapshots.md.contains("color:red"));
    assert_eq!(patched.tree[0], payload.tree[0]);
}

#[tokio::test]
async fn test_created_entry_takes_target_tag() {
    let compiler = Compiler::offline();
    let payload = compiler.compile("<p>Caption</p>", "").await.unwrap();
    assert!(payload.asset_metadata.is_empty());
    let id = payload.tree[0].id.clone().unwrap();

    let update = AssetUpdate::Image {
        src: Some("/c.png".to_string()),
        src_set: None,
        alt: None,
        hints: HintsUpdate::default(),
    };
    let patched = compiler.patch(&payload, &id, &update).await.unwrap();

    match &patched.asset_metadata[&id] {
        AssetMetadata::Image(image) => {
            assert_eq!(image.tag_name, "p");
            assert_eq!(image.src.as_deref(), Some("/c.png"));
        }
        other => panic!("expected image, got {:?}", other),
    }
}

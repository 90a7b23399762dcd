//! Style Registry
//!
//! Accumulates class rules and inline declarations for a single compile call,
//! content-addresses them, and buckets them by breakpoint. A registry is a plain value
//! owned by the caller; one is built per compilation and dropped afterwards.
//!
//! ## Invariants
//!
//! 1. **Dedup**: a rule's hash is derived from `(declarations, class name, suffix)`.
//!    Registering the same triple twice yields the same hash and one stored rule.
//! 2. **Inline isolation**: inline declarations hash with an `inline` discriminator and
//!    can never collide with a class-derived rule carrying identical text.
//! 3. **Collision check**: a hash prefix is only reused when the stored content is
//!    equal; otherwise the prefix is lengthened until it is unique.
//! 4. **Stable cascade keys**: a hash is `s` + an 8-hex cascade key + a content digest.
//!    The key comes from `(class name, suffix)`, so rules for one class at different
//!    breakpoints share it. A selector that is already a hash keeps its key, which
//!    makes registering compiled style text a fixed point.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::css::{self, CssItem, Declaration, StyleRule, StyleSheet};
use crate::validate::ViewportSnapshots;

lazy_static! {
    static ref VIEWPORT_UNIT_RE: Regex =
        Regex::new(r"(^|[^\w.-])(-?(?:\d+\.?\d*|\.\d+))v[wh]\b").unwrap();
    static ref HASHED_CLASS_RE: Regex = Regex::new(r"^s([0-9a-f]{8})[0-9a-f]{12,}$").unwrap();
}

const HASH_PREFIX: &str = "s";
const CASCADE_KEY_LEN: usize = 8;
const MIN_HASH_LEN: usize = 12;

// ═══════════════════════════════════════════════════════════════════════════════
// BREAKPOINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum widths of the three canonical viewports, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewportBreakpoints {
    pub xs: u32,
    pub md: u32,
    pub xl: u32,
}

impl Default for ViewportBreakpoints {
    fn default() -> Self {
        ViewportBreakpoints {
            xs: 0,
            md: 801,
            xl: 1367,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE STORAGE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct RuleEntry {
    /// Rules sharing `(cascade_key, suffix)` override each other across breakpoint layers.
    cascade_key: String,
    suffix: String,
    declarations: Vec<Declaration>,
    /// Exact text the hash was computed from, used for the collision check.
    fingerprint: String,
}

impl RuleEntry {
    fn selector(&self, hash: &str) -> String {
        format!(".{}{}", hash, self.suffix)
    }

    fn to_rule(&self, hash: &str) -> StyleRule {
        StyleRule {
            selectors: vec![self.selector(hash)],
            declarations: self.declarations.clone(),
        }
    }
}

/// An ordered, de-duplicated list of hashes.
#[derive(Debug, Clone, Default)]
struct Bucket {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Bucket {
    fn push(&mut self, hash: &str) {
        if self.seen.insert(hash.to_string()) {
            self.order.push(hash.to_string());
        }
    }
}

#[derive(Debug, Clone)]
pub struct StyleRegistry {
    rules: HashMap<String, RuleEntry>,
    unconditional: Bucket,
    breakpoints: BTreeMap<u32, Bucket>,
    class_index: HashMap<String, Bucket>,
    rewrite_viewport_units: bool,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    pub fn new() -> Self {
        StyleRegistry {
            rules: HashMap::new(),
            unconditional: Bucket::default(),
            breakpoints: BTreeMap::new(),
            class_index: HashMap::new(),
            rewrite_viewport_units: true,
        }
    }

    pub fn with_viewport_unit_rewrite(mut self, enabled: bool) -> Self {
        self.rewrite_viewport_units = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Registration
    // ───────────────────────────────────────────────────────────────────────────

    /// Parse style-sheet text and register every class rule in it.
    /// Returns the number of selectors that produced a rule.
    pub fn ingest(&mut self, text: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }
        let sheet = css::parse_stylesheet(text);
        let mut registered = 0;
        for item in &sheet.items {
            match item {
                CssItem::Rule(rule) => {
                    registered += self.register_style_rule(rule, None);
                }
                CssItem::Media { min_width, rules } => {
                    for rule in rules {
                        registered += self.register_style_rule(rule, Some(*min_width));
                    }
                }
                CssItem::Opaque(raw) => {
                    let head: String = raw.chars().take(40).collect();
                    tracing::debug!(at_rule = %head, "at-rule not registered");
                }
            }
        }
        registered
    }

    fn register_style_rule(&mut self, rule: &StyleRule, breakpoint: Option<u32>) -> usize {
        rule.selectors
            .iter()
            .filter(|selector| {
                self.register_declarations(selector, rule.declarations.clone(), breakpoint)
                    .is_some()
            })
            .count()
    }

    /// Register a single class rule. Non-class selectors and empty bodies are ignored.
    pub fn register_rule(
        &mut self,
        selector: &str,
        declaration_body: &str,
        breakpoint: Option<u32>,
    ) -> Option<String> {
        self.register_declarations(selector, css::parse_declarations(declaration_body), breakpoint)
    }

    fn register_declarations(
        &mut self,
        selector: &str,
        declarations: Vec<Declaration>,
        breakpoint: Option<u32>,
    ) -> Option<String> {
        let Some((class_name, suffix)) = css::split_class_selector(selector) else {
            tracing::debug!(selector, "ignoring non-class selector");
            return None;
        };
        if declarations.is_empty() {
            tracing::debug!(selector, "ignoring empty rule");
            return None;
        }

        let cascade_key = match HASHED_CLASS_RE.captures(&class_name) {
            Some(caps) => caps[1].to_string(),
            None => short_digest(&["class", &class_name, &suffix]),
        };
        let hash = self.store(cascade_key, suffix, declarations);

        match breakpoint {
            Some(min_width) => self.breakpoints.entry(min_width).or_default().push(&hash),
            None => self.unconditional.push(&hash),
        }
        self.class_index.entry(class_name).or_default().push(&hash);

        Some(hash)
    }

    /// Register an inline `style` attribute body as an unconditional rule.
    pub fn register_inline_style(&mut self, declaration_body: &str) -> Option<String> {
        let declarations = css::parse_declarations(declaration_body);
        if declarations.is_empty() {
            return None;
        }
        let body = css::render_declarations(&declarations);
        let cascade_key = short_digest(&["inline", &body]);
        let hash = self.store(cascade_key, String::new(), declarations);
        self.unconditional.push(&hash);
        Some(hash)
    }

    fn store(&mut self, cascade_key: String, suffix: String, declarations: Vec<Declaration>) -> String {
        let body = css::render_declarations(&declarations);
        let fingerprint = content_fingerprint(&[&body, &cascade_key, &suffix]);
        let digest = hex_digest(&fingerprint);
        let mut len = MIN_HASH_LEN;
        loop {
            let hash = format!("{}{}{}", HASH_PREFIX, cascade_key, &digest[..len]);
            match self.rules.get(&hash) {
                Some(existing) if existing.fingerprint == fingerprint => return hash,
                Some(_) if len < digest.len() => {
                    tracing::debug!(%hash, "hash prefix collision, lengthening");
                    len = (len + 4).min(digest.len());
                }
                _ => {
                    self.rules.insert(
                        hash.clone(),
                        RuleEntry {
                            cascade_key,
                            suffix,
                            declarations,
                            fingerprint,
                        },
                    );
                    return hash;
                }
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Lookup
    // ───────────────────────────────────────────────────────────────────────────

    /// Space-joined hashes registered under an original class name.
    pub fn lookup_class(&self, class_name: &str) -> String {
        self.class_index
            .get(class_name)
            .map(|bucket| bucket.order.join(" "))
            .unwrap_or_default()
    }

    /// Expand every token of a raw `class` attribute into its hashes, de-duplicated.
    /// Tokens with no registered rule are dropped.
    pub fn resolve_class_attr(&self, raw: &str) -> Vec<String> {
        let mut resolved = Bucket::default();
        for token in raw.split_ascii_whitespace() {
            if let Some(bucket) = self.class_index.get(token) {
                for hash in &bucket.order {
                    resolved.push(hash);
                }
            }
        }
        resolved.order
    }

    /// Canonical declaration text stored under a hash.
    pub fn declarations_for(&self, hash: &str) -> Option<String> {
        self.rules
            .get(hash)
            .map(|entry| css::render_declarations(&entry.declarations))
    }

    /// Background image URL declared by the rule stored under `hash`.
    pub fn background_image_for(&self, hash: &str) -> Option<String> {
        self.rules
            .get(hash)
            .and_then(|entry| css::background_url(&entry.declarations))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Output
    // ───────────────────────────────────────────────────────────────────────────

    fn rules_in(&self, bucket: &Bucket) -> Vec<StyleRule> {
        bucket
            .order
            .iter()
            .filter_map(|hash| self.rules.get(hash).map(|entry| entry.to_rule(hash)))
            .collect()
    }

    /// Unconditional rules followed by min-width groups in ascending order.
    pub fn compiled_css(&self) -> String {
        let mut items: Vec<CssItem> = self
            .rules_in(&self.unconditional)
            .into_iter()
            .map(CssItem::Rule)
            .collect();
        for (min_width, bucket) in &self.breakpoints {
            items.push(CssItem::Media {
                min_width: *min_width,
                rules: self.rules_in(bucket),
            });
        }
        StyleSheet { items }.to_string()
    }

    /// Cascade-resolved rules for a viewport at least `target` pixels wide.
    ///
    /// Layers apply in order: unconditional first, then every breakpoint bucket with
    /// `min_width <= target` ascending. For each `(class, suffix)` key only the rules
    /// of the last layer that declares it survive. Survivors are emitted in the
    /// order the real cascade would read them.
    pub fn viewport_snapshot(&self, target: u32) -> String {
        struct Winner {
            layer: usize,
            hashes: Vec<String>,
        }

        let mut layers: Vec<&Bucket> = vec![&self.unconditional];
        layers.extend(self.breakpoints.range(..=target).map(|(_, bucket)| bucket));

        let mut winners: HashMap<(&str, &str), Winner> = HashMap::new();
        for (layer, bucket) in layers.iter().enumerate() {
            for hash in &bucket.order {
                let Some(entry) = self.rules.get(hash) else {
                    continue;
                };
                let key = (entry.cascade_key.as_str(), entry.suffix.as_str());
                let winner = winners.entry(key).or_insert(Winner {
                    layer,
                    hashes: Vec::new(),
                });
                if winner.layer != layer {
                    winner.layer = layer;
                    winner.hashes.clear();
                }
                winner.hashes.push(hash.clone());
            }
        }

        let mut surviving: HashSet<(usize, &str)> = HashSet::new();
        for winner in winners.values() {
            for hash in &winner.hashes {
                surviving.insert((winner.layer, hash.as_str()));
            }
        }

        let mut items = Vec::new();
        for (layer, bucket) in layers.iter().enumerate() {
            for hash in &bucket.order {
                if !surviving.contains(&(layer, hash.as_str())) {
                    continue;
                }
                let Some(entry) = self.rules.get(hash) else {
                    continue;
                };
                let mut rule = entry.to_rule(hash);
                if self.rewrite_viewport_units {
                    for declaration in &mut rule.declarations {
                        declaration.value = rewrite_viewport_units(&declaration.value);
                    }
                }
                items.push(CssItem::Rule(rule));
            }
        }

        StyleSheet { items }.to_string()
    }

    /// Snapshots for the three canonical viewports.
    pub fn viewport_css(&self, breakpoints: &ViewportBreakpoints) -> ViewportSnapshots {
        ViewportSnapshots {
            xs: self.viewport_snapshot(breakpoints.xs),
            md: self.viewport_snapshot(breakpoints.md),
            xl: self.viewport_snapshot(breakpoints.xl),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn content_fingerprint(parts: &[&str]) -> String {
    parts.join("\u{1f}")
}

fn hex_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn short_digest(parts: &[&str]) -> String {
    let mut digest = hex_digest(&content_fingerprint(parts));
    digest.truncate(CASCADE_KEY_LEN);
    digest
}

/// Viewport units are meaningless on a fixed-width surface; map them to percentages.
///
/// Quoted strings and `url(...)` arguments are copied through untouched.
pub fn rewrite_viewport_units(css_text: &str) -> String {
    let bytes = css_text.as_bytes();
    let mut out = String::with_capacity(css_text.len());
    let mut plain_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let literal_end = match bytes[i] {
            b'"' | b'\'' => Some(quoted_end(bytes, i)),
            _ if is_url_open(bytes, i) => Some(url_end(bytes, i + 4)),
            _ => None,
        };
        match literal_end {
            Some(end) => {
                out.push_str(&VIEWPORT_UNIT_RE.replace_all(&css_text[plain_start..i], "${1}${2}%"));
                out.push_str(&css_text[i..end]);
                plain_start = end;
                i = end;
            }
            None => i += 1,
        }
    }
    out.push_str(&VIEWPORT_UNIT_RE.replace_all(&css_text[plain_start..], "${1}${2}%"));
    out
}

fn is_url_open(bytes: &[u8], at: usize) -> bool {
    let word_start = at == 0 || !(bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'-');
    word_start
        && bytes
            .get(at..at + 4)
            .is_some_and(|head| head.eq_ignore_ascii_case(b"url("))
}

/// Index just past the quote that closes the string opened at `open`.
fn quoted_end(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past the `)` closing a `url(` whose argument starts at `from`.
fn url_end(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = quoted_end(bytes, i),
            b'\\' => i += 2,
            b')' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

//! Style Sheet Module
//!
//! A deliberately small structured model of style-sheet text: selector lists with
//! declaration blocks, `@media (min-width)` groups, and opaque passthrough for every
//! other at-rule. Parsing is tolerant; unbalanced input is truncated at the failure
//! point instead of raising. The `Display` impl is the writer, and it parses back to
//! the same structure.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    /// `@media (min-width: 801px)`, optionally prefixed by a media type.
    static ref MIN_WIDTH_MEDIA_RE: Regex = Regex::new(
        r"(?i)^@media\s+(?:(?:only\s+)?(?:screen|all)\s+and\s+)?\(\s*min-width\s*:\s*(\d+(?:\.\d+)?)(px|em|rem)\s*\)$"
    )
    .unwrap();

    /// First `url(...)` reference in a declaration value.
    static ref URL_RE: Regex =
        Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)\s]*))\s*\)"#).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODEL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssItem {
    Rule(StyleRule),
    /// Rules that only apply from `min_width` pixels upward.
    Media {
        min_width: u32,
        rules: Vec<StyleRule>,
    },
    /// Any other at-rule, kept verbatim.
    Opaque(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    pub items: Vec<CssItem>,
}

impl StyleSheet {
    /// Every rule in the sheet paired with its breakpoint, in source order.
    pub fn rules_mut(&mut self) -> impl Iterator<Item = (Option<u32>, &mut StyleRule)> {
        self.items.iter_mut().flat_map(|item| {
            let rules: Vec<(Option<u32>, &mut StyleRule)> = match item {
                CssItem::Rule(rule) => vec![(None, rule)],
                CssItem::Media { min_width, rules } => {
                    let bp = Some(*min_width);
                    rules.iter_mut().map(|r| (bp, r)).collect()
                }
                CssItem::Opaque(_) => vec![],
            };
            rules
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn render_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| format!("{}:{}", d.property, d.value))
        .collect::<Vec<_>>()
        .join(";")
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{{}}}",
            self.selectors.join(","),
            render_declarations(&self.declarations)
        )
    }
}

impl fmt::Display for CssItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CssItem::Rule(rule) => write!(f, "{}", rule),
            CssItem::Media { min_width, rules } => {
                writeln!(f, "@media (min-width: {}px){{", min_width)?;
                for rule in rules {
                    writeln!(f, "{}", rule)?;
                }
                write!(f, "}}")
            }
            CssItem::Opaque(raw) => write!(f, "{}", raw),
        }
    }
}

impl fmt::Display for StyleSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_stylesheet(text: &str) -> StyleSheet {
    let source = strip_comments(text);
    StyleSheet {
        items: parse_items(&source),
    }
}

fn parse_items(source: &str) -> Vec<CssItem> {
    let bytes = source.as_bytes();
    let mut items = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let Some(open) = find_top_level(source, pos, &[b'{', b';']) else {
            tracing::debug!("discarding trailing style text without a block");
            break;
        };
        let prelude = source[pos..open].trim();

        if bytes[open] == b';' {
            // Statement at-rules (@import, @charset) or stray declarations.
            if prelude.starts_with('@') {
                items.push(CssItem::Opaque(format!("{};", prelude)));
            }
            pos = open + 1;
            continue;
        }

        let Some(close) = find_block_end(source, open) else {
            tracing::debug!(prelude, "unbalanced style block, truncating");
            break;
        };
        let body = &source[open + 1..close];
        pos = close + 1;

        if prelude.starts_with('@') {
            match parse_min_width(prelude) {
                Some(min_width) => {
                    let rules = parse_items(body)
                        .into_iter()
                        .filter_map(|item| match item {
                            CssItem::Rule(rule) => Some(rule),
                            _ => {
                                tracing::debug!("nested at-rule inside @media ignored");
                                None
                            }
                        })
                        .collect();
                    items.push(CssItem::Media { min_width, rules });
                }
                None => items.push(CssItem::Opaque(format!("{}{{{}}}", prelude, body.trim()))),
            }
            continue;
        }

        if prelude.is_empty() {
            continue;
        }

        items.push(CssItem::Rule(StyleRule {
            selectors: split_top_level(prelude, b',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            declarations: parse_declarations(body),
        }));
    }

    items
}

/// Parse a declaration block body (`color: red; width: 1px`).
pub fn parse_declarations(body: &str) -> Vec<Declaration> {
    split_top_level(body, b';')
        .into_iter()
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            // Custom properties are case-sensitive.
            let property = if property.starts_with("--") {
                property.to_string()
            } else {
                property.to_ascii_lowercase()
            };
            Some(Declaration {
                property,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Breakpoint in pixels for a `@media` prelude that is exactly a min-width query.
pub fn parse_min_width(prelude: &str) -> Option<u32> {
    let caps = MIN_WIDTH_MEDIA_RE.captures(prelude.trim())?;
    let amount: f64 = caps[1].parse().ok()?;
    let px = match caps[2].to_ascii_lowercase().as_str() {
        "px" => amount,
        _ => amount * 16.0,
    };
    Some(px.round() as u32)
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut quote: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        if let Some(q) = quote {
            out.push(c);
            rest = &rest[c.len_utf8()..];
            if c == '\\' {
                if let Some(next) = rest.chars().next() {
                    out.push(next);
                    rest = &rest[next.len_utf8()..];
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(end) => rest = &rest[2 + end + 2..],
                None => break,
            }
            continue;
        }

        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Index of the first `targets` byte at nesting depth zero, outside strings.
fn find_top_level(source: &str, start: usize, targets: &[u8]) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth: i32 = 0;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\\' => i += 1,
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = (depth - 1).max(0),
                _ if depth == 0 && targets.contains(&b) => return Some(i),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Index of the `}` closing the block opened at `open`.
fn find_block_end(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\\' => i += 1,
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn split_top_level(source: &str, separator: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(idx) = find_top_level(source, start, &[separator]) {
        parts.push(&source[start..idx]);
        start = idx + 1;
    }
    parts.push(&source[start..]);
    parts
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Split a class selector into its unescaped class name and the remaining suffix.
///
/// `.hover\:bg-red:hover` yields `("hover:bg-red", ":hover")`. Returns `None` for
/// anything that does not start with a class.
pub fn split_class_selector(selector: &str) -> Option<(String, String)> {
    let selector = selector.trim();
    let rest = selector.strip_prefix('.')?;
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    let mut suffix_start = rest.len();

    while let Some(&(idx, c)) = chars.peek() {
        if c == '\\' {
            chars.next();
            let mut hex = String::new();
            while let Some(&(_, h)) = chars.peek() {
                if hex.len() < 6 && h.is_ascii_hexdigit() {
                    hex.push(h);
                    chars.next();
                } else {
                    break;
                }
            }
            if hex.is_empty() {
                match chars.next() {
                    Some((_, escaped)) => name.push(escaped),
                    None => return None,
                }
            } else {
                let code = u32::from_str_radix(&hex, 16).ok()?;
                name.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                if matches!(chars.peek(), Some(&(_, ' '))) {
                    chars.next();
                }
            }
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            name.push(c);
            chars.next();
        } else {
            suffix_start = idx;
            break;
        }
    }

    if name.is_empty() || name == "-" {
        return None;
    }
    Some((name, rest[suffix_start..].trim_end().to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKGROUND IMAGES
// ═══════════════════════════════════════════════════════════════════════════════

fn is_background_property(property: &str) -> bool {
    property == "background-image" || property == "background"
}

/// URL of the first background image declared in `declarations`.
pub fn background_url(declarations: &[Declaration]) -> Option<String> {
    declarations
        .iter()
        .filter(|d| is_background_property(&d.property))
        .find_map(|d| url_in(&d.value))
}

fn url_in(value: &str) -> Option<String> {
    let caps = URL_RE.captures(value)?;
    let url = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let url = url.as_str().trim();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Replace the URL of the first background image in `declarations`.
/// Returns false when there is no such declaration.
pub fn replace_background_url(declarations: &mut [Declaration], url: &str) -> bool {
    for decl in declarations.iter_mut() {
        if !is_background_property(&decl.property) || url_in(&decl.value).is_none() {
            continue;
        }
        let replacement = format!("url(\"{}\")", url.replace('"', "%22"));
        decl.value = URL_RE
            .replace(&decl.value, regex::NoExpand(&replacement))
            .to_string();
        return true;
    }
    false
}

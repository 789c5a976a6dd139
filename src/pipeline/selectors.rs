//! Stylesheet selector rewrite: make rules written for `<i>` glyph elements
//! also apply to the `<svg>` elements that replace them.
//!
//! Slide templates style icons with rules like `.card i { color: #c00 }`.
//! Once the `<i>` is swapped for an `<svg>` those rules stop matching, so each
//! selector containing a bare `i` type selector gets an `svg` twin appended
//! to its selector list: `.card i, .card svg { color: #c00 }`.
//!
//! Only standalone `i` type tokens count. `li`, `input`, `.item`, `#i`,
//! `[data-i]` and `i-con` are left alone. At-rule preludes are never touched,
//! but rules nested inside `@media` blocks are.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A selector list: everything between the previous block boundary and `{`.
static RE_PRELUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^{};]+)\{").unwrap());

/// Type selector of the replacement element.
const REPLACEMENT_TYPE: &str = "svg";

/// Outcome of rewriting one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenCss {
    pub css: String,
    /// Number of `svg` twin selectors added.
    pub selectors_added: usize,
}

/// Rewrite every rule of `css` whose selector targets a bare `i`.
///
/// Selectors whose twin is already present are not duplicated, so the
/// rewrite is idempotent.
pub fn rewrite_glyph_selectors(css: &str) -> RewrittenCss {
    let mut added = 0usize;
    let rewritten = RE_PRELUDE.replace_all(css, |caps: &Captures<'_>| {
        let prelude = &caps[1];
        match rewrite_prelude(prelude) {
            Some((text, n)) => {
                added += n;
                format!("{text}{{")
            }
            None => caps[0].to_string(),
        }
    });

    RewrittenCss {
        css: rewritten.into_owned(),
        selectors_added: added,
    }
}

/// Rewrite one selector list. Returns `None` when nothing changes.
fn rewrite_prelude(prelude: &str) -> Option<(String, usize)> {
    // Comments before the selector belong to the previous statement.
    let split_at = prelude.rfind("*/").map(|i| i + 2).unwrap_or(0);
    let (comment, rest) = prelude.split_at(split_at);

    let core = rest.trim();
    if core.is_empty() || core.starts_with('@') {
        return None;
    }
    let lead_len = rest.len() - rest.trim_start().len();
    let lead = &rest[..lead_len];
    let trail = &rest[lead_len + core.len()..];

    let mut selectors: Vec<String> = split_selector_list(core)
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect();

    let mut twins = Vec::new();
    for selector in &selectors {
        if let Some(twin) = replace_bare_i(selector) {
            if !selectors.contains(&twin) && !twins.contains(&twin) {
                twins.push(twin);
            }
        }
    }
    if twins.is_empty() {
        return None;
    }

    let n = twins.len();
    selectors.extend(twins);
    Some((format!("{comment}{lead}{}{trail}", selectors.join(", ")), n))
}

/// Split on commas that are not nested inside `(...)` or `[...]`.
fn split_selector_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in list.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&list[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

/// Replace each bare `i` type token in `selector` with `svg`.
///
/// Returns `None` when the selector has no bare `i`.
fn replace_bare_i(selector: &str) -> Option<String> {
    let chars: Vec<char> = selector.chars().collect();
    let mut out = String::with_capacity(selector.len() + 4);
    let mut found = false;
    let mut bracket_depth = 0i32;
    let mut quote: Option<char> = None;

    for (idx, &ch) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            _ => {}
        }

        let is_bare = (ch == 'i' || ch == 'I')
            && bracket_depth == 0
            && idx
                .checked_sub(1)
                .map(|p| opens_compound(chars[p]))
                .unwrap_or(true)
            && chars.get(idx + 1).map(|&c| closes_type(c)).unwrap_or(true);

        if is_bare {
            out.push_str(REPLACEMENT_TYPE);
            found = true;
        } else {
            out.push(ch);
        }
    }

    found.then_some(out)
}

/// Characters after which a new compound selector (and so a type) begins.
fn opens_compound(c: char) -> bool {
    c.is_whitespace() || matches!(c, '>' | '+' | '~')
}

/// Characters that may follow a complete type selector.
fn closes_type(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '#' | '[' | ':' | '>' | '+' | '~' | ',' | ')')
}

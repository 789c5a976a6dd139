//! DOM transform: prepare one slide document for printing.
//!
//! Three independent rewrites, each a no-op on documents without the
//! relevant markup:
//!
//! 1. `<style>` rules that target `<i>` also target `<svg>`
//!    ([`super::selectors`]).
//! 2. Every icon-font element whose glyph is in the catalog is replaced by an
//!    inline `<svg>` carrying the original classes, attributes and style.
//! 3. A print-safety stylesheet is appended once to `<head>`.
//!
//! Rewriting runs on `lol_html`'s streaming rewriter in two passes: a read-only
//! inspection pass (doctype, `<html>`, `<head>`, existing print style), then the
//! rewrite itself. The result is byte-for-byte deterministic, and transforming
//! an already transformed document returns it unchanged.

use super::icons::{classify, is_glyph_marker, IconCatalog, IconGlyphMatch, StyleFamily, VectorGlyph};
use super::selectors::rewrite_glyph_selectors;
use lol_html::html_content::ContentType;
use lol_html::{doctype, element, rewrite_str, text, RewriteStrSettings};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// `id` of the injected print stylesheet; its presence makes injection a no-op.
pub const PRINT_STYLE_ID: &str = "html2pptx-print-safety";

/// Class every replacement `<svg>` carries.
pub const SVG_BASE_CLASS: &str = "svg-inline--fa";

/// Default inline style of a replacement, before the author's own style.
/// `{width}` is the glyph's aspect ratio in em.
const SVG_DEFAULT_STYLE: &str = "height:1em;width:{width}em;vertical-align:-0.125em;overflow:visible;";

const PRINT_SAFETY_CSS: &str = "\n@page { margin: 0; }\n\
@media print {\n\
  html, body { margin: 0 !important; padding: 0 !important; overflow: hidden !important; height: auto !important; }\n\
  body * { break-inside: avoid !important; page-break-inside: avoid !important; }\n\
  * { -webkit-print-color-adjust: exact !important; print-color-adjust: exact !important; }\n\
}\n\
::-webkit-scrollbar { display: none; }\n";

#[derive(Debug, Error)]
#[error("HTML rewrite failed: {0}")]
pub struct TransformError(String);

/// Counters for one transformed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub glyphs_replaced: usize,
    /// Glyph elements whose key is not in the catalog; left untouched.
    pub glyphs_unresolved: usize,
    pub selectors_rewritten: usize,
    pub print_style_injected: bool,
}

/// A rewritten, print-ready document.
#[derive(Debug, Clone)]
pub struct TransformedDocument {
    pub html: String,
    pub stats: TransformStats,
}

#[derive(Debug, Default)]
struct Inspection {
    has_doctype: bool,
    has_html: bool,
    has_head: bool,
    has_print_style: bool,
}

/// Rewrite `source` for printing. See the module docs for the steps.
pub fn transform(source: &str, catalog: &IconCatalog) -> Result<TransformedDocument, TransformError> {
    let found = inspect(source)?;
    let inject_style = !found.has_print_style;

    let stats = Rc::new(RefCell::new(TransformStats {
        print_style_injected: inject_style,
        ..TransformStats::default()
    }));
    let css_buffer = Rc::new(RefCell::new(String::new()));

    let mut handlers = vec![
        text!("style", {
            let stats = Rc::clone(&stats);
            let css_buffer = Rc::clone(&css_buffer);
            move |chunk| {
                css_buffer.borrow_mut().push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    let css = std::mem::take(&mut *css_buffer.borrow_mut());
                    let rewritten = rewrite_glyph_selectors(&css);
                    stats.borrow_mut().selectors_rewritten += rewritten.selectors_added;
                    chunk.replace(&rewritten.css, ContentType::Html);
                } else {
                    chunk.remove();
                }
                Ok(())
            }
        }),
        element!("[class]", {
            let stats = Rc::clone(&stats);
            move |el| {
                if el.namespace_uri() == SVG_NAMESPACE || el.tag_name() == "svg" {
                    return Ok(());
                }
                let Some(class_attr) = el.get_attribute("class") else {
                    return Ok(());
                };
                let classes: Vec<String> = class_attr.split_whitespace().map(str::to_string).collect();
                if !classes.iter().any(|c| is_glyph_marker(c)) {
                    return Ok(());
                }
                let Some((style_family, glyph_key)) = classify(&classes) else {
                    return Ok(());
                };
                let Some(glyph) = catalog.resolve(&glyph_key, style_family) else {
                    stats.borrow_mut().glyphs_unresolved += 1;
                    return Ok(());
                };

                let carried_attributes = el
                    .attributes()
                    .iter()
                    .map(|a| (a.name(), a.value()))
                    .filter(|(name, _)| name != "class" && name != "style")
                    .collect();
                let matched = IconGlyphMatch {
                    style_family,
                    glyph_key,
                    carried_classes: classes,
                    carried_attributes,
                    carried_inline_style: el.get_attribute("style"),
                };

                el.replace(&render_svg(&matched, glyph), ContentType::Html);
                stats.borrow_mut().glyphs_replaced += 1;
                Ok(())
            }
        }),
    ];

    if inject_style {
        let style_block = print_style_block();
        if found.has_head {
            handlers.push(element!("head", move |el| {
                el.append(&style_block, ContentType::Html);
                Ok(())
            }));
        } else if found.has_html {
            handlers.push(element!("html", move |el| {
                el.prepend(&format!("<head>{style_block}</head>"), ContentType::Html);
                Ok(())
            }));
        }
    }

    let rewritten = rewrite_str(
        source,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| TransformError(e.to_string()))?;

    let mut html = String::with_capacity(rewritten.len() + 512);
    if !found.has_doctype {
        html.push_str("<!DOCTYPE html>\n");
    }
    if inject_style && !found.has_head && !found.has_html {
        html.push_str(&print_style_block());
    }
    html.push_str(&rewritten);

    let stats = stats.borrow().clone();
    Ok(TransformedDocument { html, stats })
}

/// Read-only pass recording which structural elements exist.
fn inspect(source: &str) -> Result<Inspection, TransformError> {
    let found = Rc::new(RefCell::new(Inspection::default()));
    let print_style_selector = format!("style#{PRINT_STYLE_ID}");

    rewrite_str(
        source,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("html", {
                    let found = Rc::clone(&found);
                    move |_| {
                        found.borrow_mut().has_html = true;
                        Ok(())
                    }
                }),
                element!("head", {
                    let found = Rc::clone(&found);
                    move |_| {
                        found.borrow_mut().has_head = true;
                        Ok(())
                    }
                }),
                element!(print_style_selector, {
                    let found = Rc::clone(&found);
                    move |_| {
                        found.borrow_mut().has_print_style = true;
                        Ok(())
                    }
                }),
            ],
            document_content_handlers: vec![doctype!({
                let found = Rc::clone(&found);
                move |_| {
                    found.borrow_mut().has_doctype = true;
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| TransformError(e.to_string()))?;

    let inspection = std::mem::take(&mut *found.borrow_mut());
    Ok(inspection)
}

fn print_style_block() -> String {
    format!("<style id=\"{PRINT_STYLE_ID}\">{PRINT_SAFETY_CSS}</style>")
}

/// Build the replacement `<svg>` for one glyph element.
fn render_svg(matched: &IconGlyphMatch, glyph: &VectorGlyph) -> String {
    let icon_class = format!("fa-{}", matched.glyph_key);
    let mut classes: Vec<&str> = [SVG_BASE_CLASS, icon_class.as_str()]
        .into_iter()
        .filter(|c| !matched.carried_classes.iter().any(|own| own == c))
        .collect();
    classes.extend(matched.carried_classes.iter().map(String::as_str));

    let mut style = SVG_DEFAULT_STYLE.replace("{width}", &format_em(glyph.aspect_ratio()));
    if let Some(own) = &matched.carried_inline_style {
        style.push_str(own);
    }

    let mut svg = format!(
        "<svg class=\"{}\" style=\"{}\"",
        escape_attr(&classes.join(" ")),
        escape_attr(&style)
    );
    for (name, value) in &matched.carried_attributes {
        svg.push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
    }
    let carries = |name: &str| matched.carried_attributes.iter().any(|(n, _)| n == name);
    for (name, value) in [("aria-hidden", "true"), ("focusable", "false"), ("role", "img")] {
        if !carries(name) {
            svg.push_str(&format!(" {name}=\"{value}\""));
        }
    }
    svg.push_str(&format!(
        " data-prefix=\"{}\" data-icon=\"{}\" xmlns=\"{SVG_NAMESPACE}\" viewBox=\"{}\">\
         <path fill=\"currentColor\" d=\"{}\"></path></svg>",
        family_prefix(matched.style_family),
        escape_attr(&matched.glyph_key),
        glyph.view_box(),
        escape_attr(&glyph.path)
    ));
    svg
}

fn family_prefix(family: StyleFamily) -> &'static str {
    match family {
        StyleFamily::Solid => "fas",
        StyleFamily::Regular => "far",
        StyleFamily::Brand => "fab",
    }
}

/// Attribute values come through raw (entities intact); only the delimiter
/// needs escaping.
fn escape_attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// `1.125` → `"1.125"`, `1.0` → `"1"`.
fn format_em(value: f64) -> String {
    let fixed = format!("{value:.4}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> IconCatalog {
        IconCatalog::bundled().unwrap()
    }

    const SLIDE: &str = "<!DOCTYPE html><html><head><style>.card i { color: red; } .list-item { margin: 0; }</style></head>\
<body><div class=\"slide-container\"><p><i class=\"fas fa-house fa-2x\" id=\"home\" style=\"color: blue\" data-x=\"1\"></i> Home</p>\
<ul><li class=\"list-item\">one</li></ul></div></body></html>";

    #[test]
    fn replaces_resolvable_glyph_with_inline_svg() {
        let out = transform(SLIDE, &catalog()).unwrap();
        assert_eq!(out.stats.glyphs_replaced, 1);
        assert!(!out.html.contains("<i "), "glyph element survived: {}", out.html);
        assert!(out.html.contains(
            "<svg class=\"svg-inline--fa fas fa-house fa-2x\" \
             style=\"height:1em;width:1.125em;vertical-align:-0.125em;overflow:visible;color: blue\" \
             id=\"home\" data-x=\"1\""
        ), "got: {}", out.html);
        assert!(out.html.contains("viewBox=\"0 0 576 512\""));
        assert!(out.html.contains("<path fill=\"currentColor\" d=\"M288 32"));
    }

    #[test]
    fn unresolvable_glyph_is_left_untouched() {
        let src = "<!DOCTYPE html><html><head></head><body><i class=\"fas fa-not-a-glyph\" title=\"t\"></i></body></html>";
        let out = transform(src, &catalog()).unwrap();
        assert_eq!(out.stats.glyphs_unresolved, 1);
        assert_eq!(out.stats.glyphs_replaced, 0);
        assert!(out.html.contains("<i class=\"fas fa-not-a-glyph\" title=\"t\"></i>"));
    }

    #[test]
    fn style_rules_gain_svg_twins() {
        let out = transform(SLIDE, &catalog()).unwrap();
        assert!(out.html.contains(".card i, .card svg { color: red; }"));
        assert!(out.html.contains(".list-item { margin: 0; }"));
        assert_eq!(out.stats.selectors_rewritten, 1);
    }

    #[test]
    fn print_style_is_appended_to_head_once() {
        let once = transform(SLIDE, &catalog()).unwrap();
        assert!(once.stats.print_style_injected);
        assert_eq!(once.html.matches(PRINT_STYLE_ID).count(), 1);
        let style_at = once.html.find(PRINT_STYLE_ID).unwrap();
        assert!(style_at < once.html.find("</head>").unwrap());
    }

    #[test]
    fn transforming_twice_is_a_no_op() {
        let src = format!("{SLIDE}<i class=\"far fa-mystery\"></i>");
        let once = transform(&src, &catalog()).unwrap();
        let twice = transform(&once.html, &catalog()).unwrap();
        assert_eq!(twice.html, once.html);
        assert_eq!(twice.stats.glyphs_replaced, 0);
        assert!(!twice.stats.print_style_injected);
        assert_eq!(twice.html.matches("<svg").count(), once.html.matches("<svg").count());
    }

    #[test]
    fn output_is_deterministic() {
        let a = transform(SLIDE, &catalog()).unwrap();
        let b = transform(SLIDE, &catalog()).unwrap();
        assert_eq!(a.html, b.html);
    }

    #[test]
    fn fragment_gains_doctype_and_style() {
        let out = transform("<p><i class=\"fa fa-check\"></i> done</p>", &catalog()).unwrap();
        assert!(out.html.starts_with("<!DOCTYPE html>\n<style id=\"html2pptx-print-safety\">"));
        assert_eq!(out.stats.glyphs_replaced, 1);
    }

    #[test]
    fn head_is_created_inside_html_when_missing() {
        let out = transform("<html><body>x</body></html>", &catalog()).unwrap();
        assert!(out.html.contains("<html><head><style id=\"html2pptx-print-safety\">"));
    }

    #[test]
    fn sibling_glyphs_are_replaced_independently() {
        let src = "<p><i class=\"fas fa-check\"></i><i class=\"fas fa-bogus\"></i><i class=\"far fa-circle\"></i></p>";
        let out = transform(src, &catalog()).unwrap();
        assert_eq!(out.stats.glyphs_replaced, 2);
        assert_eq!(out.stats.glyphs_unresolved, 1);
        assert!(out.html.contains("data-prefix=\"far\" data-icon=\"circle\""));
        assert!(out.html.contains("<i class=\"fas fa-bogus\"></i>"));
    }

    #[test]
    fn stack_wrappers_without_glyph_key_are_ignored() {
        let src = "<span class=\"fa-stack\"><i class=\"fas fa-square fa-stack-2x\"></i></span>";
        let out = transform(src, &catalog()).unwrap();
        assert!(out.html.contains("<span class=\"fa-stack\">"));
        assert_eq!(out.stats.glyphs_replaced, 1);
        assert_eq!(out.stats.glyphs_unresolved, 0);
    }

    #[test]
    fn author_accessibility_attributes_win() {
        let src = "<i class=\"fas fa-user\" aria-hidden=\"false\" aria-label=\"Owner\"></i>";
        let out = transform(src, &catalog()).unwrap();
        assert!(out.html.contains("aria-hidden=\"false\" aria-label=\"Owner\" focusable=\"false\""));
        assert_eq!(out.html.matches("aria-hidden").count(), 1);
    }

    #[test]
    fn format_em_trims_zeros() {
        assert_eq!(format_em(1.0), "1");
        assert_eq!(format_em(1.125), "1.125");
        assert_eq!(format_em(0.625), "0.625");
    }
}

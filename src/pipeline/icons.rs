//! Icon resolver: maps an icon-font class to vector path data.
//!
//! Slides often draw icons with an icon font (`<i class="fas fa-house">`).
//! Print engines rasterise or drop such glyphs when the webfont has not
//! loaded by print time, so the transformer swaps each one for an inline
//! `<svg>` built from the path stored here.
//!
//! The catalog uses the same JSON shape as Font Awesome's `icons.json`
//! metadata (`{ name: { aliases: { names }, svg: { solid|regular|brands:
//! { width, height, path } } } }`), so a full upstream metadata file can be
//! passed with `--icons` and merged over the small bundled set.
//!
//! The catalog is built once per run and shared read-only behind an `Arc`.

use crate::error::DeckError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Catalog shipped with the crate.
const BUNDLED_CATALOG: &str = include_str!("../../assets/icons.json");

/// Class prefix carried by every glyph class (`fa-house`).
pub const GLYPH_CLASS_PREFIX: &str = "fa-";

/// Icon style family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleFamily {
    Solid,
    Regular,
    Brand,
}

impl StyleFamily {
    /// Family selected by an explicit marker class, if `class` is one.
    pub fn from_marker_class(class: &str) -> Option<Self> {
        match class {
            "fas" | "fa-solid" => Some(StyleFamily::Solid),
            "far" | "fa-regular" => Some(StyleFamily::Regular),
            "fab" | "fa-brands" => Some(StyleFamily::Brand),
            _ => None,
        }
    }

    /// Key used for this family in the catalog JSON.
    pub fn catalog_key(self) -> &'static str {
        match self {
            StyleFamily::Solid => "solid",
            StyleFamily::Regular => "regular",
            StyleFamily::Brand => "brands",
        }
    }

    fn from_catalog_key(key: &str) -> Option<Self> {
        match key {
            "solid" => Some(StyleFamily::Solid),
            "regular" => Some(StyleFamily::Regular),
            "brands" => Some(StyleFamily::Brand),
            _ => None,
        }
    }
}

/// Vector geometry for one glyph in one style.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorGlyph {
    /// View-box width in glyph units.
    pub width: u32,
    /// View-box height in glyph units.
    pub height: u32,
    /// SVG path data.
    pub path: String,
}

impl VectorGlyph {
    /// Width relative to height; the glyph is drawn `aspect_ratio()` em wide.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn view_box(&self) -> String {
        format!("0 0 {} {}", self.width, self.height)
    }
}

/// An icon-font element found in a document, reduced to what substitution
/// needs.
#[derive(Debug, Clone, PartialEq)]
pub struct IconGlyphMatch {
    pub style_family: StyleFamily,
    pub glyph_key: String,
    /// The element's full class list, in source order.
    pub carried_classes: Vec<String>,
    /// Every attribute except `class` and `style`, in source order.
    pub carried_attributes: Vec<(String, String)>,
    pub carried_inline_style: Option<String>,
}

/// Size, animation, and layout modifiers that are never glyph names.
static MODIFIER_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^fa-(?:\d+x|\d?x[sl]|sm|lg|fw|li|ul|border|inverse|stack(?:-\dx)?|pull-(?:left|right)|spin(?:-pulse|-reverse)?|pulse|beat(?:-fade)?|fade|bounce|flip(?:-horizontal|-vertical|-both)?|shake|rotate-(?:\d+|by)|solid|regular|brands|light|thin|duotone|sharp|classic)$",
    )
    .expect("modifier class regex is valid")
});

/// Whether `class` marks an element as an icon-font glyph.
pub fn is_glyph_marker(class: &str) -> bool {
    class == "fa" || StyleFamily::from_marker_class(class).is_some() || class.starts_with(GLYPH_CLASS_PREFIX)
}

/// Derive style family and glyph key from a class list.
///
/// Returns `None` when no class names a glyph (only markers and modifiers).
pub fn classify(classes: &[String]) -> Option<(StyleFamily, String)> {
    let family = classes
        .iter()
        .find_map(|c| StyleFamily::from_marker_class(c))
        .unwrap_or(StyleFamily::Solid);

    let key = classes.iter().find_map(|c| {
        let key = c.strip_prefix(GLYPH_CLASS_PREFIX)?;
        if key.is_empty() || MODIFIER_CLASS.is_match(c) {
            None
        } else {
            Some(key.to_string())
        }
    })?;

    Some((family, key))
}

// ── Catalog JSON shape ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawIcon {
    #[serde(default)]
    aliases: Option<RawAliases>,
    #[serde(default)]
    svg: HashMap<String, RawSvg>,
}

#[derive(Debug, Deserialize)]
struct RawAliases {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSvg {
    width: u32,
    height: u32,
    /// A single path, or one path per layer for duotone icons.
    path: serde_json::Value,
}

impl RawSvg {
    fn path_data(&self) -> Option<String> {
        match &self.path {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(layers) => {
                let joined: Vec<&str> = layers.iter().filter_map(|l| l.as_str()).collect();
                if joined.is_empty() {
                    None
                } else {
                    Some(joined.join(""))
                }
            }
            _ => None,
        }
    }
}

/// Immutable glyph lookup table.
#[derive(Debug, Clone, Default)]
pub struct IconCatalog {
    glyphs: BTreeMap<(String, StyleFamily), VectorGlyph>,
    aliases: BTreeMap<String, String>,
}

impl IconCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The catalog shipped with the crate.
    pub fn bundled() -> Result<Self, DeckError> {
        Self::from_json_str(BUNDLED_CATALOG)
            .map_err(|e| DeckError::Internal(format!("bundled icon catalog is invalid: {e}")))
    }

    /// Bundled catalog, extended with `extra` when given.
    pub fn with_overrides(extra: Option<&Path>) -> Result<Self, DeckError> {
        let mut catalog = Self::bundled()?;
        if let Some(path) = extra {
            catalog.extend(Self::load(path)?);
        }
        Ok(catalog)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, DeckError> {
        let text = std::fs::read_to_string(path).map_err(|e| DeckError::IconCatalog {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| DeckError::IconCatalog {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Parse catalog JSON. Unknown style keys and path-less entries are skipped.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, RawIcon> = serde_json::from_str(json)?;
        let mut catalog = Self::empty();
        for (name, icon) in raw {
            for (style, svg) in &icon.svg {
                let (Some(family), Some(path)) = (StyleFamily::from_catalog_key(style), svg.path_data())
                else {
                    continue;
                };
                catalog.insert(
                    &name,
                    family,
                    VectorGlyph {
                        width: svg.width,
                        height: svg.height,
                        path,
                    },
                );
            }
            if let Some(aliases) = icon.aliases {
                for alias in aliases.names {
                    catalog.aliases.insert(alias, name.clone());
                }
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, name: &str, family: StyleFamily, glyph: VectorGlyph) {
        self.glyphs.insert((name.to_string(), family), glyph);
    }

    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Merge `other` into `self`; entries in `other` win.
    pub fn extend(&mut self, other: IconCatalog) {
        self.glyphs.extend(other.glyphs);
        self.aliases.extend(other.aliases);
    }

    /// Look up a glyph. `None` means the caller keeps the original element.
    pub fn resolve(&self, glyph_key: &str, family: StyleFamily) -> Option<&VectorGlyph> {
        let direct = self.glyphs.get(&(glyph_key.to_string(), family));
        if direct.is_some() {
            return direct;
        }
        let target = self.aliases.get(glyph_key)?;
        self.glyphs.get(&(target.clone(), family))
    }

    /// Number of (name, style) entries.
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

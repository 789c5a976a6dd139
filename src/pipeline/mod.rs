//! Pipeline stages for HTML-deck-to-presentation conversion.
//!
//! Each submodule implements exactly one step. External programs (Chromium,
//! pdfium, LibreOffice) sit behind traits so the stages can be tested
//! without them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ transform ──▶ render ──▶ assemble ──▶ office
//! (descriptor) (lol_html) (Chromium)  (pdfium)   (soffice)
//!                  ▲          ▲
//!        icons, selectors   schedule (bounded fan-out)
//! ```
//!
//! 1. [`input`]     — resolve slide ids to source documents, in order
//! 2. [`transform`] — swap icon-font glyphs for inline SVG, twin `i`
//!    selectors ([`selectors`]), inject print-safety CSS; glyph data comes
//!    from [`icons`]
//! 3. [`render`]    — one slide to one PDF page, with height correction and
//!    bounded retry, through an [`engine`] session
//! 4. [`schedule`]  — run render jobs with at most N engines alive,
//!    returning results in slide order
//! 5. [`assemble`]  — merge successful pages, report omissions
//! 6. [`office`]    — merged PDF to PPTX via LibreOffice

pub mod assemble;
pub mod engine;
pub mod icons;
pub mod input;
pub mod office;
pub mod render;
pub mod schedule;
pub mod selectors;
pub mod transform;

//! Provenance watermark burned into the bottom-left corner of a capture.
//!
//! Strip and text have a fixed pixel size so the mark reads the same on
//! every output resolution.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use chrono::{DateTime, SecondsFormat, Utc};
use fontdb::{Database, Family, Query, ID};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::OnceLock;
use tiny_skia::{Mask, Paint, Pixmap, Rect, Transform};
use tracing::{debug, info, warn};

const TEXT_SIZE: f32 = 18.0;
const PADDING: f32 = 8.0;
const INSET: f32 = 12.0;
const STRIP_ALPHA: u8 = 140;
const NONCE_LEN: usize = 6;

/// Short random alphanumeric tag.
pub fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Default provenance text: RFC 3339 timestamp plus a nonce.
pub fn default_text(now: DateTime<Utc>) -> String {
    format!("{} #{}", now.to_rfc3339_opts(SecondsFormat::Millis, true), nonce())
}

/// System font lookup, loaded once per process.
pub struct FontDatabase {
    db: Database,
}

impl FontDatabase {
    pub fn new() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        info!("Loaded {} system fonts", db.len());
        Self { db }
    }

    /// Shared instance; the system font scan is slow.
    pub fn global() -> &'static FontDatabase {
        static DB: OnceLock<FontDatabase> = OnceLock::new();
        DB.get_or_init(FontDatabase::new)
    }

    /// Find a font by family name, returning the font ID.
    pub fn find_font(&self, family: &str) -> Option<ID> {
        self.db
            .faces()
            .find(|f| f.families.iter().any(|(name, _)| name.eq_ignore_ascii_case(family)))
            .map(|f| f.id)
    }

    /// Sans-serif face if there is one, else the first face found.
    pub fn default_font(&self) -> Option<ID> {
        self.db
            .query(&Query {
                families: &[Family::SansSerif],
                ..Query::default()
            })
            .or_else(|| self.db.faces().next().map(|f| f.id))
    }

    /// Font bytes and face index inside the file.
    pub fn font_data(&self, id: ID) -> Option<(Vec<u8>, u32)> {
        let (source, index) = self.db.face_source(id)?;
        let data = match source {
            fontdb::Source::Binary(data) => data.as_ref().as_ref().to_vec(),
            fontdb::Source::File(path) => std::fs::read(path).ok()?,
            fontdb::Source::SharedFile(path, _) => std::fs::read(path).ok()?,
        };
        Some((data, index))
    }
}

impl Default for FontDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn watermark_font() -> Option<&'static (Vec<u8>, u32)> {
    static FONT: OnceLock<Option<(Vec<u8>, u32)>> = OnceLock::new();
    FONT.get_or_init(|| {
        let db = FontDatabase::global();
        let font = db
            .find_font("DejaVu Sans")
            .or_else(|| db.default_font())
            .and_then(|id| db.font_data(id));
        if font.is_none() {
            warn!("No usable system font, watermarks will carry no text");
        }
        font
    })
    .as_ref()
}

/// Draws the strip and `text` onto `canvas`.
pub fn render(canvas: &mut Pixmap, text: &str) {
    let font = watermark_font().and_then(|(data, index)| FontRef::try_from_slice_and_index(data, *index).ok());
    render_with_font(canvas, text, font.as_ref());
}

fn render_with_font(canvas: &mut Pixmap, text: &str, font: Option<&FontRef<'_>>) {
    let text_width = font.map_or(0.0, |font| measure(font, text));
    let max_width = canvas.width() as f32 - 2.0 * INSET;
    let strip_height = TEXT_SIZE + 2.0 * PADDING;
    let strip_y = canvas.height() as f32 - INSET - strip_height;

    if max_width < 2.0 * PADDING || strip_y < 0.0 {
        debug!("Canvas {}x{} too small for a watermark", canvas.width(), canvas.height());
        return;
    }

    let strip_width = (text_width + 2.0 * PADDING).min(max_width);
    let Some(strip) = Rect::from_xywh(INSET, strip_y, strip_width, strip_height) else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, STRIP_ALPHA);
    canvas.fill_rect(strip, &paint, Transform::identity(), None);

    let Some(font) = font else {
        return;
    };
    let Some(mask) = text_mask(canvas, font, text, strip.x() + PADDING, strip.y() + PADDING) else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    canvas.fill_rect(strip, &paint, Transform::identity(), Some(&mask));
}

fn measure(font: &FontRef<'_>, text: &str) -> f32 {
    let scaled = font.as_scaled(PxScale::from(TEXT_SIZE));
    text.chars().map(|c| scaled.h_advance(scaled.glyph_id(c))).sum()
}

/// Rasterizes `text` into a coverage mask the size of `canvas`.
fn text_mask(canvas: &Pixmap, font: &FontRef<'_>, text: &str, x: f32, y: f32) -> Option<Mask> {
    let mut mask = Mask::new(canvas.width(), canvas.height())?;
    let width = canvas.width() as i64;
    let height = canvas.height() as i64;
    let data = mask.data_mut();

    let scale = PxScale::from(TEXT_SIZE);
    let scaled = font.as_scaled(scale);
    let baseline = y + scaled.ascent();
    let mut cursor = x;

    for c in text.chars() {
        let glyph_id = scaled.glyph_id(c);
        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor, baseline));
        if let Some(outlined) = scaled.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i64 + gx as i64;
                let py = bounds.min.y as i64 + gy as i64;
                if px >= 0 && py >= 0 && px < width && py < height {
                    let slot = &mut data[(py * width + px) as usize];
                    *slot = (*slot).max((coverage * 255.0) as u8);
                }
            });
        }
        cursor += scaled.h_advance(glyph_id);
    }

    Some(mask)
}

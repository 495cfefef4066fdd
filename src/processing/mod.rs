//! Turns one ready video frame into the final inspection photo.
//!
//! Order: orientation, rotation decision, aspect crop, scale-down,
//! composite, watermark, JPEG encode. Every step except the default
//! watermark text is a pure function of its inputs.

pub mod watermark;

use crate::capture::{DisplaySignals, ScreenOrientationType, VideoElement};
use crate::error::{CaptureError, ErrorCode, Result};
use crate::options::{Dimension, OrientationPolicy, SessionOptions};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::{Serialize, Serializer};
use tiny_skia::{IntSize, Pixmap, PixmapPaint, Transform};
use tracing::debug;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Clockwise rotation applied to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    /// Valid output, never chosen by the current policies
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Exact (sin, cos) so quarter turns map pixels without resampling.
    fn sin_cos(&self) -> (f32, f32) {
        match self {
            Rotation::Deg0 => (0.0, 1.0),
            Rotation::Deg90 => (1.0, 0.0),
            Rotation::Deg180 => (0.0, -1.0),
            Rotation::Deg270 => (-1.0, 0.0),
        }
    }
}

impl Serialize for Rotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.degrees())
    }
}

/// Source region in raw frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn full(size: Dimension) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }
}

/// Provenance record attached to every capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureMeta {
    pub raw: Dimension,
    pub crop: CropRect,
    /// Final encoded size, after rotation
    pub output: Dimension,
    pub rotation: Rotation,
    pub aspect_enforced: Option<f64>,
    pub stable_frames: u32,
    pub orientation_policy: OrientationPolicy,
    pub captured_at: DateTime<Utc>,
}

/// Encoded image payload.
#[derive(Clone)]
pub struct CapturedFile {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for CapturedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub file: CapturedFile,
    pub meta: CaptureMeta,
}

/// Portrait when taller than wide; square frames count as landscape.
pub fn classify_raw(size: Dimension) -> Orientation {
    if size.height > size.width {
        Orientation::Portrait
    } else {
        Orientation::Landscape
    }
}

/// Display orientation from the strongest available signal: screen
/// orientation type, then legacy angle, then viewport shape.
pub fn classify_display(signals: &DisplaySignals) -> Option<Orientation> {
    if let Some(kind) = signals.orientation_type {
        return Some(match kind {
            ScreenOrientationType::PortraitPrimary | ScreenOrientationType::PortraitSecondary => {
                Orientation::Portrait
            }
            ScreenOrientationType::LandscapePrimary | ScreenOrientationType::LandscapeSecondary => {
                Orientation::Landscape
            }
        });
    }

    if let Some(angle) = signals.angle {
        return Some(if angle.rem_euclid(180) == 90 {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        });
    }

    signals
        .viewport
        .filter(Dimension::is_valid)
        .map(classify_raw)
}

/// Rotation needed for `raw` under `policy`.
///
/// `FollowDevice` with an unknown display orientation leaves the frame
/// as is.
pub fn decide_rotation(raw: Orientation, display: Option<Orientation>, policy: OrientationPolicy) -> Rotation {
    match (policy, raw, display) {
        (OrientationPolicy::Auto, _, _) => Rotation::Deg0,
        (OrientationPolicy::LockPortrait, Orientation::Landscape, _) => Rotation::Deg270,
        (OrientationPolicy::LockLandscape, Orientation::Portrait, _) => Rotation::Deg90,
        (OrientationPolicy::FollowDevice, Orientation::Portrait, Some(Orientation::Landscape)) => Rotation::Deg90,
        (OrientationPolicy::FollowDevice, Orientation::Landscape, Some(Orientation::Portrait)) => Rotation::Deg270,
        _ => Rotation::Deg0,
    }
}

/// Centered crop of `raw` to `ratio` (width / height). `None` keeps the
/// full frame; so does a ratio that matches after rounding.
pub fn aspect_crop(raw: Dimension, ratio: Option<f64>) -> CropRect {
    let Some(ratio) = ratio.filter(|r| r.is_finite() && *r > 0.0) else {
        return CropRect::full(raw);
    };

    let actual = raw.aspect();
    if actual > ratio {
        let width = ((raw.height as f64 * ratio).round() as u32).clamp(1, raw.width);
        CropRect {
            x: (raw.width - width) / 2,
            y: 0,
            width,
            height: raw.height,
        }
    } else if actual < ratio {
        let height = ((raw.width as f64 / ratio).round() as u32).clamp(1, raw.height);
        CropRect {
            x: 0,
            y: (raw.height - height) / 2,
            width: raw.width,
            height,
        }
    } else {
        CropRect::full(raw)
    }
}

/// Uniform scale-down so the width fits `max_width`.
pub fn scale_to_fit(size: Dimension, max_width: Option<u32>) -> Dimension {
    match max_width {
        Some(max) if max > 0 && size.width > max => {
            let height = (size.height as f64 * max as f64 / size.width as f64).round() as u32;
            Dimension::new(max, height.max(1))
        }
        _ => size,
    }
}

/// Draws `source` onto a canvas sized for `rotation`.
pub fn composite(source: &RgbaImage, rotation: Rotation) -> Result<Pixmap> {
    let (width, height) = source.dimensions();
    let size = IntSize::from_wh(width, height).ok_or_else(|| processing_error("empty source image"))?;
    let mut pixels = source.as_raw().clone();
    // camera frames are opaque, so straight and premultiplied alpha agree
    for alpha in pixels.iter_mut().skip(3).step_by(4) {
        *alpha = 255;
    }
    let source = Pixmap::from_vec(pixels, size).ok_or_else(|| processing_error("source image has a bad length"))?;

    if rotation == Rotation::Deg0 {
        return Ok(source);
    }

    let (out_width, out_height) = if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    };
    let mut canvas =
        Pixmap::new(out_width, out_height).ok_or_else(|| processing_error("could not allocate output canvas"))?;

    let (sin, cos) = rotation.sin_cos();
    let transform = Transform::from_translate(out_width as f32 / 2.0, out_height as f32 / 2.0)
        .pre_concat(Transform::from_row(cos, sin, -sin, cos, 0.0, 0.0))
        .pre_translate(-(width as f32) / 2.0, -(height as f32) / 2.0);
    canvas.draw_pixmap(0, 0, source.as_ref(), &PixmapPaint::default(), transform, None);

    Ok(canvas)
}

/// Encodes an opaque canvas as JPEG; `quality` is in [0, 1].
pub fn encode_jpeg(canvas: &Pixmap, quality: f32) -> Result<Vec<u8>> {
    let rgba = RgbaImage::from_raw(canvas.width(), canvas.height(), canvas.data().to_vec())
        .ok_or_else(|| processing_error("canvas has a bad length"))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let quality = (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| processing_error(format!("JPEG encoding failed: {e}")))?;
    Ok(bytes)
}

/// Captures the element's current frame and runs the full pipeline.
///
/// `raw` is the size the session settled on; if the grabbed frame turns
/// out to differ, the frame's own size is used.
pub fn process_frame(
    element: &mut dyn VideoElement,
    options: &SessionOptions,
    stable_frames: u32,
    raw: Dimension,
    display: &DisplaySignals,
) -> Result<CaptureResult> {
    let frame = element
        .grab_frame()
        .map_err(|e| CaptureError::from_platform("could not read the current video frame", e))?;

    let frame_size = frame.dimension();
    if !frame_size.is_valid() {
        return Err(CaptureError::new(ErrorCode::CaptureInterrupted, "video frame has no pixels"));
    }
    if frame_size != raw {
        debug!("Frame is {} although the session settled on {}", frame_size, raw);
    }
    let raw = frame_size;
    let image = frame
        .into_rgba_image()
        .ok_or_else(|| processing_error("video frame data does not match its size"))?;

    let rotation = decide_rotation(classify_raw(raw), classify_display(display), options.orientation_policy);
    let aspect_enforced = options.aspect_policy.forced_ratio();
    let crop = aspect_crop(raw, aspect_enforced);
    let scaled = scale_to_fit(crop.dimension(), options.max_width);

    let mut region = imageops::crop_imm(&image, crop.x, crop.y, crop.width, crop.height).to_image();
    if scaled != crop.dimension() {
        region = imageops::resize(&region, scaled.width, scaled.height, FilterType::Triangle);
    }

    let mut canvas = composite(&region, rotation)?;
    let captured_at = Utc::now();
    if options.watermark {
        let text = match &options.watermark_builder {
            Some(builder) => builder(captured_at),
            None => watermark::default_text(captured_at),
        };
        watermark::render(&mut canvas, &text);
    }

    let bytes = encode_jpeg(&canvas, options.quality)?;
    let output = Dimension::new(canvas.width(), canvas.height());
    debug!(
        "Captured {} -> crop {} -> {} (rotation {}), {} bytes",
        raw,
        crop.dimension(),
        output,
        rotation.degrees(),
        bytes.len()
    );

    Ok(CaptureResult {
        file: CapturedFile {
            name: file_name(captured_at),
            mime: JPEG_MIME,
            bytes,
        },
        meta: CaptureMeta {
            raw,
            crop,
            output,
            rotation,
            aspect_enforced,
            stable_frames,
            orientation_policy: options.orientation_policy,
            captured_at,
        },
    })
}

fn file_name(at: DateTime<Utc>) -> String {
    format!("inspection-{}-{}.jpg", at.format("%Y%m%dT%H%M%S"), watermark::nonce())
}

fn processing_error(message: impl Into<String>) -> CaptureError {
    CaptureError::new(ErrorCode::Unknown, message)
}

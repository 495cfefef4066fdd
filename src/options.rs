//! Session configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A dimension is usable only when both sides are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Front camera
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

/// How captured frames are rotated relative to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Never rotate
    #[default]
    Auto,
    /// Always produce portrait output
    LockPortrait,
    /// Always produce landscape output
    LockLandscape,
    /// Rotate when the stream and the display disagree
    FollowDevice,
}

/// Output aspect handling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AspectPolicy {
    /// Keep whatever the camera delivers
    #[default]
    Native,
    /// Center-crop to width / height = ratio
    Force(f64),
}

impl AspectPolicy {
    pub fn forced_ratio(&self) -> Option<f64> {
        match self {
            AspectPolicy::Native => None,
            AspectPolicy::Force(ratio) => Some(*ratio),
        }
    }
}

/// Torch state requested once the session becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    /// No automatic flash is available for still frames; treated as `Off`.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationOptions {
    /// Consecutive identical frame sizes required before the stream counts as stable
    pub min_stable_frames: u32,
    /// Upper bound on the wait for stable frames
    pub timeout_ms: u64,
}

impl StabilizationOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StabilizationOptions {
    fn default() -> Self {
        Self {
            min_stable_frames: 3,
            timeout_ms: 1500,
        }
    }
}

/// Builds the watermark text from the capture timestamp.
pub type WatermarkBuilder = Arc<dyn Fn(DateTime<Utc>) -> String + Send + Sync>;

/// Configuration for one capture session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub facing_mode: FacingMode,
    /// Pins a specific device; wins over `facing_mode` when the platform honors it
    pub device_id: Option<String>,
    pub orientation_policy: OrientationPolicy,
    pub aspect_policy: AspectPolicy,
    /// Most preferred first
    pub prefer_resolutions: Vec<Dimension>,
    pub stabilization: StabilizationOptions,
    pub max_width: Option<u32>,
    /// JPEG quality in [0, 1]
    pub quality: f32,
    pub watermark: bool,
    #[serde(skip)]
    pub watermark_builder: Option<WatermarkBuilder>,
    pub initial_flash_mode: FlashMode,
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            device_id: None,
            orientation_policy: OrientationPolicy::Auto,
            aspect_policy: AspectPolicy::Native,
            prefer_resolutions: vec![Dimension::new(1920, 1080), Dimension::new(1280, 720)],
            stabilization: StabilizationOptions::default(),
            max_width: Some(1920),
            quality: 0.85,
            watermark: true,
            watermark_builder: None,
            initial_flash_mode: FlashMode::Off,
            debug: false,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("facing_mode", &self.facing_mode)
            .field("device_id", &self.device_id)
            .field("orientation_policy", &self.orientation_policy)
            .field("aspect_policy", &self.aspect_policy)
            .field("prefer_resolutions", &self.prefer_resolutions)
            .field("stabilization", &self.stabilization)
            .field("max_width", &self.max_width)
            .field("quality", &self.quality)
            .field("watermark", &self.watermark)
            .field("watermark_builder", &self.watermark_builder.as_ref().map(|_| "<fn>"))
            .field("initial_flash_mode", &self.initial_flash_mode)
            .field("debug", &self.debug)
            .finish()
    }
}

impl SessionOptions {
    /// Returns a copy with out-of-range values pulled back to something usable.
    pub fn normalized(&self) -> Self {
        let mut options = self.clone();

        options.quality = if options.quality.is_finite() {
            options.quality.clamp(0.0, 1.0)
        } else {
            tracing::warn!("Non-finite quality {}, using default", options.quality);
            SessionOptions::default().quality
        };

        options.stabilization.min_stable_frames = options.stabilization.min_stable_frames.max(1);
        options.prefer_resolutions.retain(Dimension::is_valid);

        if let AspectPolicy::Force(ratio) = options.aspect_policy {
            if !ratio.is_finite() || ratio <= 0.0 {
                tracing::warn!("Ignoring invalid forced aspect ratio {}, keeping native aspect", ratio);
                options.aspect_policy = AspectPolicy::Native;
            }
        }

        if options.max_width == Some(0) {
            options.max_width = None;
        }

        if options.device_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            options.device_id = None;
        }

        options
    }
}

//! Camera acquisition and stream lifecycle.
//!
//! The media platform (browser, native webcam stack, or the in-memory
//! simulator) is reached only through the traits in this module. Everything
//! above them is host-independent.

mod constraints;
mod controls;
mod device_manager;
#[cfg(all(
    feature = "native",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
mod nokhwa_backend;
mod permission;
mod session;
pub mod simulated;

pub use constraints::{build_candidates, CandidateKind, ConstraintCandidate, VideoConstraint};
pub use controls::{FocusRange, FocusSupport, TrackCapabilityController, TrackControlsSupport};
pub use device_manager::DeviceManager;
#[cfg(all(
    feature = "native",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
pub use nokhwa_backend::NokhwaPlatform;
pub use permission::{ensure_permission, PermissionOutcome};
pub use session::{SessionState, StreamSession, Subscription};

use crate::error::PlatformError;
use crate::frame::VideoFrame;
use crate::options::Dimension;
use std::rc::Rc;

/// Answer of a platform permission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Information about a camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Identifier accepted by `SessionOptions::device_id`
    pub device_id: String,
    /// Human-readable name
    pub label: String,
}

/// Whether a track still delivers frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackReadyState {
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    None,
    Manual,
    SingleShot,
    Continuous,
}

/// Numeric range reported by a track capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCapability {
    pub min: f64,
    pub max: f64,
}

/// Raw capability descriptor of a video track. Absent entries are `None`/empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCapabilities {
    pub torch: Option<bool>,
    pub focus_modes: Vec<FocusMode>,
    pub focus_distance: Option<RangeCapability>,
}

/// Constraint set applied to a live track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackConstraintSet {
    pub torch: Option<bool>,
    pub focus_mode: Option<FocusMode>,
    pub focus_distance: Option<f64>,
}

/// Orientation hints exposed by the display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplaySignals {
    /// Screen orientation type, if the platform reports one
    pub orientation_type: Option<ScreenOrientationType>,
    /// Legacy rotation angle in degrees (0, 90, -90, 180)
    pub angle: Option<i32>,
    /// Viewport size
    pub viewport: Option<Dimension>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOrientationType {
    PortraitPrimary,
    PortraitSecondary,
    LandscapePrimary,
    LandscapeSecondary,
}

/// A stream handed out by the platform. Tracks are shared so that a
/// [`TrackCapabilityController`] can hold a non-owning handle.
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<Rc<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn first_video_track(&self) -> Option<&Rc<dyn VideoTrack>> {
        self.tracks.first()
    }

    /// Stops every track in the stream.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// One hardware video source.
pub trait VideoTrack {
    fn label(&self) -> String;

    fn ready_state(&self) -> TrackReadyState;

    /// Returns `None` when the platform has no capability query.
    fn capabilities(&self) -> Option<TrackCapabilities>;

    fn apply_constraints(&self, constraints: &TrackConstraintSet) -> Result<(), PlatformError>;

    fn stop(&self);
}

/// Hidden playback surface bound to a stream.
pub trait VideoElement {
    /// True once the stream's metadata (and so its frame size) is known.
    fn has_metadata(&self) -> bool;

    fn play(&mut self) -> Result<(), PlatformError>;

    /// Current decoded frame size; zero while unknown.
    fn video_size(&self) -> Dimension;

    /// Count of frames presented so far, when the platform offers a
    /// frame-synchronous callback. `None` means ticks follow the display
    /// refresh instead.
    fn presented_frames(&self) -> Option<u64>;

    /// Copies out the frame currently on the surface.
    fn grab_frame(&mut self) -> Result<VideoFrame, PlatformError>;

    fn detach(&mut self);
}

/// Source of display orientation hints.
pub trait OrientationSensor {
    fn display_signals(&self) -> DisplaySignals;
}

/// Entry point into the host's media stack.
pub trait MediaPlatform {
    /// False when the host has no camera API at all.
    fn has_media_capture(&self) -> bool;

    /// `Ok(None)` when the host offers no permission query.
    fn query_camera_permission(&self) -> Result<Option<PermissionState>, PlatformError>;

    fn get_user_media(&mut self, constraint: &VideoConstraint) -> Result<MediaStream, PlatformError>;

    fn create_video_element(&mut self, stream: &MediaStream) -> Result<Box<dyn VideoElement>, PlatformError>;

    fn orientation_sensor(&self) -> Rc<dyn OrientationSensor>;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, PlatformError>;
}

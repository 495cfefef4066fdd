//! In-memory camera for tests and dry runs.
//!
//! Frame sizes follow a script (`warmup` then `native`), capability
//! descriptors are whatever the caller puts in, and a shared
//! [`SimulationProbe`] records what the engine did to the "hardware".

use super::{
    DeviceInfo, DisplaySignals, MediaPlatform, MediaStream, OrientationSensor, PermissionState,
    TrackCapabilities, TrackConstraintSet, TrackReadyState, VideoConstraint, VideoElement,
    VideoTrack,
};
use crate::error::PlatformError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::options::Dimension;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Script for the simulated camera.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pub label: String,
    /// Size the camera settles on
    pub native: Dimension,
    /// Sizes reported before `native`
    pub warmup: Vec<Dimension>,
    /// When false the camera cycles through `warmup` forever
    pub settles: bool,
    /// Number of metadata polls answered with "not yet"
    pub metadata_delay: u32,
    /// Whether the surface offers per-frame callbacks
    pub frame_callbacks: bool,
    pub capabilities: Option<TrackCapabilities>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            label: "Simulated camera".to_string(),
            native: Dimension::new(1280, 720),
            warmup: Vec::new(),
            settles: true,
            metadata_delay: 0,
            frame_callbacks: true,
            capabilities: None,
        }
    }
}

/// Counters shared between the simulated platform and a test.
#[derive(Debug, Default)]
pub struct SimulationProbe {
    attempts: RefCell<Vec<VideoConstraint>>,
    applied: RefCell<Vec<TrackConstraintSet>>,
    frames_grabbed: Cell<u32>,
    tracks_stopped: Cell<u32>,
    elements_detached: Cell<u32>,
    track_ended: Cell<bool>,
    refuse_constraints: Cell<bool>,
    frames_stalled: Cell<bool>,
    failed_grabs: Cell<u32>,
}

impl SimulationProbe {
    /// Constraints passed to `get_user_media`, in order.
    pub fn attempts(&self) -> Vec<VideoConstraint> {
        self.attempts.borrow().clone()
    }

    /// Constraint sets that tracks accepted.
    pub fn applied(&self) -> Vec<TrackConstraintSet> {
        self.applied.borrow().clone()
    }

    pub fn frames_grabbed(&self) -> u32 {
        self.frames_grabbed.get()
    }

    pub fn tracks_stopped(&self) -> u32 {
        self.tracks_stopped.get()
    }

    pub fn elements_detached(&self) -> u32 {
        self.elements_detached.get()
    }

    /// Simulates the hardware going away (unplugged, access revoked).
    pub fn end_track(&self) {
        self.track_ended.set(true);
    }

    /// Stops presenting new frames; the frame counter holds still until
    /// [`resume_frames`](Self::resume_frames).
    pub fn stall_frames(&self) {
        self.frames_stalled.set(true);
    }

    pub fn resume_frames(&self) {
        self.frames_stalled.set(false);
    }

    /// Makes the next `count` frame reads fail the way a dropped frame does.
    pub fn fail_grabs(&self, count: u32) {
        self.failed_grabs.set(count);
    }

    /// Makes every later `apply_constraints` call fail.
    pub fn refuse_constraints(&self) {
        self.refuse_constraints.set(true);
    }
}

type RejectRule = Box<dyn Fn(&VideoConstraint) -> Option<PlatformError>>;

/// Display whose orientation hints can be changed mid-test.
#[derive(Debug, Default)]
pub struct SimulatedDisplay {
    signals: Cell<DisplaySignals>,
}

impl SimulatedDisplay {
    pub fn set_signals(&self, signals: DisplaySignals) {
        self.signals.set(signals);
    }
}

impl OrientationSensor for SimulatedDisplay {
    fn display_signals(&self) -> DisplaySignals {
        self.signals.get()
    }
}

/// A [`MediaPlatform`] backed by a scripted camera.
pub struct SimulatedPlatform {
    camera: Option<SimulatedCamera>,
    media_capture: bool,
    permission: Result<Option<PermissionState>, PlatformError>,
    reject_rules: Vec<RejectRule>,
    display: Rc<SimulatedDisplay>,
    probe: Rc<SimulationProbe>,
    next_stream: u32,
}

impl SimulatedPlatform {
    pub fn new(camera: SimulatedCamera) -> Self {
        Self {
            camera: Some(camera),
            media_capture: true,
            permission: Ok(None),
            reject_rules: Vec::new(),
            display: Rc::new(SimulatedDisplay::default()),
            probe: Rc::new(SimulationProbe::default()),
            next_stream: 0,
        }
    }

    /// A host with a camera API but no camera attached.
    pub fn without_camera() -> Self {
        Self {
            camera: None,
            ..Self::new(SimulatedCamera::default())
        }
    }

    /// A host with no camera API at all.
    pub fn without_media_capture(mut self) -> Self {
        self.media_capture = false;
        self
    }

    pub fn with_permission(mut self, state: Option<PermissionState>) -> Self {
        self.permission = Ok(state);
        self
    }

    pub fn with_permission_error(mut self, error: PlatformError) -> Self {
        self.permission = Err(error);
        self
    }

    pub fn with_display_signals(self, signals: DisplaySignals) -> Self {
        self.display.set_signals(signals);
        self
    }

    /// Rejects every request for which `rule` returns an error.
    pub fn reject_if<F>(mut self, rule: F) -> Self
    where
        F: Fn(&VideoConstraint) -> Option<PlatformError> + 'static,
    {
        self.reject_rules.push(Box::new(rule));
        self
    }

    pub fn probe(&self) -> Rc<SimulationProbe> {
        self.probe.clone()
    }

    pub fn display(&self) -> Rc<SimulatedDisplay> {
        self.display.clone()
    }
}

impl MediaPlatform for SimulatedPlatform {
    fn has_media_capture(&self) -> bool {
        self.media_capture
    }

    fn query_camera_permission(&self) -> Result<Option<PermissionState>, PlatformError> {
        self.permission.clone()
    }

    fn get_user_media(&mut self, constraint: &VideoConstraint) -> Result<MediaStream, PlatformError> {
        self.probe.attempts.borrow_mut().push(constraint.clone());

        if let Some(error) = self.reject_rules.iter().find_map(|rule| rule(constraint)) {
            return Err(error);
        }

        let camera = self
            .camera
            .as_ref()
            .ok_or_else(|| PlatformError::new("NotFoundError", "Requested device not found"))?;

        self.next_stream += 1;
        let track: Rc<dyn VideoTrack> = Rc::new(SimulatedTrack::new(camera, self.probe.clone()));
        Ok(MediaStream {
            id: format!("sim-stream-{}", self.next_stream),
            tracks: vec![track],
        })
    }

    fn create_video_element(&mut self, _stream: &MediaStream) -> Result<Box<dyn VideoElement>, PlatformError> {
        let camera = self
            .camera
            .as_ref()
            .ok_or_else(|| PlatformError::invalid_state("no camera behind this stream"))?;
        Ok(Box::new(SimulatedElement::new(camera, self.probe.clone())))
    }

    fn orientation_sensor(&self) -> Rc<dyn OrientationSensor> {
        self.display.clone()
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, PlatformError> {
        Ok(self
            .camera
            .iter()
            .map(|camera| DeviceInfo {
                device_id: "sim-0".to_string(),
                label: camera.label.clone(),
            })
            .collect())
    }
}

/// Video track of the simulated camera.
pub struct SimulatedTrack {
    label: String,
    capabilities: Option<TrackCapabilities>,
    stopped: Cell<bool>,
    probe: Rc<SimulationProbe>,
}

impl SimulatedTrack {
    pub fn new(camera: &SimulatedCamera, probe: Rc<SimulationProbe>) -> Self {
        Self {
            label: camera.label.clone(),
            capabilities: camera.capabilities.clone(),
            stopped: Cell::new(false),
            probe,
        }
    }
}

impl VideoTrack for SimulatedTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn ready_state(&self) -> TrackReadyState {
        if self.stopped.get() || self.probe.track_ended.get() {
            TrackReadyState::Ended
        } else {
            TrackReadyState::Live
        }
    }

    fn capabilities(&self) -> Option<TrackCapabilities> {
        self.capabilities.clone()
    }

    fn apply_constraints(&self, constraints: &TrackConstraintSet) -> Result<(), PlatformError> {
        if self.ready_state() == TrackReadyState::Ended {
            return Err(PlatformError::invalid_state("track has ended"));
        }
        if self.probe.refuse_constraints.get() {
            return Err(PlatformError::overconstrained("constraint refused by simulated camera"));
        }
        self.probe.applied.borrow_mut().push(constraints.clone());
        Ok(())
    }

    fn stop(&self) {
        if !self.stopped.replace(true) {
            self.probe.tracks_stopped.set(self.probe.tracks_stopped.get() + 1);
        }
    }
}

/// Playback surface of the simulated camera.
struct SimulatedElement {
    script: Vec<Dimension>,
    native: Dimension,
    settles: bool,
    metadata_delay: u32,
    frame_callbacks: bool,
    metadata_polls: Cell<u32>,
    presented: Cell<u64>,
    cursor: Cell<usize>,
    current: Cell<Dimension>,
    detached: bool,
    probe: Rc<SimulationProbe>,
}

impl SimulatedElement {
    fn new(camera: &SimulatedCamera, probe: Rc<SimulationProbe>) -> Self {
        Self {
            script: camera.warmup.clone(),
            native: camera.native,
            settles: camera.settles,
            metadata_delay: camera.metadata_delay,
            frame_callbacks: camera.frame_callbacks,
            metadata_polls: Cell::new(0),
            presented: Cell::new(0),
            cursor: Cell::new(0),
            current: Cell::new(camera.native),
            detached: false,
            probe,
        }
    }

    fn next_size(&self) -> Dimension {
        let index = self.cursor.get();
        self.cursor.set(index + 1);

        if index < self.script.len() {
            self.script[index]
        } else if !self.settles && !self.script.is_empty() {
            self.script[index % self.script.len()]
        } else {
            self.native
        }
    }
}

impl VideoElement for SimulatedElement {
    fn has_metadata(&self) -> bool {
        let polls = self.metadata_polls.get().saturating_add(1);
        self.metadata_polls.set(polls);
        !self.detached && polls > self.metadata_delay
    }

    fn play(&mut self) -> Result<(), PlatformError> {
        if self.detached {
            return Err(PlatformError::invalid_state("element is detached"));
        }
        Ok(())
    }

    fn video_size(&self) -> Dimension {
        if self.detached {
            return Dimension::new(0, 0);
        }
        let size = self.next_size();
        self.current.set(size);
        size
    }

    /// One new frame per query unless the feed is stalled.
    fn presented_frames(&self) -> Option<u64> {
        if !self.frame_callbacks {
            return None;
        }
        if !self.detached && !self.probe.frames_stalled.get() {
            self.presented.set(self.presented.get() + 1);
        }
        Some(self.presented.get())
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, PlatformError> {
        if self.detached {
            return Err(PlatformError::invalid_state("element is detached"));
        }
        if self.probe.failed_grabs.get() > 0 {
            self.probe.failed_grabs.set(self.probe.failed_grabs.get() - 1);
            return Err(PlatformError::new("AbortError", "frame read timed out"));
        }
        self.probe.frames_grabbed.set(self.probe.frames_grabbed.get() + 1);

        let size = self.current.get();
        let mut data = Vec::with_capacity(size.width as usize * size.height as usize * 3);
        for y in 0..size.height {
            for x in 0..size.width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        Ok(VideoFrame::from_data(size.width, size.height, PixelFormat::Rgb, data))
    }

    fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.probe.elements_detached.set(self.probe.elements_detached.get() + 1);
        }
    }
}

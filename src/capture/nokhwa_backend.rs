//! Native webcams through nokhwa.
//!
//! Desktop cameras have no facing direction, so `user` picks the first
//! device and `environment` the last. A `device_id` is the device index.
//! Size hints become `Closest` format requests; the bare fallback asks for
//! the highest resolution the device offers.

use super::{
    DeviceInfo, DisplaySignals, FocusMode, MediaPlatform, MediaStream, OrientationSensor, PermissionState,
    RangeCapability, TrackCapabilities, TrackConstraintSet, TrackReadyState, VideoConstraint, VideoElement,
    VideoTrack,
};
use crate::error::PlatformError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::options::{Dimension, FacingMode};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, ControlValueDescription, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

type SharedCamera = Rc<RefCell<Camera>>;

/// Desktop displays give no orientation hints.
struct DesktopDisplay;

impl OrientationSensor for DesktopDisplay {
    fn display_signals(&self) -> DisplaySignals {
        DisplaySignals::default()
    }
}

/// [`MediaPlatform`] over the host's webcams.
pub struct NokhwaPlatform {
    pending: HashMap<String, SharedCamera>,
    next_stream: u32,
}

impl NokhwaPlatform {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_stream: 0,
        }
    }

    fn resolve_index(&self, constraint: &VideoConstraint) -> Result<u32, PlatformError> {
        if let Some(id) = &constraint.device_id {
            return id
                .parse::<u32>()
                .map_err(|_| PlatformError::new("NotFoundError", format!("unknown device id {:?}", id)));
        }

        let devices = self.enumerate_devices()?;
        let count = devices.len() as u32;
        if count == 0 {
            return Err(PlatformError::new("NotFoundError", "no camera connected"));
        }
        Ok(match constraint.facing_mode {
            FacingMode::User => 0,
            FacingMode::Environment => count - 1,
        })
    }
}

impl Default for NokhwaPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn requested_format(constraint: &VideoConstraint) -> RequestedFormat<'static> {
    let kind = match constraint.resolution() {
        Some(size) => RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(size.width, size.height),
            FrameFormat::MJPEG,
            30,
        )),
        None => RequestedFormatType::AbsoluteHighestResolution,
    };
    RequestedFormat::new::<RgbFormat>(kind)
}

/// A missed read on an open stream is transient; only a closed stream ends
/// the session.
fn frame_read_error(stream_open: bool, message: String) -> PlatformError {
    if stream_open {
        PlatformError::new("AbortError", message)
    } else {
        PlatformError::invalid_state(message)
    }
}

impl MediaPlatform for NokhwaPlatform {
    fn has_media_capture(&self) -> bool {
        true
    }

    fn query_camera_permission(&self) -> Result<Option<PermissionState>, PlatformError> {
        // native stacks only answer by opening the device
        Ok(None)
    }

    fn get_user_media(&mut self, constraint: &VideoConstraint) -> Result<MediaStream, PlatformError> {
        let index = self.resolve_index(constraint)?;
        let mut camera = Camera::new(CameraIndex::Index(index), requested_format(constraint))
            .map_err(|e| PlatformError::new("NotFoundError", e.to_string()))?;

        // Creating the camera is not enough for some drivers; the stream must open too.
        camera
            .open_stream()
            .map_err(|e| PlatformError::not_readable(e.to_string()))?;

        let resolution = camera.resolution();
        let label = camera.info().human_name().to_string();
        info!("Opened camera {} ({}) at {}", index, label, resolution);

        self.next_stream += 1;
        let id = format!("nokhwa-{}-{}", index, self.next_stream);
        let camera = Rc::new(RefCell::new(camera));
        self.pending.insert(id.clone(), camera.clone());

        let track: Rc<dyn VideoTrack> = Rc::new(NokhwaTrack {
            label,
            camera,
            stopped: Cell::new(false),
        });
        Ok(MediaStream { id, tracks: vec![track] })
    }

    fn create_video_element(&mut self, stream: &MediaStream) -> Result<Box<dyn VideoElement>, PlatformError> {
        let camera = self
            .pending
            .remove(&stream.id)
            .ok_or_else(|| PlatformError::invalid_state(format!("stream {} is not from this platform", stream.id)))?;
        Ok(Box::new(NokhwaElement {
            camera,
            detached: false,
        }))
    }

    fn orientation_sensor(&self) -> Rc<dyn OrientationSensor> {
        Rc::new(DesktopDisplay)
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, PlatformError> {
        let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| PlatformError::not_supported(e.to_string()))?;
        Ok(devices
            .into_iter()
            .enumerate()
            .map(|(position, d)| DeviceInfo {
                device_id: d.index().as_index().unwrap_or(position as u32).to_string(),
                label: d.human_name().to_string(),
            })
            .collect())
    }
}

struct NokhwaTrack {
    label: String,
    camera: SharedCamera,
    stopped: Cell<bool>,
}

impl VideoTrack for NokhwaTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn ready_state(&self) -> TrackReadyState {
        if self.stopped.get() {
            return TrackReadyState::Ended;
        }
        match self.camera.try_borrow() {
            Ok(camera) if !camera.is_stream_open() => TrackReadyState::Ended,
            _ => TrackReadyState::Live,
        }
    }

    fn capabilities(&self) -> Option<TrackCapabilities> {
        let camera = self.camera.try_borrow().ok()?;
        let mut caps = TrackCapabilities {
            torch: Some(false),
            ..Default::default()
        };

        match camera.camera_control(KnownCameraControl::Focus) {
            Ok(control) => {
                if let ControlValueDescription::IntegerRange { min, max, .. } = control.description() {
                    caps.focus_modes.push(FocusMode::Manual);
                    caps.focus_distance = Some(RangeCapability {
                        min: *min as f64,
                        max: *max as f64,
                    });
                }
            }
            Err(e) => debug!("Camera {} has no focus control: {}", self.label, e),
        }
        Some(caps)
    }

    fn apply_constraints(&self, constraints: &TrackConstraintSet) -> Result<(), PlatformError> {
        if constraints.torch == Some(true) {
            return Err(PlatformError::not_supported("torch is not exposed by native webcams"));
        }
        if constraints.focus_mode == Some(FocusMode::SingleShot) {
            return Err(PlatformError::not_supported("single-shot focus is not exposed by native webcams"));
        }

        if let Some(distance) = constraints.focus_distance {
            let mut camera = self
                .camera
                .try_borrow_mut()
                .map_err(|_| PlatformError::invalid_state("camera is busy"))?;
            camera
                .set_camera_control(KnownCameraControl::Focus, ControlValueSetter::Integer(distance.round() as i64))
                .map_err(|e| PlatformError::overconstrained(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        if let Ok(mut camera) = self.camera.try_borrow_mut() {
            if let Err(e) = camera.stop_stream() {
                warn!("Failed to stop camera {}: {}", self.label, e);
            }
        }
    }
}

/// Pulls frames straight from the camera; there is no per-frame callback,
/// so the session ticks on its own schedule.
struct NokhwaElement {
    camera: SharedCamera,
    detached: bool,
}

impl VideoElement for NokhwaElement {
    fn has_metadata(&self) -> bool {
        !self.detached && self.camera.try_borrow().is_ok_and(|camera| camera.is_stream_open())
    }

    fn play(&mut self) -> Result<(), PlatformError> {
        if self.detached {
            return Err(PlatformError::invalid_state("element is detached"));
        }
        let mut camera = self
            .camera
            .try_borrow_mut()
            .map_err(|_| PlatformError::invalid_state("camera is busy"))?;
        if !camera.is_stream_open() {
            camera
                .open_stream()
                .map_err(|e| PlatformError::not_readable(e.to_string()))?;
        }
        Ok(())
    }

    fn video_size(&self) -> Dimension {
        if self.detached {
            return Dimension::new(0, 0);
        }
        let Ok(mut camera) = self.camera.try_borrow_mut() else {
            return Dimension::new(0, 0);
        };
        match camera.frame() {
            Ok(buffer) => {
                let resolution = buffer.resolution();
                Dimension::new(resolution.width(), resolution.height())
            }
            Err(e) => {
                debug!("No frame yet: {}", e);
                Dimension::new(0, 0)
            }
        }
    }

    fn presented_frames(&self) -> Option<u64> {
        None
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, PlatformError> {
        if self.detached {
            return Err(PlatformError::invalid_state("element is detached"));
        }
        let mut camera = self
            .camera
            .try_borrow_mut()
            .map_err(|_| PlatformError::invalid_state("camera is busy"))?;
        let buffer = camera
            .frame()
            .map_err(|e| frame_read_error(camera.is_stream_open(), e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| PlatformError::new("EncodingError", e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        Ok(VideoFrame::from_data(width, height, PixelFormat::Rgb, decoded.into_raw()))
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorCode};

    #[test]
    fn test_missed_frame_on_open_stream_is_not_terminal() {
        let error = frame_read_error(true, "timed out".to_string());
        assert_eq!(classify(&error), ErrorCode::CaptureInterrupted);

        let error = frame_read_error(false, "stream closed".to_string());
        assert_eq!(classify(&error), ErrorCode::StreamEnded);
    }
}

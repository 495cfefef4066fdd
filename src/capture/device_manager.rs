//! Camera acquisition: permission check, candidate negotiation, session setup.

use super::constraints::{build_candidates, ConstraintCandidate};
use super::permission::{ensure_permission, PermissionOutcome};
use super::session::StreamSession;
use super::{DeviceInfo, MediaPlatform};
use crate::error::{classify, CaptureError, ErrorCode, PlatformError, Result};
use crate::options::SessionOptions;
use tracing::{debug, info, warn};

/// Opens capture sessions on a media platform.
pub struct DeviceManager<P: MediaPlatform> {
    platform: P,
}

impl<P: MediaPlatform> DeviceManager<P> {
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Lists the cameras the platform knows about.
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        if !self.platform.has_media_capture() {
            return Err(CaptureError::new(ErrorCode::NotSupported, "no camera API on this platform"));
        }
        self.platform
            .enumerate_devices()
            .map_err(|e| CaptureError::from_platform("could not enumerate cameras", e))
    }

    /// Acquires a camera stream and wraps it in a new session.
    ///
    /// Candidates are tried strictly in order and the first stream the
    /// platform hands out wins. Only when every candidate is refused does
    /// this fail, with `ConstraintFailed` wrapping the last refusal. A
    /// permission refusal stops the walk early since every other shape
    /// would be refused the same way.
    pub fn create_session(&mut self, options: SessionOptions) -> Result<StreamSession> {
        if !self.platform.has_media_capture() {
            return Err(CaptureError::new(ErrorCode::NotSupported, "no camera API on this platform"));
        }

        let options = options.normalized();
        if ensure_permission(&self.platform) == PermissionOutcome::Denied {
            return Err(CaptureError::new(ErrorCode::PermissionDenied, "camera permission was denied"));
        }

        let candidates = build_candidates(
            options.facing_mode,
            options.device_id.as_deref(),
            &options.prefer_resolutions,
            options.aspect_policy,
        );
        debug!("Negotiating camera with {} candidate(s)", candidates.len());

        let mut session = StreamSession::new(options, self.platform.orientation_sensor());
        session.mark_requesting();

        let mut last_error: Option<PlatformError> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            match self.try_candidate(candidate) {
                Ok((stream, element)) => {
                    info!("Camera opened with {} (attempt {})", candidate, index + 1);
                    session.install(stream, element, index + 1);
                    return Ok(session);
                }
                Err(e) => {
                    if classify(&e) == ErrorCode::PermissionDenied {
                        warn!("Camera access refused while trying {}: {}", candidate, e);
                        return Err(CaptureError::with_cause(
                            ErrorCode::PermissionDenied,
                            "camera permission was denied",
                            e,
                        ));
                    }
                    debug!("Candidate {} rejected: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        let message = format!("no camera configuration accepted after {} attempt(s)", candidates.len());
        warn!("{}", message);
        Err(match last_error {
            Some(cause) => CaptureError::with_cause(ErrorCode::ConstraintFailed, message, cause),
            None => CaptureError::new(ErrorCode::ConstraintFailed, message),
        })
    }

    fn try_candidate(
        &mut self,
        candidate: &ConstraintCandidate,
    ) -> std::result::Result<(super::MediaStream, Box<dyn super::VideoElement>), PlatformError> {
        let stream = self.platform.get_user_media(&candidate.constraint)?;

        if stream.first_video_track().is_none() {
            stream.stop_all();
            return Err(PlatformError::new("NotFoundError", "stream carried no video track"));
        }

        match self.platform.create_video_element(&stream) {
            Ok(element) => Ok((stream, element)),
            Err(e) => {
                stream.stop_all();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedCamera, SimulatedPlatform};
    use crate::capture::{PermissionState, SessionState};
    use crate::options::{AspectPolicy, Dimension};
    use std::error::Error as _;

    fn forced_options() -> SessionOptions {
        SessionOptions {
            aspect_policy: AspectPolicy::Force(4.0 / 3.0),
            prefer_resolutions: vec![Dimension::new(1920, 1440), Dimension::new(1280, 960)],
            ..Default::default()
        }
    }

    #[test]
    fn test_no_media_api_is_not_supported() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default()).without_media_capture();
        let mut manager = DeviceManager::new(platform);
        let err = manager.create_session(SessionOptions::default()).err().unwrap();
        assert_eq!(err.code, ErrorCode::NotSupported);
        assert!(manager.platform().probe().attempts().is_empty());
    }

    #[test]
    fn test_denied_permission_skips_acquisition() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default()).with_permission(Some(PermissionState::Denied));
        let mut manager = DeviceManager::new(platform);
        let err = manager.create_session(SessionOptions::default()).err().unwrap();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert!(manager.platform().probe().attempts().is_empty());
    }

    #[test]
    fn test_falls_back_past_rejected_candidates() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default()).reject_if(|c| {
            c.aspect_ratio
                .map(|_| PlatformError::overconstrained("aspectRatio"))
                .or_else(|| (c.width == Some(1920)).then(|| PlatformError::overconstrained("width")))
        });
        let mut manager = DeviceManager::new(platform);
        let session = manager.create_session(forced_options()).unwrap();

        // rich 1920, basic 1920, rich 1280 refused; basic 1280 accepted
        assert_eq!(session.state(), &SessionState::Starting { attempt: 4 });
        let attempts = manager.platform().probe().attempts();
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[3].resolution(), Some(Dimension::new(1280, 960)));
        assert_eq!(attempts[3].aspect_ratio, None);
    }

    #[test]
    fn test_exhausted_candidates_wrap_last_error() {
        let mut manager = DeviceManager::new(SimulatedPlatform::without_camera());
        let err = manager.create_session(forced_options()).err().unwrap();

        assert_eq!(err.code, ErrorCode::ConstraintFailed);
        assert_eq!(manager.platform().probe().attempts().len(), 5);
        let cause = err.source().map(|s| s.to_string()).unwrap();
        assert!(cause.starts_with("NotFoundError"));
    }

    #[test]
    fn test_prompt_refusal_stops_negotiation() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default())
            .with_permission(Some(PermissionState::Prompt))
            .reject_if(|_| Some(PlatformError::not_allowed("Permission dismissed")));
        let mut manager = DeviceManager::new(platform);
        let err = manager.create_session(forced_options()).err().unwrap();

        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(manager.platform().probe().attempts().len(), 1);
    }

    #[test]
    fn test_list_devices() {
        let manager = DeviceManager::new(SimulatedPlatform::new(SimulatedCamera::default()));
        let devices = manager.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].label, "Simulated camera");
    }
}

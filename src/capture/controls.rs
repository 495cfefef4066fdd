//! Best-effort torch and focus control for a single video track.
//!
//! Nothing here returns an error: a camera that cannot do something simply
//! answers `false`.

use super::{FocusMode, TrackConstraintSet, TrackReadyState, VideoTrack};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Focus distance range reported by the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FocusSupport {
    pub single_shot: bool,
    pub manual: Option<FocusRange>,
}

/// Capability snapshot taken once when the controller is built.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackControlsSupport {
    pub torch: bool,
    pub focus: FocusSupport,
}

/// Torch and focus controls over a track the session owns.
#[derive(Debug, Clone)]
pub struct TrackCapabilityController {
    track: Weak<dyn VideoTrack>,
    support: TrackControlsSupport,
}

impl TrackCapabilityController {
    pub fn new(track: &Rc<dyn VideoTrack>) -> Self {
        let support = probe_support(track.as_ref());
        debug!("Track {} controls: {:?}", track.label(), support);
        Self {
            track: Rc::downgrade(track),
            support,
        }
    }

    pub fn support(&self) -> TrackControlsSupport {
        self.support
    }

    pub fn set_torch(&self, on: bool) -> bool {
        if !self.support.torch {
            return false;
        }
        self.apply(
            "torch",
            TrackConstraintSet {
                torch: Some(on),
                ..Default::default()
            },
        )
    }

    /// Triggers one autofocus pass.
    pub fn apply_single_shot_focus(&self) -> bool {
        if !self.support.focus.single_shot {
            return false;
        }
        self.apply(
            "single-shot focus",
            TrackConstraintSet {
                focus_mode: Some(FocusMode::SingleShot),
                ..Default::default()
            },
        )
    }

    /// Sets the focus distance; `ratio` 0 maps to the nearest reported
    /// distance and 1 to the farthest. Out-of-range ratios are clamped.
    pub fn set_manual_focus(&self, ratio: f64) -> bool {
        let Some(range) = self.support.focus.manual else {
            return false;
        };
        if ratio.is_nan() {
            return false;
        }

        let ratio = ratio.clamp(0.0, 1.0);
        let distance = range.min + (range.max - range.min) * ratio;
        self.apply(
            "manual focus",
            TrackConstraintSet {
                focus_mode: Some(FocusMode::Manual),
                focus_distance: Some(distance),
                ..Default::default()
            },
        )
    }

    fn apply(&self, what: &str, constraints: TrackConstraintSet) -> bool {
        let Some(track) = self.track.upgrade() else {
            debug!("Skipping {}: track is gone", what);
            return false;
        };
        if track.ready_state() == TrackReadyState::Ended {
            debug!("Skipping {}: track has ended", what);
            return false;
        }

        match track.apply_constraints(&constraints) {
            Ok(()) => true,
            Err(e) => {
                debug!("Camera refused {}: {}", what, e);
                false
            }
        }
    }
}

fn probe_support(track: &dyn VideoTrack) -> TrackControlsSupport {
    let Some(caps) = track.capabilities() else {
        return TrackControlsSupport::default();
    };

    let manual = caps
        .focus_distance
        .filter(|_| caps.focus_modes.contains(&FocusMode::Manual))
        .filter(|range| range.min.is_finite() && range.max.is_finite() && range.min <= range.max)
        .map(|range| FocusRange {
            min: range.min,
            max: range.max,
        });

    TrackControlsSupport {
        torch: caps.torch.unwrap_or(false),
        focus: FocusSupport {
            single_shot: caps.focus_modes.contains(&FocusMode::SingleShot),
            manual,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedCamera, SimulatedTrack, SimulationProbe};
    use crate::capture::{RangeCapability, TrackCapabilities};

    fn track(capabilities: Option<TrackCapabilities>) -> (Rc<dyn VideoTrack>, Rc<SimulationProbe>) {
        let probe = Rc::new(SimulationProbe::default());
        let camera = SimulatedCamera {
            capabilities,
            ..Default::default()
        };
        let track: Rc<dyn VideoTrack> = Rc::new(SimulatedTrack::new(&camera, probe.clone()));
        (track, probe)
    }

    fn full_caps() -> TrackCapabilities {
        TrackCapabilities {
            torch: Some(true),
            focus_modes: vec![FocusMode::Continuous, FocusMode::SingleShot, FocusMode::Manual],
            focus_distance: Some(RangeCapability { min: 0.1, max: 2.1 }),
        }
    }

    #[test]
    fn test_missing_capabilities_degrade_to_unsupported() {
        let (track, probe) = track(None);
        let controls = TrackCapabilityController::new(&track);

        assert_eq!(controls.support(), TrackControlsSupport::default());
        assert!(!controls.set_torch(true));
        assert!(!controls.apply_single_shot_focus());
        assert!(!controls.set_manual_focus(0.5));
        assert!(probe.applied().is_empty());
    }

    #[test]
    fn test_torch_unsupported_returns_false() {
        let (track, _probe) = track(Some(TrackCapabilities {
            torch: Some(false),
            ..Default::default()
        }));
        let controls = TrackCapabilityController::new(&track);
        assert!(!controls.support().torch);
        assert!(!controls.set_torch(true));
    }

    #[test]
    fn test_manual_focus_maps_and_clamps() {
        let (track, probe) = track(Some(full_caps()));
        let controls = TrackCapabilityController::new(&track);
        assert_eq!(controls.support().focus.manual, Some(FocusRange { min: 0.1, max: 2.1 }));

        assert!(controls.set_manual_focus(0.5));
        assert!(controls.set_manual_focus(7.0));
        assert!(controls.set_manual_focus(-1.0));
        assert!(!controls.set_manual_focus(f64::NAN));

        let distances: Vec<f64> = probe.applied().iter().filter_map(|c| c.focus_distance).collect();
        assert_eq!(distances.len(), 3);
        assert!((distances[0] - 1.1).abs() < 1e-9);
        assert!((distances[1] - 2.1).abs() < 1e-9);
        assert!((distances[2] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_manual_range_requires_manual_mode() {
        let (track, _probe) = track(Some(TrackCapabilities {
            focus_modes: vec![FocusMode::Continuous],
            focus_distance: Some(RangeCapability { min: 0.0, max: 1.0 }),
            ..Default::default()
        }));
        let controls = TrackCapabilityController::new(&track);
        assert_eq!(controls.support().focus.manual, None);
        assert!(!controls.set_manual_focus(0.3));
    }

    #[test]
    fn test_refused_constraint_returns_false() {
        let (track, probe) = track(Some(full_caps()));
        let controls = TrackCapabilityController::new(&track);
        probe.refuse_constraints();
        assert!(!controls.apply_single_shot_focus());
    }

    #[test]
    fn test_stopped_track_fails_soft() {
        let (track, _probe) = track(Some(full_caps()));
        let controls = TrackCapabilityController::new(&track);
        track.stop();
        assert!(!controls.set_torch(true));

        drop(track);
        assert!(!controls.apply_single_shot_focus());
    }
}

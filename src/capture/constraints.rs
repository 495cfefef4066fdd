//! Ordered fallback list of camera request shapes.
//!
//! Every hint is an `ideal` hint. Hard (`exact`) constraints make many
//! devices reject the request outright instead of renegotiating.

use crate::options::{AspectPolicy, Dimension, FacingMode};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Resolution plus aspect ratio hint
    Rich,
    /// Resolution hint only
    Basic,
    /// Facing mode only
    Fallback,
}

/// A camera request shape. All fields are soft hints.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConstraint {
    pub facing_mode: FacingMode,
    pub device_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
}

impl VideoConstraint {
    fn facing_only(facing_mode: FacingMode) -> Self {
        Self {
            facing_mode,
            device_id: None,
            width: None,
            height: None,
            aspect_ratio: None,
        }
    }

    pub fn resolution(&self) -> Option<Dimension> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(Dimension::new(width, height)),
            _ => None,
        }
    }
}

/// One entry of the negotiation list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCandidate {
    pub kind: CandidateKind,
    pub constraint: VideoConstraint,
    pub description: String,
}

impl fmt::Display for ConstraintCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Builds the request shapes to try, richest first.
///
/// Per preferred resolution: a rich candidate when the aspect is forced,
/// then a basic one. A single facing-mode-only candidate always closes the
/// list so acquisition only fails when the platform refuses the camera
/// itself. A pinned `device_id` rides on every candidate except the last.
pub fn build_candidates(
    facing_mode: FacingMode,
    device_id: Option<&str>,
    prefer_resolutions: &[Dimension],
    aspect_policy: AspectPolicy,
) -> Vec<ConstraintCandidate> {
    let forced = aspect_policy.forced_ratio();
    let per_resolution = if forced.is_some() { 2 } else { 1 };
    let mut candidates = Vec::with_capacity(prefer_resolutions.len() * per_resolution + 1);

    for resolution in prefer_resolutions {
        let base = VideoConstraint {
            facing_mode,
            device_id: device_id.map(str::to_owned),
            width: Some(resolution.width),
            height: Some(resolution.height),
            aspect_ratio: None,
        };

        if let Some(ratio) = forced {
            candidates.push(ConstraintCandidate {
                kind: CandidateKind::Rich,
                description: format!("rich {} aspect {:.3} facing={}", resolution, ratio, facing_mode.as_str()),
                constraint: VideoConstraint {
                    aspect_ratio: Some(ratio),
                    ..base.clone()
                },
            });
        }

        candidates.push(ConstraintCandidate {
            kind: CandidateKind::Basic,
            description: format!("basic {} facing={}", resolution, facing_mode.as_str()),
            constraint: base,
        });
    }

    candidates.push(ConstraintCandidate {
        kind: CandidateKind::Fallback,
        description: format!("fallback facing={}", facing_mode.as_str()),
        constraint: VideoConstraint::facing_only(facing_mode),
    });

    candidates
}

//! Non-intrusive camera permission check.

use super::{MediaPlatform, PermissionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Checks camera permission without raising a capture prompt.
///
/// Only a definitive `denied` answer from the platform's permission query
/// blocks. No query API, a failing query, or a `prompt` answer all return
/// `Granted` and leave the decision to the acquisition call, which shows
/// the one real prompt.
pub fn ensure_permission<P: MediaPlatform + ?Sized>(platform: &P) -> PermissionOutcome {
    match platform.query_camera_permission() {
        Ok(Some(PermissionState::Denied)) => PermissionOutcome::Denied,
        Ok(Some(PermissionState::Granted)) => PermissionOutcome::Granted,
        Ok(Some(PermissionState::Prompt)) => {
            tracing::debug!("Camera permission not decided yet, deferring to acquisition");
            PermissionOutcome::Granted
        }
        Ok(None) => PermissionOutcome::Granted,
        Err(e) => {
            tracing::debug!("Permission query failed ({}), deferring to acquisition", e);
            PermissionOutcome::Granted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedCamera, SimulatedPlatform};
    use crate::error::PlatformError;

    #[test]
    fn test_definitive_answers_are_used() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default()).with_permission(Some(PermissionState::Denied));
        assert_eq!(ensure_permission(&platform), PermissionOutcome::Denied);

        let platform = SimulatedPlatform::new(SimulatedCamera::default()).with_permission(Some(PermissionState::Granted));
        assert_eq!(ensure_permission(&platform), PermissionOutcome::Granted);
    }

    #[test]
    fn test_prompt_and_missing_query_are_optimistic() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default()).with_permission(Some(PermissionState::Prompt));
        assert_eq!(ensure_permission(&platform), PermissionOutcome::Granted);

        let platform = SimulatedPlatform::new(SimulatedCamera::default()).with_permission(None);
        assert_eq!(ensure_permission(&platform), PermissionOutcome::Granted);
    }

    #[test]
    fn test_failing_query_is_optimistic() {
        let platform = SimulatedPlatform::new(SimulatedCamera::default())
            .with_permission_error(PlatformError::new("TypeError", "camera is not a valid PermissionName"));
        assert_eq!(ensure_permission(&platform), PermissionOutcome::Granted);
    }
}

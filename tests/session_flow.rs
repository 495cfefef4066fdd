use inspectcam::capture::simulated::{SimulatedCamera, SimulatedPlatform};
use inspectcam::capture::{DisplaySignals, ScreenOrientationType, TrackCapabilities};
use inspectcam::{
    AspectPolicy, DeviceManager, Dimension, DirectoryUploader, ErrorCode, FacingMode, OrientationPolicy, Rotation,
    SessionOptions, SessionState, StabilizationOptions, Uploader,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FRAME: Duration = Duration::from_millis(16);

fn tick_until_ready(session: &mut inspectcam::StreamSession, max_ticks: u32) -> Instant {
    let mut now = Instant::now();
    for _ in 0..max_ticks {
        now += FRAME;
        if session.tick(now).is_ready() {
            break;
        }
    }
    now
}

#[test]
fn forced_aspect_capture_end_to_end() {
    let camera = SimulatedCamera {
        native: Dimension::new(1920, 1440),
        ..Default::default()
    };
    let mut manager = DeviceManager::new(SimulatedPlatform::new(camera));
    let options = SessionOptions {
        facing_mode: FacingMode::Environment,
        aspect_policy: AspectPolicy::Force(4.0 / 3.0),
        stabilization: StabilizationOptions {
            min_stable_frames: 3,
            timeout_ms: 1500,
        },
        ..Default::default()
    };

    let mut session = manager.create_session(options).unwrap();
    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    session.on_state_change(move |state| sink.borrow_mut().push(state.clone()));

    tick_until_ready(&mut session, 10);
    assert_eq!(
        session.state(),
        &SessionState::Ready {
            dimension: Dimension::new(1920, 1440),
            stable_frames: 3,
        }
    );

    let capture = session.capture().unwrap();
    assert_eq!(capture.meta.aspect_enforced, Some(4.0 / 3.0));
    assert_eq!(capture.meta.stable_frames, 3);
    assert_eq!(capture.meta.raw, Dimension::new(1920, 1440));
    assert_eq!(capture.meta.output, Dimension::new(1920, 1440));
    assert_eq!(capture.meta.rotation, Rotation::Deg0);

    session.destroy();
    let seen: Vec<&str> = states.borrow().iter().map(|s| s.name()).collect();
    assert_eq!(seen.first(), Some(&"starting"));
    assert_eq!(seen.last(), Some(&"destroyed"));
    assert!(seen.contains(&"ready"));
}

#[test]
fn follow_device_rotates_portrait_stream_on_landscape_display() {
    let camera = SimulatedCamera {
        native: Dimension::new(720, 1280),
        ..Default::default()
    };
    let platform = SimulatedPlatform::new(camera).with_display_signals(DisplaySignals {
        orientation_type: Some(ScreenOrientationType::LandscapePrimary),
        ..Default::default()
    });
    let mut manager = DeviceManager::new(platform);
    let mut session = manager
        .create_session(SessionOptions {
            orientation_policy: OrientationPolicy::FollowDevice,
            watermark: false,
            ..Default::default()
        })
        .unwrap();

    tick_until_ready(&mut session, 10);
    let capture = session.capture().unwrap();
    assert_eq!(capture.meta.rotation, Rotation::Deg90);
    assert_eq!(capture.meta.output, Dimension::new(1280, 720));
}

#[test]
fn display_change_between_captures_is_picked_up() {
    let camera = SimulatedCamera {
        native: Dimension::new(1280, 720),
        ..Default::default()
    };
    let platform = SimulatedPlatform::new(camera);
    let display = platform.display();
    let mut manager = DeviceManager::new(platform);
    let mut session = manager
        .create_session(SessionOptions {
            orientation_policy: OrientationPolicy::FollowDevice,
            watermark: false,
            ..Default::default()
        })
        .unwrap();
    tick_until_ready(&mut session, 10);

    assert_eq!(session.capture().unwrap().meta.rotation, Rotation::Deg0);

    display.set_signals(DisplaySignals {
        angle: Some(0),
        ..Default::default()
    });
    assert_eq!(session.capture().unwrap().meta.rotation, Rotation::Deg270);
}

#[test]
fn hardware_loss_mid_stabilization_is_terminal() {
    let camera = SimulatedCamera {
        warmup: vec![Dimension::new(640, 480); 4],
        ..Default::default()
    };
    let mut manager = DeviceManager::new(SimulatedPlatform::new(camera));
    let probe = manager.platform().probe();
    let mut session = manager.create_session(SessionOptions::default()).unwrap();

    let start = Instant::now();
    session.tick(start);
    session.tick(start + FRAME);
    probe.end_track();
    session.tick(start + FRAME * 2);

    match session.state() {
        SessionState::Error { code, .. } => assert_eq!(*code, ErrorCode::StreamEnded),
        other => panic!("unexpected state {other}"),
    }
    assert_eq!(probe.elements_detached(), 1);

    session.destroy();
    assert!(session.is_destroyed());
}

#[test]
fn dropping_a_session_releases_the_camera() {
    let mut manager = DeviceManager::new(SimulatedPlatform::new(SimulatedCamera::default()));
    let probe = manager.platform().probe();
    {
        let mut session = manager.create_session(SessionOptions::default()).unwrap();
        tick_until_ready(&mut session, 2);
    }
    assert_eq!(probe.tracks_stopped(), 1);
    assert_eq!(probe.elements_detached(), 1);
}

#[test]
fn manual_focus_through_session_controls() {
    use inspectcam::capture::{FocusMode, RangeCapability};

    let camera = SimulatedCamera {
        capabilities: Some(TrackCapabilities {
            torch: None,
            focus_modes: vec![FocusMode::Manual],
            focus_distance: Some(RangeCapability { min: 0.0, max: 250.0 }),
        }),
        ..Default::default()
    };
    let mut manager = DeviceManager::new(SimulatedPlatform::new(camera));
    let probe = manager.platform().probe();
    let mut session = manager.create_session(SessionOptions::default()).unwrap();
    tick_until_ready(&mut session, 10);

    let controls = session.track_controls().unwrap();
    assert!(!controls.support().torch);
    assert!(!controls.set_torch(true));
    assert!(controls.set_manual_focus(0.5));
    assert_eq!(probe.applied().last().and_then(|c| c.focus_distance), Some(125.0));
}

#[test]
fn capture_is_stored_by_directory_uploader() {
    let temp_dir = TempDir::new().unwrap();
    let mut uploader = DirectoryUploader::new(temp_dir.path()).unwrap();

    let mut manager = DeviceManager::new(SimulatedPlatform::new(SimulatedCamera {
        native: Dimension::new(320, 240),
        ..Default::default()
    }));
    let mut session = manager.create_session(SessionOptions::default()).unwrap();
    tick_until_ready(&mut session, 10);
    let capture = session.capture().unwrap();

    let receipt = uploader.upload(&capture.file).unwrap();
    let path = receipt.file_url.to_file_path().unwrap();
    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 240));
}

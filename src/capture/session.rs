//! Stream session: owns one stream and its playback surface, waits for the
//! stream to settle, and hands ready frames to the processor.

use super::controls::TrackCapabilityController;
use super::{MediaStream, OrientationSensor, TrackReadyState, VideoElement};
use crate::error::{CaptureError, ErrorCode, Result};
use crate::options::{Dimension, FlashMode, SessionOptions};
use crate::processing::{self, CaptureResult};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Lifecycle of a [`StreamSession`]. `Error` and `Destroyed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Requesting,
    /// Stream acquired with the `attempt`-th candidate (1-based)
    Starting { attempt: usize },
    /// `observed` consecutive ticks reported `last_dimension`
    Stabilizing {
        observed: u32,
        last_dimension: Option<Dimension>,
    },
    Ready {
        dimension: Dimension,
        stable_frames: u32,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Destroyed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Starting { .. } => "starting",
            SessionState::Stabilizing { .. } => "stabilizing",
            SessionState::Ready { .. } => "ready",
            SessionState::Error { .. } => "error",
            SessionState::Destroyed => "destroyed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Error { .. } | SessionState::Destroyed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Requesting => 1,
            SessionState::Starting { .. } => 2,
            SessionState::Stabilizing { .. } => 3,
            SessionState::Ready { .. } => 4,
            SessionState::Error { .. } => 5,
            SessionState::Destroyed => 6,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Starting { attempt } => write!(f, "starting(attempt={})", attempt),
            SessionState::Stabilizing { observed, last_dimension } => match last_dimension {
                Some(dim) => write!(f, "stabilizing({} x {})", observed, dim),
                None => write!(f, "stabilizing({})", observed),
            },
            SessionState::Ready { dimension, stable_frames } => {
                write!(f, "ready({}, stable_frames={})", dimension, stable_frames)
            }
            SessionState::Error { code, message } => write!(f, "error({}: {})", code, message),
            other => f.write_str(other.name()),
        }
    }
}

type Listener = Rc<RefCell<dyn FnMut(&SessionState)>>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Handle returned by [`StreamSession::on_state_change`].
pub struct Subscription {
    registry: Weak<RefCell<ListenerRegistry>>,
    id: u64,
}

impl Subscription {
    /// Stops further notifications to this listener.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Consecutive-match counter over observed frame sizes.
#[derive(Debug, Default)]
pub(crate) struct Stabilizer {
    baseline: Option<Dimension>,
    consecutive: u32,
    best: Option<(Dimension, u32)>,
}

impl Stabilizer {
    /// Records one frame size and returns the current run length.
    pub(crate) fn observe(&mut self, size: Dimension) -> u32 {
        if self.baseline == Some(size) {
            self.consecutive += 1;
        } else {
            self.baseline = Some(size);
            self.consecutive = 1;
        }

        if self.best.map_or(true, |(_, count)| self.consecutive >= count) {
            self.best = Some((size, self.consecutive));
        }
        self.consecutive
    }

    /// Size with the longest run so far; later runs win ties.
    pub(crate) fn best(&self) -> Option<(Dimension, u32)> {
        self.best
    }
}

/// One live camera stream bound to a hidden playback surface.
///
/// Driven by [`tick`](Self::tick) from the host's frame loop. Created by
/// [`DeviceManager::create_session`](super::DeviceManager::create_session).
pub struct StreamSession {
    options: SessionOptions,
    state: SessionState,
    listeners: Rc<RefCell<ListenerRegistry>>,
    stream: Option<MediaStream>,
    element: Option<Box<dyn VideoElement>>,
    sensor: Rc<dyn OrientationSensor>,
    stabilizer: Stabilizer,
    /// Set first thing in `destroy`; every tick and continuation checks it
    stopped: bool,
    phase_started: Option<Instant>,
    last_presented: Option<u64>,
    controls: Option<TrackCapabilityController>,
}

impl StreamSession {
    pub(crate) fn new(options: SessionOptions, sensor: Rc<dyn OrientationSensor>) -> Self {
        Self {
            options,
            state: SessionState::Idle,
            listeners: Rc::new(RefCell::new(ListenerRegistry::default())),
            stream: None,
            element: None,
            sensor,
            stabilizer: Stabilizer::default(),
            stopped: false,
            phase_started: None,
            last_presented: None,
            controls: None,
        }
    }

    pub(crate) fn mark_requesting(&mut self) {
        self.transition(SessionState::Requesting);
    }

    /// Takes ownership of an acquired stream and its surface.
    pub(crate) fn install(&mut self, stream: MediaStream, element: Box<dyn VideoElement>, attempt: usize) {
        self.stream = Some(stream);
        self.element = Some(element);
        self.phase_started = None;
        self.transition(SessionState::Starting { attempt });
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, SessionState::Destroyed)
    }

    /// Registers a state listener. It is called right away with the current
    /// state, then after every transition.
    pub fn on_state_change<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&SessionState) + 'static,
    {
        let listener: Listener = Rc::new(RefCell::new(listener));
        (&mut *listener.borrow_mut())(&self.state);

        let mut registry = self.listeners.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        if !self.stopped {
            registry.listeners.push((id, listener));
        }

        Subscription {
            registry: Rc::downgrade(&self.listeners),
            id,
        }
    }

    /// Advances the session by one display tick.
    pub fn tick(&mut self, now: Instant) -> &SessionState {
        if self.stopped || self.state.is_terminal() {
            return &self.state;
        }

        if self.track_ended() {
            self.fail(ErrorCode::StreamEnded, "camera track ended unexpectedly");
            return &self.state;
        }

        match self.state {
            SessionState::Starting { .. } => self.poll_metadata(now),
            SessionState::Stabilizing { .. } => self.poll_stabilization(now),
            _ => {}
        }
        &self.state
    }

    /// Ticks until the session is ready or has failed, sleeping
    /// `frame_interval` between ticks.
    pub fn wait_until_settled(&mut self, frame_interval: Duration) -> Result<Dimension> {
        loop {
            match self.tick(Instant::now()) {
                SessionState::Ready { dimension, .. } => return Ok(*dimension),
                SessionState::Error { code, message } => {
                    return Err(CaptureError::new(*code, message.clone()));
                }
                SessionState::Destroyed => {
                    return Err(CaptureError::new(ErrorCode::CaptureInterrupted, "session was destroyed"));
                }
                SessionState::Idle | SessionState::Requesting => {
                    return Err(CaptureError::new(ErrorCode::CaptureInterrupted, "session has no stream"));
                }
                SessionState::Starting { .. } | SessionState::Stabilizing { .. } => {}
            }
            std::thread::sleep(frame_interval);
        }
    }

    /// Captures the current frame. Only valid in the `ready` state.
    pub fn capture(&mut self) -> Result<CaptureResult> {
        if self.stopped {
            return Err(CaptureError::new(ErrorCode::CaptureInterrupted, "session was destroyed"));
        }

        let (raw, stable_frames) = match &self.state {
            SessionState::Ready { dimension, stable_frames } => (*dimension, *stable_frames),
            other => {
                return Err(CaptureError::new(
                    ErrorCode::CaptureInterrupted,
                    format!("capture requires a ready session, current state is {}", other.name()),
                ));
            }
        };

        if self.track_ended() {
            self.fail(ErrorCode::StreamEnded, "camera track ended before capture");
            return Err(CaptureError::new(ErrorCode::StreamEnded, "camera track ended before capture"));
        }

        let display = self.sensor.display_signals();
        let element = self.element.as_deref_mut().ok_or_else(|| {
            CaptureError::new(ErrorCode::CaptureInterrupted, "session has no video element")
        })?;

        let result = processing::process_frame(element, &self.options, stable_frames, raw, &display);
        if let Err(e) = &result {
            if e.code == ErrorCode::StreamEnded {
                self.fail(ErrorCode::StreamEnded, e.message.clone());
            }
        }
        result
    }

    /// Torch/focus controls for the session's first video track.
    ///
    /// The controller only holds a weak handle, so it turns inert once the
    /// session releases its stream.
    pub fn track_controls(&mut self) -> Option<TrackCapabilityController> {
        if self.stopped {
            return None;
        }
        if self.controls.is_none() {
            let track = self.stream.as_ref()?.first_video_track()?;
            self.controls = Some(TrackCapabilityController::new(track));
        }
        self.controls.clone()
    }

    /// Releases the camera and ends the session. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }

        self.stopped = true;
        self.release_hardware();

        let previous = std::mem::replace(&mut self.state, SessionState::Destroyed);
        info!("Session destroyed (was {})", previous);
        self.notify();
        self.listeners.borrow_mut().listeners.clear();
    }

    fn poll_metadata(&mut self, now: Instant) {
        let started = *self.phase_started.get_or_insert(now);
        let timeout = self.options.stabilization.timeout();

        let Some(element) = self.element.as_mut() else {
            self.fail(ErrorCode::Unknown, "session has no video element");
            return;
        };

        if !element.has_metadata() {
            if now.saturating_duration_since(started) >= timeout {
                self.fail(
                    ErrorCode::StabilizationTimeout,
                    format!("stream metadata did not load within {} ms", timeout.as_millis()),
                );
            }
            return;
        }

        if let Err(e) = element.play() {
            let error = CaptureError::from_platform("video playback could not start", e);
            self.fail(error.code, error.to_string());
            return;
        }

        if element.presented_frames().is_some() {
            debug!("Stabilizing on per-frame callbacks");
        } else {
            debug!("Stabilizing on display refresh ticks");
        }

        self.phase_started = Some(now);
        self.last_presented = None;
        self.stabilizer = Stabilizer::default();
        self.transition(SessionState::Stabilizing {
            observed: 0,
            last_dimension: None,
        });
    }

    fn poll_stabilization(&mut self, now: Instant) {
        let started = *self.phase_started.get_or_insert(now);
        let min_stable = self.options.stabilization.min_stable_frames.max(1);
        let timeout = self.options.stabilization.timeout();

        let fresh_size = match self.element.as_ref() {
            Some(element) => match element.presented_frames() {
                Some(presented) if self.last_presented == Some(presented) => None,
                presented => {
                    self.last_presented = presented;
                    Some(element.video_size())
                }
            },
            None => None,
        };

        if let Some(size) = fresh_size.filter(Dimension::is_valid) {
            let observed = self.stabilizer.observe(size);
            if self.options.debug {
                info!("Stabilization tick: {} seen {} time(s) in a row", size, observed);
            } else {
                trace!("Stabilization tick: {} seen {} time(s) in a row", size, observed);
            }

            if observed >= min_stable {
                self.become_ready(size, observed);
                return;
            }
            self.transition(SessionState::Stabilizing {
                observed,
                last_dimension: Some(size),
            });
        }

        if now.saturating_duration_since(started) >= timeout {
            match self.stabilizer.best() {
                Some((size, count)) => {
                    warn!(
                        "Stream did not settle within {} ms, using {} (seen {} time(s) in a row)",
                        timeout.as_millis(),
                        size,
                        count
                    );
                    self.become_ready(size, count);
                }
                None => self.fail(
                    ErrorCode::StabilizationTimeout,
                    format!("no valid frame within {} ms", timeout.as_millis()),
                ),
            }
        }
    }

    fn become_ready(&mut self, dimension: Dimension, stable_frames: u32) {
        if !self.transition(SessionState::Ready { dimension, stable_frames }) {
            return;
        }

        if self.options.initial_flash_mode == FlashMode::On {
            match self.track_controls() {
                Some(controls) if controls.set_torch(true) => debug!("Torch enabled"),
                _ => warn!("Torch requested but not available on this camera"),
            }
        }
    }

    fn track_ended(&self) -> bool {
        self.stream
            .as_ref()
            .and_then(|stream| stream.first_video_track())
            .is_some_and(|track| track.ready_state() == TrackReadyState::Ended)
    }

    fn fail(&mut self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        if self.transition(SessionState::Error { code, message }) {
            self.release_hardware();
        }
    }

    fn release_hardware(&mut self) {
        self.controls = None;
        if let Some(mut element) = self.element.take() {
            element.detach();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            debug!("Stopped all tracks of stream {}", stream.id);
        }
    }

    /// Applies a forward transition and notifies listeners. Returns whether
    /// the state changed.
    fn transition(&mut self, next: SessionState) -> bool {
        if self.stopped || self.state.is_terminal() {
            trace!("Ignoring transition to {} from {}", next, self.state);
            return false;
        }
        if next.rank() < self.state.rank() {
            debug!("Ignoring backwards transition {} -> {}", self.state, next);
            return false;
        }
        if next == self.state {
            return false;
        }

        match &next {
            SessionState::Error { .. } => warn!("Session {} -> {}", self.state.name(), next),
            SessionState::Stabilizing { .. } => trace!("Session {} -> {}", self.state.name(), next),
            _ if self.options.debug => info!("Session {} -> {}", self.state.name(), next),
            _ => debug!("Session {} -> {}", self.state.name(), next),
        }

        self.state = next;
        self.notify();
        true
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if let Ok(mut callback) = listener.try_borrow_mut() {
                (&mut *callback)(&self.state);
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedCamera, SimulatedPlatform};
    use crate::capture::{DeviceManager, TrackCapabilities};
    use crate::options::StabilizationOptions;

    const FRAME: Duration = Duration::from_millis(16);

    fn manager(camera: SimulatedCamera) -> DeviceManager<SimulatedPlatform> {
        DeviceManager::new(SimulatedPlatform::new(camera))
    }

    fn options(min_stable_frames: u32, timeout_ms: u64) -> SessionOptions {
        SessionOptions {
            stabilization: StabilizationOptions {
                min_stable_frames,
                timeout_ms,
            },
            watermark: false,
            ..Default::default()
        }
    }

    /// Ticks `count` times, starting one frame after `start`.
    fn run_ticks(session: &mut StreamSession, start: Instant, count: u32) -> Instant {
        let mut now = start;
        for _ in 0..count {
            now += FRAME;
            session.tick(now);
        }
        now
    }

    #[test]
    fn test_stabilizer_resets_on_change() {
        let mut stabilizer = Stabilizer::default();
        let a = Dimension::new(640, 480);
        let b = Dimension::new(1280, 720);

        assert_eq!(stabilizer.observe(a), 1);
        assert_eq!(stabilizer.observe(a), 2);
        assert_eq!(stabilizer.observe(b), 1);
        assert_eq!(stabilizer.observe(b), 2);
        assert_eq!(stabilizer.observe(b), 3);
        assert_eq!(stabilizer.observe(a), 1);
        assert_eq!(stabilizer.best(), Some((b, 3)));
    }

    #[test]
    fn test_session_starts_after_first_candidate() {
        let mut manager = manager(SimulatedCamera::default());
        let session = manager.create_session(options(3, 1500)).unwrap();
        assert_eq!(session.state(), &SessionState::Starting { attempt: 1 });
    }

    #[test]
    fn test_reaches_ready_after_min_stable_frames() {
        let camera = SimulatedCamera {
            native: Dimension::new(1280, 720),
            warmup: vec![Dimension::new(640, 480), Dimension::new(640, 480)],
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(3, 1500)).unwrap();

        let start = Instant::now();
        session.tick(start);
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 0, .. }));

        let now = run_ticks(&mut session, start, 2);
        assert_eq!(
            session.state(),
            &SessionState::Stabilizing {
                observed: 2,
                last_dimension: Some(Dimension::new(640, 480)),
            }
        );

        run_ticks(&mut session, now, 3);
        assert_eq!(
            session.state(),
            &SessionState::Ready {
                dimension: Dimension::new(1280, 720),
                stable_frames: 3,
            }
        );
    }

    #[test]
    fn test_timeout_forces_ready_with_best_dimension() {
        let camera = SimulatedCamera {
            native: Dimension::new(1280, 720),
            warmup: vec![Dimension::new(640, 480), Dimension::new(1280, 720)],
            settles: false,
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(3, 100)).unwrap();

        let start = Instant::now();
        session.tick(start);
        session.tick(start + Duration::from_millis(10));
        session.tick(start + Duration::from_millis(20));
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 1, .. }));

        // the tick that trips the timeout still observes 640x480 first
        session.tick(start + Duration::from_millis(200));
        assert_eq!(
            session.state(),
            &SessionState::Ready {
                dimension: Dimension::new(640, 480),
                stable_frames: 1,
            }
        );
    }

    #[test]
    fn test_timeout_without_valid_frame_is_an_error() {
        let camera = SimulatedCamera {
            warmup: vec![Dimension::new(0, 0)],
            settles: false,
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(3, 100)).unwrap();

        let start = Instant::now();
        run_ticks(&mut session, start, 5);
        session.tick(start + Duration::from_millis(500));

        match session.state() {
            SessionState::Error { code, .. } => assert_eq!(*code, ErrorCode::StabilizationTimeout),
            other => panic!("unexpected state {other}"),
        }
    }

    #[test]
    fn test_metadata_wait_is_bounded() {
        let camera = SimulatedCamera {
            metadata_delay: u32::MAX,
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(3, 50)).unwrap();

        let start = Instant::now();
        session.tick(start);
        assert!(matches!(session.state(), SessionState::Starting { .. }));
        session.tick(start + Duration::from_millis(60));
        assert!(matches!(
            session.state(),
            SessionState::Error {
                code: ErrorCode::StabilizationTimeout,
                ..
            }
        ));
    }

    #[test]
    fn test_animation_frame_ticks_without_frame_callbacks() {
        let camera = SimulatedCamera {
            frame_callbacks: false,
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(2, 1500)).unwrap();

        run_ticks(&mut session, Instant::now(), 3);
        assert!(session.state().is_ready());
    }

    #[test]
    fn test_ticks_without_a_new_frame_are_not_observed() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(3, 100)).unwrap();

        let start = Instant::now();
        let now = run_ticks(&mut session, start, 2);
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 1, .. }));

        probe.stall_frames();
        let now = run_ticks(&mut session, now, 3);
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 1, .. }));

        probe.resume_frames();
        run_ticks(&mut session, now, 1);
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 2, .. }));
    }

    #[test]
    fn test_stalled_frames_still_time_out() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(3, 100)).unwrap();

        let start = Instant::now();
        let now = run_ticks(&mut session, start, 2);
        probe.stall_frames();
        run_ticks(&mut session, now, 3);
        assert!(matches!(session.state(), SessionState::Stabilizing { observed: 1, .. }));

        session.tick(start + Duration::from_millis(200));
        assert_eq!(
            session.state(),
            &SessionState::Ready {
                dimension: Dimension::new(1280, 720),
                stable_frames: 1,
            }
        );
    }

    #[test]
    fn test_capture_outside_ready_is_interrupted_without_frame_read() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(3, 1500)).unwrap();

        run_ticks(&mut session, Instant::now(), 2);
        assert!(matches!(session.state(), SessionState::Stabilizing { .. }));

        let err = session.capture().unwrap_err();
        assert_eq!(err.code, ErrorCode::CaptureInterrupted);
        assert_eq!(probe.frames_grabbed(), 0);
    }

    #[test]
    fn test_missed_frame_read_keeps_session_ready() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(1, 1500)).unwrap();
        run_ticks(&mut session, Instant::now(), 2);
        assert!(session.state().is_ready());

        probe.fail_grabs(1);
        assert_eq!(session.capture().unwrap_err().code, ErrorCode::CaptureInterrupted);
        assert!(session.state().is_ready());
        assert_eq!(probe.tracks_stopped(), 0);

        assert!(session.capture().is_ok());
        assert_eq!(probe.frames_grabbed(), 1);
    }

    #[test]
    fn test_listener_sees_current_state_then_transitions() {
        let mut manager = manager(SimulatedCamera::default());
        let mut session = manager.create_session(options(1, 1500)).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = session.on_state_change(move |state| sink.borrow_mut().push(state.name()));

        run_ticks(&mut session, Instant::now(), 2);
        subscription.unsubscribe();
        session.destroy();

        assert_eq!(*seen.borrow(), vec!["starting", "stabilizing", "ready"]);
    }

    #[test]
    fn test_destroy_is_idempotent_and_releases_camera() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(3, 1500)).unwrap();
        run_ticks(&mut session, Instant::now(), 2);

        let notified = Rc::new(RefCell::new(0));
        let counter = notified.clone();
        session.on_state_change(move |_| *counter.borrow_mut() += 1);

        session.destroy();
        session.destroy();

        assert!(session.is_destroyed());
        assert_eq!(probe.tracks_stopped(), 1);
        assert_eq!(probe.elements_detached(), 1);
        // initial call plus the destroyed notification
        assert_eq!(*notified.borrow(), 2);

        session.tick(Instant::now() + Duration::from_secs(5));
        assert!(session.is_destroyed());
        assert_eq!(session.capture().unwrap_err().code, ErrorCode::CaptureInterrupted);
    }

    #[test]
    fn test_track_end_is_terminal() {
        let mut manager = manager(SimulatedCamera::default());
        let probe = manager.platform().probe();
        let mut session = manager.create_session(options(1, 1500)).unwrap();
        let now = run_ticks(&mut session, Instant::now(), 2);
        assert!(session.state().is_ready());

        probe.end_track();
        session.tick(now + FRAME);
        assert!(matches!(
            session.state(),
            SessionState::Error {
                code: ErrorCode::StreamEnded,
                ..
            }
        ));

        session.tick(now + FRAME * 2);
        assert!(matches!(session.state(), SessionState::Error { .. }));
        assert_eq!(session.capture().unwrap_err().code, ErrorCode::CaptureInterrupted);
    }

    #[test]
    fn test_controls_go_inert_after_destroy() {
        let camera = SimulatedCamera {
            capabilities: Some(TrackCapabilities {
                torch: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut manager = manager(camera);
        let mut session = manager.create_session(options(1, 1500)).unwrap();
        let controls = session.track_controls().unwrap();
        assert!(controls.set_torch(true));

        session.destroy();
        assert!(!controls.set_torch(false));
        assert!(session.track_controls().is_none());
    }

    #[test]
    fn test_initial_flash_turns_torch_on_when_ready() {
        let camera = SimulatedCamera {
            capabilities: Some(TrackCapabilities {
                torch: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut manager = manager(camera);
        let probe = manager.platform().probe();
        let mut session = manager
            .create_session(SessionOptions {
                initial_flash_mode: FlashMode::On,
                ..options(1, 1500)
            })
            .unwrap();

        run_ticks(&mut session, Instant::now(), 2);
        assert!(session.state().is_ready());
        assert_eq!(probe.applied().last().and_then(|c| c.torch), Some(true));
    }
}

//! PreviewEngine: the single source of truth for playback.
//!
//! **Why**: two very different pipelines (delegated video, self-clocked
//! image sequence) must look like one player to the host. The engine owns
//! the session, enforces the legal-transition table, routes transport
//! commands to whichever pipeline is active, and is the only component
//! that emits externally observable events.
//!
//! **Used by**: the embedding host. All commands must be issued from one
//! thread; the same thread calls `pump()` from its update loop (60 Hz is
//! plenty) to drive playback and drain pipeline reports.
//!
//! # Command contract
//!
//! Every inbound command is synchronous: it either updates state before
//! returning or fails with a reported condition. None of them block on
//! I/O; media readiness arrives through `pump()` as events.
//!
//! # Teardown
//!
//! One idempotent routine serves every exit path (stop, unload, reload,
//! drop): stop the clock, cancel the loader, flush the buffer, join the
//! worker with a bounded wait, release the backend handle.

use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::PreviewConfig;
use crate::core::pipeline::{Pipeline, PipelineEvent, PipelineKind, SequencePipeline, VideoPipeline};
use crate::core::session::{MediaKind, PreviewSession};
use crate::core::state::{Command, PreviewState};
use crate::core::video::{NullBackendFactory, VideoAdapter, VideoBackendFactory};
use crate::error::PreviewError;
use crate::events::{PreviewEvent, PreviewEventSender};
use crate::frame::{ImageDecoder, ImageRsDecoder};
use crate::sequence;

/// One media load: the kind decides the pipeline, the paths name the
/// source, the rate drives index/time conversion for both kinds.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub kind: MediaKind,
    /// One path for video. For sequences: either one pattern/member path
    /// (expanded via discovery) or the explicit ordered frame list.
    pub paths: Vec<PathBuf>,
    /// Nominal frames per second. `None` or a non-positive value falls
    /// back to the configured default.
    pub frame_rate: Option<f64>,
}

/// The preview state machine and pipeline owner.
pub struct PreviewEngine {
    config: PreviewConfig,
    decoder: Arc<dyn ImageDecoder>,
    backend_factory: Box<dyn VideoBackendFactory>,
    events: PreviewEventSender,
    state: PreviewState,
    session: Option<PreviewSession>,
    pipeline: Option<PipelineKind>,
}

impl PreviewEngine {
    /// Engine for image-sequence-only hosts: default decoder, and a video
    /// backend that rejects every open with a clear reason.
    pub fn new(config: PreviewConfig, events: PreviewEventSender) -> Self {
        Self::with_backends(
            config,
            Arc::new(ImageRsDecoder),
            Box::new(NullBackendFactory),
            events,
        )
    }

    /// Engine with host-installed capabilities.
    pub fn with_backends(
        config: PreviewConfig,
        decoder: Arc<dyn ImageDecoder>,
        backend_factory: Box<dyn VideoBackendFactory>,
        events: PreviewEventSender,
    ) -> Self {
        Self {
            config,
            decoder,
            backend_factory,
            events,
            state: PreviewState::Idle,
            session: None,
            pipeline: None,
        }
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        self.session.as_ref()
    }

    /// Current position of the loaded session, if any.
    pub fn position(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.current_position())
    }

    // --- command entry points -------------------------------------------

    /// Load a media item. Legal only from `Idle`. Moves to `Loading`;
    /// `Ready` follows via `pump()` on first-frame availability.
    pub fn load_media(&mut self, request: LoadRequest) -> Result<(), PreviewError> {
        self.check(Command::Load)?;

        if request.paths.is_empty() {
            return Err(PreviewError::LoadFailure("no source paths given".into()));
        }

        let frame_rate = match request.frame_rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            other => {
                if other.is_some() {
                    warn!(
                        "Unusable frame rate {:?}, falling back to {}",
                        other, self.config.fallback_frame_rate
                    );
                }
                self.config.fallback_frame_rate
            }
        };

        match request.kind {
            MediaKind::ImageSequence => self.load_sequence(request.paths, frame_rate),
            MediaKind::Video => self.load_video(request.paths, frame_rate),
        }
    }

    fn load_sequence(&mut self, paths: Vec<PathBuf>, frame_rate: f64) -> Result<(), PreviewError> {
        // A single path is a pattern or member frame; a list is already
        // the ordered frame sequence.
        let frames = if paths.len() == 1 {
            match sequence::expand_source(&paths[0]) {
                Ok(frames) => frames,
                Err(e) => {
                    self.set_state(PreviewState::Loading);
                    self.enter_error(e.to_string());
                    return Err(e);
                }
            }
        } else {
            paths
        };
        let frames = Arc::new(frames);
        let total = frames.len() as i64;

        let mut session = PreviewSession::new(
            MediaKind::ImageSequence,
            Arc::clone(&frames),
            frame_rate,
            total,
        );
        session.set_looping(self.config.loop_by_default);
        let session_id = session.id();
        info!(
            "Session {}: sequence of {} frames at {} fps",
            session_id, total, frame_rate
        );

        let pipeline = SequencePipeline::new(
            frames,
            Arc::clone(&self.decoder),
            frame_rate,
            session.looping(),
            &self.config,
        );

        self.session = Some(session);
        self.pipeline = Some(PipelineKind::Sequence(pipeline));
        self.set_state(PreviewState::Loading);
        self.events.emit(PreviewEvent::DurationKnown {
            session: session_id,
            total_frames: total,
        });
        Ok(())
    }

    fn load_video(&mut self, paths: Vec<PathBuf>, frame_rate: f64) -> Result<(), PreviewError> {
        if paths.len() != 1 {
            return Err(PreviewError::LoadFailure(format!(
                "video load takes exactly one path, got {}",
                paths.len()
            )));
        }
        let path = paths.into_iter().next().expect("one path");

        let mut session = PreviewSession::new(
            MediaKind::Video,
            Arc::new(vec![path.clone()]),
            frame_rate,
            0, // learned from the backend's duration report
        );
        session.set_looping(self.config.loop_by_default);
        let looping = session.looping();
        let session_id = session.id();
        info!("Session {}: video {}", session_id, path.display());

        let mut adapter = VideoAdapter::new(self.backend_factory.create(), frame_rate);
        adapter.set_looping(looping);
        let mut pipeline = VideoPipeline::new(adapter);

        self.session = Some(session);
        self.set_state(PreviewState::Loading);

        match pipeline.open(&path) {
            Ok(()) => {
                self.pipeline = Some(PipelineKind::Video(pipeline));
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.enter_error(reason.clone());
                Err(PreviewError::LoadFailure(reason))
            }
        }
    }

    /// Start or resume playback.
    pub fn play(&mut self) -> Result<(), PreviewError> {
        self.check(Command::Play)?;
        let session = self.session.as_ref().ok_or(PreviewError::NoSession)?;

        // A non-looping session parked at its end restarts from the in
        // point, matching how a finished clip replays.
        let restart_from = (!session.looping()
            && session.playback_rate() > 0.0
            && session.current_position() >= session.out_point())
        .then(|| session.in_point());

        if let Some(target) = restart_from {
            self.apply_seek(target);
        }

        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.play();
        }
        self.set_state(PreviewState::Playing);
        Ok(())
    }

    /// Pause playback, keeping the session and position.
    pub fn pause(&mut self) -> Result<(), PreviewError> {
        self.check(Command::Pause)?;
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.pause();
        }
        self.set_state(PreviewState::Paused);
        Ok(())
    }

    /// Stop and fully release the active pipeline, then converge to Idle.
    pub fn stop(&mut self) -> Result<(), PreviewError> {
        self.check(Command::Stop)?;
        self.teardown_pipeline();
        self.set_state(PreviewState::Stopped);
        self.set_state(PreviewState::Idle);
        self.session = None;
        Ok(())
    }

    /// Destroy the session. Same release path as `stop`.
    pub fn unload(&mut self) -> Result<(), PreviewError> {
        self.check(Command::Unload)?;
        self.teardown_pipeline();
        self.set_state(PreviewState::Stopped);
        self.set_state(PreviewState::Idle);
        self.session = None;
        Ok(())
    }

    /// Seek to a frame, clamped to the trim range. Position updates
    /// synchronously; the pipelines settle asynchronously.
    pub fn seek(&mut self, frame: i64) -> Result<i64, PreviewError> {
        self.check(Command::Seek)?;
        let session = self.session.as_ref().ok_or(PreviewError::NoSession)?;
        let target = session.clamp_to_trim(frame);
        self.apply_seek(target);
        Ok(target)
    }

    /// Step by a frame delta from the current position. Wraps inside the
    /// trim range while looping, clamps otherwise.
    pub fn step_frames(&mut self, delta: i64) -> Result<i64, PreviewError> {
        self.check(Command::Seek)?;
        let session = self.session.as_ref().ok_or(PreviewError::NoSession)?;

        let in_point = session.in_point();
        let out_point = session.out_point();
        let range = out_point - in_point + 1;
        let target = session.current_position() + delta;

        let target = if range <= 0 {
            in_point
        } else if session.looping() {
            in_point + (target - in_point).rem_euclid(range)
        } else {
            target.clamp(in_point, out_point)
        };

        self.apply_seek(target);
        Ok(target)
    }

    /// Jump to the trim in point.
    pub fn to_in_point(&mut self) -> Result<i64, PreviewError> {
        self.check(Command::Seek)?;
        let target = self.session.as_ref().ok_or(PreviewError::NoSession)?.in_point();
        self.apply_seek(target);
        Ok(target)
    }

    /// Jump to the trim out point.
    pub fn to_out_point(&mut self) -> Result<i64, PreviewError> {
        self.check(Command::Seek)?;
        let target = self
            .session
            .as_ref()
            .ok_or(PreviewError::NoSession)?
            .out_point();
        self.apply_seek(target);
        Ok(target)
    }

    /// Change the signed speed multiplier.
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<(), PreviewError> {
        self.check(Command::SetRate)?;
        let session = self.session.as_mut().ok_or(PreviewError::NoSession)?;
        session.set_playback_rate(rate)?;
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_rate(rate);
        }
        Ok(())
    }

    /// Change the trim range. The position is clamped into the new range.
    pub fn set_in_out(&mut self, in_point: i64, out_point: i64) -> Result<(), PreviewError> {
        self.check(Command::SetInOut)?;
        let session = self.session.as_mut().ok_or(PreviewError::NoSession)?;
        let position = session.set_in_out(in_point, out_point)?;
        let session_id = session.id();

        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_trim(in_point, out_point);
        }
        self.events.emit(PreviewEvent::PositionChanged {
            session: session_id,
            frame: position,
        });
        Ok(())
    }

    /// Toggle trim-range looping.
    pub fn set_looping(&mut self, looping: bool) -> Result<(), PreviewError> {
        self.check(Command::SetLooping)?;
        let session = self.session.as_mut().ok_or(PreviewError::NoSession)?;
        session.set_looping(looping);
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_looping(looping);
        }
        Ok(())
    }

    // --- drive ----------------------------------------------------------

    /// Drive the active pipeline and apply its reports. Call from the
    /// owning thread's update loop. Returns whether anything happened,
    /// so hosts can schedule repaints.
    pub fn pump(&mut self) -> bool {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return false;
        };

        let mut reports = Vec::new();
        pipeline.pump(Instant::now(), &mut reports);
        let had_reports = !reports.is_empty();

        for report in reports {
            self.apply_report(report);
        }
        had_reports
    }

    fn apply_report(&mut self, report: PipelineEvent) {
        let session_id = self.session_id();
        match report {
            PipelineEvent::Loaded { total_frames } => {
                if let Some(session) = self.session.as_mut() {
                    session.set_total_frames(total_frames);
                    let (in_point, out_point) = (session.in_point(), session.out_point());
                    if let Some(pipeline) = self.pipeline.as_mut() {
                        pipeline.set_trim(in_point, out_point);
                    }
                }
                self.events.emit(PreviewEvent::DurationKnown {
                    session: session_id,
                    total_frames,
                });
            }
            PipelineEvent::FirstFrame => {
                if self.state == PreviewState::Loading {
                    self.set_state(PreviewState::Ready);
                }
            }
            PipelineEvent::Frame { index, image } => {
                self.events.emit(PreviewEvent::FrameReady {
                    session: session_id,
                    frame: index,
                    image,
                });
            }
            PipelineEvent::Position { index } => {
                let frame = match self.session.as_mut() {
                    Some(session) => {
                        session.set_position(index);
                        session.current_position()
                    }
                    None => index,
                };
                self.events.emit(PreviewEvent::PositionChanged {
                    session: session_id,
                    frame,
                });
            }
            PipelineEvent::DecodeFailed { index, reason } => {
                self.events.emit(PreviewEvent::FrameDecodeFailed {
                    session: session_id,
                    frame: index,
                    reason,
                });
            }
            PipelineEvent::Stalled => {
                self.events.emit(PreviewEvent::BufferStalled {
                    session: session_id,
                });
            }
            PipelineEvent::ReachedOutPoint => {
                self.events.emit(PreviewEvent::ReachedOutPoint {
                    session: session_id,
                });
            }
            PipelineEvent::Ended => {
                if self.state == PreviewState::Playing {
                    self.set_state(PreviewState::Paused);
                }
            }
            PipelineEvent::Error { reason } => {
                // Before the first frame this is a failure to open; after,
                // a terminal playback error. Both land in the error state,
                // the distinction lives in the log and the reason string.
                if self.state == PreviewState::Loading {
                    warn!("Backend failed before first frame: {}", reason);
                } else {
                    warn!("Terminal playback error: {}", reason);
                }
                self.enter_error(reason);
            }
        }
    }

    // --- internals ------------------------------------------------------

    fn check(&self, command: Command) -> Result<(), PreviewError> {
        if self.state.allows(command) {
            Ok(())
        } else {
            debug!("Rejected '{}' in state {}", command.name(), self.state);
            Err(PreviewError::InvalidTransition {
                state: self.state,
                command: command.name(),
            })
        }
    }

    fn session_id(&self) -> Uuid {
        self.session.as_ref().map(|s| s.id()).unwrap_or_else(Uuid::nil)
    }

    fn set_state(&mut self, state: PreviewState) {
        if self.state != state {
            debug!("State {} -> {}", self.state, state);
            self.state = state;
            self.events.emit(PreviewEvent::StateChanged {
                session: self.session_id(),
                state,
            });
        }
    }

    fn apply_seek(&mut self, target: i64) {
        let session_id = self.session_id();
        if let Some(session) = self.session.as_mut() {
            session.set_position(target);
        }
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.seek(target);
        }
        self.events.emit(PreviewEvent::PositionChanged {
            session: session_id,
            frame: target,
        });
    }

    /// The one teardown routine. Safe to call repeatedly and from every
    /// exit path; shutdown order is fixed inside the pipeline variants.
    fn teardown_pipeline(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.shutdown();
            debug!("Pipeline released");
        }
    }

    fn enter_error(&mut self, reason: String) {
        self.teardown_pipeline();
        self.set_state(PreviewState::Error);
        self.events.emit(PreviewEvent::PlaybackError {
            session: self.session_id(),
            reason,
        });
    }
}

impl Drop for PreviewEngine {
    fn drop(&mut self) {
        self.teardown_pipeline();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::{BackendEvent, BackendPlaybackState, VideoBackend};
    use crate::frame::{DecodeError, PreviewImage};
    use crossbeam_channel::Receiver;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    // -- fakes ----------------------------------------------------------

    struct FakeDecoder {
        fail_indices: HashSet<i64>,
        decoded: Mutex<Vec<i64>>,
    }

    impl FakeDecoder {
        fn new(fail: impl IntoIterator<Item = i64>) -> Arc<Self> {
            Arc::new(Self {
                fail_indices: fail.into_iter().collect(),
                decoded: Mutex::new(Vec::new()),
            })
        }
    }

    impl ImageDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<PreviewImage, DecodeError> {
            let index = crate::sequence::frame_number(path).unwrap() as i64;
            self.decoded.lock().unwrap().push(index);
            if self.fail_indices.contains(&index) {
                Err(DecodeError::Decode("bad frame".into()))
            } else {
                Ok(PreviewImage::solid(1, 1, [0; 4]))
            }
        }
    }

    struct ScriptedBackend {
        script: Vec<BackendEvent>,
        open_fails: bool,
    }

    impl VideoBackend for ScriptedBackend {
        fn open(&mut self, path: &Path) -> Result<(), crate::core::video::BackendError> {
            if self.open_fails {
                Err(crate::core::video::BackendError(format!(
                    "cannot open {}",
                    path.display()
                )))
            } else {
                Ok(())
            }
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn seek(&mut self, _seconds: f64) {}
        fn set_rate(&mut self, _rate: f64) {}
        fn poll_event(&mut self) -> Option<BackendEvent> {
            if self.script.is_empty() {
                None
            } else {
                Some(self.script.remove(0))
            }
        }
        fn release(&mut self) {}
    }

    struct ScriptedFactory {
        script: Vec<BackendEvent>,
        open_fails: bool,
    }

    impl VideoBackendFactory for ScriptedFactory {
        fn create(&mut self) -> Box<dyn VideoBackend> {
            Box::new(ScriptedBackend {
                script: self.script.clone(),
                open_fails: self.open_fails,
            })
        }
    }

    // -- helpers --------------------------------------------------------

    fn fake_paths(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| PathBuf::from(format!("seq.{:04}.png", i)))
            .collect()
    }

    fn fast_config() -> PreviewConfig {
        PreviewConfig {
            buffer_capacity: 8,
            min_tick_period_ms: 0,
            pop_timeout_ms: 5,
            stall_threshold: 3,
            ..PreviewConfig::default()
        }
    }

    fn sequence_engine(
        count: usize,
        decoder: Arc<FakeDecoder>,
    ) -> (PreviewEngine, Receiver<PreviewEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = PreviewEngine::with_backends(
            fast_config(),
            decoder,
            Box::new(NullBackendFactory),
            PreviewEventSender::new(tx),
        );
        engine
            .load_media(LoadRequest {
                kind: MediaKind::ImageSequence,
                paths: fake_paths(count),
                frame_rate: Some(240.0),
            })
            .unwrap();
        (engine, rx)
    }

    fn pump_until(engine: &mut PreviewEngine, mut done: impl FnMut(&PreviewEngine) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(engine) {
            assert!(Instant::now() < deadline, "timed out pumping engine");
            engine.pump();
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    fn drain(rx: &Receiver<PreviewEvent>) -> Vec<PreviewEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    // -- tests ----------------------------------------------------------

    /// Test: commands outside the table are rejected without state change
    /// Validates: InvalidTransition reporting
    #[test]
    fn test_illegal_commands_rejected() {
        let (mut engine, _rx) = {
            let (tx, rx) = crossbeam_channel::unbounded();
            (
                PreviewEngine::new(fast_config(), PreviewEventSender::new(tx)),
                rx,
            )
        };

        assert_eq!(engine.state(), PreviewState::Idle);
        for result in [
            engine.play(),
            engine.pause(),
            engine.stop(),
            engine.unload(),
            engine.seek(5).map(|_| ()),
            engine.set_playback_rate(2.0),
            engine.set_in_out(0, 1),
        ] {
            match result {
                Err(PreviewError::InvalidTransition { state, .. }) => {
                    assert_eq!(state, PreviewState::Idle)
                }
                other => panic!("expected InvalidTransition, got {:?}", other),
            }
        }
        assert_eq!(engine.state(), PreviewState::Idle);
    }

    /// Test: sequence load reaches Ready on first-frame availability
    /// Validates: Loading -> Ready via pump, duration known at load
    #[test]
    fn test_sequence_load_to_ready() {
        let (mut engine, rx) = sequence_engine(10, FakeDecoder::new([]));
        assert_eq!(engine.state(), PreviewState::Loading);

        // play() is illegal before Ready.
        assert!(matches!(
            engine.play(),
            Err(PreviewError::InvalidTransition { .. })
        ));

        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PreviewEvent::DurationKnown { total_frames: 10, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PreviewEvent::FrameReady { frame: 0, .. })));
    }

    /// Test: trimmed looping playback emits 10,11,...,20,10,...
    /// Validates: the trim playback scenario end to end
    #[test]
    fn test_trimmed_playback_scenario() {
        let decoder = FakeDecoder::new([]);
        let (mut engine, rx) = sequence_engine(100, Arc::clone(&decoder));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        let _ = drain(&rx); // discard load-time poster events

        engine.set_in_out(10, 20).unwrap();
        engine.play().unwrap();

        let mut positions = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while positions.len() < 15 {
            assert!(Instant::now() < deadline);
            engine.pump();
            for e in drain(&rx) {
                if let PreviewEvent::PositionChanged { frame, .. } = e {
                    positions.push(frame);
                }
            }
            std::thread::sleep(Duration::from_micros(200));
        }

        // First report is the synchronous clamp from set_in_out.
        assert_eq!(positions[0], 10);
        let played = &positions[1..];
        let mut expected = Vec::new();
        let mut i = 10;
        for _ in 0..played.len() {
            expected.push(i);
            i = if i == 20 { 10 } else { i + 1 };
        }
        assert_eq!(played, expected.as_slice());
        assert!(decoder
            .decoded
            .lock()
            .unwrap()
            .iter()
            .all(|&i| (10..=20).contains(&i)));
    }

    /// Test: set_in_out(30, 40) while parked at 5 clamps position to 30
    /// Validates: trim-change position clamping, synchronous for callers
    #[test]
    fn test_set_in_out_clamps_position() {
        let (mut engine, rx) = sequence_engine(100, FakeDecoder::new([]));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        engine.seek(5).unwrap();

        engine.set_in_out(30, 40).unwrap();
        assert_eq!(engine.position(), Some(30));

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PreviewEvent::PositionChanged { frame: 30, .. })));

        // Subsequent playback stays within [30, 40].
        engine.play().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = 0;
        while seen < 14 {
            assert!(Instant::now() < deadline);
            engine.pump();
            for e in drain(&rx) {
                if let PreviewEvent::PositionChanged { frame, .. } = e {
                    assert!((30..=40).contains(&frame), "position {} escaped trim", frame);
                    seen += 1;
                }
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    /// Test: a failing frame emits FrameDecodeFailed and playback continues
    /// Validates: sentinel slot keeps the position sequence gapless
    #[test]
    fn test_decode_failure_event() {
        let (mut engine, rx) = sequence_engine(8, FakeDecoder::new([3]));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        engine.set_looping(false).unwrap();
        engine.play().unwrap();

        let mut positions = Vec::new();
        let mut failures = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !positions.contains(&7) {
            assert!(Instant::now() < deadline);
            engine.pump();
            for e in drain(&rx) {
                match e {
                    PreviewEvent::PositionChanged { frame, .. } => positions.push(frame),
                    PreviewEvent::FrameDecodeFailed { frame, .. } => failures.push(frame),
                    _ => {}
                }
            }
            std::thread::sleep(Duration::from_micros(200));
        }

        assert_eq!(failures, vec![3]);
        assert!(positions.contains(&3), "position advanced through the bad frame");
        assert_eq!(engine.state(), PreviewState::Paused); // non-looping end
    }

    /// Test: stop releases everything and an immediate reload works
    /// Validates: teardown-then-reuse without leakage
    #[test]
    fn test_stop_then_reload() {
        let (mut engine, rx) = sequence_engine(50, FakeDecoder::new([]));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        engine.play().unwrap();
        pump_until(&mut engine, |e| e.position().unwrap_or(0) > 2);

        engine.stop().unwrap();
        assert_eq!(engine.state(), PreviewState::Idle);
        assert!(engine.session().is_none());

        let states: Vec<PreviewState> = drain(&rx)
            .into_iter()
            .filter_map(|e| match e {
                PreviewEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert!(states.contains(&PreviewState::Stopped));
        assert_eq!(states.last(), Some(&PreviewState::Idle));

        // Immediate reload succeeds.
        engine
            .load_media(LoadRequest {
                kind: MediaKind::ImageSequence,
                paths: fake_paths(10),
                frame_rate: Some(240.0),
            })
            .unwrap();
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
    }

    /// Test: an unresolvable sequence pattern lands in Error, stop recovers
    /// Validates: failure to open is fatal for the session, not silent
    #[test]
    fn test_sequence_load_failure_enters_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = PreviewEngine::with_backends(
            fast_config(),
            FakeDecoder::new([]),
            Box::new(NullBackendFactory),
            PreviewEventSender::new(tx),
        );

        let err = engine
            .load_media(LoadRequest {
                kind: MediaKind::ImageSequence,
                paths: vec![PathBuf::from("/nonexistent/shot.%04d.png")],
                frame_rate: Some(24.0),
            })
            .unwrap_err();
        assert!(matches!(err, PreviewError::LoadFailure(_)));
        assert_eq!(engine.state(), PreviewState::Error);
        assert!(drain(&rx)
            .iter()
            .any(|e| matches!(e, PreviewEvent::PlaybackError { .. })));

        engine.stop().unwrap();
        assert_eq!(engine.state(), PreviewState::Idle);
    }

    /// Test: video session goes Ready and normalizes positions to frames
    /// Validates: the delegated path through the same state machine
    #[test]
    fn test_video_load_and_position() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = PreviewEngine::with_backends(
            fast_config(),
            FakeDecoder::new([]),
            Box::new(ScriptedFactory {
                script: vec![
                    BackendEvent::Duration(2.0),
                    BackendEvent::State(BackendPlaybackState::Ready),
                    BackendEvent::Position(0.5),
                ],
                open_fails: false,
            }),
            PreviewEventSender::new(tx),
        );

        engine
            .load_media(LoadRequest {
                kind: MediaKind::Video,
                paths: vec![PathBuf::from("clip.mp4")],
                frame_rate: Some(30.0),
            })
            .unwrap();
        assert_eq!(engine.state(), PreviewState::Loading);

        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        assert_eq!(engine.session().unwrap().total_frames(), 60);
        assert_eq!(engine.position(), Some(15));

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PreviewEvent::DurationKnown { total_frames: 60, .. })));
    }

    /// Test: failing to open a video lands in Error; stop recovers to Idle
    /// Validates: LoadFailure path and the Error -> Idle convergence
    #[test]
    fn test_video_open_failure() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = PreviewEngine::with_backends(
            fast_config(),
            FakeDecoder::new([]),
            Box::new(ScriptedFactory {
                script: vec![],
                open_fails: true,
            }),
            PreviewEventSender::new(tx),
        );

        let err = engine
            .load_media(LoadRequest {
                kind: MediaKind::Video,
                paths: vec![PathBuf::from("broken.mp4")],
                frame_rate: Some(30.0),
            })
            .unwrap_err();
        assert!(matches!(err, PreviewError::LoadFailure(_)));
        assert_eq!(engine.state(), PreviewState::Error);

        // Only stop/unload are legal now.
        assert!(engine.play().is_err());
        assert!(engine.seek(0).is_err());

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PreviewEvent::PlaybackError { .. })));

        engine.stop().unwrap();
        assert_eq!(engine.state(), PreviewState::Idle);
    }

    /// Test: a backend runtime error mid-session tears down to Error
    /// Validates: terminal playback error handling after Ready
    #[test]
    fn test_video_runtime_error() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut engine = PreviewEngine::with_backends(
            fast_config(),
            FakeDecoder::new([]),
            Box::new(ScriptedFactory {
                script: vec![
                    BackendEvent::Duration(1.0),
                    BackendEvent::State(BackendPlaybackState::Ready),
                    BackendEvent::Error("decoder died".into()),
                ],
                open_fails: false,
            }),
            PreviewEventSender::new(tx),
        );

        engine
            .load_media(LoadRequest {
                kind: MediaKind::Video,
                paths: vec![PathBuf::from("clip.mp4")],
                frame_rate: Some(24.0),
            })
            .unwrap();
        pump_until(&mut engine, |e| e.state() == PreviewState::Error);
        engine.unload().unwrap();
        assert_eq!(engine.state(), PreviewState::Idle);
    }

    /// Test: step wraps inside the trim range while looping
    /// Validates: step/jump conveniences built on seek
    #[test]
    fn test_step_and_jump() {
        let (mut engine, _rx) = sequence_engine(100, FakeDecoder::new([]));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);
        engine.set_in_out(10, 19).unwrap();

        assert_eq!(engine.step_frames(3).unwrap(), 13);
        assert_eq!(engine.step_frames(-5).unwrap(), 18); // wrapped
        assert_eq!(engine.to_out_point().unwrap(), 19);
        assert_eq!(engine.step_frames(1).unwrap(), 10); // wrapped forward
        assert_eq!(engine.to_in_point().unwrap(), 10);

        engine.set_looping(false).unwrap();
        assert_eq!(engine.step_frames(100).unwrap(), 19); // clamped
    }

    /// Test: rate validation rejects zero without touching the pipeline
    /// Validates: pause is a state, not rate zero
    #[test]
    fn test_rate_validation() {
        let (mut engine, _rx) = sequence_engine(10, FakeDecoder::new([]));
        pump_until(&mut engine, |e| e.state() == PreviewState::Ready);

        assert!(matches!(
            engine.set_playback_rate(0.0),
            Err(PreviewError::InvalidRate(_))
        ));
        assert!(engine.set_playback_rate(-2.0).is_ok());
        assert_eq!(engine.session().unwrap().playback_rate(), -2.0);
    }
}

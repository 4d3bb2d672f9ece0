//! Delegated video player adapter.
//!
//! **Why**: video decode/render is owned by an external backend (platform
//! media player, GStreamer, libmpv, ...). The engine does not reimplement
//! it; it wraps whatever the host installs behind `VideoBackend` and
//! normalizes its asynchronous reports into the same frame-indexed
//! vocabulary the sequence path produces.
//!
//! **Used by**: Video pipeline. Single-threaded by contract: every command
//! and every event drain happens on the owning thread, so the adapter
//! holds no locks.
//!
//! # Trim looping
//!
//! Backends have no native trim-range loop. The adapter watches reported
//! positions and reissues seek-to-in + play when playback reaches the out
//! point.

use log::{debug, trace, warn};
use std::path::Path;

use crate::core::pipeline::PipelineEvent;
use crate::core::timeline::{duration_to_frames, frame_to_time, time_to_frame};

/// Failure reported by the backend itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

/// Coarse backend playback state, as backends report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPlaybackState {
    Opening,
    Ready,
    Playing,
    Paused,
    Ended,
}

/// Asynchronous reports drained from the backend on the owning thread.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Playback position, seconds from stream start.
    Position(f64),
    /// Total stream duration, seconds. May arrive once or be refined.
    Duration(f64),
    /// Backend state change.
    State(BackendPlaybackState),
    /// Runtime decode/render failure.
    Error(String),
}

/// The delegated media-backend capability the host installs.
///
/// Commands are fire-and-forget and must not block the caller; results
/// come back through `poll_event`.
pub trait VideoBackend: Send {
    fn open(&mut self, path: &Path) -> Result<(), BackendError>;
    fn play(&mut self);
    fn pause(&mut self);
    /// Seek to an absolute stream time in seconds.
    fn seek(&mut self, seconds: f64);
    /// Signed speed multiplier. Backends that cannot honor a value report
    /// a `BackendEvent::Error`.
    fn set_rate(&mut self, rate: f64);
    /// Drain one pending report, if any.
    fn poll_event(&mut self) -> Option<BackendEvent>;
    /// Release the underlying media handle. Idempotent.
    fn release(&mut self);
}

/// Creates one backend instance per loaded video session.
pub trait VideoBackendFactory: Send {
    fn create(&mut self) -> Box<dyn VideoBackend>;
}

/// Default factory for hosts that never load videos: every open fails
/// with a clear reason instead of a panic.
#[derive(Debug, Default)]
pub struct NullBackendFactory;

impl VideoBackendFactory for NullBackendFactory {
    fn create(&mut self) -> Box<dyn VideoBackend> {
        Box::new(NullVideoBackend)
    }
}

struct NullVideoBackend;

impl VideoBackend for NullVideoBackend {
    fn open(&mut self, path: &Path) -> Result<(), BackendError> {
        Err(BackendError(format!(
            "no video backend installed (cannot open {})",
            path.display()
        )))
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek(&mut self, _seconds: f64) {}
    fn set_rate(&mut self, _rate: f64) {}
    fn poll_event(&mut self) -> Option<BackendEvent> {
        None
    }
    fn release(&mut self) {}
}

/// Wraps one backend instance for one session, converting between the
/// backend's time domain and the session's frame domain.
pub struct VideoAdapter {
    backend: Box<dyn VideoBackend>,
    frame_rate: f64,
    in_point: i64,
    out_point: i64,
    looping: bool,
    total_frames: Option<i64>,
    duration_reported: bool,
    ready_reported: bool,
    released: bool,
}

impl VideoAdapter {
    pub fn new(backend: Box<dyn VideoBackend>, frame_rate: f64) -> Self {
        Self {
            backend,
            frame_rate,
            in_point: 0,
            out_point: i64::MAX,
            looping: true,
            total_frames: None,
            duration_reported: false,
            ready_reported: false,
            released: false,
        }
    }

    pub fn open(&mut self, path: &Path) -> Result<(), BackendError> {
        debug!("Opening video: {}", path.display());
        self.backend.open(path)
    }

    pub fn play(&mut self) {
        self.backend.play();
    }

    pub fn pause(&mut self) {
        self.backend.pause();
    }

    /// Seek to a frame, clamped to the trim range before forwarding.
    pub fn seek_frame(&mut self, frame: i64) {
        let clamped = self.clamp_to_trim(frame);
        if clamped != frame {
            trace!("Seek {} clamped to {}", frame, clamped);
        }
        self.backend.seek(frame_to_time(clamped, self.frame_rate));
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.backend.set_rate(rate);
    }

    pub fn set_trim(&mut self, in_point: i64, out_point: i64) {
        self.in_point = in_point;
        self.out_point = out_point;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn clamp_to_trim(&self, frame: i64) -> i64 {
        frame.clamp(self.in_point, self.out_point.max(self.in_point))
    }

    /// Drain backend reports and translate them into pipeline events.
    pub fn pump(&mut self, out: &mut Vec<PipelineEvent>) {
        while let Some(event) = self.backend.poll_event() {
            match event {
                BackendEvent::Duration(seconds) => {
                    let total = duration_to_frames(seconds, self.frame_rate).max(1);
                    self.total_frames = Some(total);
                    if self.out_point == i64::MAX {
                        self.out_point = total - 1;
                    }
                    if !self.duration_reported {
                        self.duration_reported = true;
                        out.push(PipelineEvent::Loaded {
                            total_frames: total,
                        });
                    }
                }
                BackendEvent::Position(seconds) => {
                    let mut frame = time_to_frame(seconds, self.frame_rate);
                    if let Some(total) = self.total_frames {
                        frame = frame.clamp(0, total - 1);
                    }
                    if frame >= self.out_point && self.out_point != i64::MAX {
                        self.handle_out_point(out);
                    } else {
                        out.push(PipelineEvent::Position { index: frame });
                    }
                }
                BackendEvent::State(state) => {
                    trace!("Backend state: {:?}", state);
                    match state {
                        BackendPlaybackState::Ready => {
                            if !self.ready_reported {
                                self.ready_reported = true;
                                out.push(PipelineEvent::FirstFrame);
                            }
                        }
                        BackendPlaybackState::Ended => self.handle_out_point(out),
                        _ => {}
                    }
                }
                BackendEvent::Error(reason) => {
                    warn!("Backend error: {}", reason);
                    out.push(PipelineEvent::Error { reason });
                }
            }
        }
    }

    /// Loop or end at the out point; the backend has no trim primitive.
    fn handle_out_point(&mut self, out: &mut Vec<PipelineEvent>) {
        out.push(PipelineEvent::ReachedOutPoint);
        if self.looping {
            let target = self.in_point;
            trace!("Loop: reissuing seek to {} + play", target);
            self.backend.seek(frame_to_time(target, self.frame_rate));
            self.backend.play();
            out.push(PipelineEvent::Position { index: target });
        } else {
            self.backend.pause();
            let hold = if self.out_point != i64::MAX {
                self.out_point
            } else {
                self.total_frames.map(|t| t - 1).unwrap_or(0)
            };
            out.push(PipelineEvent::Position { index: hold });
            out.push(PipelineEvent::Ended);
        }
    }

    /// Release the backend handle. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.backend.release();
        }
    }
}

impl Drop for VideoAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

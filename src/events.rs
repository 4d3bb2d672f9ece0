//! Outbound preview events.
//!
//! The engine is the only component that emits these; pipelines report
//! internally and the engine translates. Hosts receive them over a
//! crossbeam channel and drain it from their own loop.

use crossbeam_channel::Sender;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::state::PreviewState;
use crate::frame::PreviewImage;

/// Everything an embedding host can observe about playback.
#[derive(Debug, Clone)]
pub enum PreviewEvent {
    /// State machine moved to a new state.
    StateChanged {
        session: Uuid,
        state: PreviewState,
    },

    /// Total frame count became known (immediately for sequences, on the
    /// backend's duration report for video).
    DurationKnown {
        session: Uuid,
        total_frames: i64,
    },

    /// Playback position moved.
    PositionChanged {
        session: Uuid,
        frame: i64,
    },

    /// A decoded frame is ready for display. Not emitted for sentinel
    /// entries; the host keeps showing the most recent good frame.
    FrameReady {
        session: Uuid,
        frame: i64,
        image: Arc<PreviewImage>,
    },

    /// A single frame failed to decode. Playback continues; position still
    /// advances through the failed index.
    FrameDecodeFailed {
        session: Uuid,
        frame: i64,
        reason: String,
    },

    /// Consumer found the buffer empty past the stall threshold.
    /// Observability only, never a state transition.
    BufferStalled {
        session: Uuid,
    },

    /// Playback hit the out point (loop wrap, or end when not looping).
    ReachedOutPoint {
        session: Uuid,
    },

    /// Terminal playback error; the session has moved to the error state.
    PlaybackError {
        session: Uuid,
        reason: String,
    },
}

/// Event sender handed to the engine.
///
/// `dummy()` produces a disconnected sender for tests that only care about
/// return values.
#[derive(Clone, Debug)]
pub struct PreviewEventSender {
    sender: Option<Sender<PreviewEvent>>,
}

impl PreviewEventSender {
    pub fn new(sender: Sender<PreviewEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sender that drops everything (tests, fire-and-forget hosts).
    pub fn dummy() -> Self {
        Self { sender: None }
    }

    /// Emit an event. Send errors are ignored: a dropped receiver just
    /// means nobody is watching anymore.
    pub fn emit(&self, event: PreviewEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(event);
        }
    }
}

impl Default for PreviewEventSender {
    fn default() -> Self {
        Self::dummy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_sender_is_silent() {
        let sender = PreviewEventSender::dummy();
        sender.emit(PreviewEvent::BufferStalled {
            session: Uuid::new_v4(),
        });
    }

    #[test]
    fn test_channel_delivery() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sender = PreviewEventSender::new(tx);
        let id = Uuid::new_v4();
        sender.emit(PreviewEvent::PositionChanged {
            session: id,
            frame: 42,
        });

        match rx.try_recv().expect("event should arrive") {
            PreviewEvent::PositionChanged { session, frame } => {
                assert_eq!(session, id);
                assert_eq!(frame, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

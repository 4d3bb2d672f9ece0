//! Engine-level error taxonomy.
//!
//! Only conditions that are reported to the embedding host live here.
//! Recoverable per-frame decode failures are *not* errors at this level:
//! the loader substitutes a sentinel entry and the engine surfaces the
//! failure as an observability event instead (see `events::PreviewEvent`).

use crate::core::state::PreviewState;

/// Terminal and caller-facing failure conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewError {
    /// Command issued in a state that forbids it. Carries the offending
    /// state/command pair so the caller can see exactly what was rejected.
    InvalidTransition {
        state: PreviewState,
        command: &'static str,
    },

    /// Media could not be opened at all: unreadable path, empty sequence,
    /// unsupported container. Fatal for the session.
    LoadFailure(String),

    /// The delegated video backend reported a runtime failure.
    Backend(String),

    /// Playback rate outside the legal band (see `session::PreviewSession`).
    /// Zero is never a valid rate: pause is a state, not a speed.
    InvalidRate(f64),

    /// Trim points that do not satisfy `0 <= in <= out < total`.
    InvalidTrim {
        in_point: i64,
        out_point: i64,
        total_frames: i64,
    },

    /// Internal guard: a command that requires a session found none.
    /// The transition table normally makes this unreachable.
    NoSession,
}

impl std::fmt::Display for PreviewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreviewError::InvalidTransition { state, command } => {
                write!(f, "command '{}' is not legal in state {}", command, state)
            }
            PreviewError::LoadFailure(reason) => write!(f, "load failure: {}", reason),
            PreviewError::Backend(reason) => write!(f, "video backend error: {}", reason),
            PreviewError::InvalidRate(rate) => {
                write!(f, "playback rate {} outside legal range", rate)
            }
            PreviewError::InvalidTrim {
                in_point,
                out_point,
                total_frames,
            } => write!(
                f,
                "trim range [{}, {}] invalid for {} frames",
                in_point, out_point, total_frames
            ),
            PreviewError::NoSession => write!(f, "no media session loaded"),
        }
    }
}

impl std::error::Error for PreviewError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = PreviewError::InvalidTransition {
            state: PreviewState::Idle,
            command: "play",
        };
        assert!(e.to_string().contains("play"));
        assert!(e.to_string().contains("Idle"));

        let e = PreviewError::InvalidRate(0.0);
        assert!(e.to_string().contains('0'));
    }
}

//! Preview state machine states and the legal-transition table.
//!
//! The table is data, not control flow: the engine asks `allows(command)`
//! before touching anything, and every rejection carries the offending
//! state/command pair. Illegal commands never mutate state.

use serde::Serialize;

/// Observable playback states.
///
/// `Stopped` and `Error` are announced, then converge to `Idle` once
/// resource release completes; `Error` additionally waits for an explicit
/// `stop`/`unload` acknowledgement before converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreviewState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
    Error,
}

impl std::fmt::Display for PreviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PreviewState::Idle => "Idle",
            PreviewState::Loading => "Loading",
            PreviewState::Ready => "Ready",
            PreviewState::Playing => "Playing",
            PreviewState::Paused => "Paused",
            PreviewState::Stopped => "Stopped",
            PreviewState::Error => "Error",
        };
        write!(f, "{}", name)
    }
}

/// Inbound transport commands, for legality checks and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Load,
    Play,
    Pause,
    Stop,
    Seek,
    SetRate,
    SetInOut,
    SetLooping,
    Unload,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Load => "load",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Seek => "seek",
            Command::SetRate => "set_rate",
            Command::SetInOut => "set_in_out",
            Command::SetLooping => "set_looping",
            Command::Unload => "unload",
        }
    }
}

impl PreviewState {
    /// The legal-transition table.
    pub fn allows(self, command: Command) -> bool {
        use Command::*;
        use PreviewState::*;

        match command {
            Load => self == Idle,
            Play => matches!(self, Ready | Paused),
            Pause => self == Playing,
            Seek | SetRate | SetInOut | SetLooping => {
                matches!(self, Ready | Playing | Paused)
            }
            Stop | Unload => self != Idle,
        }
    }
}

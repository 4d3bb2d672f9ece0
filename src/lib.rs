//! PREVUE - embeddable media preview engine
//!
//! Plays either a single video file (through a host-installed delegated
//! backend) or an ordered image sequence (through an internal loader
//! thread, bounded frame buffer, and tick clock) under one observable
//! state machine with unified transport: play, pause, stop, seek, speed,
//! and in/out trim.
//!
//! The host owns the thread: issue all commands from one thread and call
//! [`PreviewEngine::pump`] from its update loop; observe playback through
//! the [`events::PreviewEvent`] channel.

// Core engine (buffer, loader, clock, pipelines, state machine)
pub mod core;

// Supporting modules
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod logging;
pub mod paths;
pub mod sequence;

// Re-export the embedding surface
pub use crate::config::PreviewConfig;
pub use crate::core::engine::{LoadRequest, PreviewEngine};
pub use crate::core::session::{MediaKind, PreviewSession, MAX_RATE, MIN_RATE};
pub use crate::core::state::PreviewState;
pub use crate::core::video::{
    BackendError, BackendEvent, BackendPlaybackState, VideoBackend, VideoBackendFactory,
};
pub use crate::error::PreviewError;
pub use crate::events::{PreviewEvent, PreviewEventSender};
pub use crate::frame::{ImageDecoder, ImageRsDecoder, PreviewImage};

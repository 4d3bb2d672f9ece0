//! PreviewSession: the aggregate for one loaded media item.
//!
//! Owned exclusively by the engine. Pipelines report deltas and events;
//! only the engine mutates position and trim through this type, so every
//! invariant lives in one place:
//!
//! - `0 <= in_point <= out_point < total_frames`
//! - `current_position` inside `[in_point, out_point]` after clamping
//! - `playback_rate` inside the legal band, never zero (pause is a state)

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PreviewError;

/// Legal magnitude band for the signed playback rate.
pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 8.0;

/// Which pipeline a session runs on. Decided once at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Video,
    ImageSequence,
}

/// One loaded media item and its transport parameters.
#[derive(Debug, Clone)]
pub struct PreviewSession {
    id: Uuid,
    media_kind: MediaKind,
    source_paths: Arc<Vec<PathBuf>>,
    frame_rate: f64,
    /// 0 until known (video sessions learn it from the backend).
    total_frames: i64,
    in_point: i64,
    out_point: i64,
    playback_rate: f64,
    looping: bool,
    current_position: i64,
}

impl PreviewSession {
    /// Create a session. `total_frames == 0` means "not known yet"; trim
    /// defaults to the full range once the total is known.
    pub fn new(
        media_kind: MediaKind,
        source_paths: Arc<Vec<PathBuf>>,
        frame_rate: f64,
        total_frames: i64,
    ) -> Self {
        debug_assert!(frame_rate > 0.0);
        Self {
            id: Uuid::new_v4(),
            media_kind,
            source_paths,
            frame_rate,
            total_frames,
            in_point: 0,
            out_point: (total_frames - 1).max(0),
            playback_rate: 1.0,
            looping: true,
            current_position: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn source_paths(&self) -> &Arc<Vec<PathBuf>> {
        &self.source_paths
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn total_frames(&self) -> i64 {
        self.total_frames
    }

    /// Record the frame count once the backend reports duration. Widens
    /// an untouched trim range to the full stream.
    pub fn set_total_frames(&mut self, total: i64) {
        let had_default_out = self.out_point == (self.total_frames - 1).max(0);
        self.total_frames = total.max(0);
        if had_default_out {
            self.out_point = (self.total_frames - 1).max(0);
        }
        self.out_point = self.out_point.min((self.total_frames - 1).max(0));
        self.in_point = self.in_point.min(self.out_point);
        self.current_position = self.clamp_to_trim(self.current_position);
    }

    pub fn in_point(&self) -> i64 {
        self.in_point
    }

    pub fn out_point(&self) -> i64 {
        self.out_point
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn current_position(&self) -> i64 {
        self.current_position
    }

    /// Applied only from pipeline reports and validated seeks. Playback
    /// is clamped to the trim range, which itself sits inside the stream.
    pub fn set_position(&mut self, frame: i64) {
        self.current_position = self.clamp_to_trim(frame);
    }

    pub fn clamp_to_trim(&self, frame: i64) -> i64 {
        frame.clamp(self.in_point, self.out_point)
    }

    /// Validate and store a signed rate. Zero and magnitudes outside
    /// `[0.25, 8.0]` are rejected; pause is a state, not a rate.
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<(), PreviewError> {
        let magnitude = rate.abs();
        if !rate.is_finite() || !(MIN_RATE..=MAX_RATE).contains(&magnitude) {
            return Err(PreviewError::InvalidRate(rate));
        }
        self.playback_rate = rate;
        Ok(())
    }

    /// Validate and store a trim range, clamping the position into it.
    /// Returns the position actually in effect afterwards.
    pub fn set_in_out(&mut self, in_point: i64, out_point: i64) -> Result<i64, PreviewError> {
        if in_point < 0
            || out_point < in_point
            || (self.total_frames > 0 && out_point >= self.total_frames)
        {
            return Err(PreviewError::InvalidTrim {
                in_point,
                out_point,
                total_frames: self.total_frames,
            });
        }
        self.in_point = in_point;
        self.out_point = out_point;
        self.current_position = self.clamp_to_trim(self.current_position);
        Ok(self.current_position)
    }
}

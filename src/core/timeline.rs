//! Frame index <-> wall-clock time conversion.
//!
//! Pure and stateless. Both pipelines convert *from an authoritative value
//! each call* (a backend-reported time or a produced frame index), never
//! iteratively, so no drift can accumulate.
//!
//! Rounding policy: floor. A small epsilon is added before flooring so that
//! times produced by `frame_to_time` map back to the exact same index at
//! non-integer rates like 29.97, where `i / fps * fps` can land one ulp
//! below `i`.

use std::time::Duration;

/// Guards against float round-trip error at non-integer frame rates.
/// Well below half a frame at any practical rate, well above the
/// accumulated ulp error for any realistic index.
const FRAME_EPSILON: f64 = 1e-6;

/// Seconds at which frame `frame` starts, for a nominal `fps`.
pub fn frame_to_time(frame: i64, fps: f64) -> f64 {
    debug_assert!(fps > 0.0, "frame rate must be positive");
    frame as f64 / fps
}

/// Frame index containing the instant `seconds`, for a nominal `fps`.
pub fn time_to_frame(seconds: f64, fps: f64) -> i64 {
    debug_assert!(fps > 0.0, "frame rate must be positive");
    (seconds * fps + FRAME_EPSILON).floor() as i64
}

/// Number of whole frames covered by a stream of `seconds` length.
pub fn duration_to_frames(seconds: f64, fps: f64) -> i64 {
    (seconds * fps + FRAME_EPSILON).floor() as i64
}

/// Nominal display duration of a single frame.
pub fn frame_period(fps: f64) -> Duration {
    debug_assert!(fps > 0.0, "frame rate must be positive");
    Duration::from_secs_f64(1.0 / fps)
}

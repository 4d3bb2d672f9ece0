//! Sequence clock: the consumer cadence of the sequence pipeline.
//!
//! Not a thread. The owner pumps `tick()` from its own update loop, a
//! 60 Hz host loop asking "is the next frame due?". The clock gates on
//! elapsed wall time, pops with a short bounded timeout so the owning
//! thread is never parked for long, and counts consecutive underruns so
//! a transient stall is reported without being mistaken for end-of-media.

use log::trace;
use std::time::{Duration, Instant};

use crate::core::frame_buffer::{FrameBuffer, PopError};
use crate::core::timeline::frame_period;
use crate::frame::FrameBufferEntry;

/// Outcome of one due tick.
#[derive(Debug)]
pub enum ClockTick {
    /// Next frame arrived in time.
    Frame(FrameBufferEntry),
    /// Buffer was empty. `stalled` is set once per stall episode when the
    /// underrun streak crosses the threshold.
    Underrun { stalled: bool },
    /// The buffer generation was cancelled mid-reconfigure. Ignorable;
    /// a new generation is already on its way.
    Cancelled,
}

/// Fixed-period consumer driven by the owning thread.
pub struct SequenceClock {
    frame_rate: f64,
    rate_magnitude: f64,
    min_period: Duration,
    pop_timeout: Duration,
    stall_threshold: u32,
    last_tick: Option<Instant>,
    underrun_streak: u32,
    stall_reported: bool,
}

impl SequenceClock {
    pub fn new(
        frame_rate: f64,
        rate: f64,
        min_period: Duration,
        pop_timeout: Duration,
        stall_threshold: u32,
    ) -> Self {
        Self {
            frame_rate,
            rate_magnitude: rate.abs().max(f64::MIN_POSITIVE),
            min_period,
            pop_timeout,
            stall_threshold: stall_threshold.max(1),
            last_tick: None,
            underrun_streak: 0,
            stall_reported: false,
        }
    }

    /// Current tick period: nominal frame period divided by |rate|, floored
    /// so extreme rates cannot spin the owning loop.
    pub fn period(&self) -> Duration {
        let nominal = frame_period(self.frame_rate);
        let scaled = nominal.div_f64(self.rate_magnitude);
        scaled.max(self.min_period)
    }

    /// Update the speed multiplier. Sign is irrelevant here; direction is
    /// the loader's concern.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate_magnitude = rate.abs().max(f64::MIN_POSITIVE);
        trace!("Clock period now {:?}", self.period());
    }

    /// Forget the tick phase. Called on pause/seek/resume so playback does
    /// not burst to catch up.
    pub fn reset(&mut self) {
        self.last_tick = None;
        self.underrun_streak = 0;
        self.stall_reported = false;
    }

    /// Advance the clock. Returns `None` when the next frame is not due
    /// yet; otherwise pops and reports.
    pub fn tick(&mut self, now: Instant, buffer: &FrameBuffer) -> Option<ClockTick> {
        let Some(last) = self.last_tick else {
            // First tick after start/reset anchors the phase.
            self.last_tick = Some(now);
            return None;
        };

        if now.duration_since(last) < self.period() {
            return None;
        }

        match buffer.pop(self.pop_timeout) {
            Ok(entry) => {
                self.last_tick = Some(now);
                self.underrun_streak = 0;
                self.stall_reported = false;
                Some(ClockTick::Frame(entry))
            }
            Err(PopError::Empty) => {
                // Keep the phase anchored so the retry happens next pump,
                // not a full period later.
                self.underrun_streak += 1;
                let stalled =
                    self.underrun_streak >= self.stall_threshold && !self.stall_reported;
                if stalled {
                    self.stall_reported = true;
                    trace!("Clock: stall after {} empty pops", self.underrun_streak);
                }
                Some(ClockTick::Underrun { stalled })
            }
            Err(PopError::Cancelled) => Some(ClockTick::Cancelled),
        }
    }
}

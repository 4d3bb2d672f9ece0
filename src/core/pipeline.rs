//! The two playback pipelines behind one interface.
//!
//! **Why**: video and image sequences are produced by fundamentally
//! different machinery (a delegated externally-clocked backend vs. a
//! loader thread + buffer + clock), but the engine must drive them with
//! one vocabulary. The variant is selected once at load time; the engine
//! holds exactly one, never both.
//!
//! **Used by**: engine (owns the active `PipelineKind`, routes transport
//! commands down, translates `PipelineEvent`s up).

use enum_dispatch::enum_dispatch;
use log::{debug, trace};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PreviewConfig;
use crate::core::clock::{ClockTick, SequenceClock};
use crate::core::frame_buffer::{FrameBuffer, PopError};
use crate::core::loader::{LoaderPlan, SequenceLoader};
use crate::core::video::{BackendError, VideoAdapter};
use crate::frame::{FrameBufferEntry, FramePayload, ImageDecoder, PreviewImage};

/// Reports pipelines hand upward. The engine is the only consumer; it
/// owns the session state these reports are applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Total frame count is known.
    Loaded { total_frames: i64 },
    /// First displayable frame exists; the session can leave Loading.
    FirstFrame,
    /// A decoded frame for display.
    Frame { index: i64, image: Arc<PreviewImage> },
    /// Position advanced (also sent alongside `Frame`).
    Position { index: i64 },
    /// A frame slot was a sentinel: decode failed, alignment kept.
    DecodeFailed { index: i64, reason: String },
    /// Buffer underrun past the stall threshold. Transient.
    Stalled,
    /// Playback hit a trim bound (loop wrap or end).
    ReachedOutPoint,
    /// Non-looping playback finished at the bound.
    Ended,
    /// Backend failure. The engine decides whether it is fatal.
    Error { reason: String },
}

/// Transport interface both variants implement.
#[enum_dispatch]
pub trait Pipeline {
    fn play(&mut self);
    fn pause(&mut self);
    /// Seek to a frame already clamped to the trim range by the engine.
    fn seek(&mut self, frame: i64);
    fn set_rate(&mut self, rate: f64);
    fn set_trim(&mut self, in_point: i64, out_point: i64);
    fn set_looping(&mut self, looping: bool);
    /// Drive the pipeline from the owning thread. Never blocks beyond the
    /// configured pop timeout.
    fn pump(&mut self, now: Instant, out: &mut Vec<PipelineEvent>);
    /// Idempotent teardown: stop ticking, cancel/flush/join, release.
    fn shutdown(&mut self);
}

/// The closed set of pipeline variants.
#[enum_dispatch(Pipeline)]
pub enum PipelineKind {
    Sequence(SequencePipeline),
    Video(VideoPipeline),
}

// ---------------------------------------------------------------------------
// Sequence pipeline
// ---------------------------------------------------------------------------

/// Pull-based, self-clocked pipeline: loader thread -> frame buffer ->
/// clock tick. Every reconfiguration that breaks frame-order alignment
/// (seek, trim change, direction flip) cancels the running generation,
/// flushes, and starts a fresh one; the loader is never mutated in place.
pub struct SequencePipeline {
    paths: Arc<Vec<PathBuf>>,
    decoder: Arc<dyn ImageDecoder>,
    frame_rate: f64,
    rate: f64,
    in_point: i64,
    out_point: i64,
    looping: bool,
    playing: bool,
    /// Pipeline-local cursor used for wrap detection and restarts. The
    /// authoritative `current_position` lives in the session.
    position: i64,
    buffer: Arc<FrameBuffer>,
    loader: Option<SequenceLoader>,
    clock: SequenceClock,
    generation: u64,
    first_frame_emitted: bool,
    /// Pop one frame outside of play (poster frame after load/seek).
    poster_pending: bool,
    buffer_capacity: usize,
    join_timeout: Duration,
}

impl SequencePipeline {
    pub fn new(
        paths: Arc<Vec<PathBuf>>,
        decoder: Arc<dyn ImageDecoder>,
        frame_rate: f64,
        looping: bool,
        cfg: &PreviewConfig,
    ) -> Self {
        let total = paths.len() as i64;
        let clock = SequenceClock::new(
            frame_rate,
            1.0,
            cfg.min_tick_period(),
            cfg.pop_timeout(),
            cfg.stall_threshold,
        );

        let mut pipeline = Self {
            paths,
            decoder,
            frame_rate,
            rate: 1.0,
            in_point: 0,
            out_point: (total - 1).max(0),
            looping,
            playing: false,
            position: 0,
            buffer: Arc::new(FrameBuffer::new(cfg.buffer_capacity)),
            loader: None,
            clock,
            generation: 0,
            first_frame_emitted: false,
            poster_pending: true,
            buffer_capacity: cfg.buffer_capacity,
            join_timeout: cfg.loader_join_timeout(),
        };
        pipeline.spawn_generation(0);
        pipeline
    }

    pub fn total_frames(&self) -> i64 {
        self.paths.len() as i64
    }

    fn forward(&self) -> bool {
        self.rate >= 0.0
    }

    fn spawn_generation(&mut self, start_index: i64) {
        self.generation += 1;
        let plan = LoaderPlan {
            paths: Arc::clone(&self.paths),
            in_point: self.in_point,
            out_point: self.out_point,
            start_index,
            forward: self.forward(),
            looping: self.looping,
            frame_rate: self.frame_rate,
        };
        trace!(
            "Spawning loader generation {} at frame {}",
            self.generation, start_index
        );
        self.loader = Some(SequenceLoader::spawn(
            self.generation,
            plan,
            Arc::clone(&self.decoder),
            Arc::clone(&self.buffer),
        ));
    }

    /// Cancel-then-flush-then-restart at `start_index`. The only way a
    /// running generation is ever reconfigured.
    fn restart(&mut self, start_index: i64) {
        if let Some(mut loader) = self.loader.take() {
            loader.cancel();
            self.buffer.cancel();
            loader.join(self.join_timeout);
        }
        self.buffer.flush();
        self.buffer = Arc::new(FrameBuffer::new(self.buffer_capacity));
        self.clock.reset();
        self.poster_pending = !self.playing;
        self.spawn_generation(start_index);
    }

    fn handle_entry(&mut self, entry: FrameBufferEntry, out: &mut Vec<PipelineEvent>) {
        let index = entry.frame_index;

        if !self.first_frame_emitted {
            self.first_frame_emitted = true;
            out.push(PipelineEvent::FirstFrame);
        }

        // Within one generation the index only moves monotonically in the
        // play direction; a jump the other way is the loop wrap.
        let wrapped = if self.forward() {
            index < self.position
        } else {
            index > self.position
        };
        if wrapped {
            out.push(PipelineEvent::ReachedOutPoint);
        }
        self.position = index;

        match entry.payload {
            FramePayload::Image(image) => {
                out.push(PipelineEvent::Frame { index, image });
            }
            FramePayload::Sentinel { reason } => {
                out.push(PipelineEvent::DecodeFailed { index, reason });
            }
        }
        out.push(PipelineEvent::Position { index });

        let at_end = if self.forward() {
            index >= self.out_point
        } else {
            index <= self.in_point
        };
        if !self.looping && at_end {
            self.playing = false;
            out.push(PipelineEvent::ReachedOutPoint);
            out.push(PipelineEvent::Ended);
        }
    }
}

impl Pipeline for SequencePipeline {
    fn play(&mut self) {
        if !self.playing {
            self.playing = true;
            self.poster_pending = false;
            self.clock.reset();
        }
    }

    fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            self.clock.reset();
        }
    }

    fn seek(&mut self, frame: i64) {
        let frame = frame.clamp(self.in_point, self.out_point);
        debug!("Sequence seek to {}", frame);
        self.position = frame;
        self.restart(frame);
    }

    fn set_rate(&mut self, rate: f64) {
        let direction_flip = (rate >= 0.0) != self.forward();
        self.rate = rate;
        self.clock.set_rate(rate);
        if direction_flip {
            // Queued frames run the wrong way; realign from here.
            self.restart(self.position);
        }
    }

    fn set_trim(&mut self, in_point: i64, out_point: i64) {
        self.in_point = in_point;
        self.out_point = out_point;
        self.position = self.position.clamp(in_point, out_point);
        self.restart(self.position);
    }

    fn set_looping(&mut self, looping: bool) {
        if self.looping != looping {
            self.looping = looping;
            self.restart(self.position);
        }
    }

    fn pump(&mut self, now: Instant, out: &mut Vec<PipelineEvent>) {
        if self.poster_pending {
            match self.buffer.pop(Duration::ZERO) {
                Ok(entry) => {
                    self.poster_pending = false;
                    self.handle_entry(entry, out);
                }
                Err(PopError::Empty) => {} // decode still in flight
                Err(PopError::Cancelled) => {} // mid-restart
            }
            return;
        }

        if !self.playing {
            return;
        }

        match self.clock.tick(now, &self.buffer) {
            Some(ClockTick::Frame(entry)) => self.handle_entry(entry, out),
            Some(ClockTick::Underrun { stalled }) => {
                if stalled {
                    out.push(PipelineEvent::Stalled);
                }
            }
            Some(ClockTick::Cancelled) | None => {}
        }
    }

    fn shutdown(&mut self) {
        self.playing = false;
        self.poster_pending = false;
        self.clock.reset();
        if let Some(mut loader) = self.loader.take() {
            loader.cancel();
            self.buffer.cancel();
            loader.join(self.join_timeout);
        } else {
            self.buffer.cancel();
        }
        self.buffer.flush();
    }
}

impl Drop for SequencePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Video pipeline
// ---------------------------------------------------------------------------

/// Push-based, externally-clocked pipeline: a thin shell over the
/// delegated backend adapter.
pub struct VideoPipeline {
    adapter: VideoAdapter,
}

impl VideoPipeline {
    pub fn new(adapter: VideoAdapter) -> Self {
        Self { adapter }
    }

    pub fn open(&mut self, path: &std::path::Path) -> Result<(), BackendError> {
        self.adapter.open(path)
    }
}

impl Pipeline for VideoPipeline {
    fn play(&mut self) {
        self.adapter.play();
    }

    fn pause(&mut self) {
        self.adapter.pause();
    }

    fn seek(&mut self, frame: i64) {
        self.adapter.seek_frame(frame);
    }

    fn set_rate(&mut self, rate: f64) {
        self.adapter.set_rate(rate);
    }

    fn set_trim(&mut self, in_point: i64, out_point: i64) {
        self.adapter.set_trim(in_point, out_point);
    }

    fn set_looping(&mut self, looping: bool) {
        self.adapter.set_looping(looping);
    }

    fn pump(&mut self, _now: Instant, out: &mut Vec<PipelineEvent>) {
        self.adapter.pump(out);
    }

    fn shutdown(&mut self) {
        self.adapter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DecodeError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;

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
        fn decode(&self, path: &std::path::Path) -> Result<PreviewImage, DecodeError> {
            let index = crate::sequence::frame_number(path).unwrap() as i64;
            self.decoded.lock().unwrap().push(index);
            if self.fail_indices.contains(&index) {
                Err(DecodeError::Decode("bad frame".into()))
            } else {
                Ok(PreviewImage::solid(1, 1, [0; 4]))
            }
        }
    }

    fn fake_paths(count: usize) -> Arc<Vec<PathBuf>> {
        Arc::new(
            (0..count)
                .map(|i| PathBuf::from(format!("seq.{:04}.png", i)))
                .collect(),
        )
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

    /// Pump until `count` frame positions were observed or the deadline hits.
    fn collect_positions(pipeline: &mut SequencePipeline, count: usize) -> Vec<i64> {
        let mut positions = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while positions.len() < count {
            assert!(Instant::now() < deadline, "timed out collecting frames");
            events.clear();
            pipeline.pump(Instant::now(), &mut events);
            for e in &events {
                if let PipelineEvent::Position { index } = e {
                    positions.push(*index);
                }
            }
            thread::sleep(Duration::from_micros(200));
        }
        positions
    }

    /// Test: poster frame arrives without play
    /// Validates: first-frame availability drives readiness
    #[test]
    fn test_poster_frame_before_play() {
        let mut p = SequencePipeline::new(
            fake_paths(10),
            FakeDecoder::new([]),
            24.0,
            true,
            &fast_config(),
        );

        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while events.is_empty() && Instant::now() < deadline {
            p.pump(Instant::now(), &mut events);
            thread::sleep(Duration::from_millis(1));
        }

        assert!(events.contains(&PipelineEvent::FirstFrame));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Frame { index: 0, .. }
        )));
    }

    /// Test: trimmed playback loops 10..=20 and decodes nothing outside
    /// Validates: the core trim scenario end to end
    #[test]
    fn test_trimmed_loop_playback() {
        let decoder = FakeDecoder::new([]);
        let mut p = SequencePipeline::new(
            fake_paths(100),
            Arc::clone(&decoder) as Arc<dyn ImageDecoder>,
            240.0,
            true,
            &fast_config(),
        );
        p.set_trim(10, 20);
        p.play();

        let positions = collect_positions(&mut p, 18);
        let mut expected = Vec::new();
        let mut i = 10;
        for _ in 0..18 {
            expected.push(i);
            i = if i == 20 { 10 } else { i + 1 };
        }
        assert_eq!(positions, expected);
        assert!(decoder
            .decoded
            .lock()
            .unwrap()
            .iter()
            .all(|&i| (10..=20).contains(&i)));

        p.shutdown();
    }

    /// Test: sentinel slot produces DecodeFailed and position still advances
    /// Validates: one bad frame never halts or shifts playback
    #[test]
    fn test_decode_failure_keeps_alignment() {
        let mut p = SequencePipeline::new(
            fake_paths(8),
            FakeDecoder::new([3]),
            240.0,
            false,
            &fast_config(),
        );
        p.play();

        let mut failed = Vec::new();
        let mut positions = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while !positions.contains(&7) {
            assert!(Instant::now() < deadline);
            events.clear();
            p.pump(Instant::now(), &mut events);
            for e in &events {
                match e {
                    PipelineEvent::Position { index } => positions.push(*index),
                    PipelineEvent::DecodeFailed { index, .. } => failed.push(*index),
                    _ => {}
                }
            }
            thread::sleep(Duration::from_micros(200));
        }

        assert_eq!(failed, vec![3]);
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    /// Test: shutdown terminates the loader and empties the buffer
    /// Validates: full teardown, nothing left running or held
    #[test]
    fn test_shutdown_releases_everything() {
        let mut p = SequencePipeline::new(
            fake_paths(1000),
            FakeDecoder::new([]),
            240.0,
            true,
            &fast_config(),
        );
        p.play();
        let _ = collect_positions(&mut p, 3);

        p.shutdown();
        assert!(p.loader.is_none());
        assert_eq!(p.buffer.len(), 0);
        assert!(p.buffer.is_cancelled());

        // Idempotent.
        p.shutdown();
    }

    /// Test: direction flip restarts production from the current position
    /// Validates: reconfigure-by-restart, never in-place mutation
    #[test]
    fn test_reverse_rate_restarts() {
        let mut p = SequencePipeline::new(
            fake_paths(50),
            FakeDecoder::new([]),
            240.0,
            true,
            &fast_config(),
        );
        p.play();
        let _ = collect_positions(&mut p, 5);

        p.set_rate(-1.0);
        let positions = collect_positions(&mut p, 4);
        for pair in positions.windows(2) {
            let wrapped = pair[0] == 0 && pair[1] == 49;
            assert!(
                pair[1] == pair[0] - 1 || wrapped,
                "expected descending positions, got {:?}",
                positions
            );
        }
    }
}

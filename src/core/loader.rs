//! Sequence loader: the producer side of the sequence pipeline.
//!
//! **Why**: image decode is too slow for the owning thread. One dedicated
//! worker per loader generation decodes frames in playback order and pushes
//! them into the frame buffer, blocking on backpressure.
//!
//! **Used by**: Sequence pipeline (spawned per generation, cancelled and
//! joined on every seek/trim/direction change and at teardown).
//!
//! # Ordering
//!
//! Frames are produced strictly in playback order inside the trim range,
//! wrapping at the bounds while looping. Frames outside `[in, out]` are
//! never decoded.
//!
//! # Failure
//!
//! A frame that fails to decode becomes a sentinel entry carrying its index
//! so the consumer keeps timeline alignment. One bad frame never stops the
//! generation.
//!
//! # Cancellation
//!
//! Cooperative: an atomic flag is checked between decodes, and a cancelled
//! buffer rejects the in-flight push. After either signal the thread stops
//! touching the buffer and exits. The owner joins with a bounded deadline;
//! a loader that overruns it is abandoned, never waited on forever.

use log::{debug, trace, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::frame_buffer::{FrameBuffer, PushError};
use crate::core::timeline::frame_to_time;
use crate::frame::{FrameBufferEntry, FramePayload, ImageDecoder};

/// Immutable description of one loader generation.
#[derive(Debug, Clone)]
pub struct LoaderPlan {
    /// Full ordered frame list for the session. The plan indexes into it.
    pub paths: Arc<Vec<PathBuf>>,
    /// Trim range, inclusive. Production never leaves it.
    pub in_point: i64,
    pub out_point: i64,
    /// First index to produce, already inside the trim range.
    pub start_index: i64,
    /// Production direction.
    pub forward: bool,
    /// Wrap at the trim bounds, or stop after producing the last one.
    pub looping: bool,
    /// Nominal rate, used to stamp source timestamps on entries.
    pub frame_rate: f64,
}

/// Handle to a running (or finished) loader generation.
pub struct SequenceLoader {
    cancel_flag: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    generation: u64,
}

impl SequenceLoader {
    /// Spawn the worker thread for `plan`.
    pub fn spawn(
        generation: u64,
        plan: LoaderPlan,
        decoder: Arc<dyn ImageDecoder>,
        buffer: Arc<FrameBuffer>,
    ) -> Self {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&cancel_flag);

        let handle = thread::Builder::new()
            .name(format!("prevue-loader-{}", generation))
            .spawn(move || run_loader(plan, decoder, buffer, cancel))
            .expect("Failed to spawn loader thread");

        Self {
            cancel_flag,
            handle: Some(handle),
            generation,
        }
    }

    /// Request cooperative cancellation. The flag alone does not wake a
    /// push blocked on a full buffer; cancel the buffer as well.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Wait for the worker to exit, up to `timeout`.
    ///
    /// Returns `true` when the thread terminated in time. On timeout the
    /// handle is kept so a later call (or drop) can retry, but the caller
    /// proceeds with teardown regardless.
    pub fn join(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Loader {} did not stop within {:?}, abandoning join",
                    self.generation, timeout
                );
                self.handle = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }

        let _ = handle.join();
        trace!("Loader {} joined", self.generation);
        true
    }
}

impl Drop for SequenceLoader {
    fn drop(&mut self) {
        self.cancel();
        // Short best-effort wait; an unresponsive worker dies with the process.
        self.join(Duration::from_millis(500));
    }
}

fn run_loader(
    plan: LoaderPlan,
    decoder: Arc<dyn ImageDecoder>,
    buffer: Arc<FrameBuffer>,
    cancel: Arc<AtomicBool>,
) {
    if plan.paths.is_empty() {
        warn!("Loader started with no frames, exiting");
        return;
    }

    let total = plan.paths.len() as i64;
    let in_point = plan.in_point.clamp(0, (total - 1).max(0));
    let out_point = plan.out_point.clamp(in_point, (total - 1).max(0));
    let mut index = plan.start_index.clamp(in_point, out_point);
    let mut produced: u64 = 0;

    debug!(
        "Loader start: range [{}, {}], from {}, {}",
        in_point,
        out_point,
        index,
        if plan.forward { "forward" } else { "reverse" }
    );

    loop {
        if cancel.load(Ordering::Relaxed) {
            trace!("Loader: cancel flag observed, exiting");
            break;
        }

        let path = &plan.paths[index as usize];
        let payload = match decoder.decode(path) {
            Ok(image) => FramePayload::Image(Arc::new(image)),
            Err(e) => {
                warn!("Frame {} failed to decode ({}): {}", index, path.display(), e);
                FramePayload::Sentinel {
                    reason: e.to_string(),
                }
            }
        };

        let entry = FrameBufferEntry {
            frame_index: index,
            payload,
            source_timestamp: frame_to_time(index, plan.frame_rate),
        };

        match buffer.push(entry) {
            Ok(()) => produced += 1,
            Err(PushError::Cancelled) => {
                trace!("Loader: buffer cancelled, exiting");
                break;
            }
        }

        // Advance in playback order, wrapping at the trim bounds.
        if plan.forward {
            index += 1;
            if index > out_point {
                if plan.looping {
                    index = in_point;
                } else {
                    break;
                }
            }
        } else {
            index -= 1;
            if index < in_point {
                if plan.looping {
                    index = out_point;
                } else {
                    break;
                }
            }
        }
    }

    debug!("Loader exit after {} frames", produced);
}

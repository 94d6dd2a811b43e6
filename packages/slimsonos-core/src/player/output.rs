//! Player output boundary.
//!
//! The LMS client decodes and mixes audio on its own thread and appends the
//! post-mix result here. The pull loop drains it through the [`OutputStage`]
//! trait. The stage lock is held only while frames are moved into the sink's
//! local buffer; the sink performs its blocking session write afterwards,
//! never under this lock.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Receives extracted frames from an [`OutputStage`].
///
/// `write_frames` is called under the stage's buffer lock and must only
/// stage the bytes locally; `flush` runs after the lock is released and may
/// block.
pub trait FrameSink {
    /// Accepts `frames` sample-frames of packed PCM. `pcm` is empty for
    /// silence runs. Returns the frames accepted.
    fn write_frames(&mut self, pcm: &[u8], frames: usize, silence: bool) -> usize;

    /// Delivers everything staged since the last flush. May block.
    fn flush(&mut self);
}

/// Source of post-mix PCM frames for the pull loop.
pub trait OutputStage: Send + Sync {
    /// Moves up to `max_frames` frames into `sink`, preserving order and
    /// silence markers. Returns the frames moved.
    fn output_frames(&self, max_frames: usize, sink: &mut dyn FrameSink) -> usize;
}

/// One contiguous run of frames sharing a silence flag.
struct PcmRun {
    pcm: Vec<u8>,
    frames: usize,
    silence: bool,
}

/// Mutex-guarded staging area between the LMS client and the pull loop.
#[derive(Default)]
pub struct SharedOutputBuffer {
    runs: Mutex<VecDeque<PcmRun>>,
}

impl SharedOutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends packed audio frames produced by the mixer.
    pub fn push_audio(&self, pcm: &[u8], frames: usize) {
        if frames == 0 {
            return;
        }
        self.runs.lock().push_back(PcmRun {
            pcm: pcm.to_vec(),
            frames,
            silence: false,
        });
    }

    /// Appends a run of silent frames. No bytes are carried; only the gap
    /// length and the flag matter downstream.
    pub fn push_silence(&self, frames: usize) {
        if frames == 0 {
            return;
        }
        self.runs.lock().push_back(PcmRun {
            pcm: Vec::new(),
            frames,
            silence: true,
        });
    }

    pub fn queued_frames(&self) -> usize {
        self.runs.lock().iter().map(|r| r.frames).sum()
    }
}

impl OutputStage for SharedOutputBuffer {
    fn output_frames(&self, max_frames: usize, sink: &mut dyn FrameSink) -> usize {
        let mut runs = self.runs.lock();
        let mut moved = 0;
        while moved < max_frames {
            let Some(run) = runs.front_mut() else { break };
            let budget = max_frames - moved;
            if run.frames <= budget {
                let run = match runs.pop_front() {
                    Some(run) => run,
                    None => break,
                };
                moved += sink.write_frames(&run.pcm, run.frames, run.silence);
            } else {
                // Split the run at a frame boundary and leave the tail.
                let take = budget;
                let split = if run.silence {
                    Vec::new()
                } else {
                    let bpf = run.pcm.len() / run.frames;
                    run.pcm.drain(..take * bpf).collect()
                };
                run.frames -= take;
                moved += sink.write_frames(&split, take, run.silence);
            }
        }
        moved
    }
}

//! Player-side pipeline: output buffer, PCM sink, pull loop.

pub mod output;
pub mod sink;

pub use output::{FrameSink, OutputStage, SharedOutputBuffer};
pub use sink::{spawn_pull_loop, PcmSink, PullLoopHandle, StreamIdSource};

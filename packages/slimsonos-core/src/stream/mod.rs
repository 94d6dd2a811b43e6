//! The real-time streaming pipeline.
//!
//! PCM from the player's output stage enters through
//! [`StreamSession::write`], is compressed by the [`FlacBlockEncoder`], queued
//! in the [`FrameRing`], and leaves through [`StreamSession::read`] towards
//! the HTTP chunk writer. The [`StreamSlot`] enforces that at most one
//! session is live at a time.

pub mod encoder;
pub mod registry;
pub mod ring;
pub mod session;

pub use encoder::{EncodeError, FlacBlockEncoder};
pub use registry::{PlaybackGauge, PlaybackPermit, RegisterError, StreamSlot};
pub use ring::{FramePacket, FrameRing};
pub use session::{SessionStatus, StreamSession};

use crate::protocol_constants::{CHANNELS, SAMPLE_RATE};

/// PCM sample format of one stream session.
///
/// Channel count and sample rate are fixed by the player's output stage
/// (stereo, 44.1kHz); only the bit depth varies per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Creates a format for the given bit depth.
    ///
    /// Returns `None` for depths the packed little-endian layout does not
    /// support.
    pub fn new(bits_per_sample: u16) -> Option<Self> {
        matches!(bits_per_sample, 8 | 16 | 24 | 32).then_some(Self { bits_per_sample })
    }

    /// Returns bytes per sample (e.g., 2 for 16-bit audio).
    #[inline]
    pub const fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Returns bytes per interleaved sample-frame (all channels).
    #[inline]
    pub const fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * CHANNELS as usize
    }

    /// Returns the audio duration in milliseconds of `bytes` of packed PCM.
    #[inline]
    pub fn duration_ms(&self, bytes: u64) -> u64 {
        bytes / self.bytes_per_frame() as u64 * 1000 / SAMPLE_RATE as u64
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            bits_per_sample: crate::protocol_constants::DEFAULT_SAMPLE_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_odd_bit_depths() {
        assert!(SampleFormat::new(12).is_none());
        assert!(SampleFormat::new(0).is_none());
        assert!(SampleFormat::new(16).is_some());
    }

    #[test]
    fn bytes_per_frame_16bit_stereo() {
        let format = SampleFormat::new(16).unwrap();
        assert_eq!(format.bytes_per_frame(), 4);
    }

    #[test]
    fn bytes_per_frame_24bit_stereo() {
        let format = SampleFormat::new(24).unwrap();
        assert_eq!(format.bytes_per_frame(), 6);
    }

    #[test]
    fn duration_of_one_second_of_cd_audio() {
        let format = SampleFormat::new(16).unwrap();
        // 44100 frames * 4 bytes = 176400 bytes per second
        assert_eq!(format.duration_ms(176_400), 1000);
    }

    #[test]
    fn duration_truncates_partial_milliseconds() {
        let format = SampleFormat::new(16).unwrap();
        // 50ms of audio: 2205 frames * 4 bytes
        assert_eq!(format.duration_ms(2205 * 4), 50);
    }
}

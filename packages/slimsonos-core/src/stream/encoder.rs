//! Block encoder adapter over the pure-Rust `flacenc` codec.
//!
//! Hides the block-based FLAC encoder behind a byte-stream interface: packed
//! little-endian PCM goes in, compressed frame packets come out through the
//! [`FrameRing`]. The adapter owns the conversion from packed samples to the
//! encoder's native interleaved `i32` representation and the staging buffer
//! that aligns arbitrary write sizes to fixed 1024-frame encoder blocks.

use flacenc::bitsink::ByteSink;
use flacenc::component::{BitRepr, Stream};
use flacenc::config;
use flacenc::error::{Verified, Verify};
use flacenc::source::{Fill, FrameBuf};
use thiserror::Error;

use crate::protocol_constants::{CHANNELS, ENCODER_BLOCK_SAMPLES, SAMPLE_RATE};
use crate::stream::ring::FrameRing;
use crate::stream::SampleFormat;

/// Errors surfaced by the encoder adapter.
///
/// These never cross the session boundary as `Err`; the session converts
/// them to zero-length returns.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder configuration or stream parameters were rejected.
    #[error("encoder configuration rejected: {0}")]
    Config(String),

    /// The underlying codec failed while compressing a block.
    #[error("FLAC encoding failed: {0}")]
    Codec(String),

    /// The frame ring buffer did not accept the full compressed packet.
    ///
    /// This is the backpressure signal: the consumer is not draining fast
    /// enough and the whole encode call must fail upstream.
    #[error("frame ring buffer rejected write ({accepted}/{expected} bytes)")]
    RingFull { accepted: usize, expected: usize },
}

/// Wraps the `flacenc` block encoder for one stream session.
pub struct FlacBlockEncoder {
    config: Verified<config::Encoder>,
    /// Carries the STREAMINFO the per-frame encoder needs; also the source
    /// of the serialized stream header.
    stream: Stream,
    header: Vec<u8>,
    /// Interleaved samples awaiting a full encoder block.
    staging: Vec<i32>,
    framebuf: FrameBuf,
    frames_encoded: usize,
    format: SampleFormat,
}

impl FlacBlockEncoder {
    /// Creates and initializes an encoder for the given sample format.
    ///
    /// The configuration is fixed per session: stereo, 44.1kHz, the default
    /// compression effort, 1024-sample blocks, validated through flacenc's
    /// config verification layer. Note that `into_verified` checks the
    /// configuration up front; flacenc has no equivalent of libFLAC-style
    /// decode-back verification of each compressed frame as it is written.
    pub fn new(format: SampleFormat) -> Result<Self, EncodeError> {
        let channels = CHANNELS as usize;
        let bits = format.bits_per_sample as usize;

        let mut raw = config::Encoder::default();
        raw.block_size = ENCODER_BLOCK_SAMPLES;
        let config = raw
            .into_verified()
            .map_err(|e| EncodeError::Config(format!("{e:?}")))?;

        let stream = Stream::new(SAMPLE_RATE as usize, channels, bits)
            .map_err(|e| EncodeError::Config(format!("{e:?}")))?;

        let mut sink = ByteSink::new();
        stream
            .write(&mut sink)
            .map_err(|e| EncodeError::Codec(format!("{e:?}")))?;
        let header = sink.as_slice().to_vec();

        let framebuf = FrameBuf::with_size(channels, ENCODER_BLOCK_SAMPLES)
            .map_err(|e| EncodeError::Config(format!("{e:?}")))?;

        Ok(Self {
            config,
            stream,
            header,
            staging: Vec::with_capacity(ENCODER_BLOCK_SAMPLES * channels),
            framebuf,
            frames_encoded: 0,
            format,
        })
    }

    /// The serialized stream header ("fLaC" magic plus STREAMINFO).
    ///
    /// Must reach the consumer before any frame packet.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Number of FLAC frames emitted so far.
    pub fn frames_encoded(&self) -> usize {
        self.frames_encoded
    }

    /// Compresses packed little-endian PCM into `ring`.
    ///
    /// Trailing bytes short of a whole sample-frame are dropped, matching
    /// `samples = len / bytes_per_frame`. Complete 1024-frame blocks are
    /// encoded immediately; a partial tail stays staged until the next call
    /// or [`FlacBlockEncoder::finish`].
    pub fn encode(&mut self, data: &[u8], ring: &FrameRing) -> Result<(), EncodeError> {
        let usable = data.len() - data.len() % self.format.bytes_per_frame();
        push_samples(&mut self.staging, &data[..usable], self.format.bits_per_sample);

        let block_len = ENCODER_BLOCK_SAMPLES * CHANNELS as usize;
        let mut consumed = 0;
        while self.staging.len() - consumed >= block_len {
            let block = &self.staging[consumed..consumed + block_len];
            self.framebuf
                .fill_interleaved(block)
                .map_err(|e| EncodeError::Codec(format!("{e:?}")))?;
            Self::emit_frame(
                &self.config,
                &self.framebuf,
                self.frames_encoded,
                &self.stream,
                ring,
            )?;
            self.frames_encoded += 1;
            consumed += block_len;
        }
        self.staging.drain(..consumed);
        Ok(())
    }

    /// Flushes the staged partial block, if any, and consumes the encoder.
    pub fn finish(mut self, ring: &FrameRing) -> Result<(), EncodeError> {
        let channels = CHANNELS as usize;
        let frames = self.staging.len() / channels;
        if frames == 0 {
            return Ok(());
        }
        let mut tail = FrameBuf::with_size(channels, frames)
            .map_err(|e| EncodeError::Config(format!("{e:?}")))?;
        tail.fill_interleaved(&self.staging[..frames * channels])
            .map_err(|e| EncodeError::Codec(format!("{e:?}")))?;
        Self::emit_frame(&self.config, &tail, self.frames_encoded, &self.stream, ring)?;
        self.frames_encoded += 1;
        Ok(())
    }

    /// Encodes one block and forwards the compressed bytes to the ring.
    ///
    /// A short ring write fails the whole call, mirroring the codec's
    /// fatal-on-short-write callback contract.
    fn emit_frame(
        config: &Verified<config::Encoder>,
        framebuf: &FrameBuf,
        frame_number: usize,
        stream: &Stream,
        ring: &FrameRing,
    ) -> Result<(), EncodeError> {
        let frame =
            flacenc::encode_fixed_size_frame(config, framebuf, frame_number, stream.stream_info())
                .map_err(|e| EncodeError::Codec(format!("{e:?}")))?;
        let mut sink = ByteSink::new();
        frame
            .write(&mut sink)
            .map_err(|e| EncodeError::Codec(format!("{e:?}")))?;
        let bytes = sink.as_slice();
        let accepted = ring.write(bytes);
        if accepted != bytes.len() {
            return Err(EncodeError::RingFull {
                accepted,
                expected: bytes.len(),
            });
        }
        Ok(())
    }
}

/// Converts packed little-endian PCM into interleaved `i32` samples.
///
/// 8-bit is offset-128 unsigned; 16/24/32-bit are little-endian
/// sign-extended reads.
fn push_samples(staging: &mut Vec<i32>, data: &[u8], bits: u16) {
    match bits {
        8 => staging.extend(data.iter().map(|&b| b as i32 - 128)),
        16 => staging.extend(
            data.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32),
        ),
        24 => staging.extend(
            data.chunks_exact(3)
                .map(|c| (i32::from_le_bytes([c[0], c[1], c[2], 0]) << 8) >> 8),
        ),
        32 => staging.extend(
            data.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        ),
        _ => {}
    }
}

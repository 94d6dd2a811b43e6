//! Bounded ring buffer of encoded frame packets.
//!
//! Connects the encoder's write callback (producer) to the HTTP read loop
//! (consumer). Single producer, single consumer per session, so one mutex
//! over the whole structure is sufficient. Packet buffers are pooled and
//! reused to avoid a heap allocation per compressed chunk.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// One compressed chunk emitted by the encoder, queued whole and consumed
/// atomically by the reader.
#[derive(Debug)]
pub struct FramePacket {
    data: Vec<u8>,
}

impl FramePacket {
    /// Packet payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Packet payload.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

struct RingInner {
    queue: VecDeque<FramePacket>,
    pool: Vec<Vec<u8>>,
    queued_bytes: usize,
}

/// Fixed-capacity FIFO of [`FramePacket`]s.
pub struct FrameRing {
    inner: Mutex<RingInner>,
    capacity: usize,
}

impl FrameRing {
    /// Creates a ring holding at most `capacity` packets.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                queue: VecDeque::with_capacity(capacity),
                pool: Vec::new(),
                queued_bytes: 0,
            }),
            capacity,
        }
    }

    /// Appends one packet containing `bytes`.
    ///
    /// Returns the number of bytes accepted: `bytes.len()` on success, 0 when
    /// the ring is full. A short return is the backpressure signal the
    /// encoder write callback propagates upstream.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        if inner.queue.len() >= self.capacity {
            return 0;
        }
        let mut buf = inner.pool.pop().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(bytes);
        inner.queued_bytes += bytes.len();
        inner.queue.push_back(FramePacket { data: buf });
        bytes.len()
    }

    /// Removes and returns the oldest unconsumed packet, or `None` when the
    /// ring is empty.
    ///
    /// The caller owns the packet until it hands it back via
    /// [`FrameRing::release`].
    pub fn read(&self) -> Option<FramePacket> {
        let mut inner = self.inner.lock();
        let packet = inner.queue.pop_front()?;
        inner.queued_bytes -= packet.size();
        Some(packet)
    }

    /// Returns a fully consumed packet's buffer to the pool.
    pub fn release(&self, packet: FramePacket) {
        self.inner.lock().pool.push(packet.data);
    }

    /// Total unread bytes across all queued packets.
    pub fn bytes_available(&self) -> usize {
        self.inner.lock().queued_bytes
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether the ring holds no packets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all queued packets, recycling their buffers.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        while let Some(packet) = inner.queue.pop_front() {
            inner.pool.push(packet.data);
        }
        inner.queued_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_payload() {
        let ring = FrameRing::new(4);
        assert_eq!(ring.write(b"abc"), 3);
        let packet = ring.read().expect("packet queued");
        assert_eq!(packet.as_slice(), b"abc");
        assert_eq!(packet.size(), 3);
        ring.release(packet);
    }

    #[test]
    fn read_is_fifo() {
        let ring = FrameRing::new(4);
        ring.write(b"first");
        ring.write(b"second");
        assert_eq!(ring.read().unwrap().as_slice(), b"first");
        assert_eq!(ring.read().unwrap().as_slice(), b"second");
    }

    #[test]
    fn full_ring_rejects_with_zero() {
        let ring = FrameRing::new(2);
        assert_eq!(ring.write(b"a"), 1);
        assert_eq!(ring.write(b"b"), 1);
        assert_eq!(ring.write(b"c"), 0);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn bytes_available_tracks_queued_packets() {
        let ring = FrameRing::new(4);
        ring.write(b"abc");
        ring.write(b"de");
        assert_eq!(ring.bytes_available(), 5);
        let packet = ring.read().unwrap();
        assert_eq!(ring.bytes_available(), 2);
        ring.release(packet);
    }

    #[test]
    fn released_buffers_are_reused() {
        let ring = FrameRing::new(2);
        ring.write(b"xyz");
        let packet = ring.read().unwrap();
        let old_ptr = packet.as_slice().as_ptr();
        ring.release(packet);
        // Next write of equal size must come out of the pool
        ring.write(b"uvw");
        let packet = ring.read().unwrap();
        assert_eq!(packet.as_slice().as_ptr(), old_ptr);
        assert_eq!(packet.as_slice(), b"uvw");
    }

    #[test]
    fn clear_discards_everything() {
        let ring = FrameRing::new(4);
        ring.write(b"abc");
        ring.write(b"def");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.bytes_available(), 0);
        assert!(ring.read().is_none());
    }

    #[test]
    fn empty_ring_read_is_not_ready() {
        let ring = FrameRing::new(4);
        assert!(ring.read().is_none());
    }
}

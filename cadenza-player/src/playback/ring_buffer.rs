//! Fixed-capacity byte ring buffer
//!
//! Single-producer single-consumer queue between a stream's decode worker and its
//! playback consumer. The buffer does no locking of its own; the owning stream keeps it
//! behind its data lock.
//!
//! Overflow is best effort: a single write larger than the capacity keeps only the
//! trailing `capacity` bytes, and writes that outrun the reader overwrite older unread
//! bytes. The decode worker's refill threshold keeps this from happening in practice.

use tracing::trace;

/// Circular byte queue
pub struct RingBuffer {
    data: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    unread: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` bytes (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            write_pos: 0,
            read_pos: 0,
            unread: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet read
    ///
    /// May exceed [`capacity`](Self::capacity) if the producer outran the consumer.
    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn is_empty(&self) -> bool {
        self.unread == 0
    }

    /// Append bytes
    ///
    /// The unread count grows by the full length of `bytes`, even when the payload was
    /// trimmed to the capacity.
    pub fn write(&mut self, bytes: &[u8]) {
        let total = bytes.len();
        if total == 0 {
            return;
        }

        let size = self.data.len();
        let payload = if total > size {
            trace!("Ring buffer write of {} bytes trimmed to {}", total, size);
            &bytes[total - size..]
        } else {
            bytes
        };

        let first = payload.len().min(size - self.write_pos);
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&payload[..first]);
        let rest = payload.len() - first;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&payload[first..]);
        }

        self.write_pos = (self.write_pos + payload.len()) % size;
        self.unread += total;
    }

    /// Read up to `dest.len()` bytes, returning how many were copied
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        if self.unread == 0 {
            return 0;
        }

        let size = self.data.len();
        // Reads never span more than one lap of storage, even after an overrun
        let len = dest.len().min(self.unread).min(size);

        let first = len.min(size - self.read_pos);
        dest[..first].copy_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        let rest = len - first;
        if rest > 0 {
            dest[first..len].copy_from_slice(&self.data[..rest]);
        }

        self.read_pos = (self.read_pos + len) % size;
        self.unread -= len;
        len
    }

    /// Discard all buffered bytes without erasing storage
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.unread = 0;
    }
}

use core::cmp::min;
use managed::ManagedSlice;

use super::{Empty, Full, RingBuffer};

/// Per-packet metadata kept alongside its payload in a [`PacketBuffer`].
///
/// `T` is typically an endpoint/address type (e.g. `IpEndpoint` for UDP, or
/// `()` for protocols with no per-datagram addressing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMetadata<T> {
    size: usize,
    metadata: Option<T>,
}

impl<T> PacketMetadata<T> {
    /// Empty packet description.
    pub const EMPTY: PacketMetadata<T> = PacketMetadata {
        size: 0,
        metadata: None,
    };

    fn padding(size: usize) -> PacketMetadata<T> {
        PacketMetadata {
            size,
            metadata: None,
        }
    }

    fn packet(size: usize, metadata: T) -> PacketMetadata<T> {
        PacketMetadata {
            size,
            metadata: Some(metadata),
        }
    }

    fn is_padding(&self) -> bool {
        self.metadata.is_none()
    }
}

/// A queue of discrete, length-delimited packets, each with some associated
/// metadata, backed by two ring buffers: one for metadata entries, one for
/// the raw payload octets. This is the datagram analogue of [`RingBuffer`]
/// and backs every UDP/raw/ICMP socket's send and receive queues.
#[derive(Debug)]
pub struct PacketBuffer<'a, H> {
    metadata_ring: RingBuffer<'a, PacketMetadata<H>>,
    payload_ring: RingBuffer<'a, u8>,
}

impl<'a, H> PacketBuffer<'a, H> {
    /// Create a new packet buffer with the given metadata and payload
    /// storage.
    pub fn new<MS, PS>(metadata_storage: MS, payload_storage: PS) -> PacketBuffer<'a, H>
    where
        MS: Into<ManagedSlice<'a, PacketMetadata<H>>>,
        PS: Into<ManagedSlice<'a, u8>>,
    {
        PacketBuffer {
            metadata_ring: RingBuffer::new(metadata_storage),
            payload_ring: RingBuffer::new(payload_storage),
        }
    }

    /// Clear the packet buffer.
    pub fn reset(&mut self) {
        self.metadata_ring.clear();
        self.payload_ring.clear();
    }

    /// Return the maximum number payload octets the buffer can hold.
    pub fn payload_capacity(&self) -> usize {
        self.payload_ring.capacity()
    }

    /// Return the maximum number of packets the buffer can hold.
    pub fn packet_capacity(&self) -> usize {
        self.metadata_ring.capacity()
    }

    /// Query whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.metadata_ring.is_empty()
    }

    /// Query whether the buffer is full (either metadata slots or payload
    /// space exhausted).
    pub fn is_full(&self) -> bool {
        self.metadata_ring.is_full() || self.payload_ring.is_full()
    }

    fn payload_window(&self) -> usize {
        self.payload_ring.window()
    }

    /// Enqueue a new packet with up to `max_size` payload octets, calling
    /// `f` with the contiguous payload slice actually available (which may
    /// be smaller than `max_size` if the ring has wrapped), and tag it with
    /// `metadata`.
    pub fn enqueue_with_infallible<F>(
        &mut self,
        max_size: usize,
        metadata: H,
        f: F,
    ) -> Result<usize, Full>
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        if self.metadata_ring.is_full() {
            return Err(Full);
        }
        let size = min(max_size, self.payload_window());
        if size == 0 && max_size != 0 {
            return Err(Full);
        }

        let (written, _) = self.payload_ring.enqueue_many_with(|buf| {
            let n = f(&mut buf[..min(size, buf.len())]);
            (n, ())
        });

        self.metadata_ring
            .enqueue_one_with(|md| *md = PacketMetadata::packet(written, metadata))?;
        Ok(written)
    }

    /// Enqueue a packet whose payload is exactly `data`, copying it into the
    /// buffer.
    pub fn enqueue_slice(&mut self, data: &[u8], metadata: H) -> Result<(), Full> {
        if self.metadata_ring.is_full() || data.len() > self.payload_window() {
            return Err(Full);
        }
        let mut offset = 0;
        while offset < data.len() {
            let chunk = self.payload_ring.enqueue_many(data.len() - offset);
            if chunk.is_empty() {
                break;
            }
            chunk.copy_from_slice(&data[offset..offset + chunk.len()]);
            offset += chunk.len();
        }
        self.metadata_ring
            .enqueue_one_with(|md| *md = PacketMetadata::packet(data.len(), metadata))?;
        Ok(())
    }

    /// Dequeue the oldest packet and return `(metadata, payload)`.
    pub fn dequeue(&mut self) -> Result<(H, &[u8]), Empty> {
        loop {
            let peek_meta = *self.metadata_ring.dequeue_one()?;
            if peek_meta.is_padding() {
                self.payload_ring.dequeue_many(peek_meta.size);
                continue;
            }
            let data = self.payload_ring.dequeue_many(peek_meta.size);
            return Ok((peek_meta.metadata.unwrap(), data));
        }
    }

    /// Peek at the oldest packet without consuming it.
    pub fn peek(&self) -> Result<(&H, &[u8]), Empty> {
        if self.metadata_ring.is_empty() {
            return Err(Empty);
        }
        let meta = &self.metadata_ring[0];
        let data = self.payload_ring.get_allocated(0, meta.size);
        Ok((meta.metadata.as_ref().unwrap(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> PacketBuffer<'static, u32> {
        PacketBuffer::new(vec![PacketMetadata::EMPTY; 4], vec![0u8; 16])
    }

    #[test]
    fn enqueue_dequeue_preserves_metadata_and_payload() {
        let mut pb = buffer();
        pb.enqueue_slice(b"hello", 7).unwrap();
        pb.enqueue_slice(b"world!", 9).unwrap();
        let (meta, data) = pb.dequeue().unwrap();
        assert_eq!(meta, 7);
        assert_eq!(data, b"hello");
        let (meta, data) = pb.dequeue().unwrap();
        assert_eq!(meta, 9);
        assert_eq!(data, b"world!");
        assert!(pb.dequeue().is_err());
    }

    #[test]
    fn full_when_payload_exhausted() {
        let mut pb = buffer();
        assert!(pb.enqueue_slice(&[0u8; 17], 1).is_err());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut pb = buffer();
        pb.enqueue_slice(b"abc", 1).unwrap();
        let (meta, data) = pb.peek().unwrap();
        assert_eq!(*meta, 1);
        assert_eq!(data, b"abc");
        assert!(!pb.is_empty());
    }
}

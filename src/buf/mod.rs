//! Owned byte buffers used as the universal payload container.

use std::ops::{Deref, DerefMut};

/// An owned, contiguous, cheaply movable sequence of bytes.
///
/// `DataBuffer` is the payload type passed across every boundary in this
/// crate: AT command bodies, socket sends/receives, safe-stream chunks. It
/// is a thin `Vec<u8>` wrapper rather than a bare `Vec<u8>` so call sites
/// read as domain types instead of generic containers, matching how the
/// teacher wraps raw buffers at its own I/O boundaries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataBuffer {
    bytes: Vec<u8>,
}

impl DataBuffer {
    pub fn new() -> DataBuffer {
        DataBuffer { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> DataBuffer {
        DataBuffer {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> DataBuffer {
        DataBuffer { bytes }
    }

    pub fn as_span(&self) -> Span<'_> {
        Span { bytes: &self.bytes }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn extend_from_span(&mut self, span: Span<'_>) {
        self.bytes.extend_from_slice(span.bytes);
    }
}

impl From<Vec<u8>> for DataBuffer {
    fn from(bytes: Vec<u8>) -> DataBuffer {
        DataBuffer { bytes }
    }
}

impl From<&[u8]> for DataBuffer {
    fn from(bytes: &[u8]) -> DataBuffer {
        DataBuffer { bytes: bytes.to_vec() }
    }
}

impl Deref for DataBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for DataBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// A non-owning view into a byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    bytes: &'a [u8],
}

impl<'a> Span<'a> {
    pub fn new(bytes: &'a [u8]) -> Span<'a> {
        Span { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<'a> From<&'a [u8]> for Span<'a> {
    fn from(bytes: &'a [u8]) -> Span<'a> {
        Span { bytes }
    }
}

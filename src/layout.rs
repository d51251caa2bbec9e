//! Byte layout of a shared region.
//!
//! ```text
//! offset 0                              payload_byte_length
//! | f64 | f64 | ... | f64 (buffer_size) | u32 sync word |
//! ```
//!
//! The payload length is always a multiple of 8, so the sync word that follows
//! it is naturally 4-byte aligned. There is no padding after the sync word.

use std::mem::{align_of, size_of};

use crate::error::{HandoffError, Result};

/// Bytes per payload element.
pub const PAYLOAD_ELEMENT_BYTES: usize = size_of::<f64>();

/// Bytes of the synchronization word.
pub const SYNC_WORD_BYTES: usize = size_of::<u32>();

/// Sync word value before the engine has published.
pub const NOT_DONE: u32 = 0;

/// Sync word value once the engine has published. Never reverts.
pub const DONE: u32 = 1;

/// Alignment of the region base pointer.
pub(crate) const REGION_ALIGN: usize = if align_of::<f64>() > align_of::<u32>() {
    align_of::<f64>()
} else {
    align_of::<u32>()
};

const _: () = {
    assert!(PAYLOAD_ELEMENT_BYTES == 8);
    assert!(SYNC_WORD_BYTES == 4);
    assert!(PAYLOAD_ELEMENT_BYTES % align_of::<u32>() == 0);
};

/// Offsets and lengths derived from an element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionLayout {
    buffer_size: usize,
    payload_byte_length: usize,
    flag_byte_offset: usize,
    total_byte_length: usize,
}

impl RegionLayout {
    /// Computes the layout for `buffer_size` elements, or `None` if the total
    /// byte length is not representable.
    pub const fn checked(buffer_size: usize) -> Option<Self> {
        let Some(payload_byte_length) = buffer_size.checked_mul(PAYLOAD_ELEMENT_BYTES) else {
            return None;
        };
        let Some(total_byte_length) = payload_byte_length.checked_add(SYNC_WORD_BYTES) else {
            return None;
        };
        Some(Self {
            buffer_size,
            payload_byte_length,
            flag_byte_offset: payload_byte_length,
            total_byte_length,
        })
    }

    /// Like [`RegionLayout::checked`], reporting overflow as an error.
    pub fn new(buffer_size: usize) -> Result<Self> {
        Self::checked(buffer_size).ok_or(HandoffError::SizeOverflow { buffer_size })
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[inline]
    pub fn payload_byte_length(&self) -> usize {
        self.payload_byte_length
    }

    #[inline]
    pub fn flag_byte_offset(&self) -> usize {
        self.flag_byte_offset
    }

    #[inline]
    pub fn total_byte_length(&self) -> usize {
        self.total_byte_length
    }
}

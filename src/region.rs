//! The shared region: one allocation holding the payload and the sync word.
//!
//! ## Access rules
//!
//! - The sync word is only touched through [`AtomicU32`].
//! - The payload is written with plain stores by exactly one `PayloadWriter`,
//!   which the engine obtains by claiming the region with `SharedRegion::lend`.
//! - The payload is read with plain loads only through [`CompletedPayload`],
//!   which can only be obtained after an `Acquire` load has observed [`DONE`].
//!
//! The writer publishes with a `Release` store of [`DONE`], so every payload
//! store happens-before any read made through a [`CompletedPayload`].

use std::{
    alloc::{self, Layout},
    fmt,
    ptr::NonNull,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use tracing::debug;

use crate::{
    error::{HandoffError, Result},
    layout::{DONE, NOT_DONE, REGION_ALIGN, RegionLayout},
    wait,
};

/// Reference to a region as it crosses the control channel. Cloning it never
/// copies the payload.
pub type RegionHandle = Arc<SharedRegion>;

/// A fixed-size block of memory shared by the controller and the engine.
pub struct SharedRegion {
    /// Base of the allocation, aligned to `REGION_ALIGN`.
    base: NonNull<u8>,

    /// Offsets of the payload and sync word inside the allocation.
    layout: RegionLayout,

    /// Layout handed to the global allocator; needed again on drop.
    alloc_layout: Layout,

    /// Set once the region has been handed to an engine.
    lent: AtomicBool,
}

// SAFETY: SharedRegion is safe to share between threads because:
// 1. The sync word is only accessed atomically
// 2. The payload is written by the single PayloadWriter handed out by `lend`
// 3. Payload reads are gated on an Acquire load observing DONE, which the writer
//    stores with Release after its last payload write
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocates a zero-filled region for `buffer_size` elements with the sync
    /// word set to [`NOT_DONE`].
    ///
    /// # Errors
    ///
    /// [`HandoffError::SizeOverflow`] if the byte length is not representable,
    /// [`HandoffError::Allocation`] if the allocator cannot satisfy the request.
    pub fn allocate(buffer_size: usize) -> Result<RegionHandle> {
        let layout = RegionLayout::new(buffer_size)?;
        let bytes = layout.total_byte_length();
        let alloc_layout = Layout::from_size_align(bytes, REGION_ALIGN)
            .map_err(|_| HandoffError::Allocation { bytes })?;

        // SAFETY: `alloc_layout` has a non-zero size (at least the sync word).
        let ptr = unsafe { alloc::alloc_zeroed(alloc_layout) };
        let base = NonNull::new(ptr).ok_or(HandoffError::Allocation { bytes })?;

        let region = SharedRegion {
            base,
            layout,
            alloc_layout,
            lent: AtomicBool::new(false),
        };
        region.sync_word().store(NOT_DONE, Ordering::Release);

        debug!(buffer_size, bytes, "allocated shared region");
        Ok(Arc::new(region))
    }

    #[inline]
    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Number of payload elements.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.layout.buffer_size()
    }

    /// Total byte length: `buffer_size * 8 + 4`.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.layout.total_byte_length()
    }

    /// `Acquire` load of the raw sync word value.
    #[inline]
    pub fn sync_word_value(&self) -> u32 {
        self.sync_word().load(Ordering::Acquire)
    }

    /// The synchronization word. Only the payload writer stores to it.
    #[inline]
    pub(crate) fn sync_word(&self) -> &AtomicU32 {
        // SAFETY: the flag offset is in bounds and 4-byte aligned (the payload
        // length is a multiple of 8 and the base is at least 8-aligned). The
        // word is never accessed non-atomically.
        unsafe {
            &*(self
                .base
                .as_ptr()
                .add(self.layout.flag_byte_offset())
                .cast::<AtomicU32>())
        }
    }

    /// `Acquire` load of the sync word.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.sync_word_value() == DONE
    }

    /// Returns read access to the payload once the sync word reads [`DONE`].
    pub fn completed(&self) -> Option<CompletedPayload<'_>> {
        if self.is_done() {
            Some(CompletedPayload { region: self })
        } else {
            None
        }
    }

    /// Blocks the calling thread until the engine publishes or `timeout`
    /// elapses. Returns whether the region is done.
    pub fn wait_done(&self, timeout: Option<Duration>) -> bool {
        wait::wait_while(self.sync_word(), NOT_DONE, timeout)
    }

    /// Whether an engine has already claimed this region.
    #[inline]
    pub fn is_lent(&self) -> bool {
        self.lent.load(Ordering::Acquire)
    }

    /// Claims exclusive write access to the payload. Succeeds at most once per
    /// region.
    pub(crate) fn lend(&self) -> Option<PayloadWriter<'_>> {
        if self.lent.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(PayloadWriter { region: self })
    }

    #[inline]
    fn payload_ptr(&self) -> *mut f64 {
        self.base.as_ptr().cast::<f64>()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: `base` was returned by `alloc_zeroed` with `alloc_layout`.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.alloc_layout) }
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("buffer_size", &self.buffer_size())
            .field("byte_len", &self.byte_len())
            .field("lent", &self.is_lent())
            .field("done", &self.is_done())
            .finish()
    }
}

/// Exclusive write access to a region's payload, held by the engine for the
/// duration of one run.
pub(crate) struct PayloadWriter<'a> {
    region: &'a SharedRegion,
}

impl<'a> PayloadWriter<'a> {
    /// The full payload segment.
    #[inline]
    pub(crate) fn payload_mut(&mut self) -> &mut [f64] {
        // SAFETY: this is the only writer (see `lend`), no reader can exist
        // before DONE is stored, and DONE is only stored by `publish`, which
        // consumes the writer. The payload does not overlap the sync word.
        unsafe {
            std::slice::from_raw_parts_mut(self.region.payload_ptr(), self.region.buffer_size())
        }
    }

    /// Stores [`DONE`] with `Release` ordering and wakes any blocked waiter.
    pub(crate) fn publish(self) {
        let word = self.region.sync_word();
        word.store(DONE, Ordering::Release);
        wait::wake_all(word);
    }
}

/// Read access to a payload that has been published.
#[derive(Clone, Copy)]
pub struct CompletedPayload<'a> {
    region: &'a SharedRegion,
}

impl<'a> CompletedPayload<'a> {
    /// The final payload values, read in place.
    #[inline]
    pub fn as_slice(&self) -> &'a [f64] {
        // SAFETY: DONE was observed with Acquire, the writer was consumed by
        // `publish`, and no further writer can be created for this region.
        unsafe { std::slice::from_raw_parts(self.region.payload_ptr(), self.region.buffer_size()) }
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<f64> {
        self.as_slice().to_vec()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.region.buffer_size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use cubecl_core::prelude::*;
use cubecl_runtime::server::Handle;

use crate::PrimitivesError;

/// Caller-provided scratch for the two-call protocol.
///
/// Query the required size first, then call again with a device buffer of
/// at least that size:
///
/// ```rust,ignore
/// let mut bytes = 0;
/// inclusive_scan::<R, u32, Sum>(&client, TempStorage::SizeQuery(&mut bytes), &input, &output, false)?;
/// let scratch = client.empty(bytes);
/// inclusive_scan::<R, u32, Sum>(&client, TempStorage::Device(&scratch), &input, &output, false)?;
/// ```
///
/// A size query never enqueues work and never reports zero. Passing an
/// undersized buffer is undefined behavior and is not validated.
#[derive(Debug)]
pub enum TempStorage<'a> {
    SizeQuery(&'a mut usize),
    Device(&'a Handle),
}

impl<'a> TempStorage<'a> {
    /// Answer a size query with the layout total, or hand back the device
    /// arena. Undersized scratch is undefined behavior and unvalidated in
    /// release builds; debug builds catch the one unmistakable contract
    /// violation, a buffer smaller than the sentinel every query reports.
    pub(crate) fn resolve(
        self,
        layout: &TempStorageLayout,
    ) -> Result<Option<&'a Handle>, PrimitivesError> {
        match self {
            TempStorage::SizeQuery(bytes) => {
                *bytes = layout.total_bytes();
                Ok(None)
            }
            TempStorage::Device(handle) => {
                if cfg!(debug_assertions) && (handle.size() as usize) < MIN_SCRATCH_BYTES {
                    return Err(PrimitivesError::ZeroSizedScratch);
                }
                Ok(Some(handle))
            }
        }
    }
}

/// Reported by size queries even when an operation needs no scratch, so a
/// caller can never be tricked into allocating an empty buffer and passing
/// it back as if it were a null query.
pub(crate) const MIN_SCRATCH_BYTES: usize = 4;

/// One reserved region of the scratch arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    offset: usize,
    bytes: usize,
}

impl Slot {
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Sub-slice the arena handle at this slot's offset. The slot length is
    /// enforced by the tensor shape handed to the kernel, not the handle.
    pub fn slice(&self, arena: &Handle) -> Handle {
        arena.clone().offset_start(self.offset as u64)
    }
}

/// Append-only arena layout. Both the sizing call and the work call build
/// the same layout from the same inputs, so offsets can never disagree with
/// the reported size. Slots are reserved in documented prefix order:
/// look-back state, ordered-cube-id counter, per-batch records, ping-pong
/// buffers, block prefixes.
#[derive(Debug, Default)]
pub(crate) struct TempStorageLayout {
    cursor: usize,
}

impl TempStorageLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, bytes: usize, align: usize) -> Slot {
        let offset = self.cursor.next_multiple_of(align);
        self.cursor = offset + bytes;
        Slot { offset, bytes }
    }

    pub fn total_bytes(&self) -> usize {
        self.cursor.max(MIN_SCRATCH_BYTES)
    }
}

/// A typed 1-D view over an arena slot, owning the sliced handle and the
/// shape/stride storage a [`TensorHandleRef`] borrows.
#[derive(Debug)]
pub(crate) struct ScratchView {
    handle: Handle,
    strides: [usize; 1],
    shape: [usize; 1],
    elem_size: usize,
}

impl ScratchView {
    /// View over a whole caller-owned handle, e.g. a double-buffer half.
    pub fn from_parts(handle: Handle, len: usize, elem_size: usize) -> Self {
        Self {
            handle,
            strides: [1],
            shape: [len],
            elem_size,
        }
    }

    pub fn new(arena: &Handle, slot: Slot, len: usize, elem_size: usize) -> Self {
        debug_assert!(len * elem_size <= slot.bytes());
        Self {
            handle: slot.slice(arena),
            strides: [1],
            shape: [len],
            elem_size,
        }
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn as_ref<R: Runtime>(&self) -> TensorHandleRef<'_, R> {
        unsafe {
            TensorHandleRef::from_raw_parts(&self.handle, &self.strides, &self.shape, self.elem_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layout_reports_sentinel() {
        let layout = TempStorageLayout::new();
        assert_eq!(layout.total_bytes(), MIN_SCRATCH_BYTES);
    }

    #[test]
    fn slots_are_aligned_and_ordered() {
        let mut layout = TempStorageLayout::new();
        let a = layout.reserve(10, 8);
        let b = layout.reserve(4, 4);
        let c = layout.reserve(16, 8);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 12);
        assert_eq!(c.offset, 16);
        assert_eq!(layout.total_bytes(), 32);
    }

    #[test]
    fn size_query_resolves_to_layout_total() {
        let mut layout = TempStorageLayout::new();
        layout.reserve(100, 8);
        let mut bytes = 0;
        let arena = TempStorage::SizeQuery(&mut bytes).resolve(&layout).unwrap();
        assert!(arena.is_none());
        assert_eq!(bytes, 100);
    }

    #[test]
    fn identical_builds_agree() {
        let build = || {
            let mut layout = TempStorageLayout::new();
            let state = layout.reserve(33 * 8, 8);
            let ticket = layout.reserve(4, 4);
            (state, ticket, layout.total_bytes())
        };
        assert_eq!(build(), build());
    }
}

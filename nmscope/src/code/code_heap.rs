//! Code heap and blob lookup
//!
//! The code heap is carved into fixed-size segments. A parallel segment map
//! holds one byte per segment: `0xFF` for segments outside any block, `0`
//! for the first segment of a block, and otherwise a back-distance towards
//! the block start. Following the back-distances from any segment of a block
//! reaches its header in a handful of hops, however long the block is.

use log::debug;
use nmscope_common::SEGMAP_FREE_SENTINEL;

use super::blob::CodeBlob;
use crate::domain::{Address, InspectError, MemoryRange};
use crate::memory::TargetView;

/// Header of one code heap block
#[derive(Debug, Clone, Copy)]
pub struct HeapBlock {
    address: Address,
    used: bool,
}

impl HeapBlock {
    /// # Errors
    /// Returns an error if the header is not in the image
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let used = view.read_u8(view.field_addr(address, view.layout().heap_block.used)?)? != 0;
        Ok(Self { address, used })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        !self.used
    }

    /// Where the block's payload (the blob) begins
    ///
    /// # Errors
    /// Returns [`InspectError::Malformed`] if the address overflows
    pub fn allocated_space(&self, view: &TargetView<'_>) -> Result<Address, InspectError> {
        view.field_addr(self.address, view.layout().heap_block.size)
    }
}

/// A code heap: reserved memory plus its segment map
#[derive(Debug, Clone)]
pub struct CodeHeap {
    address: Address,
    memory: MemoryRange,
    segmap: MemoryRange,
    log2_segment_size: u32,
}

impl CodeHeap {
    /// Read the code heap structure at `address`
    ///
    /// # Errors
    /// Returns an error if the structure is not in the image or its bounds are
    /// inconsistent
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let layout = view.layout();
        let space = |field: u64| -> Result<MemoryRange, InspectError> {
            let base = view.field_addr(address, field)?;
            let low = view.read_ptr(view.field_addr(base, layout.virtual_space.low)?)?;
            let high = view.read_ptr(view.field_addr(base, layout.virtual_space.high)?)?;
            if high.0 < low.0 {
                return Err(InspectError::malformed("virtual space", base.0));
            }
            Ok(MemoryRange { start: low.0, end: high.0 })
        };

        let memory = space(layout.code_heap.memory)?;
        let segmap = space(layout.code_heap.segmap)?;
        let log2 = view.read_i32(view.field_addr(address, layout.code_heap.log2_segment_size)?)?;
        let log2_segment_size = u32::try_from(log2)
            .ok()
            .filter(|&v| v < u64::BITS)
            .ok_or(InspectError::malformed("segment size", address.0))?;

        debug!("Code heap {address}: memory {memory}, segmap {segmap}, segment size {}", 1u64 << log2_segment_size);
        Ok(Self { address, memory, segmap, log2_segment_size })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The `[low, high)` range blobs are allocated from
    #[must_use]
    pub fn memory(&self) -> MemoryRange {
        self.memory
    }

    #[must_use]
    pub fn contains(&self, p: Address) -> bool {
        self.memory.contains(p.0)
    }

    /// Segment index of `p`, if `p` is inside the heap
    #[must_use]
    pub fn segment_for(&self, p: Address) -> Option<u64> {
        self.contains(p).then(|| (p.0 - self.memory.start) >> self.log2_segment_size)
    }

    fn segmap_byte(&self, view: &TargetView<'_>, segment: u64) -> Result<u8, InspectError> {
        if segment >= self.segmap.len() {
            return Err(InspectError::malformed("segment map index", self.segmap.start));
        }
        view.read_u8(Address(self.segmap.start + segment))
    }

    /// Header of the block starting at `segment`
    ///
    /// # Errors
    /// Returns an error if the header is not in the image
    pub fn block_at(&self, view: &TargetView<'_>, segment: u64) -> Result<HeapBlock, InspectError> {
        let addr = segment
            .checked_shl(self.log2_segment_size)
            .and_then(|off| Address(self.memory.start).checked_add(off))
            .ok_or(InspectError::malformed("segment index", self.address.0))?;
        HeapBlock::read(view, addr)
    }

    /// Start of the allocated block containing `p`
    ///
    /// Returns `Ok(None)` when `p` is outside the heap, in an unused segment,
    /// or in a free block.
    ///
    /// # Errors
    /// Returns [`InspectError::Malformed`] if the back-distance chain leaves
    /// the segment map
    pub fn find_start(&self, view: &TargetView<'_>, p: Address) -> Result<Option<Address>, InspectError> {
        let Some(mut segment) = self.segment_for(p) else {
            return Ok(None);
        };
        let mut distance = self.segmap_byte(view, segment)?;
        if distance == SEGMAP_FREE_SENTINEL {
            return Ok(None);
        }
        while distance > 0 {
            segment = segment
                .checked_sub(u64::from(distance))
                .ok_or(InspectError::malformed("segment map chain", self.segmap.start))?;
            distance = self.segmap_byte(view, segment)?;
        }

        let block = self.block_at(view, segment)?;
        if block.is_free() {
            debug!("{p} is in free block {}", block.address());
            return Ok(None);
        }
        block.allocated_space(view).map(Some)
    }

    /// The blob whose `[header_begin, data_end)` contains `p`
    ///
    /// # Errors
    /// Returns an error if the segment map or blob header is malformed
    pub fn find_blob(&self, view: &TargetView<'_>, p: Address) -> Result<Option<CodeBlob>, InspectError> {
        let Some(start) = self.find_start(view, p)? else {
            return Ok(None);
        };
        let blob = CodeBlob::read(view, start)?;
        if !blob.contains(p) {
            debug!("{p} is in block of blob {} but past its end {}", start, blob.data_end());
            return Ok(None);
        }
        Ok(Some(blob))
    }
}

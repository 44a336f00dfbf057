//! # Memory Image Access
//!
//! Everything the decoder knows about the target comes through the
//! [`MemoryReader`] trait: random-access reads of `length` bytes at an
//! absolute address. The decoder never writes, and never assumes two reads
//! observe the same moment in time unless the image is a frozen snapshot.
//!
//! ## Implementations
//!
//! - `[u8]`: a raw buffer where the address is the byte index. Handy for
//!   decoding a detached byte stream (e.g. a copied line-number table).
//! - [`SnapshotImage`]: a set of non-overlapping regions captured from a
//!   target, loaded from a JSON manifest or an ELF core file.
//!
//! ## Typed Reads
//!
//! [`TargetView`] pairs a reader with the resolved [`Layout`](crate::layout::Layout)
//! and performs endian- and pointer-size-aware reads of individual fields.

pub mod snapshot;
pub mod view;

use std::borrow::Cow;

use crate::domain::{InspectError, MemoryRange};

pub use snapshot::{parse_address, Snapshot, SnapshotImage};
pub use view::TargetView;

/// Random-access, read-only byte source
///
/// Every read is bounds checked; a read that is not fully backed by the image
/// fails with [`InspectError::Unmapped`] rather than returning short data.
/// Implementors are `Sync` so one image can back lookups on many threads.
pub trait MemoryReader: Sync {
    /// Read exactly `length` bytes starting at `address`
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if any byte of the range is missing
    fn read(&self, address: u64, length: usize) -> Result<Cow<'_, [u8]>, InspectError>;

    /// Read a single byte
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the byte is missing
    fn read_u8(&self, address: u64) -> Result<u8, InspectError> {
        let bytes = self.read(address, 1)?;
        bytes.first().copied().ok_or(InspectError::Unmapped { address, length: 1 })
    }
}

/// Restricts another reader to one address range
///
/// Used to keep a decoder inside the record it belongs to: a stream that
/// wanders past the end of its blob fails instead of reading a neighbour.
pub struct Bounded<'a> {
    inner: &'a dyn MemoryReader,
    range: MemoryRange,
}

impl<'a> Bounded<'a> {
    pub fn new(inner: &'a dyn MemoryReader, range: MemoryRange) -> Self {
        Self { inner, range }
    }
}

impl MemoryReader for Bounded<'_> {
    fn read(&self, address: u64, length: usize) -> Result<Cow<'_, [u8]>, InspectError> {
        let end = address.checked_add(length as u64);
        let inside = self.range.contains(address) && end.is_some_and(|e| e <= self.range.end);
        if !inside {
            return Err(InspectError::Unmapped { address, length });
        }
        self.inner.read(address, length)
    }
}

impl MemoryReader for [u8] {
    fn read(&self, address: u64, length: usize) -> Result<Cow<'_, [u8]>, InspectError> {
        usize::try_from(address)
            .ok()
            .and_then(|start| start.checked_add(length).map(|end| start..end))
            .and_then(|range| self.get(range))
            .map(Cow::Borrowed)
            .ok_or(InspectError::Unmapped { address, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_reader_in_bounds() {
        let buf: &[u8] = &[1, 2, 3, 4];
        assert_eq!(&*buf.read(1, 2).unwrap(), &[2, 3]);
        assert_eq!(buf.read_u8(3).unwrap(), 4);
    }

    #[test]
    fn test_slice_reader_out_of_bounds() {
        let buf: &[u8] = &[1, 2, 3, 4];
        assert!(matches!(buf.read(3, 2), Err(InspectError::Unmapped { address: 3, length: 2 })));
        assert!(buf.read_u8(4).is_err());
        assert!(buf.read(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_bounded_reader_clips_range() {
        let mut image = SnapshotImage::new();
        image.add_region(0x100, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let bounded = Bounded::new(&image, MemoryRange { start: 0x102, end: 0x104 });

        assert_eq!(&*bounded.read(0x102, 2).unwrap(), &[3, 4]);
        assert!(bounded.read(0x101, 1).is_err());
        assert!(bounded.read(0x103, 2).is_err());
        assert!(bounded.read_u8(0x104).is_err());
    }
}

//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep absolute target addresses apart from the
//! many relative offsets and indices that flow through the decoder.

use std::fmt;

/// Absolute address in the inspected target's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl Address {
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes past this one, or `None` on overflow
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Address> {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance from `base` to this address, or `None` if this address lies before `base`
    #[must_use]
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Half-open address range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x}, 0x{:x})", self.start, self.end)
    }
}

/// Bytecode index within a method
///
/// May be negative: `-1` is the invocation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bci(pub i32);

impl Bci {
    pub const INVOCATION_ENTRY: Bci = Bci(nmscope_common::INVOCATION_ENTRY_BCI);
}

impl fmt::Display for Bci {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bci{}", self.0)
    }
}

/// Source line number, or unknown
///
/// Mirrors the producer's convention where `-1` means "no line".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLine(pub i32);

impl SourceLine {
    pub const UNKNOWN: SourceLine = SourceLine(nmscope_common::UNKNOWN_LINE);

    #[must_use]
    pub fn is_known(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "L{}", self.0)
        } else {
            write!(f, "L?")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert_eq!(range.len(), 0x1000);
    }

    #[test]
    fn test_address_offset_from() {
        assert_eq!(Address(0x1010).offset_from(Address(0x1000)), Some(0x10));
        assert_eq!(Address(0x0FFF).offset_from(Address(0x1000)), None);
        assert_eq!(Address(0xdead).to_string(), "0x000000000000dead");
    }

    #[test]
    fn test_source_line_unknown() {
        assert!(!SourceLine::UNKNOWN.is_known());
        assert_eq!(SourceLine::UNKNOWN.to_string(), "L?");
        assert_eq!(SourceLine(42).to_string(), "L42");
    }
}

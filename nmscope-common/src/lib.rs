//! # Shared Encoding Constants (JIT Producer ↔ Decoder)
//!
//! Defines the constants that the code producer bakes into compiled-method
//! records and that the decoder must agree with bit for bit. Nothing here is
//! configurable: a mismatch means the decoder is reading a different format.
//!
//! ## Key Groups
//!
//! - Compressed integer codec parameters ([`LG_H`], [`H`], [`L`], [`MAX_I`])
//! - Line-number table markers ([`LINE_TABLE_TERMINATOR`], [`LINE_TABLE_ESCAPE`])
//! - Descriptor table limits ([`UPPER_OFFSET_LIMIT`], [`PC_DESC_CACHE_SIZE`])
//! - Code heap segment map ([`SEGMAP_FREE_SENTINEL`])

#![no_std]

// ============================================================================
// Compressed Integer Codec
// ============================================================================

/// Bits per encoded byte
pub const BITS_PER_BYTE: u32 = 8;

/// log2 of the follow-byte radix
pub const LG_H: u32 = 6;

/// Radix of each follow byte (64)
pub const H: u32 = 1 << LG_H;

/// Bytes below this value terminate an encoded integer (192)
///
/// Values `L..=255` are "high codes" that announce another byte follows.
pub const L: u32 = (1 << BITS_PER_BYTE) - H;

/// Maximum number of follow bytes after the first one
///
/// Every encoded integer therefore occupies at most `1 + MAX_I` = 5 bytes.
pub const MAX_I: u32 = 4;

// ============================================================================
// Line-Number Table
// ============================================================================

/// Ends a compressed line-number table
pub const LINE_TABLE_TERMINATOR: u8 = 0x00;

/// Introduces a pair of signed compressed deltas `(bci, line)`
pub const LINE_TABLE_ESCAPE: u8 = 0xFF;

/// Width of the bci delta in a single-byte pair (the remaining bits carry the line delta)
pub const LINE_TABLE_BCI_SHIFT: u32 = 3;

/// Mask for the line delta in a single-byte pair
pub const LINE_TABLE_LINE_MASK: u8 = 0x7;

/// Line number reported when no table entry applies
pub const UNKNOWN_LINE: i32 = -1;

// ============================================================================
// Bytecode Indices
// ============================================================================

/// Bytecode index of a method's invocation entry
///
/// Stored bcis in debug info are biased by this value so that the entry
/// encodes as `0`.
pub const INVOCATION_ENTRY_BCI: i32 = -1;

// ============================================================================
// Descriptor (PcDesc) Table
// ============================================================================

/// Instruction offsets at or beyond this value are out of range
pub const UPPER_OFFSET_LIMIT: u64 = (u32::MAX >> 1) as u64;

/// Number of slots in the producer-owned descriptor cache array
pub const PC_DESC_CACHE_SIZE: usize = 4;

/// Payload offset meaning "no scope information"
pub const SERIALIZED_NULL: u32 = 0;

// ============================================================================
// Code Heap
// ============================================================================

/// Segment map byte marking a segment that belongs to no block
pub const SEGMAP_FREE_SENTINEL: u8 = 0xFF;

/// Blob name carried by compiled Java methods
pub const COMPILED_METHOD_NAME: &str = "nmethod";

// ============================================================================
// Method Metadata
// ============================================================================

/// `ConstMethod` flag: a compressed line-number table follows the bytecodes
pub const HAS_LINENUMBER_TABLE: u16 = 1;

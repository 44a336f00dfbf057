//! Compressed integer codec
//!
//! Integers are stored in 1 to 5 bytes. A byte below [`L`] (192) ends the
//! number; a byte at or above it is a "high code" that announces another
//! byte. Each follow byte `b_i` contributes `b_i * 64^i`:
//!
//! ```text
//! value = b0 + b1*64 + b2*64^2 + b3*64^3 + b4*64^4
//! ```
//!
//! The fifth byte ends the number whatever its value, so decoding always
//! terminates. Signed values are zig-zag mapped onto unsigned ones first
//! (`0, -1, 1, -2, ...` → `0, 1, 2, 3, ...`).

use nmscope_common::{H, L, LG_H, MAX_I};

use crate::domain::InspectError;
use crate::memory::MemoryReader;

/// Cursor over a compressed byte stream inside a memory image
///
/// The cursor is transient: it lives for one decode operation and is never
/// shared between queries.
pub struct CompressedReadStream<'m, M: MemoryReader + ?Sized> {
    memory: &'m M,
    buffer: u64,
    position: u64,
}

impl<'m, M: MemoryReader + ?Sized> CompressedReadStream<'m, M> {
    /// Position a cursor `position` bytes into the stream starting at `buffer`
    pub fn new(memory: &'m M, buffer: u64, position: u64) -> Self {
        Self { memory, buffer, position }
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self) -> Result<u8, InspectError> {
        let addr = self
            .buffer
            .checked_add(self.position)
            .ok_or(InspectError::malformed("compressed stream position", self.buffer))?;
        let byte = self.memory.read_u8(addr)?;
        self.position += 1;
        Ok(byte)
    }

    /// Read one raw byte
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the stream runs off the image
    pub fn read_byte(&mut self) -> Result<u8, InspectError> {
        self.read()
    }

    /// Read a compressed unsigned integer
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the stream is truncated
    pub fn read_int(&mut self) -> Result<u32, InspectError> {
        let b0 = self.read()?;
        if u32::from(b0) < L {
            Ok(u32::from(b0))
        } else {
            self.read_int_mb(b0)
        }
    }

    fn read_int_mb(&mut self, b0: u8) -> Result<u32, InspectError> {
        let mut sum = u32::from(b0);
        let mut lg_h_i = LG_H;
        for i in 1..=MAX_I {
            let b_i = u32::from(self.read()?);
            // Wraps like the producer's 32-bit arithmetic on hostile input
            sum = sum.wrapping_add(b_i << lg_h_i);
            if b_i < L || i == MAX_I {
                break;
            }
            lg_h_i += LG_H;
        }
        Ok(sum)
    }

    /// Read a compressed zig-zag encoded signed integer
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the stream is truncated
    pub fn read_signed_int(&mut self) -> Result<i32, InspectError> {
        Ok(decode_sign(self.read_int()?))
    }
}

/// Undo zig-zag encoding: even values are non-negative, odd values negative
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn decode_sign(value: u32) -> i32 {
    ((value >> 1) ^ (value & 1).wrapping_neg()) as i32
}

/// Zig-zag encode a signed value
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn encode_sign(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Producer side of the codec
///
/// Writes exactly the byte sequences [`CompressedReadStream`] reads; used to
/// build debug-info streams for fixtures and tooling.
#[derive(Debug, Clone, Default)]
pub struct CompressedWriteStream {
    buffer: Vec<u8>,
}

impl CompressedWriteStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far (the position of the next write)
    #[must_use]
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn write_int(&mut self, value: u32) {
        let mut sum = value;
        let mut i = 0;
        loop {
            if sum < L || i == MAX_I {
                // Only the fifth byte may carry a value >= L
                self.buffer.push(sum as u8);
                return;
            }
            sum -= L;
            self.buffer.push((L + sum % H) as u8);
            sum >>= LG_H;
            i += 1;
        }
    }

    pub fn write_signed_int(&mut self, value: i32) {
        self.write_int(encode_sign(value));
    }
}

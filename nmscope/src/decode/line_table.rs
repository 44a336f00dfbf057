//! Compressed line-number tables
//!
//! A method's line table is a sequence of `(bci, line)` deltas ended by a
//! zero byte. Small deltas pack into one byte (5 bits of bci delta, 3 bits of
//! line delta); anything else is written as the escape byte `0xFF` followed
//! by two compressed signed integers.
//!
//! The table is neither sorted nor one-to-one, so lookups scan it whole.

use log::debug;
use nmscope_common::{
    LINE_TABLE_BCI_SHIFT, LINE_TABLE_ESCAPE, LINE_TABLE_LINE_MASK, LINE_TABLE_TERMINATOR,
};

use super::compressed_stream::{CompressedReadStream, CompressedWriteStream};
use crate::domain::{Bci, InspectError, SourceLine};
use crate::memory::MemoryReader;

/// Reader that accumulates `(bci, line)` pairs from a compressed table
pub struct CompressedLineNumberReadStream<'m, M: MemoryReader + ?Sized> {
    stream: CompressedReadStream<'m, M>,
    bci: i32,
    line: i32,
}

impl<'m, M: MemoryReader + ?Sized> CompressedLineNumberReadStream<'m, M> {
    /// Start reading the table at `table`
    pub fn new(memory: &'m M, table: u64) -> Self {
        Self { stream: CompressedReadStream::new(memory, table, 0), bci: 0, line: 0 }
    }

    /// Bytecode index of the most recently read pair
    #[must_use]
    pub fn bci(&self) -> i32 {
        self.bci
    }

    /// Line of the most recently read pair
    #[must_use]
    pub fn line(&self) -> i32 {
        self.line
    }

    /// Advance to the next pair
    ///
    /// Returns `false` once the terminator is reached.
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the table runs off the image
    pub fn read_pair(&mut self) -> Result<bool, InspectError> {
        let next = self.stream.read_byte()?;
        if next == LINE_TABLE_TERMINATOR {
            return Ok(false);
        }
        if next == LINE_TABLE_ESCAPE {
            self.bci = self.bci.wrapping_add(self.stream.read_signed_int()?);
            self.line = self.line.wrapping_add(self.stream.read_signed_int()?);
        } else {
            self.bci = self.bci.wrapping_add(i32::from(next >> LINE_TABLE_BCI_SHIFT));
            self.line = self.line.wrapping_add(i32::from(next & LINE_TABLE_LINE_MASK));
        }
        Ok(true)
    }
}

/// Look up the source line for `bci` in the table at `table`
///
/// An exact bci match wins immediately. Otherwise the pair with the largest
/// bci below `bci` supplies the line. `None` for `table` means the method has
/// no line table and the line is unknown.
///
/// # Errors
/// Returns [`InspectError::Unmapped`] if the table runs off the image
pub fn line_number_from_bci<M: MemoryReader + ?Sized>(
    memory: &M,
    table: Option<u64>,
    bci: Bci,
) -> Result<SourceLine, InspectError> {
    let Some(table) = table else {
        return Ok(SourceLine::UNKNOWN);
    };

    let mut best_bci = 0;
    let mut best_line = SourceLine::UNKNOWN;

    let mut stream = CompressedLineNumberReadStream::new(memory, table);
    while stream.read_pair()? {
        if stream.bci() == bci.0 {
            return Ok(SourceLine(stream.line()));
        }
        if stream.bci() < bci.0 && stream.bci() >= best_bci {
            best_bci = stream.bci();
            best_line = SourceLine(stream.line());
        }
    }

    debug!("No exact line entry for {bci} in table 0x{table:x}, using {best_line}");
    Ok(best_line)
}

/// Producer side: writes a line table [`CompressedLineNumberReadStream`] reads back
#[derive(Debug, Default)]
pub struct CompressedLineNumberWriteStream {
    stream: CompressedWriteStream,
    bci: i32,
    line: i32,
}

impl CompressedLineNumberWriteStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the pair `(bci, line)` as a delta from the previous pair
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn write_pair(&mut self, bci: i32, line: i32) {
        let bci_delta = bci.wrapping_sub(self.bci);
        let line_delta = line.wrapping_sub(self.line);
        self.bci = bci;
        self.line = line;

        if (bci_delta & !0x1F) == 0 && (line_delta & !0x7) == 0 {
            let value = ((bci_delta as u8) << LINE_TABLE_BCI_SHIFT) | line_delta as u8;
            // Single-byte form must not collide with the terminator or the escape
            if value != LINE_TABLE_TERMINATOR && value != LINE_TABLE_ESCAPE {
                self.stream.write_byte(value);
                return;
            }
        }
        self.stream.write_byte(LINE_TABLE_ESCAPE);
        self.stream.write_signed_int(bci_delta);
        self.stream.write_signed_int(line_delta);
    }

    /// Append the terminator and return the encoded table
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.stream.write_byte(LINE_TABLE_TERMINATOR);
        self.stream.into_bytes()
    }
}

//! Typed, layout-aware reads over a [`MemoryReader`]

use crate::domain::{Address, InspectError};
use crate::layout::{Endian, Layout};

use super::MemoryReader;

/// Longest C string the decoder will follow before calling it malformed
const MAX_C_STRING: usize = 256;

/// Read-only view of a target: its memory plus the layout of its structures
///
/// This is the context object every decoding operation receives. It holds no
/// per-query state, so one view can serve any number of independent lookups.
#[derive(Clone, Copy)]
pub struct TargetView<'a> {
    memory: &'a dyn MemoryReader,
    layout: &'a Layout,
}

impl<'a> TargetView<'a> {
    pub fn new(memory: &'a dyn MemoryReader, layout: &'a Layout) -> Self {
        Self { memory, layout }
    }

    #[must_use]
    pub fn memory(&self) -> &'a dyn MemoryReader {
        self.memory
    }

    #[must_use]
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    fn read_array<const N: usize>(&self, addr: Address) -> Result<[u8; N], InspectError> {
        let bytes = self.memory.read(addr.0, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Address of the field at `offset` inside the structure at `base`
    ///
    /// # Errors
    /// Returns [`InspectError::Malformed`] if the sum overflows the address space
    pub fn field_addr(&self, base: Address, offset: u64) -> Result<Address, InspectError> {
        base.checked_add(offset).ok_or(InspectError::malformed("field address", base.0))
    }

    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the byte is not in the image
    pub fn read_u8(&self, addr: Address) -> Result<u8, InspectError> {
        self.memory.read_u8(addr.0)
    }

    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the bytes are not in the image
    pub fn read_u16(&self, addr: Address) -> Result<u16, InspectError> {
        let raw = self.read_array::<2>(addr)?;
        Ok(match self.layout.target.endian {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        })
    }

    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the bytes are not in the image
    pub fn read_u32(&self, addr: Address) -> Result<u32, InspectError> {
        let raw = self.read_array::<4>(addr)?;
        Ok(match self.layout.target.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }

    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the bytes are not in the image
    pub fn read_i32(&self, addr: Address) -> Result<i32, InspectError> {
        let raw = self.read_array::<4>(addr)?;
        Ok(match self.layout.target.endian {
            Endian::Little => i32::from_le_bytes(raw),
            Endian::Big => i32::from_be_bytes(raw),
        })
    }

    /// Read a target pointer (4 or 8 bytes, per the layout)
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the bytes are not in the image
    pub fn read_ptr(&self, addr: Address) -> Result<Address, InspectError> {
        let value = if self.layout.target.pointer_size == 4 {
            u64::from(self.read_u32(addr)?)
        } else {
            let raw = self.read_array::<8>(addr)?;
            match self.layout.target.endian {
                Endian::Little => u64::from_le_bytes(raw),
                Endian::Big => u64::from_be_bytes(raw),
            }
        };
        Ok(Address(value))
    }

    /// Read a NUL-terminated string
    ///
    /// # Errors
    /// Returns [`InspectError::Unmapped`] if the string runs off the image, or
    /// [`InspectError::Malformed`] if no terminator appears within a sane length
    pub fn read_c_string(&self, addr: Address) -> Result<String, InspectError> {
        let mut bytes = Vec::new();
        for i in 0..MAX_C_STRING as u64 {
            let byte = self.read_u8(self.field_addr(addr, i)?)?;
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte);
        }
        Err(InspectError::malformed("C string", addr.0))
    }
}

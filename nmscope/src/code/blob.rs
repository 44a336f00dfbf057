//! Code blobs and compiled-method records
//!
//! A code blob is a contiguous region `[header_begin, data_end)` holding a
//! header, machine code and metadata. The header's `_name` string tells the
//! kinds apart; only compiled Java methods (`"nmethod"`) carry the
//! descriptor table and scope data this crate decodes.

use nmscope_common::COMPILED_METHOD_NAME;

use crate::domain::{Address, InspectError, MemoryRange};
use crate::memory::TargetView;

/// What kind of code a blob holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobKind {
    /// A compiled Java method with debug metadata
    CompiledMethod,
    /// Any other blob (stubs, adapters, buffers); carries the blob's name
    Other(String),
}

/// Header fields shared by every code blob
#[derive(Debug, Clone)]
pub struct CodeBlob {
    address: Address,
    size: u64,
    instructions_offset: u64,
    name: String,
}

/// `base + offset` for a header-relative offset read from the target
pub(crate) fn header_relative(
    base: Address,
    offset: i32,
    what: &'static str,
) -> Result<Address, InspectError> {
    u64::try_from(offset)
        .ok()
        .and_then(|off| base.checked_add(off))
        .ok_or(InspectError::malformed(what, base.0))
}

impl CodeBlob {
    /// Read the blob header at `address`
    ///
    /// # Errors
    /// Returns an error if the header is not in the image or holds negative sizes
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let layout = &view.layout().code_blob;

        let size = view.read_i32(view.field_addr(address, layout.size)?)?;
        let size = u64::try_from(size).map_err(|_| InspectError::malformed("blob size", address.0))?;
        let instructions_offset = view.read_i32(view.field_addr(address, layout.instructions_offset)?)?;
        let instructions_offset = u64::try_from(instructions_offset)
            .map_err(|_| InspectError::malformed("instructions offset", address.0))?;
        if address.checked_add(size).is_none() {
            return Err(InspectError::malformed("blob size", address.0));
        }

        let name_ptr = view.read_ptr(view.field_addr(address, layout.name)?)?;
        let name = if name_ptr.is_null() { String::new() } else { view.read_c_string(name_ptr)? };

        Ok(Self { address, size, instructions_offset, name })
    }

    #[must_use]
    pub fn header_begin(&self) -> Address {
        self.address
    }

    /// One past the last byte of the blob
    #[must_use]
    pub fn data_end(&self) -> Address {
        Address(self.address.0 + self.size)
    }

    #[must_use]
    pub fn instructions_begin(&self) -> Address {
        Address(self.address.0.saturating_add(self.instructions_offset))
    }

    #[must_use]
    pub fn range(&self) -> MemoryRange {
        MemoryRange { start: self.header_begin().0, end: self.data_end().0 }
    }

    /// Check if `addr` lies inside `[header_begin, data_end)`
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        self.range().contains(addr.0)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> BlobKind {
        if self.name == COMPILED_METHOD_NAME {
            BlobKind::CompiledMethod
        } else {
            BlobKind::Other(self.name.clone())
        }
    }

    #[must_use]
    pub fn is_compiled_method(&self) -> bool {
        self.name == COMPILED_METHOD_NAME
    }

    /// View this blob as a compiled method, if that is what it is
    ///
    /// # Errors
    /// Returns an error if the compiled-method header cannot be read
    pub fn as_compiled_method(
        &self,
        view: &TargetView<'_>,
    ) -> Result<Option<CompiledMethod>, InspectError> {
        if !self.is_compiled_method() {
            return Ok(None);
        }
        CompiledMethod::read(view, self.clone()).map(Some)
    }
}

/// A compiled Java method: a code blob plus its debug metadata tables
///
/// All section offsets are relative to [`CodeBlob::header_begin`].
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    blob: CodeBlob,
    method: Address,
    scopes_pcs_begin: Address,
    scopes_pcs_end: Address,
    scopes_data_begin: Address,
    oops_begin: Address,
    pc_desc_cache: Address,
}

impl CompiledMethod {
    /// Read the compiled-method header of `blob`
    ///
    /// # Errors
    /// Returns [`InspectError::NotCompiledMethod`] if the blob is some other kind,
    /// or an error if the header cannot be read
    pub fn read(view: &TargetView<'_>, blob: CodeBlob) -> Result<Self, InspectError> {
        if !blob.is_compiled_method() {
            return Err(InspectError::NotCompiledMethod(blob.header_begin().0));
        }
        let layout = &view.layout().nmethod;
        let base = blob.header_begin();
        let offset = |field: u64| -> Result<i32, InspectError> {
            view.read_i32(view.field_addr(base, field)?)
        };

        let scopes_pcs_begin =
            header_relative(base, offset(layout.scopes_pcs_offset)?, "scopes pcs offset")?;
        let scopes_pcs_end =
            header_relative(base, offset(layout.dependencies_offset)?, "dependencies offset")?;
        let scopes_data_begin =
            header_relative(base, offset(layout.scopes_data_offset)?, "scopes data offset")?;
        let oops_begin = header_relative(base, offset(layout.oops_offset)?, "oops offset")?;

        Ok(Self {
            method: view.read_ptr(view.field_addr(base, layout.method)?)?,
            pc_desc_cache: view.field_addr(base, layout.pc_desc_cache)?,
            blob,
            scopes_pcs_begin,
            scopes_pcs_end,
            scopes_data_begin,
            oops_begin,
        })
    }

    #[must_use]
    pub fn blob(&self) -> &CodeBlob {
        &self.blob
    }

    /// The top-level method this code was compiled for
    #[must_use]
    pub fn method(&self) -> Address {
        self.method
    }

    /// First descriptor of the `PcDesc` table
    #[must_use]
    pub fn scopes_pcs_begin(&self) -> Address {
        self.scopes_pcs_begin
    }

    /// End of the `PcDesc` table (the sentinel is the entry just before it)
    #[must_use]
    pub fn scopes_pcs_end(&self) -> Address {
        self.scopes_pcs_end
    }

    /// Start of the scope (debug-info) byte stream
    #[must_use]
    pub fn scopes_data_begin(&self) -> Address {
        self.scopes_data_begin
    }

    #[must_use]
    pub fn oops_begin(&self) -> Address {
        self.oops_begin
    }

    /// Address of the embedded descriptor cache
    #[must_use]
    pub fn pc_desc_cache_addr(&self) -> Address {
        self.pc_desc_cache
    }

    /// Resolve a 1-based reference-table index; `0` means "no reference"
    ///
    /// # Errors
    /// Returns an error if the table slot is not in the image
    pub fn oop_at(&self, view: &TargetView<'_>, index: u32) -> Result<Option<Address>, InspectError> {
        if index == 0 {
            return Ok(None);
        }
        let slot = u64::from(index - 1)
            .checked_mul(view.layout().pointer_size())
            .and_then(|off| self.oops_begin.checked_add(off))
            .ok_or(InspectError::malformed("reference index", self.oops_begin.0))?;
        let value = view.read_ptr(slot)?;
        Ok((!value.is_null()).then_some(value))
    }
}

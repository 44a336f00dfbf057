//! Java method metadata
//!
//! Only the slice of the metadata graph needed to name a frame and find its
//! source line is decoded: `Method -> ConstMethod -> ConstantPool -> Symbol`
//! plus the holder `Klass` name.

use nmscope_common::HAS_LINENUMBER_TABLE;

use crate::decode::line_number_from_bci;
use crate::domain::{Address, Bci, InspectError, SourceLine};
use crate::memory::TargetView;

/// Rendered in place of a holder class that has no name
const ANONYMOUS_HOLDER: &str = "special klass";

/// Read a `Symbol`'s UTF-8 body
///
/// # Errors
/// Returns an error if the symbol is not in the image
pub fn read_symbol(view: &TargetView<'_>, address: Address) -> Result<String, InspectError> {
    let layout = &view.layout().symbol;
    let length = view.read_u32(view.field_addr(address, layout.length_and_refcount)?)? >> 16;
    let body = view.field_addr(address, layout.body)?;
    let bytes = view.memory().read(body.0, length as usize)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Immutable part of a method: bytecodes, line table and constant pool link
#[derive(Debug, Clone, Copy)]
pub struct ConstMethod {
    address: Address,
    constants: Address,
    code_size: u16,
    flags: u16,
    name_index: u16,
    signature_index: u16,
}

impl ConstMethod {
    /// # Errors
    /// Returns an error if the structure is not in the image
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let layout = &view.layout().const_method;
        let u16_at = |field: u64| -> Result<u16, InspectError> { view.read_u16(view.field_addr(address, field)?) };
        Ok(Self {
            address,
            constants: view.read_ptr(view.field_addr(address, layout.constants)?)?,
            code_size: u16_at(layout.code_size)?,
            flags: u16_at(layout.flags)?,
            name_index: u16_at(layout.name_index)?,
            signature_index: u16_at(layout.signature_index)?,
        })
    }

    #[must_use]
    pub fn has_linenumber_table(&self) -> bool {
        self.flags & HAS_LINENUMBER_TABLE != 0
    }

    /// Start of the compressed line table, which follows the bytecodes
    ///
    /// # Errors
    /// Returns [`InspectError::Malformed`] if the address overflows
    pub fn compressed_linenumber_table(&self, view: &TargetView<'_>) -> Result<Option<Address>, InspectError> {
        if !self.has_linenumber_table() {
            return Ok(None);
        }
        let offset = view.layout().const_method.size + u64::from(self.code_size);
        view.field_addr(self.address, offset).map(Some)
    }

    /// Symbol held in constant-pool slot `index`
    fn symbol_at(&self, view: &TargetView<'_>, index: u16) -> Result<String, InspectError> {
        let offset = view.layout().constant_pool.size + u64::from(index) * view.layout().pointer_size();
        let symbol = view.read_ptr(view.field_addr(self.constants, offset)?)?;
        if symbol.is_null() {
            return Err(InspectError::malformed("constant pool symbol", self.constants.0));
        }
        read_symbol(view, symbol)
    }

    /// Name of the class that declares this method, if it has one
    fn holder_name(&self, view: &TargetView<'_>) -> Result<Option<String>, InspectError> {
        let holder_field = view.layout().constant_pool.pool_holder;
        let klass = view.read_ptr(view.field_addr(self.constants, holder_field)?)?;
        if klass.is_null() {
            return Ok(None);
        }
        let name = view.read_ptr(view.field_addr(klass, view.layout().klass.name)?)?;
        if name.is_null() {
            return Ok(None);
        }
        read_symbol(view, name).map(Some)
    }
}

/// A Java method referenced from compiled code
#[derive(Debug, Clone, Copy)]
pub struct Method {
    address: Address,
    const_method: ConstMethod,
}

impl Method {
    /// # Errors
    /// Returns an error if the method or its `ConstMethod` is not in the image
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let const_method = view.read_ptr(view.field_addr(address, view.layout().method.const_method)?)?;
        Ok(Self { address, const_method: ConstMethod::read(view, const_method)? })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn const_method(&self) -> &ConstMethod {
        &self.const_method
    }

    /// Source line of `bci`, or [`SourceLine::UNKNOWN`] without a line table
    ///
    /// # Errors
    /// Returns an error if the line table runs off the image
    pub fn line_number_from_bci(&self, view: &TargetView<'_>, bci: Bci) -> Result<SourceLine, InspectError> {
        let table = self.const_method.compressed_linenumber_table(view)?;
        line_number_from_bci(view.memory(), table.map(|a| a.0), bci)
    }

    /// # Errors
    /// Returns an error if the name symbol cannot be read
    pub fn name(&self, view: &TargetView<'_>) -> Result<String, InspectError> {
        self.const_method.symbol_at(view, self.const_method.name_index)
    }

    /// # Errors
    /// Returns an error if the signature symbol cannot be read
    pub fn signature(&self, view: &TargetView<'_>) -> Result<String, InspectError> {
        self.const_method.symbol_at(view, self.const_method.signature_index)
    }

    /// `holder.name(signature)return`, e.g. `java/lang/String.hashCode()I`
    ///
    /// # Errors
    /// Returns an error if any of the symbols cannot be read
    pub fn qualified_name(&self, view: &TargetView<'_>) -> Result<String, InspectError> {
        let holder = self.const_method.holder_name(view)?;
        Ok(format!(
            "{}.{}{}",
            holder.as_deref().unwrap_or(ANONYMOUS_HOLDER),
            self.name(view)?,
            self.signature(view)?
        ))
    }
}

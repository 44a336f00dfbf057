//! # Structure Layouts
//!
//! The decoder never hardcodes where a field lives inside a target
//! structure. Instead a [`LayoutProvider`] answers "at which byte offset is
//! `nmethod::_scopes_data_offset`?" and "how big is a `PcDesc`?", and
//! [`Layout::resolve`] asks every question once, up front, producing a
//! typed [`Layout`] that the rest of the crate reads from.
//!
//! Resolving eagerly means a layout file that is missing an entry fails
//! before any memory is touched, naming the missing `structure::field`.
//!
//! ## Field Widths
//!
//! Offsets come from the provider; widths are fixed by the format:
//!
//! | Field                                   | Width        |
//! |-----------------------------------------|--------------|
//! | `CodeBlob::_size`, `_instructions_offset` | `i32`      |
//! | `nmethod::_*_offset`                    | `i32`        |
//! | `PcDesc::_pc_offset`, `_scope_decode_offset` | `i32`   |
//! | `CodeHeap::_log2_segment_size`          | `i32`        |
//! | `HeapBlock::Header::_used`              | `u8` (bool)  |
//! | `ConstMethod::_code_size`, `_flags`, `_name_index`, `_signature_index` | `u16` |
//! | `Symbol::_length_and_refcount`          | `u32`        |
//! | everything else (`_name`, `_method`, `_low`, ...) | pointer |

pub mod table;

use serde::{Deserialize, Serialize};

use crate::domain::InspectError;

pub use table::{LayoutTable, StructureLayout};

/// Source of structure-field byte offsets and type sizes for one target binary
pub trait LayoutProvider {
    /// Byte offset of `field` within `structure`
    fn field_offset(&self, structure: &str, field: &str) -> Option<u64>;

    /// Size in bytes of `structure`
    fn type_size(&self, structure: &str) -> Option<u64>;
}

/// Byte order of the inspected target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Machine properties of the inspected target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Pointer width in bytes (4 or 8)
    pub pointer_size: u8,
    #[serde(default)]
    pub endian: Endian,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self { pointer_size: 8, endian: Endian::Little }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CodeBlobLayout {
    pub name: u64,
    pub size: u64,
    pub instructions_offset: u64,
}

/// Compiled-method record fields (beyond those of [`CodeBlobLayout`])
#[derive(Debug, Clone, Copy)]
pub struct NMethodLayout {
    pub method: u64,
    pub scopes_pcs_offset: u64,
    pub dependencies_offset: u64,
    pub scopes_data_offset: u64,
    pub oops_offset: u64,
    /// Offset of the embedded descriptor cache
    pub pc_desc_cache: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PcDescCacheLayout {
    pub last_pc_desc: u64,
    /// Start of the pointer array; slots are pointer-sized
    pub pc_descs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PcDescLayout {
    /// Table stride
    pub size: u64,
    pub pc_offset: u64,
    pub scope_decode_offset: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CodeHeapLayout {
    pub memory: u64,
    pub segmap: u64,
    pub log2_segment_size: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct VirtualSpaceLayout {
    pub low: u64,
    pub high: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct HeapBlockLayout {
    /// The allocated space starts right after the block header
    pub size: u64,
    /// Offset of `_header._used` from the start of the block
    pub used: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodLayout {
    pub const_method: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ConstMethodLayout {
    /// Bytecodes start right after the structure
    pub size: u64,
    pub constants: u64,
    pub code_size: u64,
    pub flags: u64,
    pub name_index: u64,
    pub signature_index: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantPoolLayout {
    /// Pool slots start right after the structure
    pub size: u64,
    pub pool_holder: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct KlassLayout {
    pub name: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolLayout {
    pub length_and_refcount: u64,
    pub body: u64,
}

/// Every offset the decoder needs, resolved once per target binary
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub target: TargetInfo,
    pub code_blob: CodeBlobLayout,
    pub nmethod: NMethodLayout,
    pub pc_desc_cache: PcDescCacheLayout,
    pub pc_desc: PcDescLayout,
    pub code_heap: CodeHeapLayout,
    pub virtual_space: VirtualSpaceLayout,
    pub heap_block: HeapBlockLayout,
    pub method: MethodLayout,
    pub const_method: ConstMethodLayout,
    pub constant_pool: ConstantPoolLayout,
    pub klass: KlassLayout,
    pub symbol: SymbolLayout,
}

struct Resolver<'p, P: ?Sized> {
    provider: &'p P,
}

impl<P: LayoutProvider + ?Sized> Resolver<'_, P> {
    fn field(&self, structure: &str, field: &str) -> Result<u64, InspectError> {
        self.provider
            .field_offset(structure, field)
            .ok_or_else(|| InspectError::missing(structure, field))
    }

    fn size(&self, structure: &str) -> Result<u64, InspectError> {
        self.provider.type_size(structure).ok_or_else(|| InspectError::missing(structure, "<size>"))
    }
}

impl Layout {
    /// Resolve every required offset from `provider`
    ///
    /// # Errors
    /// Returns [`InspectError::MissingLayout`] naming the first entry the provider
    /// cannot answer, [`InspectError::UnsupportedPointerSize`], or
    /// [`InspectError::Malformed`] if nested offsets overflow
    pub fn resolve<P: LayoutProvider + ?Sized>(
        provider: &P,
        target: TargetInfo,
    ) -> Result<Self, InspectError> {
        if !matches!(target.pointer_size, 4 | 8) {
            return Err(InspectError::UnsupportedPointerSize(target.pointer_size));
        }
        let r = Resolver { provider };

        let pc_desc_size = r.size("PcDesc")?;
        if pc_desc_size == 0 {
            return Err(InspectError::missing("PcDesc", "<size>"));
        }

        Ok(Self {
            target,
            code_blob: CodeBlobLayout {
                name: r.field("CodeBlob", "_name")?,
                size: r.field("CodeBlob", "_size")?,
                instructions_offset: r.field("CodeBlob", "_instructions_offset")?,
            },
            nmethod: NMethodLayout {
                method: r.field("nmethod", "_method")?,
                scopes_pcs_offset: r.field("nmethod", "_scopes_pcs_offset")?,
                dependencies_offset: r.field("nmethod", "_dependencies_offset")?,
                scopes_data_offset: r.field("nmethod", "_scopes_data_offset")?,
                oops_offset: r.field("nmethod", "_oops_offset")?,
                pc_desc_cache: r.field("nmethod", "_pc_desc_cache")?,
            },
            pc_desc_cache: PcDescCacheLayout {
                last_pc_desc: r.field("PcDescCache", "_last_pc_desc")?,
                pc_descs: r.field("PcDescCache", "_pc_descs")?,
            },
            pc_desc: PcDescLayout {
                size: pc_desc_size,
                pc_offset: r.field("PcDesc", "_pc_offset")?,
                scope_decode_offset: r.field("PcDesc", "_scope_decode_offset")?,
            },
            code_heap: CodeHeapLayout {
                memory: r.field("CodeHeap", "_memory")?,
                segmap: r.field("CodeHeap", "_segmap")?,
                log2_segment_size: r.field("CodeHeap", "_log2_segment_size")?,
            },
            virtual_space: VirtualSpaceLayout {
                low: r.field("VirtualSpace", "_low")?,
                high: r.field("VirtualSpace", "_high")?,
            },
            heap_block: HeapBlockLayout {
                size: r.size("HeapBlock")?,
                used: {
                    let header = r.field("HeapBlock", "_header")?;
                    header
                        .checked_add(r.field("HeapBlock::Header", "_used")?)
                        .ok_or(InspectError::malformed("HeapBlock::_header._used offset", header))?
                },
            },
            method: MethodLayout { const_method: r.field("Method", "_constMethod")? },
            const_method: ConstMethodLayout {
                size: r.size("ConstMethod")?,
                constants: r.field("ConstMethod", "_constants")?,
                code_size: r.field("ConstMethod", "_code_size")?,
                flags: r.field("ConstMethod", "_flags")?,
                name_index: r.field("ConstMethod", "_name_index")?,
                signature_index: r.field("ConstMethod", "_signature_index")?,
            },
            constant_pool: ConstantPoolLayout {
                size: r.size("ConstantPool")?,
                pool_holder: r.field("ConstantPool", "_pool_holder")?,
            },
            klass: KlassLayout { name: r.field("Klass", "_name")? },
            symbol: SymbolLayout {
                length_and_refcount: r.field("Symbol", "_length_and_refcount")?,
                body: r.field("Symbol", "_body")?,
            },
        })
    }

    /// Pointer width of the target in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u64 {
        u64::from(self.target.pointer_size)
    }
}

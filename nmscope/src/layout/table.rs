//! JSON-backed layout table
//!
//! A [`LayoutTable`] is the plain data a debugger or build script exports
//! for one target binary: pointer size, endianness, and for every structure
//! its size and field offsets.
//!
//! ```json
//! {
//!   "target": { "pointer_size": 8, "endian": "little" },
//!   "structures": {
//!     "PcDesc": { "size": 16, "fields": { "_pc_offset": 0, "_scope_decode_offset": 4 } }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{LayoutProvider, TargetInfo};

/// Size and field offsets of one structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub fields: BTreeMap<String, u64>,
}

/// Layout information for a whole target binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutTable {
    #[serde(default)]
    pub target: TargetInfo,
    #[serde(default)]
    pub structures: BTreeMap<String, StructureLayout>,
}

impl LayoutTable {
    #[must_use]
    pub fn new(target: TargetInfo) -> Self {
        Self { target, structures: BTreeMap::new() }
    }

    /// Record the offset of `structure::field`
    #[must_use]
    pub fn with_field(mut self, structure: &str, field: &str, offset: u64) -> Self {
        self.structures
            .entry(structure.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), offset);
        self
    }

    /// Record the size of `structure`
    #[must_use]
    pub fn with_size(mut self, structure: &str, size: u64) -> Self {
        self.structures.entry(structure.to_string()).or_default().size = Some(size);
        self
    }

    /// Parse a layout table from JSON text
    ///
    /// # Errors
    /// Returns an error if the text is not a valid layout table
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse layout table")
    }

    /// Load a layout table from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout file {}", path.display()))?;
        let table = Self::from_json_str(&text)?;
        info!(
            "Loaded layout for {} structures from {} ({}-bit, {:?} endian)",
            table.structures.len(),
            path.display(),
            u32::from(table.target.pointer_size) * 8,
            table.target.endian
        );
        Ok(table)
    }
}

impl LayoutProvider for LayoutTable {
    fn field_offset(&self, structure: &str, field: &str) -> Option<u64> {
        self.structures.get(structure)?.fields.get(field).copied()
    }

    fn type_size(&self, structure: &str) -> Option<u64> {
        self.structures.get(structure)?.size
    }
}

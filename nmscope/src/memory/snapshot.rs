//! Captured memory images
//!
//! A [`SnapshotImage`] holds the regions of a target's address space that
//! were captured for offline inspection. Two on-disk sources are supported:
//!
//! - a JSON manifest listing raw region dumps:
//!   `{ "regions": [ { "base": "0x7f0000000000", "file": "codeheap.bin" } ], "code_heap": "0x..." }`
//!   (file paths are relative to the manifest)
//! - an ELF core file, whose `PT_LOAD` segments become regions

use anyhow::{Context, Result};
use log::{debug, info};
use object::{Object, ObjectSegment};
use serde::Deserialize;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use super::MemoryReader;
use crate::domain::{Address, InspectError, MemoryRange, SnapshotError};

/// One contiguous captured range
#[derive(Debug, Clone)]
struct Region {
    base: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn range(&self) -> MemoryRange {
        MemoryRange { start: self.base, end: self.base + self.bytes.len() as u64 }
    }
}

/// Sorted, non-overlapping set of captured regions
#[derive(Debug, Clone, Default)]
pub struct SnapshotImage {
    regions: Vec<Region>,
}

impl SnapshotImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a captured region
    ///
    /// # Errors
    /// Returns an error if the region overlaps one already present or does
    /// not fit in the address space
    pub fn add_region(&mut self, base: u64, bytes: Vec<u8>) -> Result<(), SnapshotError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let end = base
            .checked_add(bytes.len() as u64)
            .ok_or(SnapshotError::OverlappingRegion { base })?;

        let idx = self.regions.partition_point(|r| r.base < base);
        let overlaps_prev = idx > 0 && self.regions[idx - 1].range().end > base;
        let overlaps_next = self.regions.get(idx).is_some_and(|r| r.base < end);
        if overlaps_prev || overlaps_next {
            return Err(SnapshotError::OverlappingRegion { base });
        }

        debug!("Region 0x{base:x} - 0x{end:x} ({} bytes)", bytes.len());
        self.regions.insert(idx, Region { base, bytes });
        Ok(())
    }

    /// Address ranges covered by the image, in ascending order
    pub fn ranges(&self) -> impl Iterator<Item = MemoryRange> + '_ {
        self.regions.iter().map(Region::range)
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Total number of captured bytes
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.regions.iter().map(|r| r.bytes.len() as u64).sum()
    }

    fn region_for(&self, address: u64) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.base <= address);
        idx.checked_sub(1).map(|i| &self.regions[i]).filter(|r| r.range().contains(address))
    }
}

impl MemoryReader for SnapshotImage {
    fn read(&self, address: u64, length: usize) -> Result<Cow<'_, [u8]>, InspectError> {
        let unmapped = || InspectError::Unmapped { address, length };
        let region = self.region_for(address).ok_or_else(unmapped)?;
        // A read never spans two regions, even adjacent ones
        let start = usize::try_from(address - region.base).map_err(|_| unmapped())?;
        let end = start.checked_add(length).ok_or_else(unmapped)?;
        region.bytes.get(start..end).map(Cow::Borrowed).ok_or_else(unmapped)
    }
}

/// A loaded image plus the roots recorded alongside it
#[derive(Debug, Default)]
pub struct Snapshot {
    pub image: SnapshotImage,
    /// Address of the code heap structure, if the capture recorded it
    pub code_heap: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddressLiteral {
    Number(u64),
    Text(String),
}

impl AddressLiteral {
    fn value(&self) -> Result<u64, SnapshotError> {
        match self {
            AddressLiteral::Number(n) => Ok(*n),
            AddressLiteral::Text(s) => parse_address(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    base: AddressLiteral,
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    regions: Vec<RegionEntry>,
    #[serde(default)]
    code_heap: Option<AddressLiteral>,
}

impl Snapshot {
    /// Load a snapshot from a JSON manifest and the raw region files it names
    ///
    /// # Errors
    /// Returns an error if the manifest or a region file cannot be read or parsed,
    /// or if two regions overlap
    pub fn from_manifest<P: AsRef<Path>>(manifest_path: P) -> Result<Self> {
        let manifest_path = manifest_path.as_ref();
        let text = fs::read_to_string(manifest_path)
            .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
        let manifest: Manifest =
            serde_json::from_str(&text).context("Failed to parse snapshot manifest")?;

        let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let mut image = SnapshotImage::new();
        for entry in &manifest.regions {
            let path = dir.join(&entry.file);
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read region file {}", path.display()))?;
            image.add_region(entry.base.value()?, bytes)?;
        }

        let code_heap = manifest.code_heap.as_ref().map(AddressLiteral::value).transpose()?;

        info!(
            "Loaded {} regions ({} KB) from {}",
            image.region_count(),
            image.total_bytes() / 1024,
            manifest_path.display()
        );
        Ok(Self { image, code_heap: code_heap.map(Address) })
    }

    /// Load a snapshot from the loadable segments of an ELF core file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or contains no
    /// file-backed loadable segments
    pub fn from_core_file<P: AsRef<Path>>(core_path: P) -> Result<Self> {
        let core_path = core_path.as_ref();
        let data = fs::read(core_path)
            .with_context(|| format!("Failed to read core file {}", core_path.display()))?;
        let file = object::File::parse(&*data).context("Failed to parse core file")?;

        let mut image = SnapshotImage::new();
        for segment in file.segments() {
            let bytes = segment.data().context("Failed to read segment data")?;
            // Segments with no file-backed bytes were not captured
            if bytes.is_empty() {
                continue;
            }
            image.add_region(segment.address(), bytes.to_vec())?;
        }

        if image.region_count() == 0 {
            return Err(SnapshotError::NoLoadableSegments.into());
        }

        info!(
            "Loaded {} segments ({} KB) from {}",
            image.region_count(),
            image.total_bytes() / 1024,
            core_path.display()
        );
        Ok(Self { image, code_heap: None })
    }
}

/// Parse an address written as `0x`-prefixed hex or plain decimal
///
/// # Errors
/// Returns [`SnapshotError::InvalidAddress`] if the literal is not a number
pub fn parse_address(text: &str) -> Result<u64, SnapshotError> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|_| SnapshotError::InvalidAddress(text.to_string()))
}

//! Descriptor (`PcDesc`) lookup
//!
//! Every compiled method carries a table of `(pc_offset, scope_decode_offset)`
//! descriptors sorted by `pc_offset` and closed by one sentinel entry. Finding
//! the descriptor for an instruction address goes through three stages:
//!
//! 1. The producer's descriptor cache: the most recent descriptor, then up
//!    to four recently used ones. The cache is only ever read here.
//! 2. A pivot on the most recent descriptor, narrowing the search to one side.
//! 3. Geometric steps of 512, 64 and 8 entries, then a short linear scan.
//!
//! An exact query wants a descriptor whose `pc_offset` equals the target; an
//! approximate query wants the descriptor `d` with
//! `prev(d).pc_offset < target <= d.pc_offset`.

use log::{debug, warn};
use nmscope_common::{PC_DESC_CACHE_SIZE, UPPER_OFFSET_LIMIT};

use super::blob::CompiledMethod;
use crate::domain::{Address, InspectError};
use crate::memory::TargetView;

/// Log2 of the ratio between successive search steps
const LOG2_RADIX: u32 = 3;

/// First (largest) search step: `8^3`
const INITIAL_STEP: u64 = 1 << (LOG2_RADIX * 3);

/// One descriptor, read from the table or through a cache pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcDesc {
    address: Address,
    pc_offset: i32,
    scope_decode_offset: i32,
}

impl PcDesc {
    /// # Errors
    /// Returns an error if the descriptor is not in the image
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let layout = &view.layout().pc_desc;
        Ok(Self {
            address,
            pc_offset: view.read_i32(view.field_addr(address, layout.pc_offset)?)?,
            scope_decode_offset: view.read_i32(view.field_addr(address, layout.scope_decode_offset)?)?,
        })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Offset from the compiled method's first instruction
    #[must_use]
    pub fn pc_offset(&self) -> i32 {
        self.pc_offset
    }

    /// Offset of the innermost scope record in the scopes data, `0` for none
    #[must_use]
    pub fn scope_decode_offset(&self) -> i32 {
        self.scope_decode_offset
    }

    /// Absolute instruction address this descriptor starts at
    #[must_use]
    pub fn real_pc(&self, nm: &CompiledMethod) -> Address {
        let base = nm.blob().instructions_begin().0;
        Address(base.wrapping_add_signed(i64::from(self.pc_offset)))
    }
}

/// Geometry of a compiled method's descriptor table
///
/// Entries are addressed by index; the last index is the sentinel.
#[derive(Debug, Clone, Copy)]
pub struct PcDescTable {
    begin: Address,
    len: u64,
    stride: u64,
}

impl PcDescTable {
    /// # Errors
    /// Returns [`InspectError::Malformed`] if `[begin, end)` is inverted or is
    /// not a whole number of `stride`-sized entries
    pub fn new(begin: Address, end: Address, stride: u64) -> Result<Self, InspectError> {
        let bytes = end.offset_from(begin).ok_or(InspectError::malformed("descriptor table", begin.0))?;
        if stride == 0 || bytes % stride != 0 {
            return Err(InspectError::malformed("descriptor table", begin.0));
        }
        Ok(Self { begin, len: bytes / stride, stride })
    }

    /// Number of entries, sentinel included
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the table holds no descriptor besides the sentinel
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len <= 1
    }

    /// Index of the closing sentinel
    #[must_use]
    pub fn sentinel(&self) -> u64 {
        self.len.saturating_sub(1)
    }

    #[must_use]
    pub fn address_of(&self, index: u64) -> Address {
        Address(self.begin.0 + index * self.stride)
    }

    /// Table index of the entry at `addr`, if `addr` is exactly one
    #[must_use]
    pub fn index_of(&self, addr: Address) -> Option<u64> {
        let delta = addr.offset_from(self.begin)?;
        (delta % self.stride == 0 && delta / self.stride < self.len).then_some(delta / self.stride)
    }

    /// # Errors
    /// Returns an error if the entry is not in the image
    pub fn at(&self, view: &TargetView<'_>, index: u64) -> Result<PcDesc, InspectError> {
        PcDesc::read(view, self.address_of(index))
    }

    /// Apply the exact or approximate matching rule to `desc`
    fn matches(
        &self,
        view: &TargetView<'_>,
        desc: &PcDesc,
        target: i32,
        approximate: bool,
    ) -> Result<bool, InspectError> {
        let index = self.index_of(desc.address);
        // The sentinel only closes the table, it never describes code
        if index == Some(self.sentinel()) {
            return Ok(false);
        }
        if !approximate {
            return Ok(desc.pc_offset == target);
        }
        let Some(index) = index else {
            warn!("Descriptor {} lies outside the descriptor table", desc.address);
            return Ok(false);
        };
        // The first entry has nothing before it to bound the range
        if index == 0 {
            return Ok(false);
        }
        let prev = self.at(view, index - 1)?;
        Ok(prev.pc_offset < target && target <= desc.pc_offset)
    }

    /// Quasi-binary search, pivoting on `pivot` when it is a real table entry
    fn search(
        &self,
        view: &TargetView<'_>,
        target: i32,
        approximate: bool,
        pivot: Option<Address>,
    ) -> Result<Option<PcDesc>, InspectError> {
        if self.is_empty() {
            debug!("Empty descriptor table");
            return Ok(None);
        }

        // `lower` is the last entry known to be below the target (`None` is
        // before the first entry), `upper` the first known to be at or above it
        let mut lower: Option<u64> = None;
        let mut upper = self.sentinel();
        let below = |index: u64| -> Result<bool, InspectError> {
            Ok(self.at(view, index)?.pc_offset < target)
        };

        if let Some(p) = pivot.and_then(|addr| self.index_of(addr)).filter(|&p| p < upper) {
            if below(p)? {
                lower = Some(p);
            } else {
                upper = p;
            }
            debug!("Pivot on entry {p}: lower={lower:?} upper={upper}");
        }

        let next = |lower: Option<u64>, step: u64| lower.map_or(step - 1, |l| l + step);

        let mut step = INITIAL_STEP;
        while step > 1 {
            loop {
                let mid = next(lower, step);
                if mid >= upper {
                    break;
                }
                if below(mid)? {
                    lower = Some(mid);
                } else {
                    upper = mid;
                    break;
                }
            }
            step >>= LOG2_RADIX;
        }

        loop {
            let mid = next(lower, 1);
            if mid >= upper {
                break;
            }
            if below(mid)? {
                lower = Some(mid);
            } else {
                upper = mid;
                break;
            }
        }

        if upper == self.sentinel() {
            debug!("Target {target} lies beyond the last descriptor");
            return Ok(None);
        }
        let desc = self.at(view, upper)?;
        Ok(self.matches(view, &desc, target, approximate)?.then_some(desc))
    }
}

/// Snapshot of the producer-owned descriptor cache
#[derive(Debug, Clone)]
pub struct PcDescCache {
    last_pc_desc: Option<Address>,
    pc_descs: [Option<Address>; PC_DESC_CACHE_SIZE],
}

impl PcDescCache {
    /// # Errors
    /// Returns an error if the cache is not in the image
    pub fn read(view: &TargetView<'_>, address: Address) -> Result<Self, InspectError> {
        let layout = &view.layout().pc_desc_cache;
        let non_null = |addr: Address| (!addr.is_null()).then_some(addr);

        let last_pc_desc = non_null(view.read_ptr(view.field_addr(address, layout.last_pc_desc)?)?);
        let mut pc_descs = [None; PC_DESC_CACHE_SIZE];
        for (i, slot) in pc_descs.iter_mut().enumerate() {
            let offset = layout.pc_descs + i as u64 * view.layout().pointer_size();
            *slot = non_null(view.read_ptr(view.field_addr(address, offset)?)?);
        }
        Ok(Self { last_pc_desc, pc_descs })
    }

    #[must_use]
    pub fn last_pc_desc(&self) -> Option<Address> {
        self.last_pc_desc
    }

    /// Look for a matching descriptor among the cached ones
    ///
    /// An empty "most recent" slot means nothing is cached. Slots are scanned
    /// in order until an empty slot or one holding a negative `pc_offset`.
    fn find(
        &self,
        view: &TargetView<'_>,
        table: &PcDescTable,
        target: i32,
        approximate: bool,
    ) -> Result<Option<PcDesc>, InspectError> {
        let Some(last) = self.last_pc_desc else {
            return Ok(None);
        };
        let desc = PcDesc::read(view, last)?;
        if table.matches(view, &desc, target, approximate)? {
            debug!("Descriptor cache hit on the most recent entry");
            return Ok(Some(desc));
        }

        for (i, slot) in self.pc_descs.iter().enumerate() {
            let Some(addr) = slot else { break };
            let desc = PcDesc::read(view, *addr)?;
            if desc.pc_offset < 0 {
                break;
            }
            if table.matches(view, &desc, target, approximate)? {
                debug!("Descriptor cache hit in slot {i}");
                return Ok(Some(desc));
            }
        }
        Ok(None)
    }
}

impl CompiledMethod {
    /// # Errors
    /// Returns an error if the table bounds are inconsistent
    pub fn pc_desc_table(&self, view: &TargetView<'_>) -> Result<PcDescTable, InspectError> {
        PcDescTable::new(self.scopes_pcs_begin(), self.scopes_pcs_end(), view.layout().pc_desc.size)
    }

    /// # Errors
    /// Returns an error if the cache is not in the image
    pub fn pc_desc_cache(&self, view: &TargetView<'_>) -> Result<PcDescCache, InspectError> {
        PcDescCache::read(view, self.pc_desc_cache_addr())
    }

    /// Find the descriptor for instruction address `pc`
    ///
    /// Returns `Ok(None)` when `pc` is outside the method's instructions, the
    /// table is empty or nothing matches.
    ///
    /// # Errors
    /// Returns an error if the cache or table cannot be read
    pub fn find_pc_desc(
        &self,
        view: &TargetView<'_>,
        pc: Address,
        approximate: bool,
    ) -> Result<Option<PcDesc>, InspectError> {
        let Some(offset) = pc.offset_from(self.blob().instructions_begin()) else {
            return Ok(None);
        };
        if offset >= UPPER_OFFSET_LIMIT {
            return Ok(None);
        }
        let target = i32::try_from(offset).map_err(|_| InspectError::malformed("pc offset", pc.0))?;

        let table = self.pc_desc_table(view)?;
        let cache = self.pc_desc_cache(view)?;
        if let Some(desc) = cache.find(view, &table, target, approximate)? {
            return Ok(Some(desc));
        }
        table.search(view, target, approximate, cache.last_pc_desc())
    }

    /// Exact lookup, falling back to an approximate one
    ///
    /// # Errors
    /// Returns an error if the cache or table cannot be read
    pub fn pc_desc_at(&self, view: &TargetView<'_>, pc: Address) -> Result<Option<PcDesc>, InspectError> {
        match self.find_pc_desc(view, pc, false)? {
            Some(desc) => Ok(Some(desc)),
            None => self.find_pc_desc(view, pc, true),
        }
    }
}

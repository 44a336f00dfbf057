//! Synthetic target images for unit tests
//!
//! [`ImageBuilder`] writes little-endian LP64 structures using the offsets in
//! [`layout_table`], so tests can describe a code heap, a compiled method and
//! its metadata in a few lines and get back a [`SnapshotImage`].

use std::collections::BTreeMap;

use nmscope_common::{INVOCATION_ENTRY_BCI, PC_DESC_CACHE_SIZE, UPPER_OFFSET_LIMIT};

use crate::decode::{CompressedLineNumberWriteStream, CompressedWriteStream};
use crate::domain::Address;
use crate::layout::{Layout, LayoutTable, TargetInfo};
use crate::memory::SnapshotImage;

pub const PC_DESC_SIZE: u64 = 16;
pub const HEAP_BLOCK_SIZE: u64 = 16;
pub const HEAP_BLOCK_USED: u64 = 8;
pub const NMETHOD_HEADER_SIZE: u64 = 0x50;
pub const CONST_METHOD_SIZE: u64 = 48;
pub const CONSTANT_POOL_SIZE: u64 = 64;

/// Where metadata (methods, symbols, strings) is allocated
const METADATA_BASE: u64 = 0x9000_0000;

pub fn layout_table() -> LayoutTable {
    LayoutTable::new(TargetInfo::default())
        .with_field("CodeBlob", "_name", 0)
        .with_field("CodeBlob", "_size", 8)
        .with_field("CodeBlob", "_instructions_offset", 12)
        .with_field("nmethod", "_method", 16)
        .with_field("nmethod", "_scopes_pcs_offset", 24)
        .with_field("nmethod", "_dependencies_offset", 28)
        .with_field("nmethod", "_scopes_data_offset", 32)
        .with_field("nmethod", "_oops_offset", 36)
        .with_field("nmethod", "_pc_desc_cache", 40)
        .with_field("PcDescCache", "_last_pc_desc", 0)
        .with_field("PcDescCache", "_pc_descs", 8)
        .with_size("PcDesc", PC_DESC_SIZE)
        .with_field("PcDesc", "_pc_offset", 0)
        .with_field("PcDesc", "_scope_decode_offset", 4)
        .with_field("CodeHeap", "_memory", 0x10)
        .with_field("CodeHeap", "_segmap", 0x40)
        .with_field("CodeHeap", "_log2_segment_size", 0x70)
        .with_field("VirtualSpace", "_low", 0x10)
        .with_field("VirtualSpace", "_high", 0x18)
        .with_size("HeapBlock", HEAP_BLOCK_SIZE)
        .with_field("HeapBlock", "_header", 0)
        .with_field("HeapBlock::Header", "_used", HEAP_BLOCK_USED)
        .with_field("Method", "_constMethod", 8)
        .with_size("ConstMethod", CONST_METHOD_SIZE)
        .with_field("ConstMethod", "_constants", 8)
        .with_field("ConstMethod", "_code_size", 40)
        .with_field("ConstMethod", "_flags", 42)
        .with_field("ConstMethod", "_name_index", 44)
        .with_field("ConstMethod", "_signature_index", 46)
        .with_size("ConstantPool", CONSTANT_POOL_SIZE)
        .with_field("ConstantPool", "_pool_holder", 24)
        .with_field("Klass", "_name", 16)
        .with_field("Symbol", "_length_and_refcount", 0)
        .with_field("Symbol", "_body", 8)
}

pub fn layout() -> Layout {
    let table = layout_table();
    Layout::resolve(&table, table.target).expect("fixture layout is complete")
}

fn align8(value: u64) -> u64 {
    (value + 7) & !7
}

/// Description of a compiled method to lay out in memory
///
/// Sections are placed in order: header, instructions, oops, scopes data,
/// descriptor table (plus sentinel), dependencies.
pub struct NMethodSpec {
    pub address: u64,
    pub instructions_offset: u64,
    pub code_size: u64,
    pub method: u64,
    pub oops: Vec<u64>,
    pub scopes_data: Vec<u8>,
    /// `(pc_offset, scope_decode_offset)` entries, sentinel excluded
    pub pc_descs: Vec<(i32, i32)>,
    pub cache_last: u64,
    pub cache_slots: [u64; PC_DESC_CACHE_SIZE],
}

pub struct NMethodOffsets {
    pub oops: u64,
    pub scopes_data: u64,
    pub scopes_pcs: u64,
    pub dependencies: u64,
    pub size: u64,
}

impl NMethodSpec {
    pub fn new(address: u64) -> Self {
        Self {
            address,
            instructions_offset: 0x60,
            code_size: 0x400,
            method: 0,
            oops: Vec::new(),
            scopes_data: vec![0],
            pc_descs: Vec::new(),
            cache_last: 0,
            cache_slots: [0; PC_DESC_CACHE_SIZE],
        }
    }

    pub fn offsets(&self) -> NMethodOffsets {
        let oops = align8(self.instructions_offset + self.code_size);
        let scopes_data = oops + 8 * self.oops.len() as u64;
        let scopes_pcs = align8(scopes_data + self.scopes_data.len() as u64);
        let dependencies = scopes_pcs + PC_DESC_SIZE * (self.pc_descs.len() as u64 + 1);
        NMethodOffsets { oops, scopes_data, scopes_pcs, dependencies, size: dependencies + 16 }
    }

    /// Address of table entry `index` (`pc_descs.len()` is the sentinel)
    pub fn pc_desc_addr(&self, index: usize) -> u64 {
        self.address + self.offsets().scopes_pcs + PC_DESC_SIZE * index as u64
    }

    pub fn instructions_begin(&self) -> u64 {
        self.address + self.instructions_offset
    }

    pub fn pc(&self, pc_offset: i32) -> Address {
        Address(self.instructions_begin() + u64::try_from(pc_offset).expect("non-negative"))
    }

    /// Cache `index` as the most recent descriptor
    pub fn cache_last(mut self, index: usize) -> Self {
        self.cache_last = self.pc_desc_addr(index);
        self
    }
}

/// Writes scope records the way the compiler's debug-info recorder does
pub struct ScopeWriter {
    stream: CompressedWriteStream,
}

impl ScopeWriter {
    /// Offset 0 is reserved for "no scope", so the stream starts with a pad byte
    pub fn new() -> Self {
        let mut stream = CompressedWriteStream::new();
        stream.write_byte(0);
        Self { stream }
    }

    /// Append a scope record and return its payload offset
    pub fn record(&mut self, sender: u32, method_index: u32, bci: i32) -> i32 {
        let offset = i32::try_from(self.stream.position()).expect("small stream");
        self.stream.write_int(sender);
        self.stream.write_int(method_index);
        self.stream.write_int(u32::try_from(bci - INVOCATION_ENTRY_BCI).expect("bci >= -1"));
        offset
    }

    pub fn finish(self) -> Vec<u8> {
        self.stream.into_bytes()
    }
}

/// Description of a Java method and its metadata chain
pub struct MethodSpec {
    pub holder: Option<&'static str>,
    pub name: &'static str,
    pub signature: &'static str,
    pub code_size: u16,
    pub lines: Option<Vec<(i32, i32)>>,
}

impl MethodSpec {
    pub fn new(holder: &'static str, name: &'static str, signature: &'static str) -> Self {
        Self { holder: Some(holder), name, signature, code_size: 32, lines: None }
    }

    pub fn lines(mut self, lines: &[(i32, i32)]) -> Self {
        self.lines = Some(lines.to_vec());
        self
    }
}

/// One block in a synthetic code heap
pub struct HeapBlockSpec {
    pub first_segment: u64,
    pub segments: u64,
    pub used: bool,
}

/// A code heap of `segments` segments of `1 << log2_segment_size` bytes
pub struct CodeHeapSpec {
    pub address: u64,
    pub low: u64,
    pub segments: u64,
    pub log2_segment_size: u32,
    pub segmap: u64,
    pub blocks: Vec<HeapBlockSpec>,
}

impl CodeHeapSpec {
    pub fn block_addr(&self, segment: u64) -> u64 {
        self.low + (segment << self.log2_segment_size)
    }

    /// Where the blob of the block starting at `segment` lives
    pub fn blob_addr(&self, segment: u64) -> u64 {
        self.block_addr(segment) + HEAP_BLOCK_SIZE
    }

    pub fn high(&self) -> u64 {
        self.block_addr(self.segments)
    }
}

/// Sparse byte-level image builder
pub struct ImageBuilder {
    bytes: BTreeMap<u64, u8>,
    next_metadata: u64,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self { bytes: BTreeMap::new(), next_metadata: METADATA_BASE }
    }

    pub fn put_bytes(&mut self, addr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bytes.insert(addr + i as u64, *byte);
        }
    }

    pub fn fill(&mut self, addr: u64, len: u64, value: u8) {
        for a in addr..addr + len {
            self.bytes.insert(a, value);
        }
    }

    pub fn put_u8(&mut self, addr: u64, value: u8) {
        self.bytes.insert(addr, value);
    }

    pub fn put_u16(&mut self, addr: u64, value: u16) {
        self.put_bytes(addr, &value.to_le_bytes());
    }

    pub fn put_u32(&mut self, addr: u64, value: u32) {
        self.put_bytes(addr, &value.to_le_bytes());
    }

    pub fn put_i32(&mut self, addr: u64, value: i32) {
        self.put_bytes(addr, &value.to_le_bytes());
    }

    pub fn put_ptr(&mut self, addr: u64, value: u64) {
        self.put_bytes(addr, &value.to_le_bytes());
    }

    /// Reserve zeroed metadata space
    pub fn alloc(&mut self, len: u64) -> u64 {
        let addr = self.next_metadata;
        self.fill(addr, len, 0);
        self.next_metadata = align8(addr + len) + 8;
        addr
    }

    pub fn c_string(&mut self, text: &str) -> u64 {
        let addr = self.alloc(text.len() as u64 + 1);
        self.put_bytes(addr, text.as_bytes());
        addr
    }

    pub fn symbol(&mut self, text: &str) -> u64 {
        let addr = self.alloc(8 + text.len() as u64);
        let len = u32::try_from(text.len()).expect("short symbol");
        // Length in the high half, a refcount of 1 in the low half
        self.put_u32(addr, (len << 16) | 1);
        self.put_bytes(addr + 8, text.as_bytes());
        addr
    }

    /// Zero-filled blob with a name, size and instructions offset
    pub fn code_blob(&mut self, addr: u64, size: u64, instructions_offset: u64, name: &str) -> Address {
        self.fill(addr, size, 0);
        let name = self.c_string(name);
        self.put_ptr(addr, name);
        self.put_i32(addr + 8, i32::try_from(size).expect("small blob"));
        self.put_i32(addr + 12, i32::try_from(instructions_offset).expect("small offset"));
        Address(addr)
    }

    pub fn nmethod(&mut self, spec: &NMethodSpec) -> Address {
        let off = spec.offsets();
        let base = spec.address;
        let blob = self.code_blob(base, off.size, spec.instructions_offset, "nmethod");

        let as_i32 = |v: u64| i32::try_from(v).expect("small offset");
        self.put_ptr(base + 16, spec.method);
        self.put_i32(base + 24, as_i32(off.scopes_pcs));
        self.put_i32(base + 28, as_i32(off.dependencies));
        self.put_i32(base + 32, as_i32(off.scopes_data));
        self.put_i32(base + 36, as_i32(off.oops));

        self.put_ptr(base + 40, spec.cache_last);
        for (i, slot) in spec.cache_slots.iter().enumerate() {
            self.put_ptr(base + 48 + 8 * i as u64, *slot);
        }

        for (i, oop) in spec.oops.iter().enumerate() {
            self.put_ptr(base + off.oops + 8 * i as u64, *oop);
        }
        self.put_bytes(base + off.scopes_data, &spec.scopes_data);

        let sentinel = (i32::try_from(UPPER_OFFSET_LIMIT).expect("fits"), 0);
        for (i, (pc_offset, decode)) in spec.pc_descs.iter().chain(std::iter::once(&sentinel)).enumerate() {
            let entry = base + off.scopes_pcs + PC_DESC_SIZE * i as u64;
            self.put_i32(entry, *pc_offset);
            self.put_i32(entry + 4, *decode);
        }
        blob
    }

    /// Method, const method (with bytecodes and line table), constant pool,
    /// holder klass and symbols
    pub fn method(&mut self, spec: &MethodSpec) -> Address {
        let name = self.symbol(spec.name);
        let signature = self.symbol(spec.signature);

        let klass = match spec.holder {
            Some(holder) => {
                let holder = self.symbol(holder);
                let klass = self.alloc(32);
                self.put_ptr(klass + 16, holder);
                klass
            }
            None => {
                let klass = self.alloc(32);
                self.put_ptr(klass + 16, 0);
                klass
            }
        };

        // Slot 0 unused, name at slot 1, signature at slot 2
        let cpool = self.alloc(CONSTANT_POOL_SIZE + 3 * 8);
        self.put_ptr(cpool + 24, klass);
        self.put_ptr(cpool + CONSTANT_POOL_SIZE + 8, name);
        self.put_ptr(cpool + CONSTANT_POOL_SIZE + 16, signature);

        let table = spec.lines.as_ref().map(|lines| {
            let mut w = CompressedLineNumberWriteStream::new();
            for (bci, line) in lines {
                w.write_pair(*bci, *line);
            }
            w.finish()
        });
        let table_len = table.as_ref().map_or(0, Vec::len) as u64;

        let const_method = self.alloc(CONST_METHOD_SIZE + u64::from(spec.code_size) + table_len);
        self.put_ptr(const_method + 8, cpool);
        self.put_u16(const_method + 40, spec.code_size);
        self.put_u16(const_method + 42, u16::from(table.is_some()));
        self.put_u16(const_method + 44, 1);
        self.put_u16(const_method + 46, 2);
        if let Some(table) = &table {
            self.put_bytes(const_method + CONST_METHOD_SIZE + u64::from(spec.code_size), table);
        }

        let method = self.alloc(16);
        self.put_ptr(method + 8, const_method);
        Address(method)
    }

    /// Code heap structure, its segment map and block headers
    pub fn code_heap(&mut self, spec: &CodeHeapSpec) -> Address {
        let heap = spec.address;
        self.fill(heap, 0x78, 0);
        // _memory and _segmap are embedded VirtualSpaces
        self.put_ptr(heap + 0x10 + 0x10, spec.low);
        self.put_ptr(heap + 0x10 + 0x18, spec.high());
        self.put_ptr(heap + 0x40 + 0x10, spec.segmap);
        self.put_ptr(heap + 0x40 + 0x18, spec.segmap + spec.segments);
        self.put_i32(heap + 0x70, i32::try_from(spec.log2_segment_size).expect("small"));

        self.fill(spec.segmap, spec.segments, nmscope_common::SEGMAP_FREE_SENTINEL);
        for block in &spec.blocks {
            // Back-distances 0, 1, 2, ... restarting at 1 before reaching the sentinel
            let mut distance: u8 = 0;
            for seg in block.first_segment..block.first_segment + block.segments {
                self.put_u8(spec.segmap + seg, distance);
                distance = if distance == 0xFE { 1 } else { distance + 1 };
            }
            let header = spec.block_addr(block.first_segment);
            self.fill(header, HEAP_BLOCK_SIZE, 0);
            self.put_ptr(header, block.segments);
            self.put_u8(header + HEAP_BLOCK_USED, u8::from(block.used));
        }
        Address(heap)
    }

    /// Collapse runs of consecutive bytes into regions
    pub fn finish(self) -> SnapshotImage {
        let mut image = SnapshotImage::new();
        let mut run_start = None;
        let mut run: Vec<u8> = Vec::new();
        let mut prev = 0u64;
        for (addr, byte) in self.bytes {
            match run_start {
                Some(_) if addr == prev + 1 => run.push(byte),
                Some(start) => {
                    image.add_region(start, std::mem::take(&mut run)).expect("disjoint");
                    run_start = Some(addr);
                    run.push(byte);
                }
                None => {
                    run_start = Some(addr);
                    run.push(byte);
                }
            }
            prev = addr;
        }
        if let Some(start) = run_start {
            image.add_region(start, run).expect("disjoint");
        }
        image
    }
}

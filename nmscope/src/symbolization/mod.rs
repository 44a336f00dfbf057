//! # Address Resolution
//!
//! Turns a raw instruction address inside the code heap into the chain of
//! Java frames that were executing there, names included.
//!
//! ## Resolution Flow
//!
//! ```text
//! 1. Segment map walk: address → enclosing blob
//!    0x7f3a1c0452f0 → nmethod at 0x7f3a1c045010
//!
//! 2. Descriptor lookup: pc offset → PcDesc (exact, then approximate)
//!    offset 0x2e0 → PcDesc { pc_offset: 0x2e4, scope_decode_offset: 57 }
//!
//! 3. Scope replay: PcDesc → frames, innermost first
//!    (Method*, bci 14) → (Method*, bci 3)
//!
//! 4. Naming: Method → ConstMethod → ConstantPool symbols, line table
//!    java/util/HashMap.hash(Ljava/lang/Object;)I  at bci14 / L338
//!    java/util/HashMap.put(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;  at bci3 / L607
//! ```
//!
//! Blobs that are not compiled methods (stubs, adapters) resolve to a
//! single frame carrying the blob's name.
//!
//! ## Example
//!
//! ```rust,ignore
//! let snapshot = Snapshot::from_manifest("capture/manifest.json")?;
//! let table = LayoutTable::from_json_file("layouts/jdk8-x64.json")?;
//! let layout = Layout::resolve(&table, table.target)?;
//! let view = TargetView::new(&snapshot.image, &layout);
//!
//! let symbolizer = Symbolizer::new(view, code_heap_addr)?;
//! if let Some(resolved) = symbolizer.resolve(Address(0x7f3a_1c04_52f0))? {
//!     println!("{}", resolved.format(0));
//! }
//! ```

pub mod symbolizer;

pub use symbolizer::{InlinedFrame, JavaLocation, ResolvedFrame, Symbolizer};

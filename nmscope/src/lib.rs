//! # nmscope - Compiled-Method Scope Inspector
//!
//! nmscope maps a native instruction address inside JIT-compiled code back to
//! the Java frames that produced it, inlined callers included. It works
//! purely on a byte image of the target's memory plus a table of structure
//! layouts: nothing is executed and nothing is written.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             Memory image (manifest / ELF core / buffer)         │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ MemoryReader::read(address, length)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          TargetView = memory + resolved Layout (offsets)        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!      ┌──────────────────┼──────────────────┬─────────────────┐
//!      ▼                  ▼                  ▼                 ▼
//! ┌──────────┐     ┌─────────────┐    ┌─────────────┐   ┌────────────┐
//! │ CodeHeap │────▶│ PcDesc      │───▶│ Scope       │──▶│ Method     │
//! │ segmap   │     │ cache+search│    │ replay      │   │ line table │
//! └──────────┘     └─────────────┘    └─────────────┘   └────────────┘
//!  locate_blob      find_descriptor    decode_frames     line_for_bci
//! ```
//!
//! ## Module Structure
//!
//! - [`decode`]: the compressed integer codec and line-number tables
//! - [`code`]: code heap, blobs, descriptor lookup, scope replay, methods
//!   - `code_heap`: [`CodeHeap::find_blob`](code::CodeHeap::find_blob)
//!   - `pc_desc`: [`CompiledMethod::find_pc_desc`](code::CompiledMethod::find_pc_desc)
//!   - `scopes`: [`decode_frames`](code::decode_frames)
//!   - `method`: [`Method::line_number_from_bci`](code::Method::line_number_from_bci)
//! - [`memory`]: the [`MemoryReader`](memory::MemoryReader) trait, snapshot
//!   images and the typed [`TargetView`](memory::TargetView)
//! - [`layout`]: [`LayoutProvider`](layout::LayoutProvider) and the JSON
//!   [`LayoutTable`](layout::LayoutTable)
//! - [`symbolization`]: the whole pipeline behind one call
//! - [`domain`]: core types and errors
//! - [`cli`]: command-line argument definitions
//!
//! ## Errors
//!
//! Lookups that find nothing return `Ok(None)`. An `Err` always means the
//! image or the layout disagrees with the format: a read fell outside the
//! image, a table has the wrong shape, a scope chain loops.
//!
//! ## Concurrency
//!
//! Every decoding step reads through a shared `&TargetView` and keeps its
//! cursor on the stack, so independent lookups can run on separate threads
//! over the same frozen image. Against a live target the producer may be
//! rewriting the descriptor cache while it is read; results are then best
//! effort.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Which blob holds this address?
//! nmscope --snapshot capture/manifest.json --layout jdk8.json blob 0x7f3a1c0452f0
//!
//! # Full inlining chain
//! nmscope --core core.1234 --layout jdk8.json --code-heap 0x7f3a28012340 inlining 0x7f3a1c0452f0
//! ```

pub mod cli;
pub mod code;
pub mod decode;
pub mod domain;
pub mod layout;
pub mod memory;
pub mod symbolization;

#[cfg(test)]
pub(crate) mod fixtures;

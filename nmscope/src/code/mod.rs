//! Compiled-code records and the lookups over them
//!
//! - [`code_heap`]: address → enclosing blob, through the segment map
//! - [`blob`]: blob headers and the compiled-method specialization
//! - [`pc_desc`]: instruction address → descriptor, through the cache and
//!   the quasi-binary table search
//! - [`scopes`]: descriptor → inlined frames, innermost first
//! - [`method`]: method names and `bci` → source line

pub mod blob;
pub mod code_heap;
pub mod method;
pub mod pc_desc;
pub mod scopes;

pub use blob::{BlobKind, CodeBlob, CompiledMethod};
pub use code_heap::{CodeHeap, HeapBlock};
pub use method::{read_symbol, ConstMethod, Method};
pub use pc_desc::{PcDesc, PcDescCache, PcDescTable};
pub use scopes::{decode_frames, DebugInfoReadStream, Frame};

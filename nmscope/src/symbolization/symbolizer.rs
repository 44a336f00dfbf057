// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::code::{decode_frames, CodeBlob, CodeHeap, Method, PcDesc};
use crate::domain::{Address, Bci, InspectError, SourceLine};
use crate::memory::TargetView;

/// Placeholder for a frame whose method is not recorded
const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Symbolizer for resolving instruction addresses inside the code heap
///
/// Snapshots do not change underneath it, so resolved addresses are cached.
pub struct Symbolizer<'a> {
    view: TargetView<'a>,
    code_heap: CodeHeap,
    /// Cache of resolved frames by address
    cache: RefCell<HashMap<u64, Option<ResolvedFrame>>>,
}

impl<'a> Symbolizer<'a> {
    /// Create a symbolizer over the code heap structure at `code_heap`
    ///
    /// # Errors
    /// Returns an error if the code heap structure cannot be read
    pub fn new(view: TargetView<'a>, code_heap: Address) -> Result<Self, InspectError> {
        let code_heap = CodeHeap::read(&view, code_heap)?;
        Ok(Self { view, code_heap, cache: RefCell::new(HashMap::new()) })
    }

    #[must_use]
    pub fn code_heap(&self) -> &CodeHeap {
        &self.code_heap
    }

    /// The blob containing `addr`, if any
    ///
    /// # Errors
    /// Returns an error if the segment map or blob header is malformed
    pub fn locate_blob(&self, addr: Address) -> Result<Option<CodeBlob>, InspectError> {
        self.code_heap.find_blob(&self.view, addr)
    }

    /// Resolve an instruction address to its chain of inlined Java frames
    ///
    /// Returns `Ok(None)` if `addr` is not inside any blob.
    ///
    /// # Errors
    /// Returns an error if the metadata on the way is malformed
    pub fn resolve(&self, addr: Address) -> Result<Option<ResolvedFrame>, InspectError> {
        if let Some(cached) = self.cache.borrow().get(&addr.0) {
            return Ok(cached.clone());
        }

        let resolved = self.resolve_uncached(addr)?;
        self.cache.borrow_mut().insert(addr.0, resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(&self, addr: Address) -> Result<Option<ResolvedFrame>, InspectError> {
        let view = &self.view;
        let Some(blob) = self.locate_blob(addr)? else {
            return Ok(None);
        };
        let blob_name = blob.name().to_string();

        let Some(nm) = blob.as_compiled_method(view)? else {
            debug!("{addr} is in {blob_name} blob {}", blob.header_begin());
            let frame = InlinedFrame { function: blob_name.clone(), location: None };
            return Ok(Some(ResolvedFrame { addr, blob: blob_name, pc_desc: None, frames: vec![frame] }));
        };

        let pc_desc = nm.pc_desc_at(view, addr)?;
        let mut frames = Vec::new();
        if let Some(desc) = &pc_desc {
            for frame in decode_frames(view, &nm, desc)? {
                frames.push(InlinedFrame {
                    function: self.function_name(frame.method)?,
                    location: Some(JavaLocation { bci: frame.bci, line: frame.line }),
                });
            }
        }
        // No scope information: all we know is the compiled method itself
        if frames.is_empty() {
            let method = (!nm.method().is_null()).then_some(nm.method());
            frames.push(InlinedFrame { function: self.function_name(method)?, location: None });
        }

        Ok(Some(ResolvedFrame { addr, blob: blob_name, pc_desc, frames }))
    }

    fn function_name(&self, method: Option<Address>) -> Result<String, InspectError> {
        match method {
            Some(m) => Method::read(&self.view, m)?.qualified_name(&self.view),
            None => Ok(UNKNOWN_FUNCTION.to_string()),
        }
    }
}

/// A resolved address (may contain multiple inlined frames)
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub addr: Address,
    /// Name of the enclosing blob
    pub blob: String,
    /// Descriptor the frames were decoded from
    pub pc_desc: Option<PcDesc>,
    /// Innermost frame first
    pub frames: Vec<InlinedFrame>,
}

/// An inlined frame within a resolved address
#[derive(Debug, Clone)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<JavaLocation>,
}

/// Bytecode position of a frame
#[derive(Debug, Clone, Copy)]
pub struct JavaLocation {
    pub bci: Bci,
    pub line: SourceLine,
}

impl ResolvedFrame {
    /// Format the frame for display
    #[must_use]
    pub fn format(&self, frame_num: usize) -> String {
        let mut output = String::new();

        for (idx, inlined) in self.frames.iter().enumerate() {
            let prefix = if idx == 0 { format!("#{frame_num:<2}") } else { "    ".to_string() };

            output.push_str(&format!("{} {} {}", prefix, self.addr, inlined.function));

            if let Some(ref loc) = inlined.location {
                output.push_str(&format!("\n                      at {} / {}", loc.bci, loc.line));
            }

            if idx < self.frames.len() - 1 {
                output.push('\n');
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, CodeHeapSpec, HeapBlockSpec, ImageBuilder, MethodSpec, NMethodSpec, ScopeWriter};

    #[test]
    fn test_format_inlined_frames() {
        let frame = ResolvedFrame {
            addr: Address(0x1000),
            blob: "nmethod".to_string(),
            pc_desc: None,
            frames: vec![
                InlinedFrame {
                    function: "A.leaf()V".to_string(),
                    location: Some(JavaLocation { bci: Bci(3), line: SourceLine(21) }),
                },
                InlinedFrame { function: "B.caller()V".to_string(), location: None },
            ],
        };

        let text = frame.format(0);
        assert_eq!(
            text,
            "#0  0x0000000000001000 A.leaf()V\n                      at bci3 / L21\n     0x0000000000001000 B.caller()V"
        );
    }

    #[test]
    fn test_resolve_through_code_heap() {
        let layout = fixtures::layout();
        let heap = CodeHeapSpec {
            address: 0x5000,
            low: 0x10_0000,
            segments: 512,
            log2_segment_size: 6,
            segmap: 0x20_0000,
            blocks: vec![HeapBlockSpec { first_segment: 0, segments: 256, used: true }],
        };

        let mut b = ImageBuilder::new();
        b.code_heap(&heap);
        let leaf = b.method(&MethodSpec::new("A", "leaf", "()I").lines(&[(0, 20), (3, 21)]));
        let caller = b.method(&MethodSpec::new("B", "caller", "()V").lines(&[(0, 40), (5, 42)]));

        let mut w = ScopeWriter::new();
        let outer = w.record(0, 2, 5);
        let inner = w.record(u32::try_from(outer).unwrap(), 1, 3);
        let mut nm = NMethodSpec::new(heap.blob_addr(0));
        nm.method = caller.0;
        nm.oops = vec![leaf.0, caller.0];
        nm.scopes_data = w.finish();
        nm.pc_descs = vec![(0x10, 0), (0x40, inner)];
        b.nmethod(&nm);
        let image = b.finish();
        let view = TargetView::new(&image, &layout);

        let symbolizer = Symbolizer::new(view, Address(heap.address)).unwrap();
        let resolved = symbolizer.resolve(nm.pc(0x30)).unwrap().unwrap();
        assert_eq!(resolved.blob, "nmethod");
        assert_eq!(resolved.pc_desc.unwrap().pc_offset(), 0x40);
        let names: Vec<&str> = resolved.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, vec!["A.leaf()I", "B.caller()V"]);

        // Descriptor without scopes falls back to the compiled method
        let top = symbolizer.resolve(nm.pc(0x10)).unwrap().unwrap();
        assert_eq!(top.frames.len(), 1);
        assert_eq!(top.frames[0].function, "B.caller()V");
        assert!(top.frames[0].location.is_none());

        assert!(symbolizer.resolve(Address(heap.low - 8)).unwrap().is_none());
    }
}

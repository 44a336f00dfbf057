//! Inlined-frame decoding
//!
//! A descriptor's `scope_decode_offset` points at the innermost scope record
//! in the compiled method's scopes data. Each record is three compressed
//! integers:
//!
//! ```text
//! sender offset   (next record outwards, 0 = outermost)
//! method index    (1-based into the reference table, 0 = none)
//! bci + 1         (biased by the invocation-entry bci)
//! ```

use std::collections::HashSet;

use log::debug;
use nmscope_common::{INVOCATION_ENTRY_BCI, SERIALIZED_NULL};

use super::blob::CompiledMethod;
use super::method::Method;
use super::pc_desc::PcDesc;
use crate::decode::CompressedReadStream;
use crate::domain::{Address, Bci, InspectError, MemoryRange, SourceLine};
use crate::memory::{Bounded, MemoryReader, TargetView};

/// One level of an inlining chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// The `Method` executing at this level, if recorded
    pub method: Option<Address>,
    pub bci: Bci,
    pub line: SourceLine,
}

/// Cursor over a compiled method's scopes data
pub struct DebugInfoReadStream<'m, M: MemoryReader + ?Sized> {
    stream: CompressedReadStream<'m, M>,
}

impl<'m, M: MemoryReader + ?Sized> DebugInfoReadStream<'m, M> {
    pub fn new(memory: &'m M, scopes_data: u64, offset: u64) -> Self {
        Self { stream: CompressedReadStream::new(memory, scopes_data, offset) }
    }

    /// # Errors
    /// Returns an error if the stream runs off its record
    pub fn read_int(&mut self) -> Result<u32, InspectError> {
        self.stream.read_int()
    }

    /// Read a bci stored relative to the invocation entry
    ///
    /// # Errors
    /// Returns an error if the stream runs off its record
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_bci(&mut self) -> Result<Bci, InspectError> {
        Ok(Bci((self.stream.read_int()? as i32).wrapping_add(INVOCATION_ENTRY_BCI)))
    }
}

/// Replay the scope chain of `desc`, innermost frame first
///
/// A descriptor without scope information yields no frames.
///
/// # Errors
/// Returns an error if a record runs past the end of the compiled method,
/// the chain revisits a record, or a referenced method cannot be read
pub fn decode_frames(
    view: &TargetView<'_>,
    nm: &CompiledMethod,
    desc: &PcDesc,
) -> Result<Vec<Frame>, InspectError> {
    let offset = u32::try_from(desc.scope_decode_offset())
        .map_err(|_| InspectError::malformed("scope decode offset", desc.address().0))?;

    let scopes_data = nm.scopes_data_begin();
    let bounded = Bounded::new(
        view.memory(),
        MemoryRange { start: scopes_data.0, end: nm.blob().data_end().0 },
    );

    let mut frames = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = offset;
    while offset != SERIALIZED_NULL {
        if !seen.insert(offset) {
            return Err(InspectError::malformed("scope chain", scopes_data.0 + u64::from(offset)));
        }

        let mut stream = DebugInfoReadStream::new(&bounded, scopes_data.0, u64::from(offset));
        let sender = stream.read_int()?;
        let method_index = stream.read_int()?;
        let bci = stream.read_bci()?;

        let method = nm.oop_at(view, method_index)?;
        let line = match method {
            Some(m) => Method::read(view, m)?.line_number_from_bci(view, bci)?,
            None => SourceLine::UNKNOWN,
        };
        debug!("Scope at +{offset}: method {method:?} {bci} {line}, sender +{sender}");

        frames.push(Frame { method, bci, line });
        offset = sender;
    }
    Ok(frames)
}

impl CompiledMethod {
    /// Inlining chain for `desc`; see [`decode_frames`]
    ///
    /// # Errors
    /// Returns an error if the scope records are malformed
    pub fn frames(&self, view: &TargetView<'_>, desc: &PcDesc) -> Result<Vec<Frame>, InspectError> {
        decode_frames(view, self, desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeBlob;
    use crate::fixtures::{self, ImageBuilder, MethodSpec, NMethodSpec, ScopeWriter};
    use crate::memory::SnapshotImage;

    /// Compiled method whose single descriptor at pc offset 16 points at `scope`
    fn build(
        scopes: ScopeWriter,
        scope: i32,
        with_methods: bool,
    ) -> (NMethodSpec, SnapshotImage, Vec<Address>) {
        let mut b = ImageBuilder::new();
        let mut methods = Vec::new();
        let mut spec = NMethodSpec::new(0x1000);
        if with_methods {
            let inner = b.method(&MethodSpec::new("Inner", "leaf", "()I").lines(&[(0, 20), (3, 21)]));
            let outer = b.method(&MethodSpec::new("Outer", "caller", "()V").lines(&[(0, 40), (5, 42)]));
            methods = vec![inner, outer];
            spec.method = outer.0;
            spec.oops = methods.iter().map(|m| m.0).collect();
        }
        spec.scopes_data = scopes.finish();
        spec.pc_descs = vec![(16, scope)];
        b.nmethod(&spec);
        (spec, b.finish(), methods)
    }

    fn decode(layout: &crate::layout::Layout, image: &SnapshotImage, spec: &NMethodSpec) -> Result<Vec<Frame>, InspectError> {
        let view = TargetView::new(image, layout);
        let nm = CodeBlob::read(&view, Address(spec.address)).unwrap().as_compiled_method(&view).unwrap().unwrap();
        let desc = nm.find_pc_desc(&view, spec.pc(16), false).unwrap().unwrap();
        nm.frames(&view, &desc)
    }

    #[test]
    fn test_two_frame_chain_innermost_first() {
        let layout = fixtures::layout();
        let mut w = ScopeWriter::new();
        let outer = w.record(0, 2, 5);
        let inner = w.record(u32::try_from(outer).unwrap(), 1, 3);
        let (spec, image, methods) = build(w, inner, true);

        let frames = decode(&layout, &image, &spec).unwrap();
        assert_eq!(
            frames,
            vec![
                Frame { method: Some(methods[0]), bci: Bci(3), line: SourceLine(21) },
                Frame { method: Some(methods[1]), bci: Bci(5), line: SourceLine(42) },
            ]
        );
    }

    #[test]
    fn test_no_scope_yields_no_frames() {
        let layout = fixtures::layout();
        let (spec, image, _) = build(ScopeWriter::new(), 0, false);

        assert!(decode(&layout, &image, &spec).unwrap().is_empty());
    }

    #[test]
    fn test_missing_method_has_unknown_line() {
        let layout = fixtures::layout();
        let mut w = ScopeWriter::new();
        let only = w.record(0, 0, INVOCATION_ENTRY_BCI);
        let (spec, image, _) = build(w, only, false);

        let frames = decode(&layout, &image, &spec).unwrap();
        assert_eq!(frames, vec![Frame { method: None, bci: Bci::INVOCATION_ENTRY, line: SourceLine::UNKNOWN }]);
    }

    #[test]
    fn test_cycle_is_malformed() {
        let layout = fixtures::layout();
        let mut w = ScopeWriter::new();
        // The first record sits right after the pad byte and names itself as sender
        let looped = w.record(1, 0, 0);
        assert_eq!(looped, 1);
        let (spec, image, _) = build(w, looped, false);

        assert!(matches!(
            decode(&layout, &image, &spec),
            Err(InspectError::Malformed { what: "scope chain", .. })
        ));
    }

    #[test]
    fn test_record_past_blob_end_is_error() {
        let layout = fixtures::layout();
        let (spec, image, _) = build(ScopeWriter::new(), 0x10_0000, false);

        assert!(matches!(decode(&layout, &image, &spec), Err(InspectError::Unmapped { .. })));
    }

    #[test]
    fn test_negative_offset_is_malformed() {
        let layout = fixtures::layout();
        let (spec, image, _) = build(ScopeWriter::new(), -4, false);

        assert!(matches!(
            decode(&layout, &image, &spec),
            Err(InspectError::Malformed { what: "scope decode offset", .. })
        ));
    }
}

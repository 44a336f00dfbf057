//! Byte-level decoders for compiled-method debug metadata
//!
//! - [`compressed_stream`]: the variable-length integer codec every other
//!   format is built on
//! - [`line_table`]: compressed `(bci, line)` tables attached to methods

pub mod compressed_stream;
pub mod line_table;

pub use compressed_stream::{decode_sign, encode_sign, CompressedReadStream, CompressedWriteStream};
pub use line_table::{
    line_number_from_bci, CompressedLineNumberReadStream, CompressedLineNumberWriteStream,
};

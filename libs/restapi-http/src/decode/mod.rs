//! Raw response decoding: status line and header parsing, chunked transfer
//! decoding and best-effort decompression.
//!
//! Everything here is synchronous and stateless; a parser can be shared
//! between concurrent requests without locking.

pub mod chunked;
pub mod decompress;
mod headers;
mod raw;

pub use chunked::decode_chunked;
pub use decompress::{
    DEFAULT_MAX_DECOMPRESSED_SIZE, Decompressor, compatible_inflate, decompress, inflate_raw,
};
pub use headers::{Iter as HeaderIter, ResponseHeaders};
pub use raw::{ParsedResponse, ResponseParser, parse_response};

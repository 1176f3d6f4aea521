//! Best-effort body decompression.
//!
//! Servers mislabel encodings, strip wrappers, or send a ZIP local file where a
//! deflate stream was promised. The decompressor tries an ordered list of
//! strategies and returns the first complete decode. When nothing works the
//! input comes back unchanged, so a wrong guess surfaces later as a JSON error
//! instead of a failed request.

use flate2::read::GzDecoder;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::Read;

/// Default cap on decompressed output (64 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on nested gzip headers stripped by [`compatible_inflate`].
const MAX_GZIP_LAYERS: usize = 16;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZLIB_MAGIC: [u8; 2] = [0x78, 0x9c];
const ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const ZIP_STREAMED_FLAG: u16 = 0x0008;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

/// A decoding attempt; `None` means the format did not fit.
type Strategy = fn(&[u8], usize) -> Option<Vec<u8>>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("gzip", gunzip),
    ("deflate", inflate_raw),
    ("compatible", compatible_inflate),
    ("zlib", inflate_zlib),
];

/// Content decompressor with an output size limit.
#[derive(Debug, Clone, Copy)]
pub struct Decompressor {
    limit: usize,
}

impl Default for Decompressor {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

impl Decompressor {
    /// Create a decompressor whose strategies give up past `limit` output bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    /// Output size limit in bytes.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Decompress `data`, or return it unchanged.
    ///
    /// Only input starting with gzip (`1F 8B`) or zlib (`78 9C`) magic is
    /// considered compressed; anything else was probably decoded upstream.
    #[must_use]
    pub fn decompress(&self, data: &[u8]) -> Vec<u8> {
        if !has_compression_magic(data) {
            return data.to_vec();
        }

        for (name, strategy) in STRATEGIES {
            if let Some(out) = strategy(data, self.limit) {
                tracing::trace!(
                    strategy = name,
                    compressed = data.len(),
                    decompressed = out.len(),
                    "body decompressed"
                );
                return out;
            }
        }

        tracing::debug!(
            len = data.len(),
            "no decompression strategy matched, passing body through"
        );
        data.to_vec()
    }
}

/// Decompress with the default size limit.
#[must_use]
pub fn decompress(data: &[u8]) -> Vec<u8> {
    Decompressor::default().decompress(data)
}

fn has_compression_magic(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC) || data.starts_with(&ZLIB_MAGIC)
}

/// Decoder for deflate streams that arrive with broken or unexpected wrappers.
///
/// Leading gzip headers are stripped (at most 16 of them), then each layer is
/// tried from the innermost outwards. A layer decodes as:
///
/// 1. a zlib-looking stream (low nibble 8, header divisible by 31) inflated
///    without its 2-byte header,
/// 2. a ZIP local file: returned untouched unless the streamed-data flag is
///    set, in which case the entry data is inflated,
/// 3. a raw deflate stream,
/// 4. a raw deflate stream behind an unknown 2-byte prefix.
#[must_use]
pub fn compatible_inflate(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut layers = vec![data];
    let mut current = data;
    for _ in 0..MAX_GZIP_LAYERS {
        let Some(inner) = gzip_header_len(current).and_then(|len| current.get(len..)) else {
            break;
        };
        layers.push(inner);
        current = inner;
    }

    layers
        .iter()
        .rev()
        .find_map(|layer| inflate_layer(layer, limit))
}

fn inflate_layer(layer: &[u8], limit: usize) -> Option<Vec<u8>> {
    if looks_like_zlib_header(layer)
        && let Some(out) = layer.get(2..).and_then(|rest| inflate_raw(rest, limit))
    {
        return Some(out);
    }

    if layer.starts_with(&ZIP_LOCAL_HEADER) {
        return inflate_zip_entry(layer, limit);
    }

    inflate_raw(layer, limit).or_else(|| layer.get(2..).and_then(|rest| inflate_raw(rest, limit)))
}

fn looks_like_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0f == 0x08 && u16::from_be_bytes([*cmf, *flg]) % 0x1f == 0,
        _ => false,
    }
}

fn inflate_zip_entry(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    let flags = read_le16(data, 6)?;
    if flags & ZIP_STREAMED_FLAG == 0 {
        return Some(data.to_vec());
    }
    let name_len = usize::from(read_le16(data, 26)?);
    let extra_len = usize::from(read_le16(data, 28)?);
    let start = 30 + name_len + extra_len;
    inflate_raw(data.get(start..)?, limit)
}

fn read_le16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Length of the gzip member header at the start of `data`, if there is one
/// and all of its optional fields fit.
fn gzip_header_len(data: &[u8]) -> Option<usize> {
    if !data.starts_with(&[0x1f, 0x8b, 0x08]) {
        return None;
    }
    let flags = *data.get(3)?;
    let mut pos = 10;

    if flags & FEXTRA != 0 {
        let xlen = usize::from(read_le16(data, pos)?);
        pos += 2 + xlen;
    }
    if flags & FNAME != 0 {
        pos += data.get(pos..)?.iter().position(|b| *b == 0)? + 1;
    }
    if flags & FCOMMENT != 0 {
        pos += data.get(pos..)?.iter().position(|b| *b == 0)? + 1;
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }

    (pos <= data.len()).then_some(pos)
}

fn gunzip(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let cap = u64::try_from(limit).ok()?.saturating_add(1);
    GzDecoder::new(data)
        .take(cap)
        .read_to_end(&mut out)
        .ok()?;
    (out.len() <= limit).then_some(out)
}

/// Inflate a deflate stream with no wrapper.
#[must_use]
pub fn inflate_raw(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    inflate(data, false, limit)
}

fn inflate_zlib(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    inflate(data, true, limit)
}

/// Inflate until the end-of-stream marker. Truncated or corrupt input, and
/// output beyond `limit`, are failures.
fn inflate(data: &[u8], zlib_header: bool, limit: usize) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }

    let mut inflater = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(limit).max(256));
    loop {
        let consumed = usize::try_from(inflater.total_in()).ok()?;
        let produced = out.len();
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }

        let status = inflater
            .decompress_vec(data.get(consumed..)?, &mut out, FlushDecompress::None)
            .ok()?;
        if out.len() > limit {
            return None;
        }

        match status {
            Status::StreamEnd => return Some(out),
            Status::Ok | Status::BufError => {
                let consumed_now = usize::try_from(inflater.total_in()).ok()?;
                if consumed_now == consumed && out.len() == produced {
                    return None;
                }
            }
        }
    }
}

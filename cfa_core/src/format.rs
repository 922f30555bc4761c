use serde::{Deserialize, Serialize};

use crate::bitstream::BitStream;
use crate::buffer::AlignedBuf;
use crate::error::{ArrayError, Result};
use crate::scalar::ScalarType;
use crate::stream::RateParams;

/// Magic bytes opening every header, followed by a one-byte codec version.
pub const MAGIC: &[u8; 3] = b"cfa";

/// Bumped whenever the block bit layout changes.
pub const CODEC_VERSION: u8 = 1;

/// Header field widths in bits.
///   magic[24] + version[8]                          = 32
///   type[2] + dims[2] + extents[48]                 = 52
///   mode[12] (short form; 64 in long form)          = 12
pub const MAGIC_BITS: usize = 32;
pub const META_BITS: usize = 52;
pub const MODE_SHORT_BITS: usize = 12;
pub const MODE_LONG_BITS: usize = 64;

/// Largest mode word that fits the short form; `MODE_SHORT_MAX + 1`
/// (all ones) announces the long form.
pub const MODE_SHORT_MAX: u64 = (1 << MODE_SHORT_BITS) - 2;

/// Fixed header size: 96 bits = 12 bytes = three 32-bit words.
pub const HEADER_SIZE_BITS: usize = MAGIC_BITS + META_BITS + MODE_SHORT_BITS;
pub const HEADER_SIZE: usize = HEADER_SIZE_BITS / 8;

/// Word size of the bit-cursor; compressed buffers are padded to it.
pub const STREAM_WORD_BITS: usize = 64;

/// Alignment of every compressed buffer.
pub const BUFFER_ALIGNMENT: usize = 0x100;

// ── Header record ──────────────────────────────────────────────────────────

/// Serialized array descriptor: exactly three little-endian 32-bit words.
///
/// A header has no ownership relationship with any array; it is produced by
/// `write_header` and consumed by `from_header` or [`parse_header`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub buffer: [u32; 3],
}

impl Header {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        for (chunk, word) in buf.chunks_exact_mut(4).zip(self.buffer) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes. Contents are validated on parse.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut buffer = [0u32; 3];
        for (word, chunk) in buffer.iter_mut().zip(buf.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { buffer }
    }

    /// Take the header from the front of a byte slice.
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        let bytes: &[u8; HEADER_SIZE] = buf
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                ArrayError::InvalidHeader(format!(
                    "need {} bytes, got {}",
                    HEADER_SIZE,
                    buf.len()
                ))
            })?;
        Ok(Self::from_bytes(bytes))
    }
}

// ── Field metadata ─────────────────────────────────────────────────────────

/// Scalar type and extents carried in the header's metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub scalar_type: ScalarType,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl FieldDescriptor {
    /// Number of leading nonzero extents.
    pub fn dimensionality(&self) -> u32 {
        match (self.nx, self.ny, self.nz) {
            (0, _, _) => 0,
            (_, 0, _) => 1,
            (_, _, 0) => 2,
            _ => 3,
        }
    }

    /// Pack into the 52-bit metadata word, or `None` if an extent does not
    /// fit its field (48 bits in 1D, 24 in 2D, 16 in 3D).
    pub fn metadata(&self) -> Option<u64> {
        fn field(n: usize, bits: u32) -> Option<u64> {
            let v = (n as u64).checked_sub(1)?;
            (v < 1u64 << bits).then_some(v)
        }
        let dims = self.dimensionality();
        let mut meta = match dims {
            1 => field(self.nx, 48)?,
            2 => (field(self.ny, 24)? << 24) + field(self.nx, 24)?,
            3 => {
                (field(self.nz, 16)? << 32) + (field(self.ny, 16)? << 16) + field(self.nx, 16)?
            }
            _ => return None,
        };
        meta = (meta << 2) + (dims as u64 - 1);
        meta = (meta << 2) + (self.scalar_type.tag() - 1);
        Some(meta)
    }

    pub fn from_metadata(mut meta: u64) -> Option<Self> {
        if meta >> META_BITS != 0 {
            return None;
        }
        let scalar_type = ScalarType::from_tag((meta & 0x3) + 1)?;
        meta >>= 2;
        let dims = (meta & 0x3) + 1;
        meta >>= 2;
        let (nx, ny, nz) = match dims {
            1 => ((meta & 0xffff_ffff_ffff) + 1, 0, 0),
            2 => ((meta & 0xff_ffff) + 1, ((meta >> 24) & 0xff_ffff) + 1, 0),
            3 => (
                (meta & 0xffff) + 1,
                ((meta >> 16) & 0xffff) + 1,
                ((meta >> 32) & 0xffff) + 1,
            ),
            _ => return None,
        };
        Some(Self {
            scalar_type,
            nx: nx as usize,
            ny: ny as usize,
            nz: nz as usize,
        })
    }
}

// ── Header codec ───────────────────────────────────────────────────────────

/// Everything a header describes, plus how many bits it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedHeader {
    pub field: FieldDescriptor,
    pub params: RateParams,
    pub bits: usize,
}

/// Write magic, metadata and the short-form mode at the cursor.
pub fn write_header(bits: &mut BitStream, field: &FieldDescriptor, params: &RateParams) -> Result<()> {
    let meta = field.metadata().ok_or_else(|| {
        ArrayError::InvalidHeader(format!(
            "extents {}x{}x{} do not fit the header metadata",
            field.nx, field.ny, field.nz
        ))
    })?;
    let mode = params.mode_word();
    if mode > MODE_SHORT_MAX {
        return Err(ArrayError::InvalidHeader(format!(
            "{} parameters {:?} need the {}-bit mode form",
            params.mode(),
            params,
            MODE_LONG_BITS
        )));
    }
    for &b in MAGIC {
        bits.write_bits(b as u64, 8);
    }
    bits.write_bits(CODEC_VERSION as u64, 8);
    bits.write_bits(meta, META_BITS as u32);
    bits.write_bits(mode, MODE_SHORT_BITS as u32);
    Ok(())
}

/// Read a header at the cursor. Returns `None` on bad magic, version,
/// metadata, or mode; otherwise reports the number of bits consumed, which
/// is `HEADER_SIZE_BITS` only for the short mode form.
pub fn read_header(bits: &mut BitStream) -> Option<ParsedHeader> {
    let start = bits.rtell();
    for &b in MAGIC {
        if bits.read_bits(8) != b as u64 {
            return None;
        }
    }
    if bits.read_bits(8) != CODEC_VERSION as u64 {
        return None;
    }
    let field = FieldDescriptor::from_metadata(bits.read_bits(META_BITS as u32))?;
    let mut mode = bits.read_bits(MODE_SHORT_BITS as u32);
    if mode > MODE_SHORT_MAX {
        let rest = (MODE_LONG_BITS - MODE_SHORT_BITS) as u32;
        mode += bits.read_bits(rest) << MODE_SHORT_BITS;
    }
    let params = RateParams::from_mode_word(mode)?;
    Some(ParsedHeader {
        field,
        params,
        bits: bits.rtell() - start,
    })
}

/// Parse a standalone header without an array. Used to pick the concrete
/// array type before constructing it.
pub fn parse_header(header: &Header) -> Option<ParsedHeader> {
    let buf = AlignedBuf::from_slice(&header.to_bytes()).ok()?;
    let mut bits = BitStream::new(buf);
    read_header(&mut bits)
}

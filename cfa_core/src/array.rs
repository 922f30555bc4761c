use std::any::Any;
use std::cell::{Ref, RefCell};

use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::bitstream::BitStream;
use crate::buffer::AlignedBuf;
use crate::codec::BlockCodec;
use crate::error::{ArrayError, Result};
use crate::format::{self, FieldDescriptor, Header, HEADER_SIZE, HEADER_SIZE_BITS, STREAM_WORD_BITS};
use crate::grid::{self, BlockGrid, BlockShape};
use crate::scalar::{Scalar, ScalarType};
use crate::stream::{CodecStream, CompressionMode, RateParams, StreamRedirect};

/// Bytes needed to hold `blocks` blocks of `blkbits` bits, rounded up to
/// whole stream words. `None` if the bit count overflows `usize`.
pub fn stream_bytes(blocks: usize, blkbits: usize) -> Option<usize> {
    let bits = blocks.checked_mul(blkbits)?;
    Some(bits.div_ceil(STREAM_WORD_BITS) * (STREAM_WORD_BITS / 8))
}

/// Extents whose element or bit count does not fit in memory at all.
fn oversized() -> ArrayError {
    ArrayError::Allocation { bytes: usize::MAX }
}

/// State shared by every dimensional array: extents, block grid, fixed
/// rate, and the compressed buffer.
///
/// The compressed buffer is owned by the codec stream's bit-cursor, so the
/// cursor always targets the live buffer. It sits behind a `RefCell`
/// because flushing a cache through `&self` (e.g. from
/// [`CompressedArray::compressed_data`]) rewrites compressed bytes without
/// changing any logical value. Arrays are therefore `!Sync`; share one across
/// threads only behind external synchronization.
#[derive(Debug)]
pub struct ArrayBase {
    dims: u32,
    scalar_type: ScalarType,
    nx: usize,
    ny: usize,
    nz: usize,
    grid: BlockGrid,
    blkbits: usize,
    bytes: usize,
    stream: RefCell<CodecStream>,
    shape: Option<Box<[u8]>>,
}

impl ArrayBase {
    /// An empty array of the given dimensionality and scalar type.
    pub fn new(dims: u32, scalar_type: ScalarType) -> Self {
        Self {
            dims,
            scalar_type,
            nx: 0,
            ny: 0,
            nz: 0,
            grid: BlockGrid::default(),
            blkbits: 0,
            bytes: 0,
            stream: RefCell::new(CodecStream::default()),
            shape: None,
        }
    }

    /// Validate `header` against `dims`/`scalar_type` and, when `buffer` is
    /// non-empty, check that it is long enough for the described stream.
    ///
    /// Extents and rate are taken from the header, but no storage is
    /// allocated, so the result is not a usable array until the caller
    /// resizes it and copies the buffer in. On error nothing survives.
    pub(crate) fn from_header(dims: u32, scalar_type: ScalarType, header: &Header, buffer: &[u8]) -> Result<Self> {
        let mut base = Self::new(dims, scalar_type);
        base.read_header(header).inspect_err(|err| {
            debug!(dims, %scalar_type, %err, "header rejected");
        })?;

        if !buffer.is_empty() {
            let grid = BlockGrid::new(dims, base.nx, base.ny, base.nz).ok_or_else(oversized)?;
            let required = stream_bytes(grid.blocks, base.blkbits).ok_or_else(oversized)?;
            if buffer.len() < required {
                return Err(ArrayError::BufferTooSmall {
                    required,
                    actual: buffer.len(),
                });
            }
        }
        Ok(base)
    }

    pub fn dimensionality(&self) -> u32 {
        self.dims
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    /// `(nx, ny, nz)`; unused axes are zero.
    pub fn extents(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Total number of elements (zero when empty).
    pub fn size(&self) -> usize {
        if self.nx == 0 {
            return 0;
        }
        self.nx * self.ny.max(1) * self.nz.max(1)
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    pub fn blocks(&self) -> usize {
        self.grid.blocks
    }

    /// Bits per compressed block.
    pub fn block_bits(&self) -> usize {
        self.blkbits
    }

    /// Values per block.
    pub fn block_size(&self) -> usize {
        grid::block_size(self.dims)
    }

    pub fn params(&self) -> RateParams {
        self.stream.borrow().params
    }

    /// Bits per value.
    pub fn rate(&self) -> f64 {
        self.blkbits as f64 / self.block_size() as f64
    }

    pub fn compressed_size(&self) -> usize {
        self.bytes
    }

    /// Compressed bytes as currently stored, without flushing any cache.
    pub fn data(&self) -> Ref<'_, [u8]> {
        let bytes = self.bytes;
        Ref::map(self.stream.borrow(), |s| &s.bits.buffer()[..bytes])
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let bytes = self.bytes;
        &mut self.stream.get_mut().bits.buffer_mut()[..bytes]
    }

    /// Fill storage from the front of `buffer`, which must hold at least
    /// [`compressed_size`](Self::compressed_size) bytes.
    pub(crate) fn copy_data_from(&mut self, buffer: &[u8]) {
        let data = self.data_mut();
        let n = data.len();
        data.copy_from_slice(&buffer[..n]);
    }

    /// Per-block shape codes, or `None` when all blocks are full.
    pub fn shape_table(&self) -> Option<&[u8]> {
        self.shape.as_deref()
    }

    pub fn block_shape(&self, block: usize) -> BlockShape {
        self.shape
            .as_ref()
            .map_or(BlockShape::FULL, |table| BlockShape::new(table[block]))
    }

    /// Configure fixed-rate compression and reallocate storage. Returns the
    /// rate actually achieved. Callers must invalidate their cache.
    pub(crate) fn set_rate(&mut self, rate: f64) -> Result<f64> {
        let (params, actual) = RateParams::fixed_rate(rate, self.scalar_type, self.dims, true);
        self.stream.get_mut().params = params;
        self.blkbits = params.maxbits as usize;
        debug!(requested = rate, actual, blkbits = self.blkbits, "set fixed rate");
        self.allocate(true)?;
        Ok(actual)
    }

    /// Recompute the grid for new extents and reallocate. Any zero extent
    /// among the active axes releases the array instead, and extents too
    /// large to address fail with [`ArrayError::Allocation`] and leave it
    /// empty. Callers must invalidate their cache.
    pub(crate) fn resize(&mut self, nx: usize, ny: usize, nz: usize, clear: bool) -> Result<()> {
        let extents = [nx, ny, nz];
        let active = &extents[..self.dims as usize];
        if active.contains(&0) {
            debug!(?extents, "zero extent; releasing array");
            self.release();
            return Ok(());
        }
        let ny = if self.dims >= 2 { ny } else { 0 };
        let nz = if self.dims >= 3 { nz } else { 0 };
        let Some(grid) = BlockGrid::new(self.dims, nx, ny, nz) else {
            debug!(?extents, "extents overflow; releasing array");
            self.release();
            return Err(oversized());
        };
        self.nx = nx;
        self.ny = ny;
        self.nz = nz;
        self.grid = grid;
        self.shape = None;
        self.allocate(clear)?;
        self.shape = self.grid.shape_table(nx, ny, nz);
        Ok(())
    }

    /// Replace the compressed buffer with a fresh one sized for the current
    /// grid and rate. The old buffer is released first; on failure the
    /// array is left empty.
    ///
    /// Fresh storage is always zero-initialized, so `clear` is honoured
    /// whichever way it is set.
    pub(crate) fn allocate(&mut self, clear: bool) -> Result<()> {
        let Some(len) = stream_bytes(self.grid.blocks, self.blkbits) else {
            self.release();
            return Err(oversized());
        };
        self.bytes = self.grid.blocks * self.blkbits / 8;
        let stream = self.stream.get_mut();
        stream.bits = BitStream::detached();
        match AlignedBuf::zeroed(len) {
            Ok(buf) => {
                stream.bits = BitStream::new(buf);
                debug!(bytes = self.bytes, len, clear, "allocated compressed storage");
                Ok(())
            }
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Drop the compressed buffer and shape table and zero every size.
    /// Rate and codec parameters survive. Idempotent.
    pub(crate) fn release(&mut self) {
        self.nx = 0;
        self.ny = 0;
        self.nz = 0;
        self.grid = BlockGrid::default();
        self.bytes = 0;
        self.stream.get_mut().bits = BitStream::detached();
        self.shape = None;
    }

    /// Become a byte-for-byte independent copy of `src`. On allocation
    /// failure `self` is left empty.
    pub(crate) fn deep_copy(&mut self, src: &ArrayBase) -> Result<()> {
        self.release();
        let source = src.stream.borrow();
        let data = source.bits.buffer().try_clone()?;
        self.dims = src.dims;
        self.scalar_type = src.scalar_type;
        self.nx = src.nx;
        self.ny = src.ny;
        self.nz = src.nz;
        self.grid = src.grid;
        self.blkbits = src.blkbits;
        self.bytes = src.bytes;
        *self.stream.get_mut() = CodecStream {
            params: source.params,
            bits: BitStream::new(data),
        };
        self.shape = src.shape.clone();
        Ok(())
    }

    /// Serialize the current metadata into a 96-bit header.
    ///
    /// A copy of the codec stream is pointed at a scratch record for the
    /// duration, so the compressed buffer is neither touched nor borrowed
    /// mutably and a live [`data`](Self::data) borrow is fine.
    pub fn write_header(&self) -> Result<Header> {
        let field = FieldDescriptor {
            scalar_type: self.scalar_type,
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
        };
        let mut stream = CodecStream {
            params: self.params(),
            bits: BitStream::detached(),
        };
        let mut redirect = StreamRedirect::new(&mut stream, AlignedBuf::zeroed(HEADER_SIZE)?);
        let params = redirect.params;
        format::write_header(&mut redirect.bits, &field, &params)?;
        redirect.bits.flush();
        let scratch = redirect.finish();
        debug!(nx = self.nx, ny = self.ny, nz = self.nz, blkbits = self.blkbits, "wrote header");
        Header::from_slice(&scratch)
    }

    /// Parse and validate `header`, stopping at the first failure:
    /// bit count, scalar type, dimensionality, then compression mode.
    /// Only a fully valid header updates the array.
    pub(crate) fn read_header(&mut self, header: &Header) -> Result<()> {
        let scratch = AlignedBuf::from_slice(&header.to_bytes())?;
        let mut redirect = StreamRedirect::new(self.stream.get_mut(), scratch);

        let parsed = format::read_header(&mut redirect.bits)
            .ok_or_else(|| ArrayError::InvalidHeader("unrecognized magic, metadata, or mode".into()))?;
        if parsed.bits != HEADER_SIZE_BITS {
            return Err(ArrayError::InvalidHeader(format!(
                "parsed {} bits, expected {}",
                parsed.bits, HEADER_SIZE_BITS
            )));
        }
        let field = parsed.field;
        if field.scalar_type != self.scalar_type {
            return Err(ArrayError::TypeMismatch {
                expected: self.scalar_type,
                found: field.scalar_type,
            });
        }
        if !grid::is_valid_dims(self.dims, field.nx, field.ny, field.nz) {
            return Err(ArrayError::DimensionMismatch {
                dims: self.dims,
                nx: field.nx,
                ny: field.ny,
                nz: field.nz,
            });
        }
        let mode = parsed.params.mode();
        if mode != CompressionMode::FixedRate {
            return Err(ArrayError::UnsupportedMode(mode));
        }

        redirect.params = parsed.params;
        drop(redirect);
        self.nx = field.nx;
        self.ny = field.ny;
        self.nz = field.nz;
        self.scalar_type = field.scalar_type;
        self.blkbits = parsed.params.maxbits as usize;
        debug!(nx = self.nx, ny = self.ny, nz = self.nz, blkbits = self.blkbits, "read header");
        Ok(())
    }

    /// Encode one block at its fixed bit offset.
    pub fn encode_block<S: Scalar, C: BlockCodec<S>>(&self, codec: &C, block: usize, values: &[S]) {
        if self.bytes == 0 {
            return;
        }
        let shape = self.block_shape(block);
        let mut stream = self.stream.borrow_mut();
        let CodecStream { params, bits } = &mut *stream;
        bits.wseek(block * self.blkbits);
        codec.encode_block(bits, params, shape, values);
        bits.flush();
    }

    /// Decode one block from its fixed bit offset.
    pub fn decode_block<S: Scalar, C: BlockCodec<S>>(&self, codec: &C, block: usize, values: &mut [S]) {
        if self.bytes == 0 {
            values.fill(S::default());
            return;
        }
        let mut stream = self.stream.borrow_mut();
        let CodecStream { params, bits } = &mut *stream;
        bits.rseek(block * self.blkbits);
        codec.decode_block(bits, params, values);
    }
}

impl Clone for ArrayBase {
    /// Deep copy. Allocation failure is fatal; use
    /// `assign_from` on a concrete array for a fallible copy.
    fn clone(&self) -> Self {
        let source = self.stream.borrow();
        Self {
            dims: self.dims,
            scalar_type: self.scalar_type,
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
            grid: self.grid,
            blkbits: self.blkbits,
            bytes: self.bytes,
            stream: RefCell::new(CodecStream {
                params: source.params,
                bits: BitStream::new(source.bits.buffer().clone()),
            }),
            shape: self.shape.clone(),
        }
    }
}

/// A fixed-rate compressed array of any dimensionality.
///
/// Implemented once per dimensional type. Besides exposing the shared
/// [`ArrayBase`], each implementation owns a block cache and must honour
/// its write-back contract:
///
/// - [`clear_cache`](Self::clear_cache) discards decoded blocks **without**
///   writing them back. Unflushed writes are lost; this is what buffer
///   reallocation relies on.
/// - [`flush_cache`](Self::flush_cache) re-encodes every dirty block at its
///   bit offset and marks it clean. Idempotent.
/// - Evicting a dirty block writes it back first.
///
/// Boxed arrays (`Box<dyn CompressedArray>`) own their storage and release it
/// on drop like any other value.
pub trait CompressedArray {
    fn base(&self) -> &ArrayBase;

    fn base_mut(&mut self) -> &mut ArrayBase;

    fn clear_cache(&self);

    fn flush_cache(&self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Bits per value.
    fn rate(&self) -> f64 {
        self.base().rate()
    }

    /// Set the fixed rate in bits per value and reallocate (contents are
    /// zeroed). Returns the achieved rate, which the codec rounds up to
    /// whole stream words per block.
    fn set_rate(&mut self, rate: f64) -> Result<f64> {
        let result = self.base_mut().set_rate(rate);
        self.clear_cache();
        result
    }

    /// Bytes of compressed data.
    fn compressed_size(&self) -> usize {
        self.base().compressed_size()
    }

    /// Compressed bytes. Dirty cached blocks are flushed first, so this
    /// mutates the buffer even though it takes `&self`; the logical values
    /// are unchanged.
    ///
    /// The returned borrow shares the buffer with the block cache. Element
    /// reads that miss the cache, `flush_cache`, and a second
    /// `compressed_data` with dirty blocks pending all need the buffer
    /// mutably and panic while it is alive; `write_header` does not. Copy
    /// the bytes out (`to_vec`) to keep them past further access.
    fn compressed_data(&self) -> Ref<'_, [u8]> {
        self.flush_cache();
        self.base().data()
    }

    /// Writable compressed bytes. The cache is flushed and then emptied so
    /// that direct edits are seen by later reads.
    fn compressed_data_mut(&mut self) -> &mut [u8] {
        self.flush_cache();
        self.clear_cache();
        self.base_mut().data_mut()
    }

    fn dimensionality(&self) -> u32 {
        self.base().dimensionality()
    }

    fn scalar_type(&self) -> ScalarType {
        self.base().scalar_type()
    }

    fn write_header(&self) -> Result<Header> {
        self.base().write_header()
    }

    /// xxh3-64 of the flushed compressed bytes.
    fn checksum(&self) -> u64 {
        xxh3_64(&self.compressed_data())
    }
}

/// `CompressedArray` for a dimensional array made of a `base: ArrayBase`
/// and a `store: BlockStore<S, C>`.
macro_rules! impl_compressed_array {
    ($array:ident) => {
        impl<S: $crate::scalar::Scalar, C: $crate::codec::BlockCodec<S>> $crate::array::CompressedArray
            for $array<S, C>
        {
            fn base(&self) -> &$crate::array::ArrayBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::array::ArrayBase {
                &mut self.base
            }

            fn clear_cache(&self) {
                self.store.clear();
            }

            fn flush_cache(&self) {
                self.store.flush(&self.base);
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}
pub(crate) use impl_compressed_array;

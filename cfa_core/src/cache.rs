//! Write-back cache of decoded blocks.

use std::fmt;
use std::mem;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::array::ArrayBase;
use crate::codec::BlockCodec;
use crate::error::{ArrayError, Result};
use crate::scalar::Scalar;

/// Smallest power of two `m` with `m * m >= blocks`: roughly one line per
/// block along the longest row, enough for a raster sweep to hit.
pub fn default_lines(blocks: usize) -> usize {
    let mut m = 1;
    while m * m < blocks {
        m *= 2;
    }
    m
}

#[derive(Clone)]
struct CacheLine<S> {
    values: Box<[S]>,
    dirty: bool,
}

/// Decoded blocks keyed by block index, evicted least-recently-used.
///
/// A dirty line is re-encoded into the array's buffer when it is evicted or
/// flushed; [`clear`](Self::clear) drops lines without writing them back.
pub struct BlockCache<S> {
    lines: LruCache<usize, CacheLine<S>>,
    block_len: usize,
}

impl<S: Scalar> BlockCache<S> {
    pub fn new(lines: usize, block_len: usize) -> Self {
        let cap = NonZeroUsize::new(lines).unwrap_or(NonZeroUsize::MIN);
        Self {
            lines: LruCache::new(cap),
            block_len,
        }
    }

    /// Line count for a requested size in bytes. Zero selects
    /// [`default_lines`]; otherwise the request is rounded up to whole lines.
    pub fn lines_for(bytes: usize, blocks: usize, block_len: usize) -> usize {
        let line_bytes = block_len * mem::size_of::<S>();
        let lines = if bytes == 0 {
            default_lines(blocks)
        } else {
            bytes.div_ceil(line_bytes)
        };
        lines.max(1)
    }

    /// Lines the cache can hold.
    pub fn capacity(&self) -> usize {
        self.lines.cap().get()
    }

    /// Bytes of decoded values the cache can hold.
    pub fn byte_size(&self) -> usize {
        self.capacity() * self.block_len * mem::size_of::<S>()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dirty_lines(&self) -> usize {
        self.lines.iter().filter(|(_, line)| line.dirty).count()
    }

    /// Cached values of `block`, without touching recency.
    pub fn peek(&self, block: usize) -> Option<&[S]> {
        self.lines.peek(&block).map(|line| &*line.values)
    }

    /// Values of `block`, decoding it on a miss. With `write` the line is
    /// marked dirty. A full cache writes back its least recently used line
    /// first if that line is dirty.
    pub fn line<C: BlockCodec<S>>(&mut self, base: &ArrayBase, codec: &C, block: usize, write: bool) -> &mut [S] {
        if !self.lines.contains(&block) && self.lines.len() == self.capacity() {
            if let Some((evicted, line)) = self.lines.pop_lru() {
                if line.dirty {
                    trace!(block = evicted, "writing back evicted block");
                    base.encode_block(codec, evicted, &line.values);
                }
            }
        }
        let block_len = self.block_len;
        let line = self.lines.get_or_insert_mut(block, || {
            let mut values = vec![S::default(); block_len].into_boxed_slice();
            base.decode_block(codec, block, &mut values);
            CacheLine { values, dirty: false }
        });
        line.dirty |= write;
        &mut line.values
    }

    /// Re-encode every dirty line and mark it clean.
    pub fn flush<C: BlockCodec<S>>(&mut self, base: &ArrayBase, codec: &C) {
        let mut written = 0usize;
        for (&block, line) in self.lines.iter_mut() {
            if line.dirty {
                base.encode_block(codec, block, &line.values);
                line.dirty = false;
                written += 1;
            }
        }
        if written > 0 {
            trace!(written, codec = codec.name(), "flushed dirty blocks");
        }
    }

    /// Drop every line without writing back.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Drop every line and change the capacity. Flush first to keep writes.
    pub fn reset(&mut self, lines: usize) {
        *self = Self::new(lines, self.block_len);
    }

    /// Compress a dense x-fastest array straight into the buffer, bypassing
    /// and then emptying the cache.
    pub fn store_all<C: BlockCodec<S>>(&mut self, base: &ArrayBase, codec: &C, values: &[S]) -> Result<()> {
        check_len(base, values.len())?;
        self.clear();
        let (nx, ny, nz) = base.extents();
        let grid = *base.grid();
        let mut block = vec![S::default(); self.block_len];
        for b in 0..grid.blocks {
            block.fill(S::default());
            for (local, global) in grid.block_elements(b, nx, ny, nz) {
                block[local] = values[global];
            }
            base.encode_block(codec, b, &block);
        }
        Ok(())
    }

    /// Decompress into a dense x-fastest array. Cached lines are used as is,
    /// so unflushed writes are visible.
    pub fn load_all<C: BlockCodec<S>>(&self, base: &ArrayBase, codec: &C, out: &mut [S]) -> Result<()> {
        check_len(base, out.len())?;
        let (nx, ny, nz) = base.extents();
        let grid = *base.grid();
        let mut scratch = vec![S::default(); self.block_len];
        for b in 0..grid.blocks {
            let block = match self.peek(b) {
                Some(values) => values,
                None => {
                    base.decode_block(codec, b, &mut scratch);
                    &scratch[..]
                }
            };
            for (local, global) in grid.block_elements(b, nx, ny, nz) {
                out[global] = block[local];
            }
        }
        Ok(())
    }
}

fn check_len(base: &ArrayBase, actual: usize) -> Result<()> {
    let expected = base.size();
    if actual != expected {
        return Err(ArrayError::SizeMismatch { expected, actual });
    }
    Ok(())
}

impl<S: Clone> Clone for BlockCache<S> {
    fn clone(&self) -> Self {
        let mut lines = LruCache::new(self.lines.cap());
        // oldest first so recency order carries over
        for (&block, line) in self.lines.iter().rev() {
            lines.put(block, line.clone());
        }
        Self {
            lines,
            block_len: self.block_len,
        }
    }
}

impl<S> fmt::Debug for BlockCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.lines.cap())
            .field("len", &self.lines.len())
            .field("block_len", &self.block_len)
            .finish()
    }
}

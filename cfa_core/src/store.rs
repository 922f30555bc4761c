//! Element access through a codec and its block cache, shared by the
//! dimensional arrays.

use std::cell::RefCell;

use tracing::trace;

use crate::array::ArrayBase;
use crate::cache::BlockCache;
use crate::codec::BlockCodec;
use crate::error::Result;
use crate::scalar::Scalar;

/// A codec plus the write-back cache of blocks it has decoded.
///
/// Every method takes the owning array's [`ArrayBase`] rather than holding
/// on to it, so an array is just a base and a store side by side. The cache
/// sits in a `RefCell` because reads through `&self` still fill it.
#[derive(Debug, Clone)]
pub(crate) struct BlockStore<S, C> {
    cache: RefCell<BlockCache<S>>,
    /// Requested cache size in bytes; zero picks one from the block count.
    request: usize,
    codec: C,
}

impl<S: Scalar, C: BlockCodec<S>> BlockStore<S, C> {
    pub(crate) fn new(codec: C, block_len: usize, request: usize) -> Self {
        Self {
            cache: RefCell::new(BlockCache::new(1, block_len)),
            request,
            codec,
        }
    }

    /// Drop every line and resize the cache for the base's block count.
    /// Unflushed writes are lost.
    pub(crate) fn reset(&mut self, base: &ArrayBase) {
        let lines = BlockCache::<S>::lines_for(self.request, base.blocks(), base.block_size());
        trace!(lines, blocks = base.blocks(), codec = self.codec.name(), "reset block cache");
        self.cache.get_mut().reset(lines);
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.cache.borrow().byte_size()
    }

    /// Flush, then resize the cache to hold at least `bytes`.
    pub(crate) fn set_request(&mut self, base: &ArrayBase, bytes: usize) {
        self.flush(base);
        self.request = bytes;
        self.reset(base);
    }

    pub(crate) fn get(&self, base: &ArrayBase, block: usize, local: usize) -> S {
        self.cache.borrow_mut().line(base, &self.codec, block, false)[local]
    }

    /// Writable slot of one element; its block is marked dirty.
    pub(crate) fn slot(&mut self, base: &ArrayBase, block: usize, local: usize) -> &mut S {
        &mut self.cache.get_mut().line(base, &self.codec, block, true)[local]
    }

    pub(crate) fn store_all(&mut self, base: &ArrayBase, values: &[S]) -> Result<()> {
        self.cache.get_mut().store_all(base, &self.codec, values)
    }

    pub(crate) fn load_all(&self, base: &ArrayBase, out: &mut [S]) -> Result<()> {
        self.cache.borrow().load_all(base, &self.codec, out)
    }

    pub(crate) fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    pub(crate) fn flush(&self, base: &ArrayBase) {
        self.cache.borrow_mut().flush(base, &self.codec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::TruncatingCodec;
    use crate::scalar::ScalarType;

    fn base2(nx: usize, ny: usize) -> ArrayBase {
        let mut base = ArrayBase::new(2, ScalarType::Double);
        base.set_rate(64.0).unwrap();
        base.resize(nx, ny, 0, true).unwrap();
        base
    }

    #[test]
    fn writes_stay_cached_until_flushed() {
        let base = base2(8, 8);
        let mut store = BlockStore::<f64, _>::new(TruncatingCodec, 16, 0);
        store.reset(&base);

        *store.slot(&base, 3, 5) = 1.5;
        assert_eq!(store.get(&base, 3, 5), 1.5);
        assert!(base.data().iter().all(|&b| b == 0));

        store.flush(&base);
        store.clear();
        assert_eq!(store.get(&base, 3, 5), 1.5);
    }

    #[test]
    fn request_survives_reset() {
        let base = base2(40, 40);
        let mut store = BlockStore::<f64, _>::new(TruncatingCodec, 16, 0);
        store.reset(&base);
        assert_eq!(store.byte_size(), 16 * 16 * 8);

        *store.slot(&base, 0, 0) = 2.0;
        store.set_request(&base, 300);
        assert_eq!(store.byte_size(), 3 * 16 * 8);
        assert_eq!(store.get(&base, 0, 0), 2.0);

        store.reset(&base);
        assert_eq!(store.byte_size(), 3 * 16 * 8);
    }
}

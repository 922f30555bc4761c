use crate::array::{impl_compressed_array, ArrayBase};
use crate::codec::BlockCodec;
use crate::config::ArrayConfig;
use crate::error::Result;
use crate::format::Header;
use crate::grid;
use crate::scalar::Scalar;
use crate::store::BlockStore;

const BLOCK_LEN: usize = 16;

/// Compressed `nx` by `ny` array, x varying fastest.
///
/// Reads and writes go through a write-back cache of decoded 4x4 blocks.
/// Writes reach the compressed buffer only when a block is evicted or the
/// cache is flushed; [`compressed_data`](crate::CompressedArray::compressed_data) flushes first.
#[derive(Debug, Clone)]
pub struct Array2<S: Scalar, C: BlockCodec<S>> {
    base: ArrayBase,
    store: BlockStore<S, C>,
}

impl<S: Scalar, C: BlockCodec<S> + Default> Default for Array2<S, C> {
    fn default() -> Self {
        Self {
            base: ArrayBase::new(2, S::TYPE),
            store: BlockStore::new(C::default(), BLOCK_LEN, 0),
        }
    }
}

impl<S: Scalar, C: BlockCodec<S> + Default> Array2<S, C> {
    /// Allocate an `nx` by `ny` array at `rate` bits per value, optionally
    /// compressing `data` into it. A `cache_size` of zero picks a size from
    /// the block count.
    pub fn new(nx: usize, ny: usize, rate: f64, data: Option<&[S]>, cache_size: usize) -> Result<Self> {
        let mut array = Self {
            store: BlockStore::new(C::default(), BLOCK_LEN, cache_size),
            ..Self::default()
        };
        array.base.set_rate(rate)?;
        array.resize(nx, ny, true)?;
        if let Some(values) = data {
            array.set_all(values)?;
        }
        Ok(array)
    }

    pub fn with_config(nx: usize, ny: usize, config: &ArrayConfig) -> Result<Self> {
        Self::new(nx, ny, config.rate, None, config.cache_size)
    }

    /// Rebuild an array from a serialized header and, optionally, its
    /// compressed bytes. An empty `buffer` yields a zero-filled array.
    pub fn from_header(header: &Header, buffer: &[u8]) -> Result<Self> {
        let base = ArrayBase::from_header(2, S::TYPE, header, buffer)?;
        let (nx, ny, _) = base.extents();
        let mut array = Self {
            base,
            ..Self::default()
        };
        array.resize(nx, ny, true)?;
        if !buffer.is_empty() {
            array.base.copy_data_from(buffer);
        }
        Ok(array)
    }
}

impl<S: Scalar, C: BlockCodec<S>> Array2<S, C> {
    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn size_x(&self) -> usize {
        self.base.extents().0
    }

    pub fn size_y(&self) -> usize {
        self.base.extents().1
    }

    /// Change the extents. Contents are discarded; a zero extent empties
    /// the array.
    pub fn resize(&mut self, nx: usize, ny: usize, clear: bool) -> Result<()> {
        let result = self.base.resize(nx, ny, 0, clear);
        self.store.reset(&self.base);
        result
    }

    /// Cache capacity in bytes of decoded values.
    pub fn cache_size(&self) -> usize {
        self.store.byte_size()
    }

    /// Flush, then resize the cache to hold at least `bytes`.
    pub fn set_cache_size(&mut self, bytes: usize) {
        self.store.set_request(&self.base, bytes);
    }

    fn locate(&self, i: usize, j: usize) -> (usize, usize) {
        let (nx, ny, _) = self.base.extents();
        assert!(i < nx && j < ny, "index ({i}, {j}) out of bounds for {nx}x{ny} array");
        (self.base.grid().block_index(i, j, 0), grid::local_index(i, j, 0))
    }

    /// Value at `(i, j)`.
    ///
    /// # Panics
    ///
    /// If the index is out of bounds, or while a borrow from
    /// [`compressed_data`](crate::CompressedArray::compressed_data) is alive.
    pub fn get(&self, i: usize, j: usize) -> S {
        let (block, local) = self.locate(i, j);
        self.store.get(&self.base, block, local)
    }

    pub fn set(&mut self, i: usize, j: usize, value: S) {
        let (block, local) = self.locate(i, j);
        *self.store.slot(&self.base, block, local) = value;
    }

    pub fn add(&mut self, i: usize, j: usize, delta: S) {
        let (block, local) = self.locate(i, j);
        let slot = self.store.slot(&self.base, block, local);
        *slot = *slot + delta;
    }

    /// Compress `values` (x fastest) over the whole array.
    pub fn set_all(&mut self, values: &[S]) -> Result<()> {
        self.store.store_all(&self.base, values)
    }

    /// Decompress the whole array into `out` (x fastest).
    pub fn get_all(&self, out: &mut [S]) -> Result<()> {
        self.store.load_all(&self.base, out)
    }

    /// Fallible deep copy of `source`, cache included. On failure `self` is
    /// left empty.
    pub fn assign_from(&mut self, source: &Self) -> Result<()>
    where
        C: Clone,
    {
        self.store.clear();
        self.base.deep_copy(&source.base)?;
        self.store = source.store.clone();
        Ok(())
    }
}

impl_compressed_array!(Array2);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::CompressedArray;
    use crate::codec::testing::TruncatingCodec;

    type Grid = Array2<f64, TruncatingCodec>;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 0.5 - 3.0).collect()
    }

    #[test]
    fn dense_data_round_trips_at_full_rate() {
        let values = ramp(5 * 3);
        let grid = Grid::new(5, 3, 64.0, Some(&values), 0).unwrap();
        assert_eq!((grid.size_x(), grid.size_y(), grid.size()), (5, 3, 15));
        assert_eq!(grid.rate(), 64.0);

        let mut out = vec![0.0; 15];
        grid.get_all(&mut out).unwrap();
        assert_eq!(out, values);
        assert_eq!(grid.get(4, 2), values[14]);
        assert_eq!(grid.get(1, 1), values[6]);
    }

    #[test]
    fn writes_reach_the_buffer_on_flush() {
        let mut grid = Grid::new(8, 8, 64.0, None, 0).unwrap();
        let before = grid.checksum();

        grid.set(6, 7, 1.25);
        grid.add(6, 7, 1.0);
        assert_eq!(grid.get(6, 7), 2.25);
        assert!(grid.base().data().iter().all(|&b| b == 0));

        assert_ne!(grid.checksum(), before);
        grid.clear_cache();
        assert_eq!(grid.get(6, 7), 2.25);
    }

    #[test]
    fn cache_size_is_at_least_the_request() {
        let mut grid = Grid::new(55, 23, 64.0, None, 1000).unwrap();
        assert!(grid.cache_size() >= 1000);

        grid.set(0, 0, 9.0);
        grid.set_cache_size(1);
        assert_eq!(grid.cache_size(), BLOCK_LEN * 8);
        assert_eq!(grid.get(0, 0), 9.0);

        grid.set_cache_size(0);
        assert_eq!(grid.cache_size(), 16 * BLOCK_LEN * 8);
    }

    #[test]
    fn resize_discards_contents() {
        let values = ramp(16);
        let mut grid = Grid::new(4, 4, 64.0, Some(&values), 0).unwrap();
        grid.set(0, 0, 5.0);
        grid.resize(6, 6, true).unwrap();
        assert_eq!(grid.size(), 36);
        assert_eq!(grid.get(0, 0), 0.0);
        assert_eq!(grid.get(5, 5), 0.0);

        grid.resize(0, 6, true).unwrap();
        assert_eq!(grid.size(), 0);
        assert_eq!(grid.compressed_size(), 0);
    }

    #[test]
    fn header_and_buffer_rebuild_the_array() {
        let values = ramp(7 * 6);
        let grid = Grid::new(7, 6, 64.0, Some(&values), 0).unwrap();
        let header = grid.write_header().unwrap();

        let copy = Grid::from_header(&header, &grid.compressed_data()).unwrap();
        assert_eq!((copy.size_x(), copy.size_y()), (7, 6));
        assert_eq!(copy.rate(), grid.rate());
        assert_eq!(copy.checksum(), grid.checksum());

        let blank = Grid::from_header(&header, &[]).unwrap();
        assert_eq!(blank.compressed_size(), grid.compressed_size());
        assert_eq!(blank.get(3, 3), 0.0);
    }

    #[test]
    fn clone_is_independent_and_sees_dirty_lines() {
        let mut grid = Grid::new(9, 9, 64.0, None, 0).unwrap();
        grid.set(8, 8, 4.0);

        let mut copy = grid.clone();
        assert_eq!(copy.get(8, 8), 4.0);
        copy.set(8, 8, -1.0);
        assert_eq!(grid.get(8, 8), 4.0);

        let mut target = Grid::new(2, 2, 16.0, None, 0).unwrap();
        target.assign_from(&grid).unwrap();
        assert_eq!((target.size_x(), target.size_y()), (9, 9));
        assert_eq!(target.rate(), 64.0);
        assert_eq!(target.get(8, 8), 4.0);
        assert_eq!(target.checksum(), grid.checksum());
    }

    #[test]
    fn direct_buffer_edits_are_seen_by_reads() {
        let values = vec![1.0; 16];
        let mut grid = Grid::new(4, 4, 64.0, Some(&values), 0).unwrap();
        assert_eq!(grid.get(2, 2), 1.0);
        grid.compressed_data_mut().fill(0);
        assert_eq!(grid.get(2, 2), 0.0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_read_panics() {
        let grid = Grid::new(3, 3, 16.0, None, 0).unwrap();
        grid.get(3, 0);
    }
}

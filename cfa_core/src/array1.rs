use crate::array::{impl_compressed_array, ArrayBase};
use crate::codec::BlockCodec;
use crate::config::ArrayConfig;
use crate::error::Result;
use crate::format::Header;
use crate::grid;
use crate::scalar::Scalar;
use crate::store::BlockStore;

const BLOCK_LEN: usize = 4;

/// Compressed one-dimensional array of `nx` values.
#[derive(Debug, Clone)]
pub struct Array1<S: Scalar, C: BlockCodec<S>> {
    base: ArrayBase,
    store: BlockStore<S, C>,
}

impl<S: Scalar, C: BlockCodec<S> + Default> Default for Array1<S, C> {
    fn default() -> Self {
        Self {
            base: ArrayBase::new(1, S::TYPE),
            store: BlockStore::new(C::default(), BLOCK_LEN, 0),
        }
    }
}

impl<S: Scalar, C: BlockCodec<S> + Default> Array1<S, C> {
    pub fn new(nx: usize, rate: f64, data: Option<&[S]>, cache_size: usize) -> Result<Self> {
        let mut array = Self {
            store: BlockStore::new(C::default(), BLOCK_LEN, cache_size),
            ..Self::default()
        };
        array.base.set_rate(rate)?;
        array.resize(nx, true)?;
        if let Some(values) = data {
            array.set_all(values)?;
        }
        Ok(array)
    }

    pub fn with_config(nx: usize, config: &ArrayConfig) -> Result<Self> {
        Self::new(nx, config.rate, None, config.cache_size)
    }

    pub fn from_header(header: &Header, buffer: &[u8]) -> Result<Self> {
        let base = ArrayBase::from_header(1, S::TYPE, header, buffer)?;
        let (nx, _, _) = base.extents();
        let mut array = Self {
            base,
            ..Self::default()
        };
        array.resize(nx, true)?;
        if !buffer.is_empty() {
            array.base.copy_data_from(buffer);
        }
        Ok(array)
    }
}

impl<S: Scalar, C: BlockCodec<S>> Array1<S, C> {
    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn resize(&mut self, nx: usize, clear: bool) -> Result<()> {
        let result = self.base.resize(nx, 0, 0, clear);
        self.store.reset(&self.base);
        result
    }

    pub fn cache_size(&self) -> usize {
        self.store.byte_size()
    }

    pub fn set_cache_size(&mut self, bytes: usize) {
        self.store.set_request(&self.base, bytes);
    }

    fn locate(&self, i: usize) -> (usize, usize) {
        let nx = self.base.extents().0;
        assert!(i < nx, "index {i} out of bounds for array of {nx}");
        (self.base.grid().block_index(i, 0, 0), grid::local_index(i, 0, 0))
    }

    pub fn get(&self, i: usize) -> S {
        let (block, local) = self.locate(i);
        self.store.get(&self.base, block, local)
    }

    pub fn set(&mut self, i: usize, value: S) {
        let (block, local) = self.locate(i);
        *self.store.slot(&self.base, block, local) = value;
    }

    pub fn add(&mut self, i: usize, delta: S) {
        let (block, local) = self.locate(i);
        let slot = self.store.slot(&self.base, block, local);
        *slot = *slot + delta;
    }

    pub fn set_all(&mut self, values: &[S]) -> Result<()> {
        self.store.store_all(&self.base, values)
    }

    pub fn get_all(&self, out: &mut [S]) -> Result<()> {
        self.store.load_all(&self.base, out)
    }

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

impl_compressed_array!(Array1);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::CompressedArray;
    use crate::codec::testing::TruncatingCodec;
    use crate::error::ArrayError;

    type Line = Array1<f32, TruncatingCodec>;

    #[test]
    fn rate_is_rounded_up_to_whole_words() {
        let mut line = Line::new(10, 12.0, None, 0).unwrap();
        assert_eq!(line.rate(), 16.0);
        assert_eq!(line.set_rate(30.0).unwrap(), 32.0);
        assert_eq!(line.rate(), 32.0);
        assert_eq!(line.compressed_size(), 3 * 128 / 8);
    }

    #[test]
    fn partial_tail_block_keeps_values() {
        let values: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut line = Line::new(10, 64.0, Some(&values), 0).unwrap();
        assert_eq!(line.get(9), 9.0);
        line.add(9, 0.5);
        let mut out = vec![0.0; 10];
        line.get_all(&mut out).unwrap();
        assert_eq!(out[9], 9.5);
        assert_eq!(&out[..9], &values[..9]);
    }

    #[test]
    fn unaddressable_length_is_an_allocation_error() {
        let err = Line::new(usize::MAX / 2, 64.0, None, 0).unwrap_err();
        assert!(matches!(err, ArrayError::Allocation { .. }), "{err}");
        assert!(err.is_fatal());

        let mut line = Line::new(8, 16.0, None, 0).unwrap();
        assert!(line.resize(usize::MAX, true).is_err());
        assert_eq!(line.size(), 0);
        assert_eq!(line.compressed_size(), 0);
        line.resize(8, true).unwrap();
        assert_eq!(line.get(7), 0.0);
    }

    #[test]
    fn set_rate_discards_contents_and_cache() {
        let mut line = Line::new(8, 64.0, None, 0).unwrap();
        line.set(3, 2.0);
        line.set_rate(32.0).unwrap();
        assert_eq!(line.get(3), 0.0);
        assert_eq!(line.checksum(), Line::new(8, 32.0, None, 0).unwrap().checksum());
    }
}

use crate::array::{impl_compressed_array, ArrayBase};
use crate::codec::BlockCodec;
use crate::config::ArrayConfig;
use crate::error::Result;
use crate::format::Header;
use crate::grid;
use crate::scalar::Scalar;
use crate::store::BlockStore;

const BLOCK_LEN: usize = 64;

/// Compressed `nx` by `ny` by `nz` array, x fastest and z slowest.
///
/// Blocks are 4x4x4, so the default cache is sized for a sweep along x
/// rather than whole planes; raise it with [`set_cache_size`](Self::set_cache_size)
/// for plane-order traversals.
#[derive(Debug, Clone)]
pub struct Array3<S: Scalar, C: BlockCodec<S>> {
    base: ArrayBase,
    store: BlockStore<S, C>,
}

impl<S: Scalar, C: BlockCodec<S> + Default> Default for Array3<S, C> {
    fn default() -> Self {
        Self {
            base: ArrayBase::new(3, S::TYPE),
            store: BlockStore::new(C::default(), BLOCK_LEN, 0),
        }
    }
}

impl<S: Scalar, C: BlockCodec<S> + Default> Array3<S, C> {
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        rate: f64,
        data: Option<&[S]>,
        cache_size: usize,
    ) -> Result<Self> {
        let mut array = Self {
            store: BlockStore::new(C::default(), BLOCK_LEN, cache_size),
            ..Self::default()
        };
        array.base.set_rate(rate)?;
        array.resize(nx, ny, nz, true)?;
        if let Some(values) = data {
            array.set_all(values)?;
        }
        Ok(array)
    }

    pub fn with_config(nx: usize, ny: usize, nz: usize, config: &ArrayConfig) -> Result<Self> {
        Self::new(nx, ny, nz, config.rate, None, config.cache_size)
    }

    pub fn from_header(header: &Header, buffer: &[u8]) -> Result<Self> {
        let base = ArrayBase::from_header(3, S::TYPE, header, buffer)?;
        let (nx, ny, nz) = base.extents();
        let mut array = Self {
            base,
            ..Self::default()
        };
        array.resize(nx, ny, nz, true)?;
        if !buffer.is_empty() {
            array.base.copy_data_from(buffer);
        }
        Ok(array)
    }
}

impl<S: Scalar, C: BlockCodec<S>> Array3<S, C> {
    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn size_x(&self) -> usize {
        self.base.extents().0
    }

    pub fn size_y(&self) -> usize {
        self.base.extents().1
    }

    pub fn size_z(&self) -> usize {
        self.base.extents().2
    }

    pub fn resize(&mut self, nx: usize, ny: usize, nz: usize, clear: bool) -> Result<()> {
        let result = self.base.resize(nx, ny, nz, clear);
        self.store.reset(&self.base);
        result
    }

    pub fn cache_size(&self) -> usize {
        self.store.byte_size()
    }

    pub fn set_cache_size(&mut self, bytes: usize) {
        self.store.set_request(&self.base, bytes);
    }

    fn locate(&self, i: usize, j: usize, k: usize) -> (usize, usize) {
        let (nx, ny, nz) = self.base.extents();
        assert!(
            i < nx && j < ny && k < nz,
            "index ({i}, {j}, {k}) out of bounds for {nx}x{ny}x{nz} array"
        );
        (self.base.grid().block_index(i, j, k), grid::local_index(i, j, k))
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> S {
        let (block, local) = self.locate(i, j, k);
        self.store.get(&self.base, block, local)
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: S) {
        let (block, local) = self.locate(i, j, k);
        *self.store.slot(&self.base, block, local) = value;
    }

    pub fn add(&mut self, i: usize, j: usize, k: usize, delta: S) {
        let (block, local) = self.locate(i, j, k);
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

impl_compressed_array!(Array3);

//! Block grid model: maps logical extents onto 4^d blocks.

/// Elements along each edge of a block.
pub const BLOCK_EDGE: usize = 4;

/// Values per block for a given dimensionality.
pub fn block_size(dims: u32) -> usize {
    1 << (2 * dims)
}

/// Exactly the first `dims` extents are nonzero.
pub fn is_valid_dims(dims: u32, nx: usize, ny: usize, nz: usize) -> bool {
    match dims {
        1 => nx != 0 && ny == 0 && nz == 0,
        2 => nx != 0 && ny != 0 && nz == 0,
        3 => nx != 0 && ny != 0 && nz != 0,
        _ => false,
    }
}

/// Offset of element `(i, j, k)` within its block.
#[inline]
pub fn local_index(i: usize, j: usize, k: usize) -> usize {
    (i & 3) + BLOCK_EDGE * ((j & 3) + BLOCK_EDGE * (k & 3))
}

/// Padding elements needed to round `n` up to a whole block.
fn padding(n: usize) -> u8 {
    ((BLOCK_EDGE - n % BLOCK_EDGE) % BLOCK_EDGE) as u8
}

/// Block counts per axis. Unused axes count as one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockGrid {
    pub bx: usize,
    pub by: usize,
    pub bz: usize,
    pub blocks: usize,
}

impl BlockGrid {
    /// Grid for the given extents, or `None` when the element or block
    /// count overflows `usize`.
    pub fn new(dims: u32, nx: usize, ny: usize, nz: usize) -> Option<Self> {
        let along = |axis: u32, n: usize| {
            if axis < dims {
                n.div_ceil(BLOCK_EDGE).max(1)
            } else {
                1
            }
        };
        let active = |axis: u32, n: usize| if axis < dims { n.max(1) } else { 1 };
        active(0, nx).checked_mul(active(1, ny))?.checked_mul(active(2, nz))?;
        let (bx, by, bz) = (along(0, nx), along(1, ny), along(2, nz));
        Some(Self {
            bx,
            by,
            bz,
            blocks: bx.checked_mul(by)?.checked_mul(bz)?,
        })
    }

    /// Index of the block holding element `(i, j, k)`.
    #[inline]
    pub fn block_index(&self, i: usize, j: usize, k: usize) -> usize {
        i / BLOCK_EDGE + self.bx * (j / BLOCK_EDGE + self.by * (k / BLOCK_EDGE))
    }

    /// Per-block shape codes, or `None` when every block is full.
    pub fn shape_table(&self, nx: usize, ny: usize, nz: usize) -> Option<Box<[u8]>> {
        let (px, py, pz) = (padding(nx), padding(ny), padding(nz));
        if px | py | pz == 0 {
            return None;
        }
        let mut table = Vec::with_capacity(self.blocks);
        for k in 0..self.bz {
            for j in 0..self.by {
                for i in 0..self.bx {
                    let x = if i == self.bx - 1 { px } else { 0 };
                    let y = if j == self.by - 1 { py } else { 0 };
                    let z = if k == self.bz - 1 { pz } else { 0 };
                    table.push(x + 4 * y + 16 * z);
                }
            }
        }
        Some(table.into_boxed_slice())
    }

    /// `(local, global)` offsets of the in-range elements of `block`, where
    /// `global` indexes a dense x-fastest array of the given extents.
    pub fn block_elements(
        &self,
        block: usize,
        nx: usize,
        ny: usize,
        nz: usize,
    ) -> impl Iterator<Item = (usize, usize)> {
        let (sx, sy, sz) = (nx.max(1), ny.max(1), nz.max(1));
        let bi = block % self.bx;
        let bj = (block / self.bx) % self.by;
        let bk = block / (self.bx * self.by);
        let (x0, y0, z0) = (BLOCK_EDGE * bi, BLOCK_EDGE * bj, BLOCK_EDGE * bk);
        let ex = (sx - x0).min(BLOCK_EDGE);
        let ey = (sy - y0).min(BLOCK_EDGE);
        let ez = (sz - z0).min(BLOCK_EDGE);
        (0..ez).flat_map(move |k| {
            (0..ey).flat_map(move |j| {
                (0..ex).map(move |i| {
                    let local = local_index(i, j, k);
                    let global = (x0 + i) + sx * ((y0 + j) + sy * (z0 + k));
                    (local, global)
                })
            })
        })
    }
}

/// Shape code of one block: bits `2a..2a+2` count the padding elements
/// along axis `a`. Zero means a full block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockShape(u8);

impl BlockShape {
    pub const FULL: BlockShape = BlockShape(0);

    pub fn new(code: u8) -> Self {
        Self(code)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 == 0
    }

    /// In-range elements along `axis`.
    pub fn extent(self, axis: u32) -> usize {
        BLOCK_EDGE - ((self.0 >> (2 * axis)) & 3) as usize
    }

    /// Whether block offset `local` holds a real (non-padding) element.
    pub fn contains(self, local: usize) -> bool {
        local % BLOCK_EDGE < self.extent(0)
            && (local / BLOCK_EDGE) % BLOCK_EDGE < self.extent(1)
            && local / (BLOCK_EDGE * BLOCK_EDGE) < self.extent(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_counts_partial_blocks() {
        let g = BlockGrid::new(2, 55, 23, 0).unwrap();
        assert_eq!((g.bx, g.by, g.bz, g.blocks), (14, 6, 1, 84));

        let g = BlockGrid::new(1, 8, 0, 0).unwrap();
        assert_eq!((g.bx, g.by, g.bz, g.blocks), (2, 1, 1, 2));

        let g = BlockGrid::new(3, 1, 5, 9).unwrap();
        assert_eq!((g.bx, g.by, g.bz, g.blocks), (1, 2, 3, 6));
    }

    #[test]
    fn overflowing_extents_have_no_grid() {
        assert!(BlockGrid::new(2, usize::MAX, 2, 0).is_none());
        assert!(BlockGrid::new(3, usize::MAX / 8, 2, 4).is_some());
        assert!(BlockGrid::new(3, usize::MAX / 8, 4, 4).is_none());
        // unused axes never count
        assert!(BlockGrid::new(1, usize::MAX, 7, 7).is_some());
    }

    #[test]
    fn dims_validity() {
        assert!(is_valid_dims(1, 3, 0, 0));
        assert!(!is_valid_dims(1, 3, 1, 0));
        assert!(is_valid_dims(2, 3, 1, 0));
        assert!(!is_valid_dims(2, 0, 1, 0));
        assert!(!is_valid_dims(3, 3, 1, 0));
        assert!(!is_valid_dims(4, 1, 1, 1));
    }

    #[test]
    fn shape_table_only_for_partial_grids() {
        assert!(BlockGrid::new(2, 8, 16, 0).unwrap().shape_table(8, 16, 0).is_none());

        let g = BlockGrid::new(2, 55, 23, 0).unwrap();
        let table = g.shape_table(55, 23, 0).unwrap();
        assert_eq!(table.len(), g.blocks);
        assert_eq!(table[0], 0);
        // last column pads one in x, last row pads one in y
        assert_eq!(table[13], 1);
        assert_eq!(table[14 * 5], 4);
        assert_eq!(table[83], 5);

        let shape = BlockShape::new(table[83]);
        assert_eq!((shape.extent(0), shape.extent(1), shape.extent(2)), (3, 3, 4));
        assert!(shape.contains(local_index(2, 2, 0)));
        assert!(!shape.contains(local_index(3, 0, 0)));
        assert!(!shape.contains(local_index(0, 3, 0)));
    }

    #[test]
    fn block_elements_cover_every_element_once() {
        for (dims, nx, ny, nz) in [(1, 13, 0, 0), (2, 7, 5, 0), (3, 5, 6, 3)] {
            let g = BlockGrid::new(dims, nx, ny, nz).unwrap();
            let total = nx * ny.max(1) * nz.max(1);
            let mut seen = vec![0u32; total];
            for b in 0..g.blocks {
                for (local, global) in g.block_elements(b, nx, ny, nz) {
                    assert!(local < block_size(dims));
                    seen[global] += 1;
                }
            }
            assert!(seen.iter().all(|&c| c == 1), "dims {dims}");
        }
    }

    #[test]
    fn block_index_matches_element_map() {
        let g = BlockGrid::new(3, 9, 6, 5).unwrap();
        let (i, j, k) = (8, 5, 4);
        let b = g.block_index(i, j, k);
        let global = i + 9 * (j + 6 * k);
        let hit = g
            .block_elements(b, 9, 6, 5)
            .find(|&(_, gl)| gl == global)
            .map(|(local, _)| local);
        assert_eq!(hit, Some(local_index(i, j, k)));
    }
}

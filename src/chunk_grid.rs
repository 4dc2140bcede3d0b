//! Hyper-rectangular selections and their decomposition over a regular
//! chunk grid.

use std::fmt::Display;

use itertools::izip;

use crate::{CoordVec, DimensionMismatch, GridCoord, Ndim};

/// A half-open range `[offset, offset + shape)` along one dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArraySlice {
    pub offset: u64,
    pub shape: u64,
}

impl ArraySlice {
    pub fn new(offset: u64, shape: u64) -> Self {
        Self { offset, shape }
    }

    /// From half-open bounds; `None` if `end < start`.
    pub fn from_start_end(start: u64, end: u64) -> Option<Self> {
        end.checked_sub(start)
            .map(|shape| Self::new(start, shape))
    }

    pub fn end(&self) -> u64 {
        self.offset + self.shape
    }
}

/// A hyper-rectangular selection: one [`ArraySlice`] per dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayRegion(CoordVec<ArraySlice>);

impl FromIterator<ArraySlice> for ArrayRegion {
    fn from_iter<T: IntoIterator<Item = ArraySlice>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Ndim for ArrayRegion {
    fn ndim(&self) -> usize {
        self.0.len()
    }
}

impl Display for ArrayRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset {:?} shape {:?}", self.offset(), self.shape())
    }
}

impl ArrayRegion {
    pub fn from_offset_shape(
        offset: &[u64],
        shape: &[u64],
    ) -> Result<Self, DimensionMismatch> {
        DimensionMismatch::check(offset.len(), shape.len())?;
        Ok(offset
            .iter()
            .zip(shape.iter())
            .map(|(o, s)| ArraySlice::new(*o, *s))
            .collect())
    }

    /// From per-dimension half-open `[start, end)` bounds.
    pub fn from_start_end(start: &[u64], end: &[u64]) -> Result<Self, DimensionMismatch> {
        DimensionMismatch::check(start.len(), end.len())?;
        Ok(start
            .iter()
            .zip(end.iter())
            .map(|(lo, hi)| ArraySlice::from_start_end(*lo, *hi).unwrap_or(ArraySlice::new(*lo, 0)))
            .collect())
    }

    /// The whole of an array with the given shape.
    pub fn whole(shape: &[u64]) -> Self {
        shape.iter().map(|s| ArraySlice::new(0, *s)).collect()
    }

    pub fn slices(&self) -> &[ArraySlice] {
        &self.0
    }

    pub fn offset(&self) -> GridCoord {
        self.0.iter().map(|s| s.offset).collect()
    }

    pub fn shape(&self) -> GridCoord {
        self.0.iter().map(|s| s.shape).collect()
    }

    pub fn end(&self) -> GridCoord {
        self.0.iter().map(|s| s.end()).collect()
    }

    /// Element count; 1 for the zero-dimensional region.
    pub fn numel(&self) -> u64 {
        self.0.iter().map(|s| s.shape).product()
    }

    /// True when any dimension has zero extent.
    pub fn is_empty(&self) -> bool {
        self.0.iter().any(|s| s.shape == 0)
    }

    /// The same extents translated to the origin.
    pub fn at_origin(&self) -> Self {
        self.0.iter().map(|s| ArraySlice::new(0, s.shape)).collect()
    }

    /// Whether this region covers all of `shape`. Panics on dimensionality
    /// mismatch.
    pub fn is_whole(&self, shape: &[u64]) -> bool {
        DimensionMismatch::check(self.ndim(), shape.len()).unwrap();
        self.0
            .iter()
            .zip(shape.iter())
            .all(|(sl, sh)| sl.offset == 0 && sl.shape == *sh)
    }

    /// Whether this region stays inside an array of `shape`.
    pub fn fits_within(&self, shape: &[u64]) -> bool {
        self.ndim() == shape.len()
            && self.0.iter().zip(shape.iter()).all(|(sl, sh)| sl.end() <= *sh)
    }
}

/// A selection that does not fit the array it addresses.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OutOfBoundsError {
    #[error("selection has dimensionality {0} but the array has {1}")]
    Dimensionality(usize, usize),
    #[error("selection ({region}) exceeds array shape {shape:?}")]
    Extent { region: String, shape: Vec<u64> },
}

/// A caller buffer whose size disagrees with its selection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("buffer is {actual} bytes but the selection spans {expected}")]
pub struct ShapeMismatchError {
    pub expected: usize,
    pub actual: usize,
}

/// One chunk's share of a selection: the grid coordinate, the intra-chunk
/// region it contributes, and the co-shaped region of the caller's buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkProjection {
    pub chunk_idx: GridCoord,
    pub chunk_region: ArrayRegion,
    pub out_region: ArrayRegion,
}

/// The regular tiling of an array's shape by a fixed chunk shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegularChunkGrid {
    chunk_shape: GridCoord,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("chunk shape {0:?} has a zero extent")]
pub struct InvalidChunkShape(pub Vec<u64>);

impl Ndim for RegularChunkGrid {
    fn ndim(&self) -> usize {
        self.chunk_shape.len()
    }
}

impl RegularChunkGrid {
    pub fn new(chunk_shape: GridCoord) -> Result<Self, InvalidChunkShape> {
        if chunk_shape.iter().any(|c| *c == 0) {
            return Err(InvalidChunkShape(chunk_shape.to_vec()));
        }
        Ok(Self { chunk_shape })
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Elements per chunk; 1 for the zero-dimensional grid.
    pub fn chunk_numel(&self) -> u64 {
        self.chunk_shape.iter().product()
    }

    /// Chunks per dimension for an array of `shape`; 0 along zero-sized
    /// dimensions. Panics on dimensionality mismatch.
    pub fn grid_shape(&self, array_shape: &[u64]) -> GridCoord {
        DimensionMismatch::check(array_shape.len(), self.ndim()).unwrap();
        izip!(array_shape, &self.chunk_shape)
            .map(|(sh, ch)| sh.div_ceil(*ch))
            .collect()
    }

    /// Decompose a selection into per-chunk projections.
    ///
    /// Projections are yielded in row-major order of grid coordinate. Their
    /// chunk regions partition the selection, and their out regions tile the
    /// caller's buffer without overlap. Panics on dimensionality mismatch.
    pub fn projections(&self, region: &ArrayRegion) -> ChunkProjections {
        DimensionMismatch::check(region.ndim(), self.ndim()).unwrap();
        let first_chunk: GridCoord = izip!(region.slices(), &self.chunk_shape)
            .map(|(sl, ch)| sl.offset / ch)
            .collect();
        let end_chunk: GridCoord = izip!(region.slices(), &self.chunk_shape)
            .map(|(sl, ch)| sl.end().div_ceil(*ch))
            .collect();
        let next = if region.is_empty() {
            None
        } else {
            Some(first_chunk.clone())
        };
        ChunkProjections {
            chunk_shape: self.chunk_shape.clone(),
            sel_start: region.offset(),
            sel_end: region.end(),
            first_chunk,
            end_chunk,
            next,
        }
    }
}

/// Iterator over [`ChunkProjection`]s; see [`RegularChunkGrid::projections`].
pub struct ChunkProjections {
    chunk_shape: GridCoord,
    sel_start: GridCoord,
    sel_end: GridCoord,
    first_chunk: GridCoord,
    end_chunk: GridCoord,
    next: Option<GridCoord>,
}

impl ChunkProjections {
    fn project(&self, chunk_idx: &[u64]) -> ChunkProjection {
        let mut chunk_region = CoordVec::with_capacity(chunk_idx.len());
        let mut out_region = CoordVec::with_capacity(chunk_idx.len());
        for (k, ch, lo, hi) in izip!(
            chunk_idx,
            &self.chunk_shape,
            &self.sel_start,
            &self.sel_end
        ) {
            let chunk_lo = k * ch;
            let start = chunk_lo.max(*lo);
            let end = (chunk_lo + ch).min(*hi);
            chunk_region.push(ArraySlice::new(start - chunk_lo, end - start));
            out_region.push(ArraySlice::new(start - lo, end - start));
        }
        ChunkProjection {
            chunk_idx: chunk_idx.iter().copied().collect(),
            chunk_region: ArrayRegion(chunk_region),
            out_region: ArrayRegion(out_region),
        }
    }

    /// Odometer increment in row-major order; `None` past the end.
    fn advance(&self, mut idx: GridCoord) -> Option<GridCoord> {
        for d in (0..idx.len()).rev() {
            idx[d] += 1;
            if idx[d] < self.end_chunk[d] {
                return Some(idx);
            }
            idx[d] = self.first_chunk[d];
        }
        None
    }
}

impl Iterator for ChunkProjections {
    type Item = ChunkProjection;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let item = self.project(&current);
        self.next = self.advance(current);
        Some(item)
    }
}

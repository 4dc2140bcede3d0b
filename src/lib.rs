use smallvec::SmallVec;

pub mod chunk_grid;
pub mod codecs;
pub mod data_type;
pub mod fill_value;
pub mod node;
pub mod prelude;
pub mod store;

const COORD_SMALLVEC_SIZE: usize = 6;
pub const ZARR_FORMAT: usize = 2;

pub type CoordVec<T> = SmallVec<[T; COORD_SMALLVEC_SIZE]>;
pub type GridCoord = CoordVec<u64>;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("inconsistent dimensionalities: {0} != {1}")]
pub struct DimensionMismatch(pub usize, pub usize);

impl DimensionMismatch {
    pub fn check(found: usize, expected: usize) -> Result<(), Self> {
        if found == expected {
            Ok(())
        } else {
            Err(Self(found, expected))
        }
    }
}

pub trait Ndim {
    fn ndim(&self) -> usize;

    fn same_ndim<T: Ndim>(&self, other: &T) -> Result<usize, DimensionMismatch> {
        DimensionMismatch::check(self.ndim(), other.ndim())?;
        Ok(self.ndim())
    }
}

/// Any failure surfaced by the crate's public API.
#[derive(thiserror::Error, Debug)]
pub enum ZarrError {
    #[error(transparent)]
    InvalidPath(#[from] store::InvalidNodePath),
    #[error(transparent)]
    InvalidMetadata(#[from] node::MetadataError),
    #[error("no array or group at path '{0}'")]
    NodeNotFound(store::NodePath),
    #[error("a node already exists at path '{0}'")]
    PathExists(store::NodePath),
    #[error("path '{path}' is blocked by the array at '{ancestor}'")]
    PathConflict {
        path: store::NodePath,
        ancestor: store::NodePath,
    },
    #[error(transparent)]
    OutOfBounds(#[from] chunk_grid::OutOfBoundsError),
    #[error(transparent)]
    ShapeMismatch(#[from] chunk_grid::ShapeMismatchError),
    #[error(transparent)]
    Codec(#[from] codecs::CodecError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
}

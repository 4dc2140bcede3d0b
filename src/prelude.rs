pub use crate::chunk_grid::{ArrayRegion, ArraySlice, ChunkProjection};
pub use crate::codecs::{register_compressor, Compressor};
pub use crate::data_type::{ByteOrder, DataType, ScalarKind, ScalarType};
pub use crate::fill_value::FillValue;
pub use crate::node::{
    create_array, create_group, node_kind, Array, ArrayMetadata, ArrayMetadataBuilder,
    Compression, Group, GroupMetadata, JsonObject, NodeKind, Order,
};
#[cfg(feature = "filesystem")]
pub use crate::store::FileSystemStore;
pub use crate::store::{
    ListableStore, MemoryStore, NodeName, NodePath, ReadableStore, Store, WriteableStore,
};
pub use crate::{CoordVec, GridCoord, ZarrError, ZARR_FORMAT};

pub use serde_json;
pub use smallvec;

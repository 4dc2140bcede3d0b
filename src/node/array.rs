use std::sync::Arc;

use bytes::Bytes;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    chunk_grid::{
        ArrayRegion, ChunkProjections, OutOfBoundsError, RegularChunkGrid, ShapeMismatchError,
    },
    codecs::{build_compressor, CodecError, Compressor},
    data_type::DataType,
    fill_value::FillValue,
    store::{NodePath, ReadableStore, Store, WriteableStore},
    DimensionMismatch, GridCoord, Ndim, ZarrError, ZARR_FORMAT,
};

use super::{read_attributes, write_attributes, JsonObject, MetadataError, ARRAY_METADATA_KEY};

/// The byte layout of elements within a chunk.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// Row-major: the last dimension varies fastest.
    C,
    /// Column-major: the first dimension varies fastest.
    F,
}

/// The `compression` field: a registered compressor name, or JSON `null`
/// for identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Name(String),
}

impl Serialize for Compression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Name(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Compression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<String>::deserialize(deserializer)? {
            None => Self::None,
            Some(name) => Self::Name(name),
        })
    }
}

/// A `.zarray` document.
///
/// Fields are declared in alphabetical order so the stable serialization
/// is sorted by key. All eight keys are mandatory and no others are
/// accepted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArrayMetadata {
    pub chunks: GridCoord,
    pub compression: Compression,
    /// Opaque to the core; interpreted by the named compressor.
    pub compression_opts: Value,
    pub dtype: DataType,
    /// Validated against `dtype` when the array is opened.
    pub fill_value: Value,
    pub order: Order,
    pub shape: GridCoord,
    pub zarr_format: usize,
}

impl Ndim for ArrayMetadata {
    fn ndim(&self) -> usize {
        self.shape.len()
    }
}

impl ArrayMetadata {
    pub fn builder(shape: GridCoord, dtype: DataType) -> ArrayMetadataBuilder {
        ArrayMetadataBuilder::new(shape, dtype)
    }
}

pub struct ArrayMetadataBuilder {
    shape: GridCoord,
    dtype: DataType,
    chunks: Option<GridCoord>,
    order: Order,
    compression: Compression,
    compression_opts: Value,
    fill_value: Value,
}

impl ArrayMetadataBuilder {
    /// At a minimum, [`Self::chunks`] should be called: the default is a
    /// single chunk spanning the whole array.
    pub fn new(shape: GridCoord, dtype: DataType) -> Self {
        Self {
            shape,
            dtype,
            chunks: None,
            order: Order::C,
            compression: Compression::None,
            compression_opts: Value::Null,
            fill_value: Value::Null,
        }
    }

    /// Set the chunk shape.
    ///
    /// Fails if its dimensionality disagrees with the array's shape.
    pub fn chunks(mut self, chunks: GridCoord) -> Result<Self, DimensionMismatch> {
        DimensionMismatch::check(chunks.len(), self.shape.len())?;
        self.chunks = Some(chunks);
        Ok(self)
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Set the fill value, encoding it against the array's dtype.
    ///
    /// Non-finite floats become the `"NaN"`/`"Infinity"`/`"-Infinity"`
    /// sentinels here, which a plain JSON round-trip would lose.
    pub fn fill_value(mut self, fill: &FillValue) -> Result<Self, MetadataError> {
        self.fill_value = fill.to_json(&self.dtype)?;
        Ok(self)
    }

    /// Set the `fill_value` JSON verbatim.
    pub fn fill_value_json(mut self, fill: Value) -> Self {
        self.fill_value = fill;
        self
    }

    /// Name a compressor and its options. Both are validated against the
    /// registry when the array is created or opened, not here.
    pub fn compressor(mut self, name: &str, opts: Value) -> Self {
        self.compression = Compression::Name(name.to_owned());
        self.compression_opts = opts;
        self
    }

    pub fn build(self) -> ArrayMetadata {
        let chunks = self.chunks.unwrap_or_else(|| self.shape.clone());
        ArrayMetadata {
            chunks,
            compression: self.compression,
            compression_opts: self.compression_opts,
            dtype: self.dtype,
            fill_value: self.fill_value,
            order: self.order,
            shape: self.shape,
            zarr_format: ZARR_FORMAT,
        }
    }
}

/// Everything derived from an [`ArrayMetadata`] when it is accepted.
pub(crate) struct ValidatedParts {
    pub(crate) grid: RegularChunkGrid,
    pub(crate) fill: FillValue,
    pub(crate) fill_pattern: Vec<u8>,
    pub(crate) compressor: Option<Arc<dyn Compressor>>,
}

pub(crate) fn validate_metadata(meta: &ArrayMetadata) -> Result<ValidatedParts, ZarrError> {
    if meta.zarr_format != ZARR_FORMAT {
        return Err(MetadataError::BadFormatVersion(meta.zarr_format).into());
    }
    if meta.shape.len() != meta.chunks.len() {
        return Err(MetadataError::ShapeChunksMismatch {
            shape: meta.shape.to_vec(),
            chunks: meta.chunks.to_vec(),
        }
        .into());
    }
    let grid = RegularChunkGrid::new(meta.chunks.clone())
        .map_err(|e| MetadataError::ZeroChunkExtent(e.0))?;
    let fill = FillValue::from_json(&meta.dtype, &meta.fill_value).map_err(MetadataError::from)?;
    let fill_pattern = fill.to_item_bytes(&meta.dtype).map_err(MetadataError::from)?;
    let compressor = match &meta.compression {
        Compression::None => None,
        Compression::Name(name) => {
            let compressor = build_compressor(name, &meta.compression_opts).map_err(|e| {
                match e {
                    CodecError::UnknownCompressor(_) => ZarrError::Codec(e),
                    other => MetadataError::CompressionOpts {
                        name: name.clone(),
                        source: other,
                    }
                    .into(),
                }
            })?;
            Some(compressor)
        }
    };
    Ok(ValidatedParts {
        grid,
        fill,
        fill_pattern,
        compressor,
    })
}

/// A handle on a stored array: validated metadata plus the derived codec,
/// fill pattern, and chunk grid.
///
/// The I/O engine is byte-oriented. Callers exchange contiguous buffers
/// laid out in the array's declared [`Order`]; element interpretation is
/// left to layers above.
pub struct Array<'s, S: Store> {
    store: &'s S,
    path: NodePath,
    metadata: ArrayMetadata,
    grid: RegularChunkGrid,
    fill: FillValue,
    fill_pattern: Vec<u8>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl<'s, S: Store> std::fmt::Debug for Array<'s, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("grid", &self.grid)
            .field("fill", &self.fill)
            .field("fill_pattern", &self.fill_pattern)
            .finish_non_exhaustive()
    }
}

impl<'s, S: Store> Ndim for Array<'s, S> {
    fn ndim(&self) -> usize {
        self.metadata.shape.len()
    }
}

impl<'s, S: Store> Array<'s, S> {
    pub(crate) fn from_parts(
        store: &'s S,
        path: NodePath,
        metadata: ArrayMetadata,
        parts: ValidatedParts,
    ) -> Self {
        Self {
            store,
            path,
            metadata,
            grid: parts.grid,
            fill: parts.fill,
            fill_pattern: parts.fill_pattern,
            compressor: parts.compressor,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    pub fn chunk_shape(&self) -> &[u64] {
        self.grid.chunk_shape()
    }

    pub fn dtype(&self) -> &DataType {
        &self.metadata.dtype
    }

    pub fn order(&self) -> Order {
        self.metadata.order
    }

    pub fn fill_value(&self) -> &FillValue {
        &self.fill
    }

    pub fn item_size(&self) -> usize {
        self.metadata.dtype.item_size()
    }

    /// Uncompressed chunk size in bytes.
    pub fn chunk_byte_len(&self) -> usize {
        self.grid.chunk_numel() as usize * self.item_size()
    }

    /// The store key of a chunk: decimal grid indices joined by `.`, with
    /// the zero-dimensional array using `"0"`.
    pub fn chunk_key(&self, chunk_idx: &[u64]) -> String {
        if chunk_idx.is_empty() {
            self.path.key("0")
        } else {
            self.path
                .key(&chunk_idx.iter().map(|i| i.to_string()).join("."))
        }
    }

    /// Decompose a selection into independent per-chunk work items.
    ///
    /// Each projection touches one chunk and one disjoint part of the
    /// caller's buffer, so callers may fan them out to workers.
    pub fn projections(&self, region: &ArrayRegion) -> Result<ChunkProjections, ZarrError> {
        self.check_region(region)?;
        Ok(self.grid.projections(region))
    }

    fn check_region(&self, region: &ArrayRegion) -> Result<(), ZarrError> {
        if region.ndim() != self.ndim() {
            return Err(OutOfBoundsError::Dimensionality(region.ndim(), self.ndim()).into());
        }
        if !region.fits_within(self.shape()) {
            return Err(OutOfBoundsError::Extent {
                region: region.to_string(),
                shape: self.shape().to_vec(),
            }
            .into());
        }
        Ok(())
    }

    fn check_buffer(&self, region: &ArrayRegion, len: usize) -> Result<(), ZarrError> {
        let expected = region.numel() as usize * self.item_size();
        if len != expected {
            return Err(ShapeMismatchError {
                expected,
                actual: len,
            }
            .into());
        }
        Ok(())
    }

    /// A fill-initialized chunk buffer.
    fn fill_chunk(&self) -> Vec<u8> {
        self.fill_pattern.repeat(self.grid.chunk_numel() as usize)
    }

    fn is_fill_chunk(&self, chunk: &[u8]) -> bool {
        chunk
            .chunks_exact(self.item_size())
            .all(|item| item == self.fill_pattern)
    }
}

impl<'s, S: ReadableStore> Array<'s, S> {
    /// Open the array whose `.zarray` lives at `path`.
    pub fn open(store: &'s S, path: NodePath) -> Result<Self, ZarrError> {
        let bytes = store
            .get(&path.key(ARRAY_METADATA_KEY))?
            .ok_or_else(|| ZarrError::NodeNotFound(path.clone()))?;
        let metadata: ArrayMetadata =
            serde_json::from_slice(&bytes).map_err(MetadataError::from)?;
        let parts = validate_metadata(&metadata)?;
        Ok(Self::from_parts(store, path, metadata, parts))
    }

    /// The decoded bytes of one chunk, or `None` if it is uninitialized.
    pub fn read_chunk_bytes(&self, chunk_idx: &[u64]) -> Result<Option<Vec<u8>>, ZarrError> {
        let raw_len = self.chunk_byte_len();
        match self.store.get(&self.chunk_key(chunk_idx))? {
            None => Ok(None),
            Some(stored) => {
                let raw = match &self.compressor {
                    Some(codec) => codec.decode(&stored, raw_len)?,
                    None => {
                        if stored.len() != raw_len {
                            return Err(CodecError::WrongLength {
                                expected: raw_len,
                                actual: stored.len(),
                            }
                            .into());
                        }
                        stored.to_vec()
                    }
                };
                Ok(Some(raw))
            }
        }
    }

    /// Read a selection into a fresh buffer in the array's order.
    pub fn read_region(&self, region: &ArrayRegion) -> Result<Vec<u8>, ZarrError> {
        let mut out = vec![0u8; region.numel() as usize * self.item_size()];
        self.read_region_into(region, &mut out)?;
        Ok(out)
    }

    /// Read a selection into `out`, which must hold exactly the selection's
    /// elements in the array's order.
    ///
    /// Absent chunks synthesize the fill value directly into the output;
    /// no chunk-sized buffer is allocated for them.
    pub fn read_region_into(&self, region: &ArrayRegion, out: &mut [u8]) -> Result<(), ZarrError> {
        self.check_region(region)?;
        self.check_buffer(region, out.len())?;
        let out_shape = region.shape();
        for projection in self.grid.projections(region) {
            match self.read_chunk_bytes(&projection.chunk_idx)? {
                Some(chunk) => copy_region_bytes(
                    &chunk,
                    self.chunk_shape(),
                    &projection.chunk_region,
                    out,
                    &out_shape,
                    &projection.out_region,
                    self.item_size(),
                    self.metadata.order,
                ),
                None => fill_region_bytes(
                    out,
                    &out_shape,
                    &projection.out_region,
                    &self.fill_pattern,
                    self.metadata.order,
                ),
            }
        }
        Ok(())
    }

    pub fn attributes(&self) -> Result<JsonObject, ZarrError> {
        read_attributes(self.store, &self.path)
    }
}

impl<'s, S: WriteableStore> Array<'s, S> {
    /// Create an array at `path`, writing implicit ancestor groups.
    ///
    /// See [`create_array`](crate::node::create_array).
    pub fn create(
        store: &'s S,
        path: NodePath,
        metadata: ArrayMetadata,
        overwrite: bool,
    ) -> Result<Self, ZarrError> {
        super::create_array(store, &path, metadata, overwrite)
    }

    /// Write a selection from `src`, which must hold exactly the selection's
    /// elements in the array's order.
    ///
    /// Fully covered chunks are encoded straight from the source; a fully
    /// covered chunk that equals the fill value is deleted instead of
    /// stored. Partially covered chunks are read, merged, and rewritten.
    /// Chunks are independent: no cross-chunk atomicity, and a failure
    /// partway leaves earlier chunks written.
    pub fn write_region(&self, region: &ArrayRegion, src: &[u8]) -> Result<(), ZarrError> {
        self.check_region(region)?;
        self.check_buffer(region, src.len())?;
        let src_shape = region.shape();
        for projection in self.grid.projections(region) {
            let key = self.chunk_key(&projection.chunk_idx);
            let full_coverage = projection.chunk_region.is_whole(self.chunk_shape());
            let mut chunk = if full_coverage {
                vec![0u8; self.chunk_byte_len()]
            } else {
                match self.read_chunk_bytes(&projection.chunk_idx)? {
                    Some(existing) => existing,
                    None => self.fill_chunk(),
                }
            };
            copy_region_bytes(
                src,
                &src_shape,
                &projection.out_region,
                &mut chunk,
                self.chunk_shape(),
                &projection.chunk_region,
                self.item_size(),
                self.metadata.order,
            );
            if full_coverage && self.fill.is_defined() && self.is_fill_chunk(&chunk) {
                self.store.erase(&key)?;
            } else {
                self.store.set(&key, self.encode_chunk(chunk)?)?;
            }
        }
        Ok(())
    }

    fn encode_chunk(&self, raw: Vec<u8>) -> Result<Bytes, ZarrError> {
        Ok(match &self.compressor {
            Some(codec) => Bytes::from(codec.encode(&raw)?),
            None => Bytes::from(raw),
        })
    }

    pub fn set_attributes(&self, attrs: &JsonObject) -> Result<(), ZarrError> {
        write_attributes(self.store, &self.path, attrs)
    }
}

fn strides_for(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

fn advance(idx: &mut [u64], extents: &[u64]) -> bool {
    for d in (0..idx.len()).rev() {
        idx[d] += 1;
        if idx[d] < extents[d] {
            return true;
        }
        idx[d] = 0;
    }
    false
}

/// Copy `src_region` of `src` onto `dst_region` of `dst`, where both
/// regions have the same extents and both buffers are contiguous in
/// `order`. Moves one contiguous run along the fastest-varying dimension
/// per `copy_from_slice`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_region_bytes(
    src: &[u8],
    src_shape: &[u64],
    src_region: &ArrayRegion,
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_region: &ArrayRegion,
    item_size: usize,
    order: Order,
) {
    debug_assert_eq!(src_region.shape(), dst_region.shape());
    match order {
        Order::C => {
            copy_region_row_major(src, src_shape, src_region, dst, dst_shape, dst_region, item_size);
        }
        Order::F => {
            // column-major on a shape is row-major on the reversed shape
            let src_shape: Vec<u64> = src_shape.iter().rev().copied().collect();
            let dst_shape: Vec<u64> = dst_shape.iter().rev().copied().collect();
            let src_region: ArrayRegion = src_region.slices().iter().rev().copied().collect();
            let dst_region: ArrayRegion = dst_region.slices().iter().rev().copied().collect();
            copy_region_row_major(
                src,
                &src_shape,
                &src_region,
                dst,
                &dst_shape,
                &dst_region,
                item_size,
            );
        }
    }
}

fn copy_region_row_major(
    src: &[u8],
    src_shape: &[u64],
    src_region: &ArrayRegion,
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_region: &ArrayRegion,
    item_size: usize,
) {
    let nd = src_shape.len();
    if nd == 0 {
        dst[..item_size].copy_from_slice(&src[..item_size]);
        return;
    }
    if src_region.is_empty() {
        return;
    }
    let src_strides = strides_for(src_shape);
    let dst_strides = strides_for(dst_shape);
    let region_shape = src_region.shape();
    let src_offset = src_region.offset();
    let dst_offset = dst_region.offset();
    let run_bytes = region_shape[nd - 1] as usize * item_size;

    let mut idx = vec![0u64; nd - 1];
    loop {
        let mut s = src_offset[nd - 1];
        let mut d = dst_offset[nd - 1];
        for dim in 0..nd - 1 {
            s += (src_offset[dim] + idx[dim]) * src_strides[dim];
            d += (dst_offset[dim] + idx[dim]) * dst_strides[dim];
        }
        let s = s as usize * item_size;
        let d = d as usize * item_size;
        dst[d..d + run_bytes].copy_from_slice(&src[s..s + run_bytes]);
        if !advance(&mut idx, &region_shape[..nd - 1]) {
            break;
        }
    }
}

/// Tile `pattern` (one item) over `region` of `dst`.
pub(crate) fn fill_region_bytes(
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_region: &ArrayRegion,
    pattern: &[u8],
    order: Order,
) {
    match order {
        Order::C => fill_region_row_major(dst, dst_shape, dst_region, pattern),
        Order::F => {
            let dst_shape: Vec<u64> = dst_shape.iter().rev().copied().collect();
            let dst_region: ArrayRegion = dst_region.slices().iter().rev().copied().collect();
            fill_region_row_major(dst, &dst_shape, &dst_region, pattern);
        }
    }
}

fn fill_region_row_major(dst: &mut [u8], dst_shape: &[u64], dst_region: &ArrayRegion, pattern: &[u8]) {
    let nd = dst_shape.len();
    if nd == 0 {
        dst[..pattern.len()].copy_from_slice(pattern);
        return;
    }
    if dst_region.is_empty() {
        return;
    }
    let dst_strides = strides_for(dst_shape);
    let region_shape = dst_region.shape();
    let dst_offset = dst_region.offset();
    let run = pattern.repeat(region_shape[nd - 1] as usize);

    let mut idx = vec![0u64; nd - 1];
    loop {
        let mut d = dst_offset[nd - 1];
        for dim in 0..nd - 1 {
            d += (dst_offset[dim] + idx[dim]) * dst_strides[dim];
        }
        let d = d as usize * pattern.len();
        dst[d..d + run.len()].copy_from_slice(&run);
        if !advance(&mut idx, &region_shape[..nd - 1]) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::ScalarType;
    use crate::node::{create_array, to_json_document};
    use crate::store::{ListableStore, MemoryStore, ReadableStore};
    use serde_json::json;
    use smallvec::smallvec;

    fn scalar(s: &str) -> DataType {
        DataType::Scalar(s.parse::<ScalarType>().unwrap())
    }

    fn le_i32s(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn zarray_document_roundtrips() {
        let json = r#"{"chunks":[1000,1000],"compression":"blosc",
            "compression_opts":{"clevel":5,"cname":"lz4","shuffle":1},
            "dtype":"<f8","fill_value":null,"order":"C",
            "shape":[10000,10000],"zarr_format":2}"#;
        let meta: ArrayMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.shape.to_vec(), vec![10000, 10000]);
        assert_eq!(meta.compression, Compression::Name("blosc".to_owned()));
        assert_eq!(meta.order, Order::C);
        let meta2: ArrayMetadata =
            serde_json::from_str(&serde_json::to_string(&meta).unwrap()).unwrap();
        assert_eq!(meta, meta2);
    }

    #[test]
    fn zarray_requires_exact_keys() {
        let complete = json!({
            "chunks": [2], "compression": null, "compression_opts": null,
            "dtype": "<i4", "fill_value": 0, "order": "C",
            "shape": [4], "zarr_format": 2
        });
        serde_json::from_value::<ArrayMetadata>(complete.clone()).unwrap();

        // dropping any key is an error
        for key in [
            "chunks",
            "compression",
            "compression_opts",
            "dtype",
            "fill_value",
            "order",
            "shape",
            "zarr_format",
        ] {
            let mut doc = complete.clone();
            doc.as_object_mut().unwrap().remove(key);
            assert!(
                serde_json::from_value::<ArrayMetadata>(doc).is_err(),
                "accepted document missing `{key}`"
            );
        }

        // as is any extra key
        let mut extra = complete.clone();
        extra
            .as_object_mut()
            .unwrap()
            .insert("filters".to_owned(), Value::Null);
        assert!(serde_json::from_value::<ArrayMetadata>(extra).is_err());

        // and a bad order
        let mut bad_order = complete;
        bad_order
            .as_object_mut()
            .unwrap()
            .insert("order".to_owned(), json!("K"));
        assert!(serde_json::from_value::<ArrayMetadata>(bad_order).is_err());
    }

    #[test]
    fn validation_rejects_bad_structure() {
        let meta = ArrayMetadata::builder(smallvec![4], scalar("<i4")).build();
        let mut wrong_version = meta.clone();
        wrong_version.zarr_format = 3;
        assert!(validate_metadata(&wrong_version).is_err());

        let mut mismatched = meta.clone();
        mismatched.chunks = smallvec![2, 2];
        assert!(validate_metadata(&mismatched).is_err());

        let mut zero_chunk = meta.clone();
        zero_chunk.chunks = smallvec![0];
        assert!(validate_metadata(&zero_chunk).is_err());

        let mut bad_fill = meta;
        bad_fill.fill_value = json!("forty-two");
        assert!(validate_metadata(&bad_fill).is_err());
    }

    #[test]
    fn stable_serialization_is_sorted_and_indented() {
        let meta = ArrayMetadata::builder(smallvec![4], scalar("<i4"))
            .chunks(smallvec![2])
            .unwrap()
            .fill_value_json(json!(0))
            .build();
        let doc = to_json_document(&meta).unwrap();
        let text = std::str::from_utf8(&doc).unwrap();
        let expected = "{\n  \"chunks\": [\n    2\n  ],\n  \"compression\": null,\n  \"compression_opts\": null,\n  \"dtype\": \"<i4\",\n  \"fill_value\": 0,\n  \"order\": \"C\",\n  \"shape\": [\n    4\n  ],\n  \"zarr_format\": 2\n}";
        assert_eq!(text, expected);
    }

    #[test]
    fn read_your_writes() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![6, 6], scalar("<i4"))
            .chunks(smallvec![4, 4])
            .unwrap()
            .fill_value_json(json!(-1))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();

        let region = ArrayRegion::from_offset_shape(&[1, 2], &[4, 3]).unwrap();
        let src = le_i32s(&(0..12).collect::<Vec<i32>>());
        arr.write_region(&region, &src).unwrap();
        assert_eq!(arr.read_region(&region).unwrap(), src);
    }

    #[test]
    fn uncompressed_chunk_payload_is_raw_bytes() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![2, 2], scalar("<i4"))
            .chunks(smallvec![2, 2])
            .unwrap()
            .fill_value_json(json!(0))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();
        arr.write_region(&ArrayRegion::whole(&[2, 2]), &le_i32s(&[1, 2, 3, 4]))
            .unwrap();
        let stored = store.get("a/0.0").unwrap().unwrap();
        assert_eq!(stored.as_ref(), le_i32s(&[1, 2, 3, 4]));
    }

    #[test]
    fn missing_chunks_read_as_fill() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![4, 4], scalar("<i4"))
            .chunks(smallvec![2, 2])
            .unwrap()
            .fill_value_json(json!(42))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();
        let out = arr
            .read_region(&ArrayRegion::from_offset_shape(&[3, 1], &[1, 2]).unwrap())
            .unwrap();
        assert_eq!(out, le_i32s(&[42, 42]));
    }

    #[test]
    fn partial_write_merges_with_fill() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![5], scalar("<u1"))
            .chunks(smallvec![3])
            .unwrap()
            .fill_value_json(json!(0))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();

        arr.write_region(
            &ArrayRegion::from_offset_shape(&[1], &[2]).unwrap(),
            &[9, 9],
        )
        .unwrap();
        assert_eq!(store.get("a/0").unwrap().unwrap().as_ref(), &[0, 9, 9]);
        assert!(store.get("a/1").unwrap().is_none());
        assert_eq!(
            arr.read_region(&ArrayRegion::whole(&[5])).unwrap(),
            vec![0, 9, 9, 0, 0]
        );
    }

    #[test]
    fn partial_write_preserves_existing_data() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![4], scalar("<u1"))
            .chunks(smallvec![4])
            .unwrap()
            .fill_value_json(json!(0))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();
        arr.write_region(&ArrayRegion::whole(&[4]), &[1, 2, 3, 4])
            .unwrap();
        arr.write_region(&ArrayRegion::from_offset_shape(&[1], &[2]).unwrap(), &[9, 9])
            .unwrap();
        assert_eq!(
            arr.read_region(&ArrayRegion::whole(&[4])).unwrap(),
            vec![1, 9, 9, 4]
        );
    }

    #[test]
    fn full_fill_chunk_write_deletes_key() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![4], scalar("<u1"))
            .chunks(smallvec![2])
            .unwrap()
            .fill_value_json(json!(7))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();

        arr.write_region(&ArrayRegion::whole(&[4]), &[1, 2, 3, 4])
            .unwrap();
        assert!(store.contains("a/0").unwrap());

        // rewriting a whole chunk with the fill value erases its key
        arr.write_region(&ArrayRegion::from_offset_shape(&[0], &[2]).unwrap(), &[7, 7])
            .unwrap();
        assert!(!store.contains("a/0").unwrap());
        assert_eq!(
            arr.read_region(&ArrayRegion::whole(&[4])).unwrap(),
            vec![7, 7, 3, 4]
        );

        // and a fresh fill-valued write leaves no key behind at all
        arr.write_region(&ArrayRegion::from_offset_shape(&[0], &[2]).unwrap(), &[7, 7])
            .unwrap();
        assert!(!store.contains("a/0").unwrap());
    }

    #[test]
    fn column_major_layout_roundtrips() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![2, 3], scalar("<u1"))
            .chunks(smallvec![2, 3])
            .unwrap()
            .order(Order::F)
            .fill_value_json(json!(0))
            .build();
        let arr = create_array(&store, &"f".parse().unwrap(), meta, false).unwrap();

        // element (i, j) lives at j*2 + i in a column-major buffer
        let buf: [u8; 6] = [
            00, 10, // column 0
            01, 11, // column 1
            02, 12, // column 2
        ];
        arr.write_region(&ArrayRegion::whole(&[2, 3]), &buf).unwrap();
        assert_eq!(store.get("f/0.0").unwrap().unwrap().as_ref(), &buf);

        let column1 = arr
            .read_region(&ArrayRegion::from_offset_shape(&[0, 1], &[2, 1]).unwrap())
            .unwrap();
        assert_eq!(column1, vec![01, 11]);

        let row1 = arr
            .read_region(&ArrayRegion::from_offset_shape(&[1, 0], &[1, 3]).unwrap())
            .unwrap();
        assert_eq!(row1, vec![10, 11, 12]);
    }

    #[test]
    fn zero_dimensional_array_uses_key_zero() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![], scalar("<f8"))
            .fill_value_json(json!(0.0))
            .build();
        let arr = create_array(&store, &"scalar".parse().unwrap(), meta, false).unwrap();

        let region = ArrayRegion::from_offset_shape(&[], &[]).unwrap();
        arr.write_region(&region, &1.5f64.to_le_bytes()).unwrap();
        assert!(store.contains("scalar/0").unwrap());
        assert_eq!(arr.read_region(&region).unwrap(), 1.5f64.to_le_bytes());
    }

    #[test]
    fn bounds_and_buffer_checks() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![4, 4], scalar("<u1"))
            .chunks(smallvec![2, 2])
            .unwrap()
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();

        let oob = ArrayRegion::from_offset_shape(&[2, 2], &[3, 1]).unwrap();
        assert!(matches!(
            arr.read_region(&oob),
            Err(ZarrError::OutOfBounds(_))
        ));

        let wrong_ndim = ArrayRegion::from_offset_shape(&[0], &[1]).unwrap();
        assert!(matches!(
            arr.read_region(&wrong_ndim),
            Err(ZarrError::OutOfBounds(_))
        ));

        let region = ArrayRegion::from_offset_shape(&[0, 0], &[2, 2]).unwrap();
        assert!(matches!(
            arr.write_region(&region, &[0u8; 3]),
            Err(ZarrError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn boundary_chunks_never_surface_overhang() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![5], scalar("<u1"))
            .chunks(smallvec![3])
            .unwrap()
            .fill_value_json(json!(0))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();
        arr.write_region(&ArrayRegion::whole(&[5]), &[1, 2, 3, 4, 5])
            .unwrap();

        // the boundary chunk is stored full-sized
        assert_eq!(store.get("a/1").unwrap().unwrap().len(), 3);
        // but reads stop at the array edge
        assert_eq!(
            arr.read_region(&ArrayRegion::whole(&[5])).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn unknown_compressor_fails_open() {
        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![4], scalar("<u1"))
            .compressor("snapzip", Value::Null)
            .build();
        assert!(matches!(
            create_array(&store, &"a".parse().unwrap(), meta, false),
            Err(ZarrError::Codec(CodecError::UnknownCompressor(_)))
        ));
    }

    #[cfg(feature = "zlib")]
    #[test]
    fn zlib_array_matches_wire_contract() {
        use std::io::Read;

        let store = MemoryStore::new();
        let meta = ArrayMetadata::builder(smallvec![20, 20], scalar("<i4"))
            .chunks(smallvec![10, 10])
            .unwrap()
            .fill_value_json(json!(42))
            .compressor("zlib", json!(1))
            .build();
        let arr = create_array(&store, &"a".parse().unwrap(), meta, false).unwrap();

        arr.write_region(
            &ArrayRegion::from_offset_shape(&[0, 0], &[10, 10]).unwrap(),
            &le_i32s(&[1; 100]),
        )
        .unwrap();

        // exactly one chunk key exists
        assert!(store.contains("a/0.0").unwrap());
        for key in ["a/0.1", "a/1.0", "a/1.1"] {
            assert!(!store.contains(key).unwrap(), "unexpected key {key}");
        }

        // the payload is a bare zlib stream over 400 bytes of LE int32 ones
        let stored = store.get("a/0.0").unwrap().unwrap();
        let mut raw = Vec::new();
        flate2::read::ZlibDecoder::new(stored.as_ref())
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, le_i32s(&[1; 100]));

        // untouched cells read as fill
        let corner = arr
            .read_region(&ArrayRegion::from_offset_shape(&[10, 10], &[1, 1]).unwrap())
            .unwrap();
        assert_eq!(corner, le_i32s(&[42]));

        // covering the rest of the array produces exactly four chunk keys
        arr.write_region(
            &ArrayRegion::from_offset_shape(&[0, 10], &[10, 10]).unwrap(),
            &le_i32s(&[2; 100]),
        )
        .unwrap();
        arr.write_region(
            &ArrayRegion::from_offset_shape(&[10, 0], &[10, 20]).unwrap(),
            &le_i32s(&[3; 200]),
        )
        .unwrap();
        let mut chunk_keys: Vec<String> = store
            .list_prefix("a/")
            .unwrap()
            .into_iter()
            .filter(|k| !k.ends_with(".zarray") && !k.ends_with(".zattrs"))
            .collect();
        chunk_keys.sort();
        assert_eq!(chunk_keys, vec!["a/0.0", "a/0.1", "a/1.0", "a/1.1"]);
    }
}

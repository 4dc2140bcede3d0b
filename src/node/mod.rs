//! Arrays, groups, and the path-shaped hierarchy over a store.

mod array;
mod group;

pub use array::{Array, ArrayMetadata, ArrayMetadataBuilder, Compression, Order};
pub use group::{Group, GroupMetadata};

use std::collections::BTreeMap;

use bytes::Bytes;
use log::debug;
use serde::Serialize;

use crate::{
    codecs::CodecError,
    data_type::DataTypeError,
    fill_value::FillValueError,
    store::{ListableStore, NodeName, NodePath, ReadableStore, StoreError, WriteableStore},
    ZarrError,
};

pub(crate) const ARRAY_METADATA_KEY: &str = ".zarray";
pub(crate) const GROUP_METADATA_KEY: &str = ".zgroup";
pub(crate) const ATTRS_KEY: &str = ".zattrs";

/// A `.zattrs` document: an arbitrary JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// A metadata document that cannot be accepted.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("zarr_format must be 2, got {0}")]
    BadFormatVersion(usize),
    #[error("shape {shape:?} and chunks {chunks:?} have different dimensionalities")]
    ShapeChunksMismatch { shape: Vec<u64>, chunks: Vec<u64> },
    #[error("chunk shape {0:?} has a zero extent")]
    ZeroChunkExtent(Vec<u64>),
    #[error(transparent)]
    DataType(#[from] DataTypeError),
    #[error(transparent)]
    FillValue(#[from] FillValueError),
    #[error("invalid compression_opts for `{name}`: {source}")]
    CompressionOpts {
        name: String,
        #[source]
        source: CodecError,
    },
}

/// The kind of node a metadata key announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Array,
    Group,
}

/// Serialize a metadata document in the stable form: sorted keys,
/// two-space indent, `\n` line endings.
pub(crate) fn to_json_document<T: Serialize>(value: &T) -> Result<Bytes, MetadataError> {
    let s = serde_json::to_string_pretty(value)?;
    Ok(Bytes::from(s.into_bytes()))
}

/// What, if anything, lives at `path`. An array wins if both metadata keys
/// are somehow present; creation never produces that state.
pub fn node_kind<S: ReadableStore>(
    store: &S,
    path: &NodePath,
) -> Result<Option<NodeKind>, StoreError> {
    if store.contains(&path.key(ARRAY_METADATA_KEY))? {
        return Ok(Some(NodeKind::Array));
    }
    if store.contains(&path.key(GROUP_METADATA_KEY))? {
        return Ok(Some(NodeKind::Group));
    }
    Ok(None)
}

pub(crate) fn read_attributes<S: ReadableStore>(
    store: &S,
    path: &NodePath,
) -> Result<JsonObject, ZarrError> {
    match store.get(&path.key(ATTRS_KEY))? {
        None => Ok(JsonObject::new()),
        Some(bytes) => {
            let attrs: JsonObject =
                serde_json::from_slice(&bytes).map_err(MetadataError::from)?;
            Ok(attrs)
        }
    }
}

pub(crate) fn write_attributes<S: WriteableStore>(
    store: &S,
    path: &NodePath,
    attrs: &JsonObject,
) -> Result<(), ZarrError> {
    let doc = to_json_document(attrs)?;
    store.set(&path.key(ATTRS_KEY), doc)?;
    Ok(())
}

/// Write `.zgroup` at every proper ancestor of `path` where no node exists.
///
/// An array at any ancestor blocks the whole subtree.
fn ensure_ancestors<S: WriteableStore>(store: &S, path: &NodePath) -> Result<(), ZarrError> {
    for ancestor in path.ancestors() {
        match node_kind(store, &ancestor)? {
            Some(NodeKind::Array) => {
                return Err(ZarrError::PathConflict {
                    path: path.clone(),
                    ancestor,
                });
            }
            Some(NodeKind::Group) => {}
            None => {
                let doc = to_json_document(&GroupMetadata::default())?;
                store.set(&ancestor.key(GROUP_METADATA_KEY), doc)?;
            }
        }
    }
    Ok(())
}

/// Create a group at `path`, creating implicit ancestor groups.
///
/// Creating a group where one already exists opens it; an array at the
/// path or any ancestor is an error.
pub fn create_group<'s, S: WriteableStore>(
    store: &'s S,
    path: &NodePath,
) -> Result<Group<'s, S>, ZarrError> {
    ensure_ancestors(store, path)?;
    match node_kind(store, path)? {
        Some(NodeKind::Array) => Err(ZarrError::PathExists(path.clone())),
        Some(NodeKind::Group) => Group::open(store, path.clone()),
        None => {
            let metadata = GroupMetadata::default();
            let doc = to_json_document(&metadata)?;
            store.set(&path.key(GROUP_METADATA_KEY), doc)?;
            Ok(Group::new(store, path.clone(), metadata))
        }
    }
}

/// Create an array at `path`, creating implicit ancestor groups.
///
/// Without `overwrite`, an existing node at `path` is an error. With it,
/// every key under the node's prefix is erased first; this sweep is one
/// store call per key and is not atomic.
pub fn create_array<'s, S: WriteableStore>(
    store: &'s S,
    path: &NodePath,
    metadata: ArrayMetadata,
    overwrite: bool,
) -> Result<Array<'s, S>, ZarrError> {
    let parts = array::validate_metadata(&metadata)?;
    ensure_ancestors(store, path)?;
    if node_kind(store, path)?.is_some() {
        if !overwrite {
            return Err(ZarrError::PathExists(path.clone()));
        }
        debug!("overwriting node at '{path}'");
        store.erase_prefix(&path.key_prefix())?;
    }
    store.set(&path.key(ARRAY_METADATA_KEY), to_json_document(&metadata)?)?;
    store.set(&path.key(ATTRS_KEY), to_json_document(&JsonObject::new())?)?;
    Ok(Array::from_parts(store, path.clone(), metadata, parts))
}

/// Direct members of the group prefix at `path`: keys matching
/// `child/.zgroup` or `child/.zarray` with no intervening `/`, deduplicated.
pub(crate) fn list_members<S: ListableStore>(
    store: &S,
    path: &NodePath,
) -> Result<Vec<(NodeName, NodeKind)>, ZarrError> {
    let prefix = path.key_prefix();
    let mut members: BTreeMap<String, NodeKind> = BTreeMap::new();
    for key in store.list_prefix(&prefix)? {
        let rest = &key[prefix.len()..];
        let mut parts = rest.splitn(3, '/');
        if let (Some(child), Some(meta), None) = (parts.next(), parts.next(), parts.next()) {
            let kind = match meta {
                ARRAY_METADATA_KEY => NodeKind::Array,
                GROUP_METADATA_KEY => NodeKind::Group,
                _ => continue,
            };
            if child.is_empty() {
                continue;
            }
            // arrays shadow groups; creation never produces both
            members
                .entry(child.to_owned())
                .and_modify(|k| {
                    if kind == NodeKind::Array {
                        *k = NodeKind::Array;
                    }
                })
                .or_insert(kind);
        }
    }
    members
        .into_iter()
        .map(|(name, kind)| Ok((NodeName::new(name)?, kind)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;
    use crate::store::{ListableStore, MemoryStore, ReadableStore};
    use smallvec::smallvec;

    fn int32_meta() -> ArrayMetadata {
        ArrayMetadata::builder(smallvec![4, 4], DataType::Scalar("<i4".parse().unwrap()))
            .chunks(smallvec![2, 2])
            .unwrap()
            .build()
    }

    #[test]
    fn deep_array_creates_implicit_groups() {
        let store = MemoryStore::new();
        let path = NodePath::new("a/b/c").unwrap();
        create_array(&store, &path, int32_meta(), false).unwrap();

        let mut keys = store.list().unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ".zgroup",
                "a/.zgroup",
                "a/b/.zgroup",
                "a/b/c/.zarray",
                "a/b/c/.zattrs",
            ]
        );
    }

    #[test]
    fn existing_array_blocks_descendants() {
        let store = MemoryStore::new();
        create_array(&store, &NodePath::new("a").unwrap(), int32_meta(), false).unwrap();
        let err = create_group(&store, &NodePath::new("a/b").unwrap()).unwrap_err();
        assert!(matches!(err, ZarrError::PathConflict { .. }));
        let err =
            create_array(&store, &NodePath::new("a/b").unwrap(), int32_meta(), false).unwrap_err();
        assert!(matches!(err, ZarrError::PathConflict { .. }));
    }

    #[test]
    fn creation_collision_without_overwrite() {
        let store = MemoryStore::new();
        let path = NodePath::new("x").unwrap();
        create_array(&store, &path, int32_meta(), false).unwrap();
        assert!(matches!(
            create_array(&store, &path, int32_meta(), false),
            Err(ZarrError::PathExists(_))
        ));
        assert!(matches!(
            create_group(&store, &path),
            Err(ZarrError::PathExists(_))
        ));
    }

    #[test]
    fn overwrite_sweeps_old_keys() {
        let store = MemoryStore::new();
        let path = NodePath::new("x").unwrap();
        let arr = create_array(&store, &path, int32_meta(), false).unwrap();
        arr.write_region(
            &crate::chunk_grid::ArrayRegion::whole(&[4, 4]),
            &vec![1u8; 4 * 4 * 4],
        )
        .unwrap();
        assert!(store.contains("x/0.0").unwrap());

        create_array(&store, &path, int32_meta(), true).unwrap();
        assert!(!store.contains("x/0.0").unwrap());
        assert!(store.contains("x/.zarray").unwrap());
    }

    #[test]
    fn group_creation_is_idempotent() {
        let store = MemoryStore::new();
        let path = NodePath::new("g").unwrap();
        create_group(&store, &path).unwrap();
        create_group(&store, &path).unwrap();
        assert_eq!(node_kind(&store, &path).unwrap(), Some(NodeKind::Group));
    }

    #[test]
    fn members_are_direct_children_only() {
        let store = MemoryStore::new();
        create_group(&store, &NodePath::new("g/sub").unwrap()).unwrap();
        create_array(
            &store,
            &NodePath::new("g/arr").unwrap(),
            int32_meta(),
            false,
        )
        .unwrap();
        create_array(
            &store,
            &NodePath::new("g/sub/deep").unwrap(),
            int32_meta(),
            false,
        )
        .unwrap();

        let members = list_members(&store, &NodePath::new("g").unwrap()).unwrap();
        let rendered: Vec<(String, NodeKind)> = members
            .into_iter()
            .map(|(n, k)| (n.as_str().to_owned(), k))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("arr".to_owned(), NodeKind::Array),
                ("sub".to_owned(), NodeKind::Group),
            ]
        );
    }

    #[test]
    fn attributes_default_to_empty() {
        let store = MemoryStore::new();
        let path = NodePath::new("g").unwrap();
        assert!(read_attributes(&store, &path).unwrap().is_empty());
    }
}

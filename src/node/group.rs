use serde::{Deserialize, Serialize};

use crate::{
    store::{ListableStore, NodeName, NodePath, ReadableStore, Store, WriteableStore},
    ZarrError, ZARR_FORMAT,
};

use super::{
    list_members, read_attributes, write_attributes, Array, ArrayMetadata, JsonObject,
    MetadataError, NodeKind, GROUP_METADATA_KEY,
};

/// A `.zgroup` document: exactly the format version marker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GroupMetadata {
    pub zarr_format: usize,
}

impl Default for GroupMetadata {
    fn default() -> Self {
        Self {
            zarr_format: ZARR_FORMAT,
        }
    }
}

impl GroupMetadata {
    fn validate(&self) -> Result<(), MetadataError> {
        if self.zarr_format != ZARR_FORMAT {
            return Err(MetadataError::BadFormatVersion(self.zarr_format));
        }
        Ok(())
    }
}

/// A handle on a stored group.
#[derive(Debug)]
pub struct Group<'s, S: Store> {
    store: &'s S,
    path: NodePath,
    metadata: GroupMetadata,
}

impl<'s, S: Store> Group<'s, S> {
    pub(crate) fn new(store: &'s S, path: NodePath, metadata: GroupMetadata) -> Self {
        Self {
            store,
            path,
            metadata,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn metadata(&self) -> &GroupMetadata {
        &self.metadata
    }

    fn child_path(&self, name: &NodeName) -> NodePath {
        self.path.join(name.clone())
    }
}

impl<'s, S: ReadableStore> Group<'s, S> {
    /// Open the group whose `.zgroup` lives at `path`.
    pub fn open(store: &'s S, path: NodePath) -> Result<Self, ZarrError> {
        let bytes = store
            .get(&path.key(GROUP_METADATA_KEY))?
            .ok_or_else(|| ZarrError::NodeNotFound(path.clone()))?;
        let metadata: GroupMetadata =
            serde_json::from_slice(&bytes).map_err(MetadataError::from)?;
        metadata.validate()?;
        Ok(Self::new(store, path, metadata))
    }

    /// Open a child array of this group.
    pub fn array(&self, name: &NodeName) -> Result<Array<'s, S>, ZarrError> {
        Array::open(self.store, self.child_path(name))
    }

    /// Open a child group of this group.
    pub fn group(&self, name: &NodeName) -> Result<Group<'s, S>, ZarrError> {
        Self::open(self.store, self.child_path(name))
    }

    pub fn attributes(&self) -> Result<JsonObject, ZarrError> {
        read_attributes(self.store, &self.path)
    }
}

impl<'s, S: ListableStore> Group<'s, S> {
    /// Direct members of this group, sorted by name.
    ///
    /// Membership is derived by scanning for immediate-child metadata keys;
    /// nothing is stored per group.
    pub fn members(&self) -> Result<Vec<(NodeName, NodeKind)>, ZarrError> {
        list_members(self.store, &self.path)
    }
}

impl<'s, S: WriteableStore> Group<'s, S> {
    /// Create a child group, with this group as the implicit ancestor.
    pub fn create_group(&self, name: &NodeName) -> Result<Group<'s, S>, ZarrError> {
        super::create_group(self.store, &self.child_path(name))
    }

    /// Create a child array.
    pub fn create_array(
        &self,
        name: &NodeName,
        metadata: ArrayMetadata,
        overwrite: bool,
    ) -> Result<Array<'s, S>, ZarrError> {
        super::create_array(self.store, &self.child_path(name), metadata, overwrite)
    }

    pub fn set_attributes(&self, attrs: &JsonObject) -> Result<(), ZarrError> {
        write_attributes(self.store, &self.path, attrs)
    }
}

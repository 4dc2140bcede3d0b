use bytes::Bytes;
use itertools::Itertools;
use smallvec::SmallVec;
use std::{fmt::Display, str::FromStr};

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "filesystem")]
pub mod filesystem;
#[cfg(feature = "filesystem")]
pub use filesystem::FileSystemStore;

const NODE_PATH_SIZE: usize = 10;
pub(crate) const KEY_SEP: &str = "/";

/// A single segment of a logical path.
///
/// Valid segments are non-empty, ASCII-only, contain no `/`,
/// and are not the traversal segments `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(String);

impl NodeName {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, InvalidNodePath> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    fn validate(s: &str) -> Result<(), InvalidNodePath> {
        if s.is_empty() {
            return Err(InvalidNodePath::EmptySegment);
        }
        if s == "." || s == ".." {
            return Err(InvalidNodePath::Traversal(s.to_owned()));
        }
        if s.contains('/') {
            return Err(InvalidNodePath::HasSlash(s.to_owned()));
        }
        if !s.is_ascii() {
            return Err(InvalidNodePath::NonAscii(s.to_owned()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeName {
    type Err = InvalidNodePath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidNodePath {
    #[error("path segment is empty")]
    EmptySegment,
    #[error("path segment `{0}` contains '/'")]
    HasSlash(String),
    #[error("path traversal segment `{0}` is not allowed")]
    Traversal(String),
    #[error("path segment `{0}` contains non-ASCII characters")]
    NonAscii(String),
}

/// The canonical logical path of an array or group within a store.
///
/// Parsing normalizes the raw string: `\` becomes `/`, leading/trailing
/// separators are stripped, and runs of separators collapse. The empty
/// path is the root. Normalization is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(SmallVec<[NodeName; NODE_PATH_SIZE]>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(raw: &str) -> Result<Self, InvalidNodePath> {
        raw.parse()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[NodeName] {
        &self.0
    }

    /// The final segment; `None` at the root.
    pub fn name(&self) -> Option<&NodeName> {
        self.0.last()
    }

    /// The path with the final segment removed; `None` at the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].iter().cloned().collect()))
    }

    /// Proper ancestors, shortest (root) first.
    pub fn ancestors(&self) -> impl Iterator<Item = NodePath> + '_ {
        (0..self.0.len()).map(move |n| Self(self.0[..n].iter().cloned().collect()))
    }

    pub fn join(&self, name: NodeName) -> NodePath {
        let mut out = self.clone();
        out.0.push(name);
        out
    }

    /// The store-key prefix for this path: `"a/b/"`, or `""` at the root.
    pub fn key_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            let mut s = self.0.iter().map(NodeName::as_str).join(KEY_SEP);
            s.push_str(KEY_SEP);
            s
        }
    }

    /// A store key under this path: prefix plus `suffix`.
    pub fn key(&self, suffix: &str) -> String {
        let mut s = self.key_prefix();
        s.push_str(suffix);
        s
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.iter().map(NodeName::as_str).join(KEY_SEP))
    }
}

impl FromStr for NodePath {
    type Err = InvalidNodePath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('\\', KEY_SEP);
        let mut path = Self::default();
        for segment in normalized.split(KEY_SEP).filter(|seg| !seg.is_empty()) {
            path.0.push(NodeName::new(segment)?);
        }
        Ok(path)
    }
}

impl FromIterator<NodeName> for NodePath {
    fn from_iter<T: IntoIterator<Item = NodeName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A failure inside a store backend.
///
/// A missing key is not an error; it is `Ok(None)` from [`ReadableStore::get`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid store key `{0}`")]
    InvalidKey(String),
    #[error("{0}")]
    Other(String),
}

pub trait Store {}

pub trait ReadableStore: Store {
    /// The full value at `key`, or `None` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.get(key).map(|v| v.is_some())
    }
}

pub trait ListableStore: Store {
    /// All keys starting with `prefix`, in unspecified order.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Every key in the store.
    fn list(&self) -> Result<Vec<String>, StoreError> {
        self.list_prefix("")
    }
}

pub trait WriteableStore: ReadableStore + ListableStore {
    /// Write the full value at `key`, replacing any previous value.
    fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Delete the value at `key`, reporting whether it existed.
    fn erase(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every key starting with `prefix`.
    ///
    /// The default implementation issues one `erase` per listed key and
    /// is not atomic.
    fn erase_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        for key in self.list_prefix(prefix)? {
            self.erase(&key)?;
        }
        Ok(())
    }
}

use std::{
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use fs4::FileExt;
use log::warn;
use walkdir::WalkDir;

use super::{ListableStore, ReadableStore, Store, StoreError, WriteableStore, KEY_SEP};

/// A store mapping keys onto files under a base directory.
///
/// Readers take shared locks and writers exclusive locks, so concurrent
/// processes see whole values per key. This store is thread-safe.
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    /// Uses the path as given, without checks.
    pub fn new_unchecked(path: PathBuf) -> Self {
        Self { base_path: path }
    }

    /// Canonicalizes the path and checks that it is an extant directory.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let base_path = path.canonicalize()?;
        if fs::metadata(&base_path)?.is_file() {
            return Err(StoreError::Other(format!(
                "{} exists, but it is a file",
                base_path.display()
            )));
        }
        Ok(Self { base_path })
    }

    /// Creates the directory (with parents if `parents`) and opens it.
    pub fn create(path: PathBuf, parents: bool) -> Result<Self, StoreError> {
        if path.exists() {
            return Err(StoreError::Other(format!(
                "{} already exists",
                path.display()
            )));
        }
        if parents {
            fs::create_dir_all(&path)?;
        } else {
            fs::create_dir(&path)?;
        }
        Ok(Self {
            base_path: path.canonicalize()?,
        })
    }

    /// Opens the directory, creating it first if absent.
    pub fn open_or_create(path: PathBuf, parents: bool) -> Result<Self, StoreError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, parents)
        }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        let mut path = self.base_path.clone();
        for segment in key.split(KEY_SEP) {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StoreError::InvalidKey(key.to_owned()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// The directory a key prefix denotes; the base directory for the
    /// empty prefix.
    fn prefix_path(&self, prefix: &str) -> Result<PathBuf, StoreError> {
        let trimmed = prefix.trim_end_matches(KEY_SEP);
        if trimmed.is_empty() {
            Ok(self.base_path.clone())
        } else {
            self.key_path(trimmed)
        }
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let mut segments = Vec::new();
        for component in rel.components() {
            segments.push(component.as_os_str().to_str()?.to_owned());
        }
        Some(segments.join(KEY_SEP))
    }
}

impl Store for FileSystemStore {}

impl ReadableStore for FileSystemStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.key_path(key)?;
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(Some(Bytes::from(buf)))
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.key_path(key)?.is_file())
    }
}

impl ListableStore for FileSystemStore {
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.prefix_path(prefix)?;
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| StoreError::Other(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            match self.relative_key(entry.path()) {
                Some(key) => keys.push(key),
                None => {
                    warn!("skipping entry with non-UTF8 name: {:?}", entry.path());
                }
            }
        }
        Ok(keys)
    }
}

impl WriteableStore for FileSystemStore {
    fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)?;
        file.lock_exclusive()?;
        file.write_all(&value)?;
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.key_path(key)?;
        match File::open(&path) {
            Ok(file) => {
                file.lock_exclusive()?;
                fs::remove_file(&path)?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn erase_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        let root = self.prefix_path(prefix)?;
        if !root.exists() {
            return Ok(());
        }
        for entry in WalkDir::new(&root).contents_first(true) {
            let entry = entry.map_err(|e| StoreError::Other(e.to_string()))?;
            if entry.file_type().is_dir() {
                // the base directory itself stays in place for the root prefix
                if entry.path() != self.base_path {
                    fs::remove_dir(entry.path())?;
                }
            } else {
                let file = File::open(entry.path())?;
                file.lock_exclusive()?;
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn fresh_store(tmp: &TempDir) -> FileSystemStore {
        FileSystemStore::create(tmp.path().join("root.zarr"), true).unwrap()
    }

    #[test]
    fn set_get_erase_roundtrip() {
        let tmp = TempDir::new("zarr2-fs").unwrap();
        let store = fresh_store(&tmp);

        store.set("a/b/.zarray", Bytes::from_static(b"{}")).unwrap();
        assert_eq!(
            store.get("a/b/.zarray").unwrap().unwrap().as_ref(),
            b"{}"
        );
        assert!(store.contains("a/b/.zarray").unwrap());
        assert_eq!(store.get("a/b/0.0").unwrap(), None);

        assert!(store.erase("a/b/.zarray").unwrap());
        assert!(!store.erase("a/b/.zarray").unwrap());
    }

    #[test]
    fn list_prefix_walks_subtree() {
        let tmp = TempDir::new("zarr2-fs").unwrap();
        let store = fresh_store(&tmp);
        for key in ["x/.zgroup", "x/y/.zarray", "x/y/0.0", "z/.zgroup"] {
            store.set(key, Bytes::new()).unwrap();
        }
        let mut under_x = store.list_prefix("x/").unwrap();
        under_x.sort();
        assert_eq!(under_x, vec!["x/.zgroup", "x/y/.zarray", "x/y/0.0"]);
        assert_eq!(store.list_prefix("").unwrap().len(), 4);
        assert_eq!(store.list_prefix("missing/").unwrap().len(), 0);
    }

    #[test]
    fn erase_prefix_removes_directories() {
        let tmp = TempDir::new("zarr2-fs").unwrap();
        let store = fresh_store(&tmp);
        for key in ["x/y/.zarray", "x/y/0.0", "x/.zgroup"] {
            store.set(key, Bytes::new()).unwrap();
        }
        store.erase_prefix("x/y/").unwrap();
        assert!(!store.contains("x/y/.zarray").unwrap());
        assert!(store.contains("x/.zgroup").unwrap());
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let tmp = TempDir::new("zarr2-fs").unwrap();
        let store = fresh_store(&tmp);
        for key in ["../escape", "a//b", "", "a/./b"] {
            assert!(
                matches!(store.get(key), Err(StoreError::InvalidKey(_))),
                "accepted key `{key}`"
            );
        }
    }
}

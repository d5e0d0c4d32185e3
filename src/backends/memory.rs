//! In-process bundle backend (`mem://`).
//!
//! Holds files and directories in memory behind `RwLock`s, the interior
//! mutability all backends use so every operation takes `&self`. Serves as
//! the resource-bundle backend and as the workhorse for tests.

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{EntryIter, FsBackend};
use crate::walk::Walker;
use crate::{DirectoryEntry, ListOptions, Locator, OmniError};

#[derive(Debug, Default)]
struct Inner {
    /// Path (no trailing slash) -> contents.
    files: RwLock<HashMap<String, Vec<u8>>>,
    /// Directory paths, no trailing slash; `""` is the root.
    dirs: RwLock<BTreeSet<String>>,
}

impl Inner {
    fn files(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn files_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }

    fn dirs(&self) -> RwLockReadGuard<'_, BTreeSet<String>> {
        self.dirs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn dirs_mut(&self) -> RwLockWriteGuard<'_, BTreeSet<String>> {
        self.dirs.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Normalized lookup key: absolute path without its trailing slash.
fn key_of(locator: &Locator) -> String {
    let trimmed = locator.path().trim_end_matches('/');
    trimmed.to_string()
}

fn parent_key(key: &str) -> &str {
    match key.rfind('/') {
        Some(0) | None => "",
        Some(i) => &key[..i],
    }
}

/// Driver for `mem://` locators.
///
/// Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Empty store with just a root directory.
    pub fn new() -> Self {
        let backend = Self::default();
        backend.inner.dirs_mut().insert(String::new());
        backend
    }
}

/// Write stream that publishes the file only once dropped, never partially.
struct MemWriter {
    inner: Arc<Inner>,
    key: String,
    buf: Vec<u8>,
    committed: bool,
}

impl MemWriter {
    fn commit(&mut self) {
        if !self.committed {
            self.committed = true;
            self.inner
                .files_mut()
                .insert(std::mem::take(&mut self.key), std::mem::take(&mut self.buf));
        }
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

impl MemoryBackend {
    fn is_dir(&self, key: &str) -> bool {
        self.inner.dirs().contains(key)
    }

    /// Immediate children of a directory key, sorted by name.
    fn children_of(
        inner: &Inner,
        dir: &Locator,
        extended: bool,
    ) -> Result<Vec<DirectoryEntry>, OmniError> {
        let key = key_of(dir);
        if !inner.dirs().contains(&key) {
            return Err(OmniError::NotFound {
                locator: dir.to_string(),
            });
        }
        let prefix = format!("{key}/");
        let direct = |candidate: &str| -> Option<String> {
            let rest = candidate.strip_prefix(&prefix)?;
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        };

        let mut names: Vec<(String, bool)> = Vec::new();
        for d in inner.dirs().iter() {
            if let Some(name) = direct(d) {
                names.push((name, true));
            }
        }
        for f in inner.files().keys() {
            if let Some(name) = direct(f) {
                names.push((name, false));
            }
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let files = inner.files();
        Ok(names
            .into_iter()
            .map(|(name, is_dir)| {
                let child = dir.child(&name, is_dir);
                let mut entry = if is_dir {
                    DirectoryEntry::dir(child)
                } else {
                    let size = files.get(&key_of(&child)).map_or(0, Vec::len) as u64;
                    DirectoryEntry::file(child, size)
                };
                if extended {
                    entry.permissions = Some(if is_dir {
                        "rwxr-xr-x".to_string()
                    } else {
                        "rw-r--r--".to_string()
                    });
                }
                entry
            })
            .collect())
    }
}

impl FsBackend for MemoryBackend {
    fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError> {
        let key = key_of(locator);
        if self.is_dir(&key) {
            return Err(OmniError::NotAFile {
                locator: locator.to_string(),
            });
        }
        match self.inner.files().get(&key) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(OmniError::NotFound {
                locator: locator.to_string(),
            }),
        }
    }

    fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError> {
        let key = key_of(locator);
        if self.is_dir(&key) {
            return Err(OmniError::NotAFile {
                locator: locator.to_string(),
            });
        }
        if !self.is_dir(parent_key(&key)) {
            return Err(OmniError::NotFound {
                locator: locator.to_string(),
            });
        }
        Ok(Box::new(MemWriter {
            inner: self.inner.clone(),
            key,
            buf: Vec::new(),
            committed: false,
        }))
    }

    fn stat_opt(
        &self,
        locator: &Locator,
        extended: bool,
    ) -> Result<Option<DirectoryEntry>, OmniError> {
        let key = key_of(locator);
        if self.is_dir(&key) {
            let dir_loc = if locator.is_dir_path() {
                locator.clone()
            } else {
                locator.with_path(&format!("{}/", locator.path()))?
            };
            let mut entry = DirectoryEntry::dir(dir_loc);
            if extended {
                entry.permissions = Some("rwxr-xr-x".to_string());
            }
            return Ok(Some(entry));
        }
        match self.inner.files().get(&key) {
            Some(data) => {
                let mut entry = DirectoryEntry::file(locator.clone(), data.len() as u64);
                if extended {
                    entry.permissions = Some("rw-r--r--".to_string());
                }
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, locator: &Locator) -> Result<(), OmniError> {
        let key = key_of(locator);
        if self.is_dir(&key) {
            let prefix = format!("{key}/");
            let has_children = self.inner.dirs().iter().any(|d| d.starts_with(&prefix))
                || self.inner.files().keys().any(|f| f.starts_with(&prefix));
            if has_children {
                return Err(OmniError::io(
                    "delete",
                    locator.to_string(),
                    std::io::Error::new(std::io::ErrorKind::DirectoryNotEmpty, "not empty"),
                ));
            }
            self.inner.dirs_mut().remove(&key);
            return Ok(());
        }
        if self.inner.files_mut().remove(&key).is_none() {
            return Err(OmniError::NotFound {
                locator: locator.to_string(),
            });
        }
        Ok(())
    }

    fn mkdir(&self, locator: &Locator) -> Result<(), OmniError> {
        let key = key_of(locator);
        if self.is_dir(&key) || self.inner.files().contains_key(&key) {
            return Err(OmniError::AlreadyExists {
                locator: locator.to_string(),
                operation: "mkdir",
            });
        }
        if !self.is_dir(parent_key(&key)) {
            return Err(OmniError::NotFound {
                locator: locator.to_string(),
            });
        }
        self.inner.dirs_mut().insert(key);
        Ok(())
    }

    fn list(&self, locator: &Locator, opts: ListOptions) -> Result<EntryIter, OmniError> {
        let key = key_of(locator);
        if !self.is_dir(&key) {
            if self.inner.files().contains_key(&key) {
                return Err(OmniError::NotADirectory {
                    locator: locator.to_string(),
                });
            }
            return Err(OmniError::NotFound {
                locator: locator.to_string(),
            });
        }
        let first = Self::children_of(&self.inner, locator, opts.extended)?;
        let inner = self.inner.clone();
        let extended = opts.extended;
        let walker = Walker::new(
            first,
            opts.recurse,
            Box::new(move |dir: &Locator| Self::children_of(&inner, dir, extended)),
        );
        Ok(EntryIter::new(walker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(path: &str) -> Locator {
        Locator::parse(&format!("mem://{path}")).unwrap()
    }

    fn seeded() -> MemoryBackend {
        let b = MemoryBackend::new();
        b.mkdir(&loc("/a")).unwrap();
        b.mkdir(&loc("/a/b")).unwrap();
        b.open_write(&loc("/a/x.txt")).unwrap().write_all(b"xx").unwrap();
        b.open_write(&loc("/a/b/y.txt")).unwrap().write_all(b"y").unwrap();
        b
    }

    #[test]
    fn write_then_read_round_trip() {
        let b = MemoryBackend::new();
        let file = loc("/data.bin");
        let mut w = b.open_write(&file).unwrap();
        w.write_all(b"hello").unwrap();
        drop(w);

        let mut out = Vec::new();
        b.open_read(&file).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn writes_are_invisible_until_the_writer_is_dropped() {
        let b = MemoryBackend::new();
        let file = loc("/partial");
        let mut w = b.open_write(&file).unwrap();
        w.write_all(b"half").unwrap();
        w.flush().unwrap();
        assert!(!b.exists(&file).unwrap());
        drop(w);
        assert!(b.exists(&file).unwrap());
    }

    #[test]
    fn open_write_requires_parent_directory() {
        let b = MemoryBackend::new();
        let err = b.open_write(&loc("/no/such/parent.txt")).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn exists_and_stat_opt() {
        let b = seeded();
        assert!(b.exists(&loc("/a/x.txt")).unwrap());
        assert!(b.exists(&loc("/a/b")).unwrap());
        assert!(!b.exists(&loc("/a/z")).unwrap());

        let entry = b.stat(&loc("/a/x.txt"), false).unwrap();
        assert_eq!(entry.size, Some(2));
        let dir = b.stat(&loc("/a/b"), false).unwrap();
        assert!(dir.is_dir);
        assert!(dir.locator.path().ends_with('/'));
    }

    #[test]
    fn recursive_listing_order() {
        let b = seeded();
        let entries = b
            .list(&loc("/a"), ListOptions::recursive())
            .unwrap()
            .collect_all()
            .unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.locator.path()).collect();
        assert_eq!(paths, ["/a/b/", "/a/b/y.txt", "/a/x.txt"]);
    }

    #[test]
    fn dot_files_participate_in_ordering() {
        let b = MemoryBackend::new();
        b.mkdir(&loc("/d")).unwrap();
        b.open_write(&loc("/d/.hidden")).unwrap().write_all(b"h").unwrap();
        b.open_write(&loc("/d/visible")).unwrap().write_all(b"v").unwrap();
        let entries = b
            .list(&loc("/d"), ListOptions::shallow())
            .unwrap()
            .collect_all()
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.locator.name()).collect();
        assert_eq!(names, [".hidden", "visible"]);
    }

    #[test]
    fn delete_refuses_non_empty_directories() {
        let b = seeded();
        assert!(b.delete(&loc("/a")).is_err());
        b.delete(&loc("/a/b/y.txt")).unwrap();
        b.delete(&loc("/a/b")).unwrap();
        assert!(!b.exists(&loc("/a/b")).unwrap());
    }

    #[test]
    fn mkdir_rejects_duplicates_and_orphans() {
        let b = seeded();
        assert!(matches!(
            b.mkdir(&loc("/a")).unwrap_err(),
            OmniError::AlreadyExists { .. }
        ));
        assert!(b.mkdir(&loc("/nope/child")).unwrap_err().is_not_found());
    }

    #[test]
    fn clones_share_the_store() {
        let b = MemoryBackend::new();
        let c = b.clone();
        b.open_write(&loc("/shared")).unwrap().write_all(b"s").unwrap();
        assert!(c.exists(&loc("/shared")).unwrap());
    }
}

//! Local-disk backend (`file://`).

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use crate::backend::{EntryIter, FsBackend};
use crate::types::mode_string;
use crate::walk::Walker;
use crate::{DirectoryEntry, ListOptions, Locator, OmniError};

/// Driver for `file://` locators, backed by `std::fs`.
///
/// Stateless; every operation maps directly onto the host filesystem.
/// Extended attributes carry numeric uid/gid (no local name resolution).
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

fn map_io(operation: &'static str, locator: &Locator, e: std::io::Error) -> OmniError {
    match e.kind() {
        std::io::ErrorKind::NotFound => OmniError::NotFound {
            locator: locator.to_string(),
        },
        std::io::ErrorKind::AlreadyExists => OmniError::AlreadyExists {
            locator: locator.to_string(),
            operation,
        },
        _ => OmniError::io(operation, locator.to_string(), e),
    }
}

/// Build an entry from already-fetched metadata (does not follow symlinks).
fn entry_from_meta(
    locator: &Locator,
    meta: &fs::Metadata,
    extended: bool,
) -> Result<DirectoryEntry, OmniError> {
    let is_dir = meta.is_dir();
    let entry_locator = if is_dir && !locator.is_dir_path() {
        locator.with_path(&format!("{}/", locator.path()))?
    } else {
        locator.clone()
    };

    let mut entry = if is_dir {
        DirectoryEntry::dir(entry_locator)
    } else {
        DirectoryEntry::file(entry_locator, meta.len())
    };

    if extended {
        entry.accessed = meta.accessed().ok();
        entry.modified = meta.modified().ok();
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            entry.owner = Some(meta.uid().to_string());
            entry.group = Some(meta.gid().to_string());
            entry.permissions = Some(mode_string(meta.mode()));
        }
        if meta.file_type().is_symlink() {
            entry.symlink_target = fs::read_link(locator.path())
                .ok()
                .map(|t| t.to_string_lossy().into_owned());
        }
    }
    Ok(entry)
}

/// Sorted children of a local directory, `.`/`..` excluded, dot-files kept.
fn children_of(dir: &Locator, extended: bool) -> Result<Vec<DirectoryEntry>, OmniError> {
    let mut named: Vec<(String, fs::Metadata)> = Vec::new();
    for item in fs::read_dir(dir.path()).map_err(|e| map_io("list", dir, e))? {
        let item = item.map_err(|e| map_io("list", dir, e))?;
        let name = item.file_name().to_string_lossy().into_owned();
        // DirEntry::metadata does not follow symlinks, matching the remote lister.
        let meta = item.metadata().map_err(|e| map_io("list", dir, e))?;
        named.push((name, meta));
    }
    named.sort_by(|a, b| a.0.cmp(&b.0));

    named
        .into_iter()
        .map(|(name, meta)| {
            let child = dir.child(&name, meta.is_dir());
            entry_from_meta(&child, &meta, extended)
        })
        .collect()
}

impl FsBackend for LocalBackend {
    fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError> {
        let path = Path::new(locator.path());
        if path.is_dir() {
            return Err(OmniError::NotAFile {
                locator: locator.to_string(),
            });
        }
        let file = fs::File::open(path).map_err(|e| map_io("open_read", locator, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError> {
        let path = Path::new(locator.path());
        if path.is_dir() {
            return Err(OmniError::NotAFile {
                locator: locator.to_string(),
            });
        }
        let file = fs::File::create(path).map_err(|e| map_io("open_write", locator, e))?;
        Ok(Box::new(file))
    }

    fn stat_opt(
        &self,
        locator: &Locator,
        extended: bool,
    ) -> Result<Option<DirectoryEntry>, OmniError> {
        match fs::symlink_metadata(locator.path()) {
            Ok(meta) => Ok(Some(entry_from_meta(locator, &meta, extended)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OmniError::io("stat", locator.to_string(), e)),
        }
    }

    fn delete(&self, locator: &Locator) -> Result<(), OmniError> {
        debug!(locator = %locator, "delete");
        let meta = fs::symlink_metadata(locator.path()).map_err(|e| map_io("delete", locator, e))?;
        if meta.is_dir() {
            fs::remove_dir(locator.path()).map_err(|e| map_io("delete", locator, e))
        } else {
            fs::remove_file(locator.path()).map_err(|e| map_io("delete", locator, e))
        }
    }

    fn mkdir(&self, locator: &Locator) -> Result<(), OmniError> {
        debug!(locator = %locator, "mkdir");
        fs::create_dir(locator.path()).map_err(|e| map_io("mkdir", locator, e))
    }

    fn list(&self, locator: &Locator, opts: ListOptions) -> Result<EntryIter, OmniError> {
        let meta =
            fs::symlink_metadata(locator.path()).map_err(|e| map_io("list", locator, e))?;
        if !meta.is_dir() {
            return Err(OmniError::NotADirectory {
                locator: locator.to_string(),
            });
        }
        let first = children_of(locator, opts.extended)?;
        let extended = opts.extended;
        let walker = Walker::new(
            first,
            opts.recurse,
            Box::new(move |dir: &Locator| children_of(dir, extended)),
        );
        Ok(EntryIter::new(walker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc_for(path: &Path) -> Locator {
        Locator::parse(&format!("file://{}", path.display())).unwrap()
    }

    #[test]
    fn write_read_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let loc = loc_for(&tmp.path().join("data.bin"));
        let backend = LocalBackend::new();

        let mut w = backend.open_write(&loc).unwrap();
        w.write_all(b"local bytes").unwrap();
        drop(w);

        let mut out = Vec::new();
        backend.open_read(&loc).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"local bytes");
    }

    #[test]
    fn exists_distinguishes_absence() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let missing = loc_for(&tmp.path().join("nope"));
        assert!(!backend.exists(&missing).unwrap());
        assert!(backend.exists(&loc_for(tmp.path())).unwrap());
    }

    #[test]
    fn stat_reports_directory_with_trailing_slash() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let entry = backend.stat(&loc_for(tmp.path()), false).unwrap();
        assert!(entry.is_dir);
        assert!(entry.locator.path().ends_with('/'));
        assert_eq!(entry.size, None);
    }

    #[test]
    fn extended_stat_populates_unix_attributes() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let loc = loc_for(&tmp.path().join("f"));
        backend.open_write(&loc).unwrap().write_all(b"x").unwrap();

        let entry = backend.stat(&loc, true).unwrap();
        assert!(entry.modified.is_some());
        #[cfg(unix)]
        {
            assert!(entry.owner.is_some());
            assert_eq!(entry.permissions.as_ref().map(String::len), Some(9));
        }
    }

    #[test]
    fn recursive_listing_matches_contract_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("a");
        fs::create_dir(&root).unwrap();
        fs::create_dir(root.join("b")).unwrap();
        fs::write(root.join("x.txt"), b"x").unwrap();
        fs::write(root.join("b/y.txt"), b"y").unwrap();

        let backend = LocalBackend::new();
        let entries = backend
            .list(&loc_for(&root), ListOptions::recursive())
            .unwrap()
            .collect_all()
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.locator.name()).collect();
        assert_eq!(names, ["b", "y.txt", "x.txt"]);
        assert!(entries[0].is_dir);
        assert!(entries[0].locator.path().ends_with("/b/"));
    }

    #[test]
    fn delete_handles_files_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();

        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        backend.delete(&loc_for(&file)).unwrap();
        assert!(!file.exists());

        let dir = tmp.path().join("d");
        fs::create_dir(&dir).unwrap();
        backend.delete(&loc_for(&dir)).unwrap();
        assert!(!dir.exists());

        let err = backend.delete(&loc_for(&file)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn mkdir_requires_parent_and_rejects_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();

        let nested = loc_for(&tmp.path().join("missing/child"));
        assert!(backend.mkdir(&nested).is_err());

        let dir = loc_for(&tmp.path().join("d"));
        backend.mkdir(&dir).unwrap();
        let err = backend.mkdir(&dir).unwrap_err();
        assert!(matches!(err, OmniError::AlreadyExists { .. }));
    }

    #[test]
    fn list_of_file_is_not_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        let err = backend
            .list(&loc_for(&file), ListOptions::shallow())
            .unwrap_err();
        assert!(matches!(err, OmniError::NotADirectory { .. }));
    }
}

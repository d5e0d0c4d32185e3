//! Scheme → backend registry, the single dispatch point for every operation.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{EntryIter, FsBackend};
use crate::backends::{LocalBackend, MemoryBackend, SftpBackend};
use crate::{Config, DirectoryEntry, ListOptions, Locator, OmniError};

/// Maps locator schemes to backend drivers and dispatches operations.
///
/// Every caller-facing operation passes through here. New backends register
/// with [`register`](Registry::register) without any change to the dispatch
/// logic.
///
/// # Examples
///
/// ```rust,no_run
/// use omnifs::{Config, Locator, Registry};
///
/// let registry = Registry::with_defaults(Config::new());
/// let src = Locator::parse("file:///etc/hostname")?;
/// let dst = Locator::parse("mem:///backup/hostname")?;
/// registry.copy(&src, &dst)?;
/// assert!(registry.exists(&dst)?);
/// # Ok::<(), omnifs::OmniError>(())
/// ```
pub struct Registry {
    backends: HashMap<String, Arc<dyn FsBackend>>,
}

impl Registry {
    /// Empty registry with no backends.
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry with the built-in backends: `file`, `mem`, and `sftp`.
    ///
    /// The configuration supplies credential scopes for the remote backend;
    /// local and in-memory backends ignore it.
    pub fn with_defaults(config: Config) -> Self {
        let mut registry = Self::new();
        registry.register("file", Arc::new(LocalBackend::new()));
        registry.register("mem", Arc::new(MemoryBackend::new()));
        registry.register("sftp", Arc::new(SftpBackend::new(config)));
        registry
    }

    /// Register a backend for a scheme, replacing any previous registration.
    pub fn register(&mut self, scheme: impl Into<String>, backend: Arc<dyn FsBackend>) {
        let scheme = scheme.into().to_ascii_lowercase();
        debug!(scheme = %scheme, "registering backend");
        self.backends.insert(scheme, backend);
    }

    /// Look up the backend for a locator's scheme.
    ///
    /// # Errors
    ///
    /// [`OmniError::UnknownScheme`] when nothing is registered for it.
    pub fn backend_for(&self, locator: &Locator) -> Result<&Arc<dyn FsBackend>, OmniError> {
        self.backends
            .get(locator.scheme())
            .ok_or_else(|| OmniError::UnknownScheme {
                scheme: locator.scheme().to_string(),
            })
    }

    /// Open a read stream. See [`FsBackend::open_read`].
    pub fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError> {
        self.backend_for(locator)?.open_read(locator)
    }

    /// Open a write stream. See [`FsBackend::open_write`].
    pub fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError> {
        self.backend_for(locator)?.open_write(locator)
    }

    /// Whether the object exists. See [`FsBackend::exists`].
    pub fn exists(&self, locator: &Locator) -> Result<bool, OmniError> {
        self.backend_for(locator)?.exists(locator)
    }

    /// Delete a file or directory. See [`FsBackend::delete`].
    pub fn delete(&self, locator: &Locator) -> Result<(), OmniError> {
        self.backend_for(locator)?.delete(locator)
    }

    /// Create a directory. See [`FsBackend::mkdir`].
    pub fn mkdir(&self, locator: &Locator) -> Result<(), OmniError> {
        self.backend_for(locator)?.mkdir(locator)
    }

    /// Stat an object. See [`FsBackend::stat`].
    pub fn stat(&self, locator: &Locator, extended: bool) -> Result<DirectoryEntry, OmniError> {
        self.backend_for(locator)?.stat(locator, extended)
    }

    /// List a directory. See [`FsBackend::list`].
    pub fn list(&self, locator: &Locator, opts: ListOptions) -> Result<EntryIter, OmniError> {
        self.backend_for(locator)?.list(locator, opts)
    }

    /// Copy one object between any two registered backends.
    ///
    /// Streams bytes from the source reader to the destination writer
    /// without buffering the whole payload in memory, then flushes so that
    /// backends delivering on commit report their failure here. Best-effort,
    /// not transactional: a failure mid-copy may leave the destination
    /// absent but never partially visible on backends that spool writes.
    pub fn copy(&self, src: &Locator, dst: &Locator) -> Result<u64, OmniError> {
        debug!(src = %src, dst = %dst, "copy");
        let mut reader = self.open_read(src)?;
        let mut writer = self.open_write(dst)?;
        let n = std::io::copy(&mut reader, &mut writer)
            .map_err(|e| OmniError::io("copy", src.to_string(), e))?;
        writer
            .flush()
            .map_err(|e| OmniError::io("copy", dst.to_string(), e))?;
        Ok(n)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

//! The backend driver contract.
//!
//! Every storage scheme implements [`FsBackend`]; the
//! [`Registry`](crate::Registry) dispatches on the locator's scheme to pick
//! the implementation. New backends plug in without modifying the
//! dispatcher.

use std::io::{Read, Write};

use crate::{DirectoryEntry, ListOptions, Locator, OmniError};

/// Operation set every backend implements.
///
/// All methods take `&self`; backends use interior mutability for any state
/// they keep. Operations are synchronous and blocking, and each acquires and
/// releases whatever session state it needs; two concurrent operations
/// never share a live handle.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
///
/// # Object Safety
///
/// This trait is object-safe and is normally used as `Arc<dyn FsBackend>`
/// inside the registry.
pub trait FsBackend: Send + Sync {
    /// Open a byte stream reading the object at `locator`.
    ///
    /// The returned reader owns every resource backing it (for remote
    /// backends, the session and channel) and releases them when dropped.
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the object does not exist
    /// - [`OmniError::NotAFile`] if the locator names a directory
    fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError>;

    /// Open a byte stream writing the object at `locator`.
    ///
    /// Backends may buffer; the object must be fully visible at its
    /// destination no later than when the writer is dropped, and never
    /// partially visible before that. `flush` is the commit point for
    /// backends that deliver on close: it reports delivery failures, while
    /// dropping an unflushed writer delivers on a best-effort basis only.
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the parent directory does not exist
    fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError>;

    /// Stat the object, distinguishing absence from failure.
    ///
    /// `Ok(None)` means the object does not exist. Any other failure (a
    /// connection error, say, or a permission error) propagates as `Err`,
    /// never as `Ok(None)`.
    ///
    /// `extended` requests owner/group/timestamps/permissions/symlink-target
    /// resolution.
    fn stat_opt(
        &self,
        locator: &Locator,
        extended: bool,
    ) -> Result<Option<DirectoryEntry>, OmniError>;

    /// Whether the object exists.
    ///
    /// Derived from [`stat_opt`](Self::stat_opt): absence is a normal
    /// `false`; every other failure propagates.
    fn exists(&self, locator: &Locator) -> Result<bool, OmniError> {
        Ok(self.stat_opt(locator, false)?.is_some())
    }

    /// Stat the object.
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the object does not exist
    fn stat(&self, locator: &Locator, extended: bool) -> Result<DirectoryEntry, OmniError> {
        self.stat_opt(locator, extended)?
            .ok_or_else(|| OmniError::NotFound {
                locator: locator.to_string(),
            })
    }

    /// Delete a file or an (empty) directory, whichever the locator names.
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the object does not exist
    fn delete(&self, locator: &Locator) -> Result<(), OmniError>;

    /// Create a single directory (parent must exist).
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the parent does not exist
    /// - [`OmniError::AlreadyExists`] if the path already exists
    fn mkdir(&self, locator: &Locator) -> Result<(), OmniError>;

    /// List a directory.
    ///
    /// Entries within a directory are sorted by name, dot-files included,
    /// `.`/`..` excluded. With `opts.recurse`, each directory's own listing
    /// is spliced in immediately after it (depth-first, pre-order). The
    /// sequence is lazy, single-pass, and non-restartable; a failure in one
    /// subtree surfaces as a single [`DirectoryEntry::failed`] entry rather
    /// than aborting the traversal.
    ///
    /// # Errors
    ///
    /// - [`OmniError::NotFound`] if the directory does not exist
    /// - [`OmniError::NotADirectory`] if the locator names a file
    fn list(&self, locator: &Locator, opts: ListOptions) -> Result<EntryIter, OmniError>;
}

/// Lazy sequence of directory entries.
///
/// Wraps a boxed iterator so backends are free in how they produce entries.
/// The outer `Result` of [`FsBackend::list`] answers "can I open this
/// directory at all?"; per-item errors abort iteration for conditions that
/// invalidate the whole traversal, while per-branch failures come through as
/// [`DirectoryEntry::failed`] items.
///
/// Dropping the iterator before exhaustion releases the resources backing
/// the traversal.
pub struct EntryIter(Box<dyn Iterator<Item = Result<DirectoryEntry, OmniError>> + Send + 'static>);

impl EntryIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<DirectoryEntry, OmniError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<Result<DirectoryEntry, OmniError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }

    /// Collect all entries, short-circuiting on the first hard error.
    ///
    /// Per-branch failures are entries, not errors, so they survive
    /// collection; see [`DirectoryEntry::is_error`].
    pub fn collect_all(self) -> Result<Vec<DirectoryEntry>, OmniError> {
        self.collect()
    }
}

impl std::fmt::Debug for EntryIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryIter").finish_non_exhaustive()
    }
}

impl Iterator for EntryIter {
    type Item = Result<DirectoryEntry, OmniError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

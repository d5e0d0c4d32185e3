//! Recursive lazy listing bound to one remote session.
//!
//! The traversal owns exactly one session/channel pair for its whole
//! lifetime. A [`Finalizer`] releases it when the caller drains the
//! sequence, and backstops the case where the iterator is dropped (or
//! leaked) before exhaustion.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::EntryIter;
use crate::cleanup::Finalizer;
use crate::walk::Walker;
use crate::{DirectoryEntry, ListOptions, Locator, OmniError};

use super::entry_from_stat;
use super::ident::IdentityMaps;
use super::session::{RemoteSession, map_sftp};

/// The transport session is `Send` but not `Sync`, so sharing it between
/// the traversal and its cleanup goes through a mutex. Only one of them
/// touches it at a time by construction; the lock is for the type system,
/// not for contention.
pub(super) type SharedSession = Arc<Mutex<RemoteSession>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, RemoteSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Close a shared session (idempotent).
pub(super) fn close_shared(session: &SharedSession) {
    lock(session).close();
}

/// Build the lazy listing. The caller closes `session` if this returns an
/// error; on success the iterator owns the close.
pub(super) fn remote_listing(
    session: SharedSession,
    locator: &Locator,
    opts: ListOptions,
) -> Result<EntryIter, OmniError> {
    let (first, ident) = {
        let guard = lock(&session);
        let st = guard
            .sftp()
            .lstat(Path::new(locator.path()))
            .map_err(|e| map_sftp("list", locator, e))?;
        if !st.is_dir() {
            return Err(OmniError::NotADirectory {
                locator: locator.to_string(),
            });
        }

        // One lookup per traversal, and only when attributes were asked for.
        let ident: Option<Arc<IdentityMaps>> =
            opts.extended.then(|| Arc::new(IdentityMaps::fetch(&guard)));
        let first = children_of(&guard, locator, opts.extended, ident.as_deref())?;
        (first, ident)
    };

    let finalizer = Finalizer::new({
        let session = session.clone();
        move || close_shared(&session)
    });
    let children = move |dir: &Locator| {
        let guard = lock(&session);
        children_of(&guard, dir, opts.extended, ident.as_deref())
    };
    let walker = Walker::new(first, opts.recurse, Box::new(children));
    Ok(EntryIter::new(SessionBound { walker, finalizer }))
}

/// Sorted children of one remote directory, `.`/`..` excluded.
fn children_of(
    session: &RemoteSession,
    dir: &Locator,
    extended: bool,
    ident: Option<&IdentityMaps>,
) -> Result<Vec<DirectoryEntry>, OmniError> {
    let listed = session
        .sftp()
        .readdir(Path::new(dir.path()))
        .map_err(|e| map_sftp("list", dir, e))?;

    let mut named: Vec<(String, ssh2::FileStat)> = listed
        .into_iter()
        .filter_map(|(path, st)| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            (name != "." && name != "..").then_some((name, st))
        })
        .collect();
    named.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(named
        .into_iter()
        .map(|(name, st)| {
            let child = dir.child(&name, st.is_dir());
            entry_from_stat(session, child, &st, extended, ident)
        })
        .collect())
}

/// Walker plus the scoped cleanup releasing its session.
struct SessionBound {
    walker: Walker,
    finalizer: Finalizer,
}

impl Iterator for SessionBound {
    type Item = Result<DirectoryEntry, OmniError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.walker.next() {
            Some(item) => Some(item),
            None => {
                // Drained: release eagerly instead of waiting for drop.
                self.finalizer.close();
                None
            }
        }
    }
}

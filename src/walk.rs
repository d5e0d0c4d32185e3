//! Lazy depth-first directory traversal shared by all backends.

use crate::{DirectoryEntry, Locator, OmniError};

/// Produces the children of one directory, sorted by name, `.`/`..` excluded.
pub(crate) type ChildrenFn =
    Box<dyn FnMut(&Locator) -> Result<Vec<DirectoryEntry>, OmniError> + Send>;

/// Lazy pre-order traversal over a `ChildrenFn`.
///
/// Each directory entry is yielded first; when recursion is on, its own
/// children are spliced in immediately after it, computed only when the
/// caller reaches that point. A failure expanding one directory yields a
/// single synthetic [`DirectoryEntry::failed`] entry for that branch and the
/// traversal continues with the siblings.
///
/// Single-pass and non-restartable.
pub(crate) struct Walker {
    children: ChildrenFn,
    recurse: bool,
    stack: Vec<std::vec::IntoIter<DirectoryEntry>>,
}

impl Walker {
    /// Start a traversal from an already-listed set of root children.
    pub(crate) fn new(first: Vec<DirectoryEntry>, recurse: bool, children: ChildrenFn) -> Self {
        Self {
            children,
            recurse,
            stack: vec![first.into_iter()],
        }
    }
}

impl Iterator for Walker {
    type Item = Result<DirectoryEntry, OmniError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let Some(entry) = top.next() else {
                self.stack.pop();
                continue;
            };
            if self.recurse && entry.is_dir && !entry.is_error() {
                match (self.children)(&entry.locator) {
                    Ok(kids) => self.stack.push(kids.into_iter()),
                    Err(e) => {
                        // One synthetic entry stands in for the whole branch.
                        let failed = DirectoryEntry::failed(entry.locator.clone(), e);
                        self.stack.push(vec![failed].into_iter());
                    }
                }
            }
            return Some(Ok(entry));
        }
    }
}

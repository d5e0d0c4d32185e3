//! Core value types produced by backend operations.

use std::time::SystemTime;

use crate::Locator;

/// Options controlling a directory listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Recurse into subdirectories (depth-first, pre-order).
    pub recurse: bool,
    /// Resolve extended attributes (owner/group names, timestamps,
    /// permissions, symlink target).
    pub extended: bool,
}

impl ListOptions {
    /// Shallow listing, no extended attributes.
    pub fn shallow() -> Self {
        Self::default()
    }

    /// Recursive listing.
    pub fn recursive() -> Self {
        Self {
            recurse: true,
            extended: false,
        }
    }

    /// Request extended attributes.
    pub fn with_extended(mut self) -> Self {
        self.extended = true;
        self
    }
}

/// One entry produced by `stat` or `list`.
///
/// Directory entries carry a trailing `/` in their locator and no `size`.
/// Extended fields are populated only when requested. A failed subtree in a
/// recursive listing is represented by an entry whose `error` field is set
/// in place of attributes, so one inaccessible branch does not abort the
/// whole traversal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectoryEntry {
    /// Full address of the entry (trailing `/` for directories).
    pub locator: Locator,
    /// `true` for directories.
    pub is_dir: bool,
    /// Size in bytes; absent for directories.
    pub size: Option<u64>,
    /// Last access time (extended).
    #[cfg_attr(feature = "serde", serde(with = "opt_system_time_serde"))]
    pub accessed: Option<SystemTime>,
    /// Last modification time (extended).
    #[cfg_attr(feature = "serde", serde(with = "opt_system_time_serde"))]
    pub modified: Option<SystemTime>,
    /// Owner name, or the numeric uid when unresolvable (extended).
    pub owner: Option<String>,
    /// Group name, or the numeric gid when unresolvable (extended).
    pub group: Option<String>,
    /// Permission string, e.g. `"rwxr-xr-x"` (extended).
    pub permissions: Option<String>,
    /// Symlink target; only set when the entry is a symbolic link (extended).
    pub symlink_target: Option<String>,
    /// Listing failure for this branch, in place of attributes.
    pub error: Option<String>,
}

impl DirectoryEntry {
    /// A plain file entry with no extended attributes.
    pub fn file(locator: Locator, size: u64) -> Self {
        Self {
            locator,
            is_dir: false,
            size: Some(size),
            accessed: None,
            modified: None,
            owner: None,
            group: None,
            permissions: None,
            symlink_target: None,
            error: None,
        }
    }

    /// A plain directory entry with no extended attributes.
    pub fn dir(locator: Locator) -> Self {
        Self {
            locator,
            is_dir: true,
            size: None,
            accessed: None,
            modified: None,
            owner: None,
            group: None,
            permissions: None,
            symlink_target: None,
            error: None,
        }
    }

    /// A synthetic entry representing one branch's listing failure.
    pub fn failed(locator: Locator, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::dir(locator)
        }
    }

    /// `true` if this entry stands for a failed branch.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Format the low nine permission bits as `rwxrwxrwx`.
pub fn mode_string(mode: u32) -> String {
    let mut s = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

/// Serde support for optional SystemTime (when the serde feature is enabled).
#[cfg(feature = "serde")]
mod opt_system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time.map(|t| {
            let d = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
            (d.as_secs(), d.subsec_nanos())
        })
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts: Option<(u64, u32)> = Deserialize::deserialize(deserializer)?;
        Ok(parts.map(|(secs, nanos)| UNIX_EPOCH + Duration::new(secs, nanos)))
    }
}

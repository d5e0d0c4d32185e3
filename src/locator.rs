//! Scheme-qualified locators for storage objects.
//!
//! A [`Locator`] is the uniform address every operation dispatches on:
//! `scheme://[user@]host[:port]/absolute/path`. It is a pure value type:
//! parsing performs no I/O and a parsed locator is never mutated.
//!
//! Credentials beyond the user name are never embedded in the locator; they
//! come from a [`Config`](crate::Config) scope resolved by `scheme://host`
//! prefix.

use std::fmt;

use crate::OmniError;

/// Immutable scheme-qualified address of a storage object or directory.
///
/// Invariants (enforced by [`Locator::parse`]):
/// - the scheme is present and lower-case
/// - the path is absolute within the backend's namespace
///
/// A trailing `/` on the path marks a directory; [`Locator::child`] preserves
/// this convention so listings produced by different backends agree.
///
/// # Examples
///
/// ```rust
/// use omnifs::Locator;
///
/// let loc = Locator::parse("sftp://deploy@build-host:2022/srv/artifacts/")?;
/// assert_eq!(loc.scheme(), "sftp");
/// assert_eq!(loc.user(), Some("deploy"));
/// assert_eq!(loc.host(), Some("build-host"));
/// assert_eq!(loc.port(), Some(2022));
/// assert_eq!(loc.path(), "/srv/artifacts/");
/// assert_eq!(loc.to_string(), "sftp://deploy@build-host:2022/srv/artifacts/");
/// # Ok::<(), omnifs::OmniError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Locator {
    scheme: String,
    user: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
}

impl Locator {
    /// Parse an address string into a locator.
    ///
    /// # Errors
    ///
    /// [`OmniError::InvalidLocator`] if the input has no scheme, no absolute
    /// path, or is otherwise malformed.
    pub fn parse(input: &str) -> Result<Self, OmniError> {
        let url = url::Url::parse(input).map_err(|e| OmniError::InvalidLocator {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        if url.cannot_be_a_base() {
            return Err(OmniError::InvalidLocator {
                input: input.to_string(),
                reason: "missing '//' after scheme".to_string(),
            });
        }

        let path = url.path().to_string();
        if !path.starts_with('/') {
            return Err(OmniError::InvalidLocator {
                input: input.to_string(),
                reason: "path must be absolute".to_string(),
            });
        }

        let user = match url.username() {
            "" => None,
            u => Some(u.to_string()),
        };
        let host = url.host_str().filter(|h| !h.is_empty()).map(str::to_string);

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            user,
            host,
            port: url.port(),
            path,
        })
    }

    /// The lower-case scheme, e.g. `"sftp"`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The user name embedded in the locator, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The host, if the scheme addresses one.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The absolute path within the backend's namespace.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `true` if the path carries a trailing `/` (directory convention).
    pub fn is_dir_path(&self) -> bool {
        self.path.ends_with('/')
    }

    /// The final path segment, without any trailing `/`.
    pub fn name(&self) -> &str {
        self.path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }

    /// A copy of this locator with a different path.
    ///
    /// # Errors
    ///
    /// [`OmniError::InvalidLocator`] if `path` is not absolute.
    pub fn with_path(&self, path: &str) -> Result<Self, OmniError> {
        if !path.starts_with('/') {
            return Err(OmniError::InvalidLocator {
                input: path.to_string(),
                reason: "path must be absolute".to_string(),
            });
        }
        let mut loc = self.clone();
        loc.path = path.to_string();
        Ok(loc)
    }

    /// Address of a child entry, treating this locator as a directory.
    ///
    /// Directory children get a trailing `/` so that directory-ness survives
    /// in the locator itself.
    pub fn child(&self, name: &str, is_dir: bool) -> Self {
        let mut path = self.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(name);
        if is_dir {
            path.push('/');
        }
        let mut loc = self.clone();
        loc.path = path;
        loc
    }

    /// `scheme://host` prefix used to look up a credential scope.
    pub fn scope_key(&self) -> String {
        match &self.host {
            Some(h) => format!("{}://{}", self.scheme, h),
            None => format!("{}://", self.scheme),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        if let Some(host) = &self.host {
            write!(f, "{host}")?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}", self.path)
    }
}

impl std::str::FromStr for Locator {
    type Err = OmniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

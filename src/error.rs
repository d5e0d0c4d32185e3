//! Error types for the omnifs storage abstraction.

/// Error type for all omnifs operations.
///
/// Every variant that concerns a storage object carries the locator text so
/// top-level callers can surface a single descriptive message. Uses
/// `#[non_exhaustive]` for forward compatibility.
///
/// # Examples
///
/// ```rust
/// use omnifs::OmniError;
///
/// let err = OmniError::NotFound { locator: "sftp://host/missing".into() };
/// assert_eq!(err.to_string(), "not found: sftp://host/missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OmniError {
    /// Missing or malformed credentials, key material, or configuration.
    #[error("configuration error: {reason}")]
    Config {
        /// What was missing or malformed.
        reason: String,
    },

    /// The address string could not be parsed into a locator.
    #[error("invalid locator: {input} ({reason})")]
    InvalidLocator {
        /// The input that failed to parse.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No backend is registered for the locator's scheme.
    #[error("no backend registered for scheme: {scheme}")]
    UnknownScheme {
        /// The unrecognized scheme.
        scheme: String,
    },

    /// The storage object does not exist.
    ///
    /// This is the only condition `exists` treats as a normal `false`;
    /// every other failure propagates.
    #[error("not found: {locator}")]
    NotFound {
        /// The locator that was not found.
        locator: String,
    },

    /// Expected a file but found something else.
    #[error("not a file: {locator}")]
    NotAFile {
        /// The locator that is not a file.
        locator: String,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {locator}")]
    NotADirectory {
        /// The locator that is not a directory.
        locator: String,
    },

    /// The target already exists when it should not.
    #[error("{operation}: already exists: {locator}")]
    AlreadyExists {
        /// The locator that already exists.
        locator: String,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Connection, authentication, or channel failure against a remote host.
    #[error("{operation} failed for {locator}: {detail}")]
    Transport {
        /// The operation that failed.
        operation: &'static str,
        /// The locator involved.
        locator: String,
        /// Description of the underlying transport failure.
        detail: String,
    },

    /// I/O error with operation and locator context.
    #[error("{operation} failed for {locator}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The locator involved.
        locator: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl OmniError {
    /// Wrap an I/O error with operation and locator context.
    pub fn io(operation: &'static str, locator: impl Into<String>, source: std::io::Error) -> Self {
        OmniError::Io {
            operation,
            locator: locator.into(),
            source,
        }
    }

    /// Build a transport error from any displayable failure.
    pub fn transport(
        operation: &'static str,
        locator: impl Into<String>,
        detail: impl std::fmt::Display,
    ) -> Self {
        OmniError::Transport {
            operation,
            locator: locator.into(),
            detail: detail.to_string(),
        }
    }

    /// Build a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        OmniError::Config {
            reason: reason.into(),
        }
    }

    /// `true` if this error means the object simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OmniError::NotFound { .. })
    }
}

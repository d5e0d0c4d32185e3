//! Credential scopes and key-material normalization.
//!
//! Configuration is explicit: a [`Config`] is built by the caller and handed
//! to backend construction. There is no ambient process-wide state. Scopes
//! are keyed by a `scheme://host` prefix; the longest matching prefix wins,
//! and a user name embedded in the locator overrides the scope's.

use crate::{Locator, OmniError};

/// Credentials for one scope.
///
/// Invariants checked by [`Credentials::validate_remote`] (remote backends
/// only; local backends ignore credentials entirely):
/// - `user` and `fingerprint` are present
/// - at least one of `password` / `private_key` is present
/// - `passphrase` is only meaningful alongside `private_key`
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// User identity to authenticate as.
    pub user: Option<String>,
    /// Expected host-key fingerprint (hex, SHA-256 or MD5 of the host key).
    pub fingerprint: Option<String>,
    /// Password, if password authentication is used.
    pub password: Option<String>,
    /// PEM private key material, if key authentication is used.
    pub private_key: Option<String>,
    /// Passphrase protecting `private_key`.
    pub passphrase: Option<String>,
}

impl Credentials {
    /// Check the invariants required to open an authenticated remote session.
    ///
    /// # Errors
    ///
    /// [`OmniError::Config`] naming the first missing or inconsistent field.
    pub fn validate_remote(&self) -> Result<(), OmniError> {
        if self.user.as_deref().unwrap_or("").is_empty() {
            return Err(OmniError::config("missing credential field: user"));
        }
        if self.fingerprint.as_deref().unwrap_or("").is_empty() {
            return Err(OmniError::config("missing credential field: fingerprint"));
        }
        if self.password.is_none() && self.private_key.is_none() {
            return Err(OmniError::config(
                "missing credential field: one of password or private-key is required",
            ));
        }
        if self.passphrase.is_some() && self.private_key.is_none() {
            return Err(OmniError::config(
                "private-key passphrase supplied without a private-key",
            ));
        }
        Ok(())
    }
}

/// Explicit configuration passed into backend construction.
///
/// # Examples
///
/// ```rust
/// use omnifs::{Config, Credentials, Locator};
///
/// let mut config = Config::new();
/// config.add_scope(
///     "sftp://example.com",
///     Credentials {
///         user: Some("deploy".into()),
///         password: Some("s3cret".into()),
///         fingerprint: Some("aa:bb".into()),
///         ..Default::default()
///     },
/// );
///
/// let loc = Locator::parse("sftp://example.com/data")?;
/// let creds = config.resolve(&loc);
/// assert_eq!(creds.user.as_deref(), Some("deploy"));
/// # Ok::<(), omnifs::OmniError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    scopes: Vec<(String, Credentials)>,
}

impl Config {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials for a `scheme://host` prefix.
    ///
    /// Later additions with the same prefix replace earlier ones.
    pub fn add_scope(&mut self, prefix: impl Into<String>, creds: Credentials) -> &mut Self {
        let prefix = prefix.into();
        self.scopes.retain(|(p, _)| *p != prefix);
        self.scopes.push((prefix, creds));
        self
    }

    /// Resolve credentials for a locator.
    ///
    /// Picks the longest registered prefix matching the locator's
    /// `scheme://host`, then overlays the user embedded in the locator (if
    /// any). An unmatched locator yields empty credentials, which fail
    /// [`Credentials::validate_remote`] later with a descriptive message.
    pub fn resolve(&self, locator: &Locator) -> Credentials {
        let key = locator.scope_key();
        let mut creds = self
            .scopes
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, c)| c.clone())
            .unwrap_or_default();
        if let Some(user) = locator.user() {
            creds.user = Some(user.to_string());
        }
        creds
    }
}

/// Width of re-wrapped PEM body lines.
const PEM_LINE_WIDTH: usize = 64;

/// Normalize private-key material that may have lost its line breaks.
///
/// Keys carried as flat configuration values commonly arrive as one physical
/// line with the original newlines replaced by spaces. Keys that already
/// contain real line breaks pass through trimmed. Otherwise the body between
/// the `-----BEGIN …-----` and `-----END …-----` markers is stripped of
/// whitespace and re-wrapped at 64 columns.
///
/// # Errors
///
/// [`OmniError::Config`] if the input has neither line breaks nor
/// recognizable header/footer markers.
pub fn normalize_private_key(raw: &str) -> Result<String, OmniError> {
    let raw = raw.trim();
    if raw.contains('\n') {
        return Ok(raw.to_string());
    }

    let header_start = raw
        .find("-----BEGIN")
        .ok_or_else(|| OmniError::config("private-key has no BEGIN marker and no line breaks"))?;
    let header_end = raw[header_start + 10..]
        .find("-----")
        .map(|i| header_start + 10 + i + 5)
        .ok_or_else(|| OmniError::config("private-key BEGIN marker is not terminated"))?;

    let footer_start = raw
        .rfind("-----END")
        .filter(|&i| i >= header_end)
        .ok_or_else(|| OmniError::config("private-key has no END marker"))?;

    let header = &raw[header_start..header_end];
    let footer = &raw[footer_start..];
    let body: String = raw[header_end..footer_start]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(OmniError::config("private-key body is empty"));
    }

    let mut out = String::with_capacity(raw.len() + body.len() / PEM_LINE_WIDTH + 2);
    out.push_str(header);
    for chunk in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        out.push('\n');
        // body was built from str::chars, so chunks stay ASCII base64
        out.push_str(std::str::from_utf8(chunk).map_err(|_| {
            OmniError::config("private-key body contains non-ASCII characters")
        })?);
    }
    out.push('\n');
    out.push_str(footer);
    Ok(out)
}

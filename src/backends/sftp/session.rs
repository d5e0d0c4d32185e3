//! Remote session and channel management for the SFTP backend.
//!
//! One [`RemoteSession`] bundles an authenticated transport session and the
//! file-transfer channel multiplexed over it. A session is scoped to one
//! backend operation (or one lazily consumed listing), is never shared
//! between concurrent operations, and reaches closed exactly once on every
//! exit path. The file-transfer channel drops before the session (field
//! order), so teardown order is always channel first.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Credentials, normalize_private_key};
use crate::{Locator, OmniError};

/// Default bound on session establishment and channel opening.
///
/// Steady-state transfers have no enforced deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// An authenticated transport session plus its file-transfer channel.
pub(crate) struct RemoteSession {
    // Declared before `session` so the channel drops first.
    sftp: ssh2::Sftp,
    session: ssh2::Session,
    closed: AtomicBool,
    host: String,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("host", &self.host)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl RemoteSession {
    /// Establish a session: connect within `timeout`, verify the host key
    /// against the configured fingerprint, authenticate, and open the SFTP
    /// channel. Anything opened before a failure is torn down before the
    /// error propagates (transport objects close on drop).
    pub(crate) fn connect(
        locator: &Locator,
        creds: &Credentials,
        timeout: Duration,
    ) -> Result<Self, OmniError> {
        creds.validate_remote()?;
        let host = locator
            .host()
            .ok_or_else(|| OmniError::config(format!("locator has no host: {locator}")))?
            .to_string();
        let port = locator.port().unwrap_or(22);
        let user = creds.user.as_deref().unwrap_or_default();

        debug!(host = %host, port, user, "opening session");

        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| OmniError::transport("connect", locator.to_string(), e))?
            .next()
            .ok_or_else(|| {
                OmniError::transport("connect", locator.to_string(), "host resolved to no address")
            })?;
        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| OmniError::transport("connect", locator.to_string(), e))?;

        let mut session = ssh2::Session::new()
            .map_err(|e| OmniError::transport("connect", locator.to_string(), e))?;
        // Bounds handshake, auth, and channel open; cleared after setup so
        // steady-state transfers keep no deadline.
        session.set_timeout(clamped_millis(timeout));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| OmniError::transport("handshake", locator.to_string(), e))?;

        verify_host_key(&session, creds, locator)?;
        authenticate(&session, user, creds, locator)?;

        let sftp = session
            .sftp()
            .map_err(|e| OmniError::transport("channel open", locator.to_string(), e))?;
        session.set_timeout(0);

        Ok(Self {
            sftp,
            session,
            closed: AtomicBool::new(false),
            host,
        })
    }

    /// The file-transfer channel.
    pub(crate) fn sftp(&self) -> &ssh2::Sftp {
        &self.sftp
    }

    /// Run a command on the remote host and return its stdout.
    ///
    /// # Errors
    ///
    /// [`OmniError::Transport`] on channel failure or non-zero exit.
    pub(crate) fn exec(&self, command: &str) -> Result<String, OmniError> {
        let target = format!("sftp://{}/", self.host);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| OmniError::transport("exec", target.clone(), e))?;
        channel
            .exec(command)
            .map_err(|e| OmniError::transport("exec", target.clone(), e))?;
        let mut out = String::new();
        channel
            .read_to_string(&mut out)
            .map_err(|e| OmniError::transport("exec", target.clone(), e))?;
        channel
            .wait_close()
            .map_err(|e| OmniError::transport("exec", target.clone(), e))?;
        let status = channel
            .exit_status()
            .map_err(|e| OmniError::transport("exec", target.clone(), e))?;
        if status != 0 {
            return Err(OmniError::transport(
                "exec",
                target,
                format!("`{command}` exited with status {status}"),
            ));
        }
        Ok(out)
    }

    /// Close the session. Idempotent; later calls are no-ops.
    ///
    /// Failures during teardown are logged, never raised, so they cannot
    /// mask an original operation error.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(host = %self.host, "closing session");
        if let Err(e) = self.session.disconnect(None, "session closed", None) {
            warn!(host = %self.host, error = %e, "error disconnecting session");
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Compare the server's host-key hash against the configured fingerprint.
///
/// Accepts hex with or without `:` separators, case-insensitive, for either
/// the SHA-256 or the MD5 hash of the host key.
fn verify_host_key(
    session: &ssh2::Session,
    creds: &Credentials,
    locator: &Locator,
) -> Result<(), OmniError> {
    let expected = creds
        .fingerprint
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace(':', "");

    let matches = [ssh2::HashType::Sha256, ssh2::HashType::Md5]
        .into_iter()
        .filter_map(|ht| session.host_key_hash(ht))
        .any(|hash| hex::encode(hash) == expected);
    if !matches {
        return Err(OmniError::transport(
            "handshake",
            locator.to_string(),
            "host key does not match the configured fingerprint",
        ));
    }
    Ok(())
}

/// Authenticate with the private key if one is configured, else the password.
fn authenticate(
    session: &ssh2::Session,
    user: &str,
    creds: &Credentials,
    locator: &Locator,
) -> Result<(), OmniError> {
    if let Some(raw_key) = creds.private_key.as_deref() {
        let key = normalize_private_key(raw_key)?;
        session
            .userauth_pubkey_memory(user, None, &key, creds.passphrase.as_deref())
            .map_err(|e| OmniError::transport("authenticate", locator.to_string(), e))?;
    } else if let Some(password) = creds.password.as_deref() {
        session
            .userauth_password(user, password)
            .map_err(|e| OmniError::transport("authenticate", locator.to_string(), e))?;
    }
    if !session.authenticated() {
        return Err(OmniError::transport(
            "authenticate",
            locator.to_string(),
            "authentication rejected",
        ));
    }
    Ok(())
}

/// Millisecond timeout for the transport API, saturating at `u32::MAX`.
fn clamped_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Map an SFTP-level failure, turning "no such file" into [`OmniError::NotFound`].
pub(crate) fn map_sftp(operation: &'static str, locator: &Locator, e: ssh2::Error) -> OmniError {
    if is_no_such_file(&e) {
        OmniError::NotFound {
            locator: locator.to_string(),
        }
    } else {
        OmniError::transport(operation, locator.to_string(), e)
    }
}

/// SSH_FX_NO_SUCH_FILE.
pub(crate) fn is_no_such_file(e: &ssh2::Error) -> bool {
    matches!(e.code(), ssh2::ErrorCode::SFTP(2))
}

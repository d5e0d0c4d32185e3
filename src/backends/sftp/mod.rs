//! Remote backend over an authenticated SFTP channel (`sftp://`).
//!
//! Each operation opens its own short-lived session/channel pair, performs
//! one remote call, and closes deterministically through the
//! [`with_session`](SftpBackend::with_session) choke point. Streams returned
//! to the caller own their session and release it on drop.

mod ident;
mod list;
mod session;

use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::backend::{EntryIter, FsBackend};
use crate::cleanup::Finalizer;
use crate::config::Credentials;
use crate::types::mode_string;
use crate::{Config, DirectoryEntry, ListOptions, Locator, OmniError};

use ident::IdentityMaps;
use session::{RemoteSession, is_no_such_file, map_sftp};

pub use session::DEFAULT_CONNECT_TIMEOUT;

/// Driver for `sftp://` locators.
///
/// Credentials come from the [`Config`] scope matching the locator's
/// `sftp://host` prefix; see [`Credentials`] for what a remote scope must
/// contain.
pub struct SftpBackend {
    config: Config,
    timeout: Duration,
}

impl SftpBackend {
    /// Backend with the default connect timeout.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the session-establishment timeout.
    ///
    /// The bound covers connect, handshake, authentication, and channel
    /// open; steady-state transfer is unbounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn open_session(&self, locator: &Locator) -> Result<RemoteSession, OmniError> {
        let creds = self.config.resolve(locator);
        RemoteSession::connect(locator, &creds, self.timeout)
    }

    /// Run one operation against a fresh session/channel pair, guaranteeing
    /// teardown on both normal return and error. Every remote operation goes
    /// through here (streams and listings hold their session via a
    /// [`Finalizer`] instead, since they outlive the call).
    fn with_session<T>(
        &self,
        locator: &Locator,
        f: impl FnOnce(&RemoteSession) -> Result<T, OmniError>,
    ) -> Result<T, OmniError> {
        let session = self.open_session(locator)?;
        let result = f(&session);
        session.close();
        result
    }
}

impl FsBackend for SftpBackend {
    fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError> {
        let session = self.open_session(locator)?;
        let path = Path::new(locator.path());

        let opened = (|| {
            let st = session
                .sftp()
                .lstat(path)
                .map_err(|e| map_sftp("open_read", locator, e))?;
            if st.is_dir() {
                return Err(OmniError::NotAFile {
                    locator: locator.to_string(),
                });
            }
            session
                .sftp()
                .open(path)
                .map_err(|e| map_sftp("open_read", locator, e))
        })();

        match opened {
            Ok(file) => Ok(Box::new(RemoteReader {
                file,
                // The file handle stays valid while the session lives; the
                // finalizer owns the session and closes it after the handle
                // drops (field order).
                _cleanup: Finalizer::new(move || session.close()),
            })),
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError> {
        let creds = self.config.resolve(locator);
        // Fail fast on bad credentials; the session itself opens at upload time.
        creds.validate_remote()?;
        let spool = NamedTempFile::new()
            .map_err(|e| OmniError::io("open_write", locator.to_string(), e))?;
        debug!(locator = %locator, spool = %spool.path().display(), "spooling upload");
        Ok(Box::new(SpooledWriter {
            encoder: Some(GzEncoder::new(spool, Compression::fast())),
            locator: locator.clone(),
            creds,
            timeout: self.timeout,
            uploaded: false,
        }))
    }

    fn stat_opt(
        &self,
        locator: &Locator,
        extended: bool,
    ) -> Result<Option<DirectoryEntry>, OmniError> {
        self.with_session(locator, |session| {
            match session.sftp().lstat(Path::new(locator.path())) {
                Ok(st) => {
                    let ident = extended.then(|| IdentityMaps::fetch(session));
                    let entry_locator = if st.is_dir() && !locator.is_dir_path() {
                        locator.with_path(&format!("{}/", locator.path()))?
                    } else {
                        locator.clone()
                    };
                    Ok(Some(entry_from_stat(
                        session,
                        entry_locator,
                        &st,
                        extended,
                        ident.as_ref(),
                    )))
                }
                Err(e) if is_no_such_file(&e) => Ok(None),
                Err(e) => Err(OmniError::transport("stat", locator.to_string(), e)),
            }
        })
    }

    fn delete(&self, locator: &Locator) -> Result<(), OmniError> {
        debug!(locator = %locator, "delete");
        self.with_session(locator, |session| {
            let path = Path::new(locator.path());
            let st = session
                .sftp()
                .lstat(path)
                .map_err(|e| map_sftp("delete", locator, e))?;
            if st.is_dir() {
                session
                    .sftp()
                    .rmdir(path)
                    .map_err(|e| map_sftp("delete", locator, e))
            } else {
                session
                    .sftp()
                    .unlink(path)
                    .map_err(|e| map_sftp("delete", locator, e))
            }
        })
    }

    fn mkdir(&self, locator: &Locator) -> Result<(), OmniError> {
        debug!(locator = %locator, "mkdir");
        self.with_session(locator, |session| {
            let path = Path::new(locator.path());
            if session.sftp().lstat(path).is_ok() {
                return Err(OmniError::AlreadyExists {
                    locator: locator.to_string(),
                    operation: "mkdir",
                });
            }
            session
                .sftp()
                .mkdir(path, 0o755)
                .map_err(|e| map_sftp("mkdir", locator, e))
        })
    }

    fn list(&self, locator: &Locator, opts: ListOptions) -> Result<EntryIter, OmniError> {
        let session: list::SharedSession = Arc::new(Mutex::new(self.open_session(locator)?));
        match list::remote_listing(session.clone(), locator, opts) {
            Ok(iter) => Ok(iter),
            Err(e) => {
                list::close_shared(&session);
                Err(e)
            }
        }
    }
}

/// Read stream owning the session that backs it.
struct RemoteReader {
    // Dropped before the finalizer closes the session.
    file: ssh2::File,
    _cleanup: Finalizer,
}

impl Read for RemoteReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

/// Write stream implementing the spooled-upload workaround.
///
/// The transport misbehaves under concurrent streamed uploads, so caller
/// bytes go into a gzip-compressed local temp file first. `flush` is the
/// commit point: it finishes the spool, pushes it over a fresh session, and
/// reports any delivery failure to the caller. Dropping an unflushed writer
/// still uploads as a backstop, but can only log a failure. The temp file is
/// removed regardless of upload outcome, and the remote object is never
/// partially visible before the upload finishes.
struct SpooledWriter {
    encoder: Option<GzEncoder<NamedTempFile>>,
    locator: Locator,
    creds: Credentials,
    timeout: Duration,
    uploaded: bool,
}

impl SpooledWriter {
    fn upload(&mut self) -> Result<(), OmniError> {
        if self.uploaded {
            return Ok(());
        }
        self.uploaded = true;
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };

        // `spool` drops (and deletes) on every path out of this function.
        let spool = encoder
            .finish()
            .map_err(|e| OmniError::io("open_write", self.locator.to_string(), e))?;
        let reopened = spool
            .reopen()
            .map_err(|e| OmniError::io("open_write", self.locator.to_string(), e))?;
        let mut decoder = GzDecoder::new(BufReader::new(reopened));

        let session = RemoteSession::connect(&self.locator, &self.creds, self.timeout)?;
        let result = (|| {
            let mut remote = session
                .sftp()
                .create(Path::new(self.locator.path()))
                .map_err(|e| map_sftp("open_write", &self.locator, e))?;
            let n = std::io::copy(&mut decoder, &mut remote)
                .map_err(|e| OmniError::io("open_write", self.locator.to_string(), e))?;
            debug!(locator = %self.locator, bytes = n, "upload complete");
            Ok(())
        })();
        session.close();
        result
    }
}

impl Write for SpooledWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.write(buf),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write after upload",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.upload().map_err(std::io::Error::other)
    }
}

impl Drop for SpooledWriter {
    fn drop(&mut self) {
        if let Err(e) = self.upload() {
            warn!(locator = %self.locator, error = %e, "spooled upload failed");
        }
    }
}

/// Build an entry from SFTP attributes. `locator` already carries the
/// directory trailing slash; `ident` is present only for extended requests.
fn entry_from_stat(
    session: &RemoteSession,
    locator: Locator,
    st: &ssh2::FileStat,
    extended: bool,
    ident: Option<&IdentityMaps>,
) -> DirectoryEntry {
    let mut entry = if st.is_dir() {
        DirectoryEntry::dir(locator)
    } else {
        DirectoryEntry::file(locator, st.size.unwrap_or(0))
    };
    if extended {
        entry.accessed = st.atime.map(|s| UNIX_EPOCH + Duration::from_secs(s));
        entry.modified = st.mtime.map(|s| UNIX_EPOCH + Duration::from_secs(s));
        if let Some(ident) = ident {
            entry.owner = st.uid.map(|uid| ident.owner(uid));
            entry.group = st.gid.map(|gid| ident.group(gid));
        }
        entry.permissions = st.perm.map(mode_string);
        if st.file_type().is_symlink() {
            entry.symlink_target = session
                .sftp()
                .readlink(Path::new(entry.locator.path()))
                .ok()
                .map(|t| t.to_string_lossy().into_owned());
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> Config {
        let mut config = Config::new();
        config.add_scope(
            "sftp://127.0.0.1",
            Credentials {
                user: Some("u".into()),
                fingerprint: Some("aa:bb".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn open_write_rejects_unconfigured_hosts_without_spooling() {
        let backend = SftpBackend::new(Config::new());
        let loc = Locator::parse("sftp://unconfigured/x").unwrap();
        let err = backend.open_write(&loc).err().unwrap();
        assert!(matches!(err, OmniError::Config { .. }));
    }

    #[test]
    fn open_write_spools_locally_before_any_network_use() {
        // Credentials are valid, so the writer opens even though nothing
        // listens on the port; writes touch only the local spool.
        let backend =
            SftpBackend::new(remote_config()).with_timeout(Duration::from_millis(200));
        let loc = Locator::parse("sftp://127.0.0.1:1/out.bin").unwrap();
        let mut w = backend.open_write(&loc).unwrap();
        w.write_all(b"spooled").unwrap();
    }

    #[test]
    fn flush_reports_upload_failure_to_the_caller() {
        let backend =
            SftpBackend::new(remote_config()).with_timeout(Duration::from_millis(200));
        let loc = Locator::parse("sftp://127.0.0.1:1/out.bin").unwrap();
        let mut w = backend.open_write(&loc).unwrap();
        w.write_all(b"doomed").unwrap();
        let err = w.flush().unwrap_err();
        assert!(err.to_string().contains("sftp://127.0.0.1:1/out.bin"));
    }

    #[test]
    fn writes_after_the_commit_are_rejected() {
        let backend =
            SftpBackend::new(remote_config()).with_timeout(Duration::from_millis(200));
        let loc = Locator::parse("sftp://127.0.0.1:1/out.bin").unwrap();
        let mut w = backend.open_write(&loc).unwrap();
        w.write_all(b"once").unwrap();
        let _ = w.flush();
        let err = w.write_all(b"again").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn timeout_is_configurable() {
        let backend = SftpBackend::new(remote_config()).with_timeout(Duration::from_millis(50));
        assert_eq!(backend.timeout, Duration::from_millis(50));
    }

    #[test]
    fn stat_on_unconfigured_host_is_a_config_error_not_false() {
        let backend = SftpBackend::new(Config::new());
        let loc = Locator::parse("sftp://127.0.0.1:1/x").unwrap();
        // Credential validation fails before any network use; `exists` must
        // propagate it rather than report absence.
        assert!(backend.exists(&loc).is_err());
    }
}

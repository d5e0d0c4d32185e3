//! # omnifs
//!
//! Uniform file operations over heterogeneous storage backends, addressed
//! through scheme-qualified locators (`scheme://host[:port]/path`).
//!
//! One [`Registry`] dispatches every operation (read, write, copy, delete,
//! mkdir, existence check, stat, directory listing) to the backend driver
//! registered for the locator's scheme. Local disk (`file://`), an
//! in-process bundle (`mem://`), and remote hosts over authenticated SFTP
//! (`sftp://`) ship built in; the design generalizes to object stores and
//! distributed filesystems by implementing [`FsBackend`] and registering it.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use omnifs::{Config, Credentials, ListOptions, Locator, Registry};
//!
//! let mut config = Config::new();
//! config.add_scope(
//!     "sftp://files.example.com",
//!     Credentials {
//!         user: Some("deploy".into()),
//!         fingerprint: Some("2f:ca:...".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     },
//! );
//! let registry = Registry::with_defaults(config);
//!
//! let src = Locator::parse("file:///var/data/report.csv")?;
//! let dst = Locator::parse("sftp://files.example.com/inbox/report.csv")?;
//! registry.copy(&src, &dst)?;
//!
//! let inbox = Locator::parse("sftp://files.example.com/inbox/")?;
//! for entry in registry.list(&inbox, ListOptions::recursive())? {
//!     println!("{}", entry?.locator);
//! }
//! # Ok::<(), omnifs::OmniError>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Locator`] | Scheme-qualified address; pure value type, no I/O |
//! | [`Registry`] | Scheme → backend dispatch, the single entry point |
//! | [`FsBackend`] | Driver contract every backend implements |
//! | [`DirectoryEntry`] | Stat/listing result, with optional extended attributes |
//! | [`Config`] / [`Credentials`] | Explicit credential scopes (no ambient state) |
//! | [`Finalizer`] | Exactly-once scoped cleanup with a drop backstop |
//! | [`CountingReader`] / [`DigestWriter`] / … | Transparent stream decorators |
//! | [`OmniError`] | Error taxonomy; messages always name the locator |
//!
//! ---
//!
//! ## Resource Model
//!
//! Operations are synchronous and blocking. Each remote operation opens its
//! own session/channel pair, uses it, and closes it deterministically:
//! channel before session, exactly once, on success and failure alike.
//! Streams and lazy listings own the session backing them and release it on
//! drop, with a [`Finalizer`] as the backstop when the normal close path is
//! skipped. Session establishment is bounded by a connect timeout (10 s by
//! default); steady-state transfer is not.
//!
//! ## Thread Safety
//!
//! Backends take `&self` and are `Send + Sync`; share a [`Registry`] across
//! threads freely. A session/channel pair is never shared between
//! concurrent operations. Decorator byte counters are atomic and readable
//! concurrently with ongoing I/O, though a single stream is not meant to be
//! read from multiple threads at once.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Enable serialization for [`DirectoryEntry`] and [`Locator`] |

// Private modules
mod backend;
mod backends;
mod cleanup;
mod config;
mod error;
mod locator;
mod registry;
mod stream;
mod types;
mod walk;

// Public re-exports - error type
pub use error::OmniError;

// Public re-exports - addressing and configuration
pub use config::{Config, Credentials, normalize_private_key};
pub use locator::Locator;

// Public re-exports - driver contract and dispatch
pub use backend::{EntryIter, FsBackend};
pub use registry::Registry;

// Public re-exports - value types
pub use types::{DirectoryEntry, ListOptions, mode_string};

// Public re-exports - stream decorators and scoped cleanup
pub use cleanup::Finalizer;
pub use stream::{
    ByteCounter, CountingReader, CountingWriter, DigestReader, DigestWriter, NullSink,
};

// Public re-exports - built-in backends
pub use backends::{DEFAULT_CONNECT_TIMEOUT, LocalBackend, MemoryBackend, SftpBackend};

//! Built-in backend drivers.

mod local;
mod memory;
mod sftp;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use sftp::{DEFAULT_CONNECT_TIMEOUT, SftpBackend};

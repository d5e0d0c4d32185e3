//! Remote-host identity maps for extended listing attributes.
//!
//! Numeric uid/gid values from SFTP attributes are resolved to names by
//! running `getent passwd` and `getent group` on the remote host and parsing
//! the colon-delimited output. The maps are built at most once per traversal;
//! any failure degrades to an empty map, leaving numeric ids in the output
//! rather than failing the listing.

use std::collections::HashMap;

use tracing::warn;

use super::session::RemoteSession;

/// uid -> user name and gid -> group name for one remote host.
#[derive(Debug, Default)]
pub(crate) struct IdentityMaps {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl IdentityMaps {
    /// Query the remote identity databases, degrading to empty maps.
    pub(crate) fn fetch(session: &RemoteSession) -> Self {
        Self {
            users: fetch_map(session, "getent passwd"),
            groups: fetch_map(session, "getent group"),
        }
    }

    /// Owner name for a uid, or the uid itself when unresolvable.
    pub(crate) fn owner(&self, uid: u32) -> String {
        self.users.get(&uid).cloned().unwrap_or_else(|| uid.to_string())
    }

    /// Group name for a gid, or the gid itself when unresolvable.
    pub(crate) fn group(&self, gid: u32) -> String {
        self.groups.get(&gid).cloned().unwrap_or_else(|| gid.to_string())
    }
}

fn fetch_map(session: &RemoteSession, command: &str) -> HashMap<u32, String> {
    match session.exec(command) {
        Ok(output) => parse_ident_lines(&output),
        Err(e) => {
            warn!(command, error = %e, "identity lookup failed, keeping numeric ids");
            HashMap::new()
        }
    }
}

/// Parse `name:x:id:...` lines; unparsable lines are skipped.
pub(crate) fn parse_ident_lines(output: &str) -> HashMap<u32, String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _secret = fields.next()?;
            let id: u32 = fields.next()?.parse().ok()?;
            (!name.is_empty()).then(|| (id, name.to_string()))
        })
        .collect()
}

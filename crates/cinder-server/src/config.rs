//! Server configuration.
//!
//! Populated from CLI flags in `main`; the struct itself stays
//! transport-agnostic so tests can build one directly.

use cinder_persistence::FsyncPolicy;
use serde::Deserialize;

/// Complete server configuration with Redis-flavored defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Number of logical databases.
    pub databases: usize,
    /// Password required by AUTH; empty disables authentication.
    pub password: String,
    /// Whether the append-only file is enabled.
    pub append_only: bool,
    /// AOF path.
    pub aof_filename: String,
    /// AOF fsync policy: always / everysec / no.
    pub aof_fsync: String,
    /// Whether the periodic size check may trigger rewrites.
    pub auto_aof_rewrite: bool,
    /// Growth factor (percent of the post-rewrite baseline).
    pub auto_aof_rewrite_percentage: u64,
    /// Minimum file size (MiB) before auto-rewrite considers acting.
    pub auto_aof_rewrite_min_size: u64,
    /// Roll back transactions on the first failing command.
    pub open_atomic_tx: bool,
    /// Idle seconds before a client connection is closed.
    pub keepalive: u64,
    /// Cluster peers (accepted, currently unused).
    pub peers: Vec<String>,
    /// This node's advertised address (accepted, currently unused).
    pub self_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 6399,
            databases: 16,
            password: String::new(),
            append_only: false,
            aof_filename: "dump.aof".into(),
            aof_fsync: "everysec".into(),
            auto_aof_rewrite: false,
            auto_aof_rewrite_percentage: 100,
            auto_aof_rewrite_min_size: 16,
            open_atomic_tx: false,
            keepalive: 300,
            peers: Vec::new(),
            self_addr: String::new(),
        }
    }
}

impl ServerConfig {
    /// The socket address to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Resolved fsync policy.
    pub fn fsync_policy(&self) -> Result<FsyncPolicy, String> {
        parse_fsync_policy(&self.aof_fsync)
    }

    /// Auto-rewrite size floor in bytes.
    pub fn rewrite_min_bytes(&self) -> u64 {
        self.auto_aof_rewrite_min_size * 1024 * 1024
    }
}

/// Parses an fsync policy name from a CLI string.
pub fn parse_fsync_policy(input: &str) -> Result<FsyncPolicy, String> {
    match input.to_ascii_lowercase().as_str() {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySec),
        "no" => Ok(FsyncPolicy::No),
        _ => Err(format!(
            "unknown fsync policy '{input}'. valid options: always, everysec, no"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.databases, 16);
        assert_eq!(cfg.aof_filename, "dump.aof");
        assert_eq!(cfg.auto_aof_rewrite_percentage, 100);
        assert_eq!(cfg.auto_aof_rewrite_min_size, 16);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:6399");
        assert_eq!(cfg.rewrite_min_bytes(), 16 * 1024 * 1024);
    }

    #[test]
    fn parse_fsync_policies() {
        assert_eq!(parse_fsync_policy("always").unwrap(), FsyncPolicy::Always);
        assert_eq!(parse_fsync_policy("EVERYSEC").unwrap(), FsyncPolicy::EverySec);
        assert_eq!(parse_fsync_policy("no").unwrap(), FsyncPolicy::No);
        assert!(parse_fsync_policy("sometimes").is_err());
    }
}

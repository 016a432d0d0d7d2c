//! Filesystem layout and the optional configuration override file.
//!
//! [`AgentPaths`] is an immutable value assembled once at startup and passed
//! explicitly, rather than looked up through global mutable paths.
//! [`AgentConfig`] follows the `load`/`save` pattern used elsewhere for node
//! configuration, including a `0o600` permission check, for a consumer that
//! wants to relocate the agent root instead of accepting the default under
//! `$HOME`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The filesystem locations the storage core reads and writes. Assembled
/// once at startup and passed explicitly rather than looked up globally.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentPaths {
    /// Root directory holding the agent's database and bins.
    pub root: PathBuf,
}

impl AgentPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The encrypted key-value database file.
    pub fn db_file(&self) -> PathBuf {
        self.root.join("agent.edb")
    }

    /// Directory containing encrypted bin archives, named by bin id.
    pub fn bins_dir(&self) -> PathBuf {
        self.root.join("bins")
    }

    pub fn bin_file(&self, bin_id: &str) -> PathBuf {
        self.bins_dir().join(bin_id)
    }
}

/// Overrides the default agent root. Optional: absent, callers fall back to
/// `AgentPaths::new(default_root)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The agent root directory, overriding the default under `$HOME`.
    pub root: PathBuf,
}

impl AgentConfig {
    /// Loads the configuration file at `path`, refusing to proceed if its
    /// permissions are more permissive than owner-only.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let mut f = File::open(path)?;

        if f.metadata()?.permissions().mode() & 0o077 > 0 {
            return Err(CoreError::UnsafePath(format!(
                "{} has group/world-readable permissions",
                path.display()
            )));
        }

        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Ok(toml::from_str(&s)?)
    }

    /// Saves the configuration to `path`, creating it with `0o600`
    /// permissions.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let s = toml::to_string_pretty(self)?;

        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;

        f.write_all(s.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_paths_derive_db_and_bins_locations() {
        let paths = AgentPaths::new("/home/user/.transcodine");
        assert_eq!(
            paths.db_file(),
            PathBuf::from("/home/user/.transcodine/agent.edb")
        );
        assert_eq!(
            paths.bin_file("abc123"),
            PathBuf::from("/home/user/.transcodine/bins/abc123")
        );
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AgentConfig {
            root: PathBuf::from("/custom/root"),
        };
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn config_rejects_insecure_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AgentConfig {
            root: PathBuf::from("/custom/root"),
        };
        config.save(&path).unwrap();

        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&path, perms).unwrap();

        assert!(matches!(
            AgentConfig::load(&path),
            Err(CoreError::UnsafePath(_))
        ));
    }
}

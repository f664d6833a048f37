use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Explicit configuration for the sync and run-tracking core.
///
/// The home directory holds the local database and the per-run log files;
/// `scheduler_folder` is the folder path inside the external scheduler that
/// reconciliation mirrors. Callers construct this once and pass it in;
/// nothing here is read from a shared config file or the process
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub home: PathBuf,
    pub scheduler_folder: String,
    pub db_name: String,
}

impl AutomationConfig {
    pub fn new(
        home: impl Into<PathBuf>,
        scheduler_folder: impl Into<String>,
        db_name: impl Into<String>,
    ) -> Self {
        Self {
            home: home.into(),
            scheduler_folder: scheduler_folder.into(),
            db_name: db_name.into(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.home.join(&self.db_name)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ProcessDashboard");
        Self {
            home,
            scheduler_folder: "\\Automation".to_string(),
            db_name: "automation.db".to_string(),
        }
    }
}

/// Identity of the machine whose rows a sync or run belongs to.
///
/// Threaded explicitly through reconciliation and run logging; `detect`
/// exists for callers that want the local hostname, but nothing in the core
/// falls back to it implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The local hostname, or `"unknown-host"` when it cannot be read.
    pub fn detect() -> Self {
        let name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_home() {
        let config = AutomationConfig::new("/srv/automation", "\\Jobs", "mirror.db");
        assert_eq!(config.db_path(), PathBuf::from("/srv/automation/mirror.db"));
        assert_eq!(config.logs_dir(), PathBuf::from("/srv/automation/logs"));
    }

    #[test]
    fn detect_returns_nonempty_machine() {
        assert!(!MachineId::detect().as_str().is_empty());
    }

    #[test]
    fn machine_id_displays_raw_name() {
        assert_eq!(MachineId::new("WS-04").to_string(), "WS-04");
    }
}

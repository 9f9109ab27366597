//! [`RuntimeConfig`] – sizing and budgets of a runtime context, read from
//! TOML.
//!
//! Every field is optional in the file; missing fields take the defaults
//! below.  `EDGE_*` environment variables override the file.
//!
//! ```toml
//! min_slot_contract_version = 1
//! fault_queue_capacity = 64
//! fault_queue_reserved = 8
//! fault_handler_budget_us = 1000
//! execute_budget_us = 10000
//! snapshot_max_bytes = 4096
//! event_bus_capacity = 256
//! audit_db_path = "/var/lib/edge/audit.db"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use edge_slots::RegistryLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Lowest slot contract version accepted at registration.
    pub min_slot_contract_version: u32,
    pub fault_queue_capacity: usize,
    /// Queue entries held back for protected faults.
    pub fault_queue_reserved: usize,
    pub fault_handler_budget_us: u64,
    pub execute_budget_us: u64,
    pub snapshot_max_bytes: usize,
    pub event_bus_capacity: usize,
    /// SQLite audit database.  In-memory audit log when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_db_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_slot_contract_version: 1,
            fault_queue_capacity: 64,
            fault_queue_reserved: 8,
            fault_handler_budget_us: 1_000,
            execute_budget_us: 10_000,
            snapshot_max_bytes: 4_096,
            event_bus_capacity: 256,
            audit_db_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, apply `EDGE_*` overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Self = toml::from_str(&raw)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply environment overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `EDGE_AUDIT_DB` | `audit_db_path` |
    /// | `EDGE_FAULT_QUEUE_CAPACITY` | `fault_queue_capacity` |
    /// | `EDGE_EXECUTE_BUDGET_US` | `execute_budget_us` |
    ///
    /// Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EDGE_AUDIT_DB") {
            self.audit_db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("EDGE_FAULT_QUEUE_CAPACITY")
            && let Ok(n) = v.parse()
        {
            self.fault_queue_capacity = n;
        }
        if let Ok(v) = std::env::var("EDGE_EXECUTE_BUDGET_US")
            && let Ok(n) = v.parse()
        {
            self.execute_budget_us = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fault_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "fault_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.fault_queue_reserved >= self.fault_queue_capacity {
            return Err(ConfigError::Invalid(format!(
                "fault_queue_reserved ({}) must be below fault_queue_capacity ({})",
                self.fault_queue_reserved, self.fault_queue_capacity
            )));
        }
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_bus_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            min_version: self.min_slot_contract_version,
            exec_budget_us: self.execute_budget_us,
            fault_budget_us: self.fault_handler_budget_us,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

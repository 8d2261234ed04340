//! # Engine Configuration
//!
//! Settings that change how the engine behaves rather than where it stores
//! data: invoice code prefix and payment acceptance policy, plus the
//! database location and pool sizing used to build a [`DbConfig`].
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     COMANDA_DB_PATH=/var/lib/comanda/comanda.db                        │
//! │     COMANDA_ALLOW_OVERPAYMENT=true                                     │
//! │                                                                         │
//! │  2. TOML Config File (path given by the caller)                        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./comanda.db, prefix FACT, strict payment policy                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # comanda.toml
//! [database]
//! path = "./comanda.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [billing]
//! invoice_prefix = "FACT"
//!
//! [payments]
//! allow_overpayment = false          # true to accept tips above the total
//! allow_payments_on_voided = false
//! ```

use comanda_core::{PaymentPolicy, INVOICE_CODE_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. Created if missing.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Pool size. One connection per concurrently served terminal request.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the write lock before `DbError::Busy`.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./comanda.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// `[billing]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// First segment of every invoice code (`FACT-YYYYMMDD-NNNNN`).
    #[serde(default = "default_invoice_prefix")]
    pub invoice_prefix: String,
}

fn default_invoice_prefix() -> String {
    INVOICE_CODE_PREFIX.to_string()
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            invoice_prefix: default_invoice_prefix(),
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub billing: BillingSettings,

    #[serde(default)]
    pub payments: PaymentPolicy,
}

impl EngineConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// `COMANDA_*` environment overrides and validates the result.
    ///
    /// A path that does not exist falls back to defaults.
    pub fn load(config_path: Option<&Path>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(path)?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies overrides from a key lookup (the process environment in
    /// [`EngineConfig::load`]).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("COMANDA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("COMANDA_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(m) => self.database.max_connections = m,
                Err(_) => warn!(value = %max, "Ignoring invalid COMANDA_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = lookup("COMANDA_BUSY_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %ms, "Ignoring invalid COMANDA_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(prefix) = lookup("COMANDA_INVOICE_PREFIX") {
            debug!(prefix = %prefix, "Overriding invoice prefix from environment");
            self.billing.invoice_prefix = prefix;
        }

        if let Some(flag) = lookup("COMANDA_ALLOW_OVERPAYMENT") {
            match parse_flag(&flag) {
                Some(b) => self.payments.allow_overpayment = b,
                None => warn!(value = %flag, "Ignoring invalid COMANDA_ALLOW_OVERPAYMENT"),
            }
        }

        if let Some(flag) = lookup("COMANDA_ALLOW_PAYMENTS_ON_VOIDED") {
            match parse_flag(&flag) {
                Some(b) => self.payments.allow_payments_on_voided = b,
                None => warn!(value = %flag, "Ignoring invalid COMANDA_ALLOW_PAYMENTS_ON_VOIDED"),
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        let prefix = &self.billing.invoice_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DbError::InvalidConfig(format!(
                "invoice_prefix must be non-empty ASCII letters/digits, got: '{}'",
                prefix
            )));
        }

        Ok(())
    }

    /// Builds the pool configuration for [`Database::new`](crate::Database::new).
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.billing.invoice_prefix, "FACT");
        assert!(!config.payments.allow_overpayment);
        assert!(!config.payments.allow_payments_on_voided);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [payments]
            allow_overpayment = true
            "#,
        )
        .unwrap();

        assert!(config.payments.allow_overpayment);
        assert!(!config.payments.allow_payments_on_voided);
        assert_eq!(config.billing.invoice_prefix, "FACT");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[payments\nallow = ").unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("COMANDA_DB_PATH", "/tmp/other.db"),
            ("COMANDA_MAX_CONNECTIONS", "8"),
            ("COMANDA_BUSY_TIMEOUT_MS", "not-a-number"),
            ("COMANDA_INVOICE_PREFIX", "FAC"),
            ("COMANDA_ALLOW_PAYMENTS_ON_VOIDED", "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.billing.invoice_prefix, "FAC");
        assert!(config.payments.allow_payments_on_voided);
        assert!(!config.payments.allow_overpayment);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.billing.invoice_prefix = "FA-CT".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[billing]\ninvoice_prefix = \"INV\"").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.billing.invoice_prefix, "INV");

        let missing = EngineConfig::load(Some(Path::new("/nonexistent/comanda.toml")));
        assert!(missing.is_ok());
    }

    #[test]
    fn test_db_config_from_engine_config() {
        let mut config = EngineConfig::default();
        config.database.max_connections = 3;
        config.database.busy_timeout_ms = 250;

        let db = config.db_config();
        assert_eq!(db.max_connections, 3);
        assert_eq!(db.busy_timeout, Duration::from_millis(250));
    }
}

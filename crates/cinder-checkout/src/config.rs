//! # Cinder Configuration
//!
//! Store, compliance, checkout, audit, tax and database settings.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CINDER_STORE_ID=store-042                                          │
//! │     CINDER_JURISDICTION=NY                                             │
//! │     CINDER_DB_PATH=/var/lib/cinder/cinder.db                           │
//! │     CINDER_MIN_AGE=21                                                  │
//! │     CINDER_ALLOW_EXPIRED_ID_OVERRIDE=false                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cinder-pos/cinder.toml (Linux)                           │
//! │     ~/Library/Application Support/com.cinder.pos/cinder.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! id = "store-042"
//! name = "Cinder Smoke & Vape"
//! jurisdiction = "NY"
//! address_lines = ["12 Canal St", "New York, NY"]
//!
//! [age_verification]
//! minimum_age = 21
//! allow_expired_id_override = true
//! verification_ttl_secs = 900
//!
//! [checkout]
//! stock_conflict_retries = 1
//! request_timeout_ms = 10000
//!
//! [tax.jurisdictions.PA]
//! base_rate_bps = 600
//! tobacco_bps = 4000
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use cinder_audit::DispatcherSettings;
use cinder_core::age::{AgePolicy, DEFAULT_MINIMUM_AGE, OVERRIDE_AGE_FLOOR};
use cinder_core::receipt::StoreInfo;
use cinder_core::tax::{JurisdictionRates, JurisdictionTable, SpecialTaxCategory};
use cinder_core::validation::validate_tax_rate_bps;
use cinder_core::TaxRate;
use cinder_db::DbConfig;

const CONFIG_FILE_NAME: &str = "cinder.toml";
const DATABASE_FILE_NAME: &str = "cinder.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available on this platform")]
    NoPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_id")]
    pub id: String,

    #[serde(default = "default_store_name")]
    pub name: String,

    /// Tax jurisdiction code. Unset means the default rate applies.
    #[serde(default)]
    pub jurisdiction: Option<String>,

    #[serde(default)]
    pub address_lines: Vec<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub receipt_footer: Option<String>,
}

fn default_store_id() -> String {
    "store-001".to_string()
}

fn default_store_name() -> String {
    "Cinder POS".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            id: default_store_id(),
            name: default_store_name(),
            jurisdiction: None,
            address_lines: Vec::new(),
            phone: None,
            receipt_footer: None,
        }
    }
}

/// The override floor is not configurable; see [`OVERRIDE_AGE_FLOOR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeVerificationSettings {
    #[serde(default = "default_minimum_age")]
    pub minimum_age: i32,

    #[serde(default = "default_true")]
    pub allow_expired_id_override: bool,

    /// How long a verification can authorise a checkout.
    #[serde(default = "default_verification_ttl")]
    pub verification_ttl_secs: u64,

    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,
}

fn default_minimum_age() -> i32 {
    DEFAULT_MINIMUM_AGE
}

fn default_true() -> bool {
    true
}

fn default_verification_ttl() -> u64 {
    900
}

fn default_expiry_warning_days() -> i64 {
    30
}

impl Default for AgeVerificationSettings {
    fn default() -> Self {
        Self {
            minimum_age: default_minimum_age(),
            allow_expired_id_override: true,
            verification_ttl_secs: default_verification_ttl(),
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Retries after losing a conditional stock decrement.
    #[serde(default = "default_stock_conflict_retries")]
    pub stock_conflict_retries: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_stock_conflict_retries() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            stock_conflict_retries: default_stock_conflict_retries(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_max_attempts_low")]
    pub max_attempts_low_severity: i64,
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_batch_size() -> u32 {
    100
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

fn default_max_attempts_low() -> i64 {
    10
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_attempts_low_severity: default_max_attempts_low(),
        }
    }
}

/// One jurisdiction added to (or replacing) the built-in table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionEntry {
    pub base_rate_bps: u32,
    #[serde(default)]
    pub tobacco_bps: Option<u32>,
    #[serde(default)]
    pub vapor_bps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxSettings {
    #[serde(default)]
    pub jurisdictions: BTreeMap<String, JurisdictionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Defaults to `cinder.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CinderConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub age_verification: AgeVerificationSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub tax: TaxSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl CinderConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cinder.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Writes the configuration as pretty TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.id.trim().is_empty() {
            return Err(ConfigError::Invalid("store.id must not be empty".into()));
        }

        if self.age_verification.minimum_age < OVERRIDE_AGE_FLOOR {
            return Err(ConfigError::Invalid(format!(
                "age_verification.minimum_age must be at least {OVERRIDE_AGE_FLOOR}"
            )));
        }

        if self.age_verification.verification_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "age_verification.verification_ttl_secs must be greater than 0".into(),
            ));
        }

        if self.checkout.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "checkout.request_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.audit.batch_size == 0 || self.audit.max_attempts_low_severity < 1 {
            return Err(ConfigError::Invalid(
                "audit.batch_size and audit.max_attempts_low_severity must be at least 1".into(),
            ));
        }

        for (code, entry) in &self.tax.jurisdictions {
            let rates = [Some(entry.base_rate_bps), entry.tobacco_bps, entry.vapor_bps];
            for bps in rates.into_iter().flatten() {
                validate_tax_rate_bps(bps)
                    .map_err(|e| ConfigError::Invalid(format!("tax.jurisdictions.{code}: {e}")))?;
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies `CINDER_*` overrides read through `lookup`.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("CINDER_STORE_ID") {
            debug!(store_id = %id, "Overriding store id from environment");
            self.store.id = id;
        }

        if let Some(code) = lookup("CINDER_JURISDICTION") {
            debug!(jurisdiction = %code, "Overriding jurisdiction from environment");
            self.store.jurisdiction = Some(code).filter(|c| !c.trim().is_empty());
        }

        if let Some(path) = lookup("CINDER_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(age) = lookup("CINDER_MIN_AGE") {
            match age.parse::<i32>() {
                Ok(age) => self.age_verification.minimum_age = age,
                Err(_) => warn!(value = %age, "Ignoring unparsable CINDER_MIN_AGE"),
            }
        }

        if let Some(flag) = lookup("CINDER_ALLOW_EXPIRED_ID_OVERRIDE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.age_verification.allow_expired_id_override = true,
                "0" | "false" | "no" => self.age_verification.allow_expired_id_override = false,
                _ => warn!(value = %flag, "Ignoring unparsable CINDER_ALLOW_EXPIRED_ID_OVERRIDE"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "cinder", "pos")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    pub fn age_policy(&self) -> AgePolicy {
        AgePolicy {
            minimum_age: self.age_verification.minimum_age,
            allow_expired_id_override: self.age_verification.allow_expired_id_override,
            expiry_warning_days: self.age_verification.expiry_warning_days,
        }
    }

    pub fn verification_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.age_verification.verification_ttl_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout.request_timeout_ms)
    }

    /// Built-in jurisdictions with configured entries layered on top.
    pub fn jurisdiction_table(&self) -> JurisdictionTable {
        let mut table = JurisdictionTable::builtin();
        for (code, entry) in &self.tax.jurisdictions {
            let mut rates = JurisdictionRates::new(TaxRate::from_bps(entry.base_rate_bps));
            if let Some(bps) = entry.tobacco_bps {
                rates = rates.with_surcharge(SpecialTaxCategory::Tobacco, TaxRate::from_bps(bps));
            }
            if let Some(bps) = entry.vapor_bps {
                rates = rates.with_surcharge(SpecialTaxCategory::Vapor, TaxRate::from_bps(bps));
            }
            table.insert(code, rates);
        }
        table
    }

    pub fn store_info(&self) -> StoreInfo {
        StoreInfo {
            store_id: self.store.id.clone(),
            name: self.store.name.clone(),
            address_lines: self.store.address_lines.clone(),
            phone: self.store.phone.clone(),
            footer: self.store.receipt_footer.clone(),
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            poll_interval: Duration::from_millis(self.audit.poll_interval_ms),
            batch_size: self.audit.batch_size,
            initial_backoff: Duration::from_millis(self.audit.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.audit.max_backoff_secs),
            max_attempts_low_severity: self.audit.max_attempts_low_severity,
        }
    }

    pub fn db_config(&self) -> ConfigResult<DbConfig> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => Self::project_dirs()
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
                .ok_or(ConfigError::NoPath)?,
        };

        Ok(DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = CinderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.age_verification.minimum_age, 21);
        assert_eq!(config.age_verification.verification_ttl_secs, 900);
        assert_eq!(config.checkout.stock_conflict_retries, 1);
        assert_eq!(config.checkout.request_timeout_ms, 10_000);
        assert!(config.store.jurisdiction.is_none());
    }

    #[test]
    fn test_minimum_age_cannot_drop_below_override_floor() {
        let mut config = CinderConfig::default();
        config.age_verification.minimum_age = 16;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CINDER_STORE_ID", "store-042"),
            ("CINDER_JURISDICTION", "nj"),
            ("CINDER_MIN_AGE", "19"),
            ("CINDER_ALLOW_EXPIRED_ID_OVERRIDE", "false"),
            ("CINDER_DB_PATH", "/tmp/cinder-test.db"),
        ]);

        let mut config = CinderConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.id, "store-042");
        assert_eq!(config.store.jurisdiction.as_deref(), Some("nj"));
        assert_eq!(config.age_policy().minimum_age, 19);
        assert!(!config.age_policy().allow_expired_id_override);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/cinder-test.db")));
    }

    #[test]
    fn test_toml_roundtrip_and_tax_entries() {
        let toml_str = r#"
            [store]
            id = "store-9"
            jurisdiction = "PA"

            [tax.jurisdictions.PA]
            base_rate_bps = 600
            tobacco_bps = 4000

            [tax.jurisdictions.NY]
            base_rate_bps = 888
        "#;
        let config: CinderConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());

        let table = config.jurisdiction_table();
        let pa = table.get("PA").unwrap();
        assert_eq!(pa.base_rate.bps(), 600);
        assert_eq!(pa.surcharge(SpecialTaxCategory::Tobacco).map(|r| r.bps()), Some(4000));
        assert_eq!(table.get("NY").unwrap().base_rate.bps(), 888);
        assert!(table.contains("CA"));

        let written = toml::to_string_pretty(&config).unwrap();
        assert!(written.contains("[store]"));
        let reparsed: CinderConfig = toml::from_str(&written).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("cinder-config-{}", uuid::Uuid::new_v4()))
            .join(CONFIG_FILE_NAME);

        let mut config = CinderConfig::default();
        config.store.name = "Saved Store".into();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: CinderConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.store.name, "Saved Store");

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_load_refuses_an_invalid_file_instead_of_defaulting() {
        let dir = std::env::temp_dir().join(format!("cinder-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
            [store]
            id = "store-9"

            [tax.jurisdictions.ZZ]
            base_rate_bps = 20000
            "#,
        )
        .unwrap();

        assert!(CinderConfig::load(Some(path.clone())).is_err());

        std::fs::write(&path, "[store]\nid = \"store-9\"\n").unwrap();
        assert_eq!(CinderConfig::load(Some(path)).unwrap().store.id, "store-9");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        let mut config = CinderConfig::default();
        config.tax.jurisdictions.insert(
            "ZZ".into(),
            JurisdictionEntry {
                base_rate_bps: 20_000,
                tobacco_bps: None,
                vapor_bps: None,
            },
        );
        assert!(config.validate().is_err());
    }
}

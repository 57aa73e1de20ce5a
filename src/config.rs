// ⚙️ Configuration - environment driven, with .env support
//
//   CARE_LEDGER_DB                  SQLite file        (care-ledger.db)
//   CARE_LEDGER_ADDR                server bind addr   (0.0.0.0:3000)
//   CARE_LEDGER_FREE_MAX_RECORDS    free quota         (4)
//   CARE_LEDGER_FREE_MAX_ENTRIES    free quota         (3)
//   CARE_LEDGER_FREE_MAX_HOSPITALS  free quota         (1)

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::plan_limits::PlanLimits;

pub const DEFAULT_DB_PATH: &str = "care-ledger.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub limits: PlanLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            limits: PlanLimits::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment, or a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let limit = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, value)),
                None => Ok(default),
            }
        };

        Ok(AppConfig {
            db_path: lookup("CARE_LEDGER_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            bind_addr: lookup("CARE_LEDGER_ADDR").unwrap_or(defaults.bind_addr),
            limits: PlanLimits {
                max_surgery_records: limit(
                    "CARE_LEDGER_FREE_MAX_RECORDS",
                    defaults.limits.max_surgery_records,
                )?,
                max_entries_per_record: limit(
                    "CARE_LEDGER_FREE_MAX_ENTRIES",
                    defaults.limits.max_entries_per_record,
                )?,
                max_hospitals: limit(
                    "CARE_LEDGER_FREE_MAX_HOSPITALS",
                    defaults.limits.max_hospitals,
                )?,
            },
        })
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Ignore a second init (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

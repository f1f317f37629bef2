//! Runtime configuration from the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_DB_PATH: &str = "stayline.db";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_JOURNEY_INTERVAL_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Worker process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    /// Seconds between PMS reconciliation passes (journeys run right
    /// after each pass).
    pub sync_interval_secs: u64,
    /// Seconds between standalone journey cycles between syncs.
    pub journey_interval_secs: u64,
    /// Seconds between stay sweeps.
    pub sweep_interval_secs: u64,
}

impl RuntimeConfig {
    /// Reads `STAYLINE_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => {
                    let value: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;
                    Ok(value.max(1))
                }
                None => Ok(default),
            }
        };
        Ok(Self {
            db_path: lookup("STAYLINE_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            sync_interval_secs: interval("STAYLINE_SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL_SECS)?,
            journey_interval_secs: interval(
                "STAYLINE_JOURNEY_INTERVAL_SECS",
                DEFAULT_JOURNEY_INTERVAL_SECS,
            )?,
            sweep_interval_secs: interval(
                "STAYLINE_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn unit_config_defaults_apply_without_environment() {
        let config = RuntimeConfig::from_lookup(|_| None).expect("config");
        assert_eq!(config.db_path, PathBuf::from("stayline.db"));
        assert_eq!(config.sync_interval_secs, 300);
        assert_eq!(config.journey_interval_secs, 60);
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn unit_config_reads_overrides_and_rejects_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STAYLINE_DB_PATH", "/var/lib/stayline/stayline.db"),
            ("STAYLINE_SYNC_INTERVAL_SECS", "30"),
            ("STAYLINE_SWEEP_INTERVAL_SECS", "0"),
        ]);
        let config = RuntimeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("config");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/stayline/stayline.db"));
        assert_eq!(config.sync_interval_secs, 30);
        // Zero is clamped to the 1-second floor instead of busy-looping.
        assert_eq!(config.sweep_interval_secs, 1);

        let bad = RuntimeConfig::from_lookup(|key| {
            (key == "STAYLINE_SYNC_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(bad.is_err());
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/adm/config.toml`.
///
/// Credentials can also come from the environment (`ADM_API_ID`,
/// `ADM_API_HASH`, `ADM_SESSION_NAME`), which takes precedence over the
/// file so secrets can stay out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmConfig {
    /// Remote API credentials. Required for `download`; inspection
    /// commands work without them.
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
    pub session_name: String,

    /// Library root where completed files land.
    pub download_dir: PathBuf,

    /// Concurrency bounds for the adaptive scheduler.
    pub max_concurrent_downloads: usize,
    pub min_concurrent_downloads: usize,
    pub initial_concurrent_downloads: usize,

    /// Governor watermarks (percent).
    pub cpu_high: f32,
    pub cpu_low: f32,
    pub mem_high: f32,
    pub mem_low: f32,

    /// Token bucket: initial rate (tokens/second) and bucket capacity.
    pub rate_initial: f64,
    pub rate_burst: f64,

    /// Hard limits: process RSS soft ceiling and disk reserve.
    pub max_memory_mb: u64,
    pub min_free_disk_gb: u64,

    /// Governor sampling interval and per-download wall-clock timeout.
    pub check_interval_seconds: u64,
    pub per_download_timeout_seconds: u64,

    /// Capacity of the completed-identifier LRU cache.
    pub identifier_cache_capacity: usize,

    /// Target filename template; see `naming` for placeholders.
    pub filename_template: String,
}

impl Default for AdmConfig {
    fn default() -> Self {
        Self {
            api_id: None,
            api_hash: None,
            session_name: "adm".to_string(),
            download_dir: PathBuf::from("downloads"),
            max_concurrent_downloads: 10,
            min_concurrent_downloads: 1,
            initial_concurrent_downloads: 3,
            cpu_high: 80.0,
            cpu_low: 50.0,
            mem_high: 85.0,
            mem_low: 70.0,
            rate_initial: 1.0,
            rate_burst: 5.0,
            max_memory_mb: 1024,
            min_free_disk_gb: 1,
            check_interval_seconds: 5,
            per_download_timeout_seconds: 600,
            identifier_cache_capacity: 50_000,
            filename_template: "{artist} - {title}".to_string(),
        }
    }
}

impl AdmConfig {
    /// Apply environment overrides for credentials.
    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var("ADM_API_ID") {
            if let Ok(id) = v.parse::<i64>() {
                self.api_id = Some(id);
            }
        }
        if let Ok(v) = env::var("ADM_API_HASH") {
            if !v.is_empty() {
                self.api_hash = Some(v);
            }
        }
        if let Ok(v) = env::var("ADM_SESSION_NAME") {
            if !v.is_empty() {
                self.session_name = v;
            }
        }
    }

    /// Validate the parts a download run depends on. Errors here are fatal
    /// at startup, before any network or store access.
    pub fn validate_for_download(&self) -> Result<()> {
        if self.api_id.is_none() || self.api_hash.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!(
                "missing remote credentials: set api_id/api_hash in the config file or ADM_API_ID/ADM_API_HASH"
            );
        }
        if self.min_concurrent_downloads == 0 {
            anyhow::bail!("min_concurrent_downloads must be at least 1");
        }
        if self.min_concurrent_downloads > self.max_concurrent_downloads {
            anyhow::bail!(
                "min_concurrent_downloads ({}) exceeds max_concurrent_downloads ({})",
                self.min_concurrent_downloads,
                self.max_concurrent_downloads
            );
        }
        if self.rate_initial <= 0.0 || self.rate_burst <= 0.0 {
            anyhow::bail!("rate_initial and rate_burst must be positive");
        }
        Ok(())
    }

    /// Clamp the initial scheduler target into `[min, max]`.
    pub fn initial_target(&self) -> usize {
        self.initial_concurrent_downloads
            .max(self.min_concurrent_downloads)
            .min(self.max_concurrent_downloads)
    }

    /// Disk reserve in bytes for the governor's pre-download gate.
    pub fn disk_reserve_bytes(&self) -> u64 {
        self.min_free_disk_gb * 1024 * 1024 * 1024
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// Environment overrides are applied after the file is read.
pub fn load_or_init() -> Result<AdmConfig> {
    let path = config_path()?;
    let mut cfg = if path.exists() {
        let data = fs::read_to_string(&path)?;
        toml::from_str::<AdmConfig>(&data)?
    } else {
        let default_cfg = AdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    };
    cfg.apply_env();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = AdmConfig::default();
        assert_eq!(cfg.max_concurrent_downloads, 10);
        assert_eq!(cfg.min_concurrent_downloads, 1);
        assert_eq!(cfg.initial_concurrent_downloads, 3);
        assert_eq!(cfg.cpu_high, 80.0);
        assert_eq!(cfg.mem_low, 70.0);
        assert_eq!(cfg.rate_initial, 1.0);
        assert_eq!(cfg.rate_burst, 5.0);
        assert_eq!(cfg.identifier_cache_capacity, 50_000);
        assert_eq!(cfg.check_interval_seconds, 5);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = AdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: AdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_downloads, cfg.max_concurrent_downloads);
        assert_eq!(parsed.rate_burst, cfg.rate_burst);
        assert_eq!(parsed.filename_template, cfg.filename_template);
    }

    #[test]
    fn config_toml_partial_file_fills_defaults() {
        let toml = r#"
            max_concurrent_downloads = 4
            rate_initial = 0.5
        "#;
        let cfg: AdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_downloads, 4);
        assert_eq!(cfg.rate_initial, 0.5);
        // Untouched keys keep their defaults.
        assert_eq!(cfg.min_concurrent_downloads, 1);
        assert_eq!(cfg.identifier_cache_capacity, 50_000);
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let cfg = AdmConfig::default();
        assert!(cfg.validate_for_download().is_err());

        let mut cfg = AdmConfig::default();
        cfg.api_id = Some(12345);
        cfg.api_hash = Some("abcdef".to_string());
        assert!(cfg.validate_for_download().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_concurrency_bounds() {
        let mut cfg = AdmConfig {
            api_id: Some(1),
            api_hash: Some("h".to_string()),
            ..AdmConfig::default()
        };
        cfg.min_concurrent_downloads = 8;
        cfg.max_concurrent_downloads = 2;
        assert!(cfg.validate_for_download().is_err());
    }

    #[test]
    fn initial_target_is_clamped() {
        let mut cfg = AdmConfig::default();
        cfg.initial_concurrent_downloads = 50;
        assert_eq!(cfg.initial_target(), cfg.max_concurrent_downloads);
        cfg.initial_concurrent_downloads = 0;
        assert_eq!(cfg.initial_target(), cfg.min_concurrent_downloads);
    }
}

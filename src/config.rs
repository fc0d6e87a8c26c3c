use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;

fn default_portal_base_url() -> String {
    "https://cei.b3.com.br".to_string()
}

fn default_portal_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Portal (CEI) connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the portal host. Overridable for tests.
    pub base_url: String,

    /// Timeout applied to every request.
    #[serde(
        default = "default_portal_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,

    /// Optional PEM bundle pinned as the only trust anchor for the
    /// portal's certificate. If unset, the system roots are used.
    pub ca_certificate: Option<PathBuf>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_base_url(),
            timeout: default_portal_timeout(),
            ca_certificate: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

/// Retry configuration for the whole authenticate+fetch flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up. There is no delay between attempts.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_quotes_base_url() -> String {
    "https://br.tradingview.com/symbols/BMFBOVESPA-{code}/".to_string()
}

fn default_render_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Market-quote scraping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    /// Compute price deltas for held positions after every fetch.
    pub enabled: bool,

    /// Symbol page URL template; `{code}` is replaced with the ticker.
    pub base_url: String,

    /// How long to wait for the price element to render.
    #[serde(
        default = "default_render_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub render_timeout: Duration,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_quotes_base_url(),
            render_timeout: default_render_timeout(),
        }
    }
}

/// Fee schedule configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    /// Path to the CSV fee schedule. Relative paths are resolved against
    /// the config file's directory. A missing file means no fee data.
    pub schedule: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory (price cache, logs). If relative, resolved
    /// from the config file's location; defaults to that location itself.
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub portal: PortalConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub quotes: QuotesConfig,

    #[serde(default)]
    pub fees: FeesConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn resolve_path(base: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub portal: PortalConfig,
    pub retry: RetryConfig,
    pub quotes: QuotesConfig,
    /// Resolved fee schedule path, if configured.
    pub fee_schedule: Option<PathBuf>,
}

/// Returns the default config file path.
///
/// `./ceitrack.toml` if it exists in the current directory, otherwise
/// `~/.config/ceitrack/ceitrack.toml`.
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("ceitrack.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ceitrack").join("ceitrack.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// Relative paths are resolved against the config file's directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::resolve(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::resolve(Config::default(), config_dir))
    }

    fn resolve(config: Config, config_dir: &Path) -> Self {
        let data_dir = match &config.data_dir {
            Some(dir) => Config::resolve_path(config_dir, dir),
            None => config_dir.to_path_buf(),
        };
        let fee_schedule = config
            .fees
            .schedule
            .as_ref()
            .map(|p| Config::resolve_path(config_dir, p));

        Self {
            data_dir,
            portal: config.portal,
            retry: config.retry,
            quotes: config.quotes,
            fee_schedule,
        }
    }

    /// Where the ticker price cache lives.
    pub fn price_cache_path(&self) -> PathBuf {
        self.data_dir.join("prices.json")
    }

    /// Where rotating log files go.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.portal.base_url, "https://cei.b3.com.br");
        assert_eq!(config.portal.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 4);
        assert!(!config.quotes.enabled);
        assert!(config.fees.schedule.is_none());
    }

    #[test]
    fn test_load_portal_section() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ceitrack.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[portal]")?;
        writeln!(file, "base_url = \"http://localhost:9999\"")?;
        writeln!(file, "timeout = \"5s\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.portal.base_url, "http://localhost:9999");
        assert_eq!(config.portal.timeout, Duration::from_secs(5));

        Ok(())
    }

    #[test]
    fn test_load_retry_and_quotes() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ceitrack.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[retry]")?;
        writeln!(file, "max_attempts = 2")?;
        writeln!(file, "[quotes]")?;
        writeln!(file, "enabled = true")?;
        writeln!(file, "render_timeout = \"10s\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.retry.max_attempts, 2);
        assert!(config.quotes.enabled);
        assert_eq!(config.quotes.render_timeout, Duration::from_secs(10));

        Ok(())
    }

    #[test]
    fn test_resolved_defaults_to_config_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ceitrack.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());
        assert_eq!(resolved.price_cache_path(), dir.path().join("prices.json"));
        assert_eq!(resolved.log_dir(), dir.path().join("logs"));

        Ok(())
    }

    #[test]
    fn test_relative_paths_resolved_against_config_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ceitrack.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"./data\"")?;
        writeln!(file, "[fees]")?;
        writeln!(file, "schedule = \"fees.csv\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path().join("data"));
        assert_eq!(resolved.fee_schedule, Some(dir.path().join("fees.csv")));

        Ok(())
    }

    #[test]
    fn test_absolute_data_dir_kept() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ceitrack.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"/var/lib/ceitrack\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, PathBuf::from("/var/lib/ceitrack"));

        Ok(())
    }
}

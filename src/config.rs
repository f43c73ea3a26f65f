use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub keys: KeyConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// The purchasable pack catalog. Read-only at runtime.
    #[serde(default)]
    pub packs: Vec<PackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/keyvend.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Session inactivity expiry in minutes.
    pub session_minutes: i64,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cors_allowed_origins: vec!["*".to_string()],
            session_minutes: 7 * 24 * 60,
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Namespace prefix on every issued key code.
    pub code_prefix: String,

    /// Random suffix length for purchased keys.
    pub code_suffix_len: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            code_prefix: "keyvend".to_string(),
            code_suffix_len: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    pub code: String,
    pub price: i64,
    pub minutes: i64,
    pub label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            keys: KeyConfig::default(),
            observability: ObservabilityConfig::default(),
            packs: vec![
                PackConfig {
                    code: "1d".to_string(),
                    price: 15_000,
                    minutes: 24 * 60,
                    label: "1d".to_string(),
                },
                PackConfig {
                    code: "3d".to_string(),
                    price: 35_000,
                    minutes: 3 * 24 * 60,
                    label: "3d".to_string(),
                },
                PackConfig {
                    code: "30d".to_string(),
                    price: 80_000,
                    minutes: 30 * 24 * 60,
                    label: "30d".to_string(),
                },
                PackConfig {
                    code: "life".to_string(),
                    price: 150_000,
                    minutes: 0,
                    label: "life".to_string(),
                },
            ],
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyvend").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".keyvend").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.packs.is_empty() {
            anyhow::bail!("At least one pack must be configured");
        }

        for pack in &self.packs {
            if pack.code.trim().is_empty() {
                anyhow::bail!("Pack codes cannot be empty");
            }
            if pack.price <= 0 {
                anyhow::bail!("Pack '{}' must have a positive price", pack.code);
            }
            if pack.minutes < 0 {
                anyhow::bail!("Pack '{}' cannot have a negative duration", pack.code);
            }
        }

        let mut codes: Vec<String> = self.packs.iter().map(|p| p.code.to_lowercase()).collect();
        codes.sort();
        codes.dedup();
        if codes.len() != self.packs.len() {
            anyhow::bail!("Pack codes must be unique");
        }

        if self.keys.code_suffix_len < crate::constants::codes::MIN_SUFFIX_LEN {
            anyhow::bail!(
                "keys.code_suffix_len must be at least {}",
                crate::constants::codes::MIN_SUFFIX_LEN
            );
        }

        Ok(())
    }
}

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeirwoodConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub auth: AuthConfig,
    pub incognito: IncognitoConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Browser origins allowed to make credentialed requests.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub system_instruction: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Newest messages of the chat replayed on every turn.
    pub short_term_limit: usize,
    /// Semantically similar past messages injected on every turn.
    pub long_term_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IncognitoConfig {
    pub message_quota: u32,
}

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Weirwood. Always speak in Hinglish with a little Bhojpuri.
Be playful, cheeky, friendly.
Explain things clearly.
Reference previous context subtly when needed.";

impl Default for WeirwoodConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
            auth: AuthConfig::default(),
            incognito: IncognitoConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
            allowed_origins: vec!["http://localhost:5173".into()],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_weirwood_dir()
            .join("weirwood.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            model: "gemini-2.0-flash".into(),
            temperature: 1.4,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.into(),
            embedding_model: "gemini-embedding-001".into(),
            embedding_dimensions: 768,
            timeout_secs: 120,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_limit: 20,
            long_term_limit: crate::memory::search::DEFAULT_QUERY_LIMIT,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24 * 7,
            secure_cookies: false,
        }
    }
}

impl Default for IncognitoConfig {
    fn default() -> Self {
        Self { message_quota: 3 }
    }
}

/// Returns `~/.weirwood/`, or `./.weirwood/` when no home directory is known.
pub fn default_weirwood_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".weirwood")
}

/// Returns the default config file path: `~/.weirwood/config.toml`
pub fn default_config_path() -> PathBuf {
    default_weirwood_dir().join("config.toml")
}

impl WeirwoodConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            WeirwoodConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `WEIRWOOD_DB`, `WEIRWOOD_LOG_LEVEL`, `WEIRWOOD_HOST`, `WEIRWOOD_PORT`,
    /// `GEMINI_API_KEY` and `JWT_SECRET`. An unparsable port is ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WEIRWOOD_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("WEIRWOOD_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("WEIRWOOD_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("WEIRWOOD_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid WEIRWOOD_PORT"),
            }
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = val;
        }
    }

    /// Check the settings the server cannot run without.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.auth.jwt_secret.is_empty(),
            "auth.jwt_secret is empty; set it in the config file or via JWT_SECRET"
        );
        ensure!(
            self.llm.embedding_dimensions > 0,
            "llm.embedding_dimensions must be greater than zero"
        );
        ensure!(
            self.memory.short_term_limit > 0,
            "memory.short_term_limit must be greater than zero"
        );
        ensure!(
            self.memory.long_term_limit > 0,
            "memory.long_term_limit must be greater than zero"
        );
        ensure!(
            self.auth.token_ttl_hours > 0,
            "auth.token_ttl_hours must be greater than zero"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

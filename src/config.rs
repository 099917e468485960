use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::rotation::DEFAULT_LIMIT;
use crate::store::TableLayout;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub file: FileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    None,
    File,
    Sqlite,
    Mysql,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// URL schemes accepted for a SQL backend
    fn url_schemes(&self) -> &'static [&'static str] {
        match self {
            Self::Sqlite => &["sqlite:"],
            Self::Mysql => &["mysql:"],
            Self::Postgres => &["postgres:", "postgresql:"],
            Self::None | Self::File => &[],
        }
    }

    pub fn is_sql(&self) -> bool {
        !self.url_schemes().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL for SQL backends
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub table_layout: TableLayout,
    /// Per-tag capacity; 0 or less means unbounded
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub tag_limits: HashMap<String, i64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::None,
            url: String::new(),
            table_layout: TableLayout::default(),
            default_limit: default_limit(),
            max_connections: default_max_connections(),
            tag_limits: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileConfig {
    /// Empty means the executable's directory
    #[serde(default)]
    pub folder: String,
    /// Empty means the executable's file stem
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            name: String::new(),
            flush_interval_ms: default_flush_interval_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl FileConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Also persist this process's own tracing events into the store
    #[serde(default)]
    pub persist: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            persist: false,
        }
    }
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_max_connections() -> u32 {
    5
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_buffer_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Load `config.toml` (or `path`) layered with `LOGVAULT__*` environment variables
///
/// The default file is optional; an explicit `path` must exist.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => config::File::with_name(path).required(true),
        None => config::File::with_name("config").required(false),
    };
    let config = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("LOGVAULT").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    let store = &cfg.store;
    if store.backend.is_sql() {
        if store.url.is_empty() {
            anyhow::bail!("store.url is required for the {} backend", store.backend.as_str());
        }
        if !store
            .backend
            .url_schemes()
            .iter()
            .any(|scheme| store.url.starts_with(scheme))
        {
            anyhow::bail!(
                "store.url '{}' does not match the {} backend",
                store.url,
                store.backend.as_str()
            );
        }
        if store.max_connections == 0 {
            anyhow::bail!("store.max_connections must be at least 1");
        }
    }

    match cfg.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("logging.format must be 'pretty' or 'json', got '{}'", other),
    }

    Ok(())
}

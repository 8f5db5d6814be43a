use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub advisor: AdvisorConfig,
    pub server: ServerConfig,
    pub brand: BrandConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    pub provider: AdvisorProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl AdvisorConfig {
    /// Whether the remote advisor can actually be called; otherwise the
    /// application falls back to the no-op advisor.
    pub fn has_credentials(&self) -> bool {
        match self.provider {
            AdvisorProvider::OpenAi | AdvisorProvider::Groq => self
                .api_key
                .as_ref()
                .map(|key| !key.expose_secret().trim().is_empty())
                .unwrap_or(false),
            AdvisorProvider::Ollama => self
                .base_url
                .as_ref()
                .map(|url| !url.trim().is_empty())
                .unwrap_or(false),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BrandConfig {
    pub name: String,
    pub support_hours: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self { name: "Cassie".to_string(), support_hours: "Mon-Fri 9:00-17:00".to_string() }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorProvider {
    OpenAi,
    Groq,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub advisor_provider: Option<AdvisorProvider>,
    pub advisor_model: Option<String>,
    pub advisor_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cassie.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            advisor: AdvisorConfig {
                provider: AdvisorProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            brand: BrandConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for AdvisorProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported advisor provider `{other}` (expected openai|groq|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cassie.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(advisor) = patch.advisor {
            if let Some(provider) = advisor.provider {
                self.advisor.provider = provider;
            }
            if let Some(api_key_value) = advisor.api_key {
                self.advisor.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = advisor.base_url {
                self.advisor.base_url = Some(base_url);
            }
            if let Some(model) = advisor.model {
                self.advisor.model = model;
            }
            if let Some(timeout_secs) = advisor.timeout_secs {
                self.advisor.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = advisor.max_retries {
                self.advisor.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(brand) = patch.brand {
            if let Some(name) = brand.name {
                self.brand.name = name;
            }
            if let Some(support_hours) = brand.support_hours {
                self.brand.support_hours = support_hours;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CASSIE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CASSIE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CASSIE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CASSIE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CASSIE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CASSIE_ADVISOR_PROVIDER") {
            self.advisor.provider = value.parse()?;
        }
        if let Some(value) = read_env("CASSIE_ADVISOR_API_KEY") {
            self.advisor.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CASSIE_ADVISOR_BASE_URL") {
            self.advisor.base_url = Some(value);
        }
        if let Some(value) = read_env("CASSIE_ADVISOR_MODEL") {
            self.advisor.model = value;
        }
        if let Some(value) = read_env("CASSIE_ADVISOR_TIMEOUT_SECS") {
            self.advisor.timeout_secs = parse_u64("CASSIE_ADVISOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CASSIE_ADVISOR_MAX_RETRIES") {
            self.advisor.max_retries = parse_u32("CASSIE_ADVISOR_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CASSIE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CASSIE_SERVER_PORT") {
            self.server.port = parse_u16("CASSIE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CASSIE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CASSIE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CASSIE_BRAND_NAME") {
            self.brand.name = value;
        }
        if let Some(value) = read_env("CASSIE_BRAND_SUPPORT_HOURS") {
            self.brand.support_hours = value;
        }

        let log_level = read_env("CASSIE_LOGGING_LEVEL").or_else(|| read_env("CASSIE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CASSIE_LOGGING_FORMAT").or_else(|| read_env("CASSIE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.advisor_provider {
            self.advisor.provider = provider;
        }
        if let Some(model) = overrides.advisor_model {
            self.advisor.model = model;
        }
        if let Some(api_key) = overrides.advisor_api_key {
            self.advisor.api_key = Some(api_key.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_advisor(&self.advisor)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cassie.toml"), PathBuf::from("config/cassie.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_advisor(advisor: &AdvisorConfig) -> Result<(), ConfigError> {
    if advisor.timeout_secs == 0 || advisor.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "advisor.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if advisor.model.trim().is_empty() {
        return Err(ConfigError::Validation("advisor.model must not be empty".to_string()));
    }

    // Missing credentials are not an error: the advisor is optional and the
    // controller runs rule-first without it. A malformed base url is.
    if let Some(base_url) = &advisor.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "advisor.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    advisor: Option<AdvisorPatch>,
    server: Option<ServerPatch>,
    brand: Option<BrandPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvisorPatch {
    provider: Option<AdvisorProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BrandPatch {
    name: Option<String>,
    support_hours: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

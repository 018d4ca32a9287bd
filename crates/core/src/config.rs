use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub push: PushConfig,
    pub sms: SmsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SmsConfig {
    pub endpoint: Option<String>,
    pub sender: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
    None,
}

impl LlmProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            "none" => Some(Self::None),
            _ => None,
        }
    }
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://zapys.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::None,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            push: PushConfig { endpoint: None },
            sms: SmsConfig { endpoint: None, sender: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<FileDatabase>,
    llm: Option<FileLlm>,
    server: Option<FileServer>,
    push: Option<FilePush>,
    sms: Option<FileSms>,
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLlm {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FilePush {
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSms {
    endpoint: Option<String>,
    sender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Load order: defaults, then the optional TOML file, then `ZAPYS_*`
    /// environment variables, then programmatic overrides (used by tests).
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = options
            .config_path
            .clone()
            .or_else(|| env::var("ZAPYS_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("zapys.toml"));

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let file: FileConfig = toml::from_str(&raw)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                config.apply_file(file);
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(database) = file.database {
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
        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider.as_deref().and_then(LlmProvider::parse) {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }
        if let Some(server) = file.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }
        if let Some(push) = file.push {
            if push.endpoint.is_some() {
                self.push.endpoint = push.endpoint;
            }
        }
        if let Some(sms) = file.sms {
            if sms.endpoint.is_some() {
                self.sms.endpoint = sms.endpoint;
            }
            if sms.sender.is_some() {
                self.sms.sender = sms.sender;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("ZAPYS_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("ZAPYS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(value) = env::var("ZAPYS_LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride { key: "ZAPYS_LLM_PROVIDER".to_string(), value }
            })?;
        }
        if let Ok(api_key) = env::var("ZAPYS_LLM_API_KEY") {
            if !api_key.is_empty() {
                self.llm.api_key = Some(api_key.into());
            }
        }
        if let Ok(base_url) = env::var("ZAPYS_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Ok(model) = env::var("ZAPYS_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(value) = env::var("ZAPYS_PORT") {
            self.server.port = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "ZAPYS_PORT".to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if matches!(self.llm.provider, LlmProvider::OpenAi | LlmProvider::Anthropic)
            && self.llm.api_key.is_none()
        {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for provider {:?}",
                self.llm.provider
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    fn options_with_file(contents: &str) -> (tempfile::NamedTempFile, LoadOptions) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        let options = LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        };
        (file, options)
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let options = LoadOptions {
            config_path: Some(std::path::PathBuf::from("/nonexistent/zapys.toml")),
            require_file: false,
            ..LoadOptions::default()
        };
        let config = AppConfig::load(options).expect("load defaults");
        assert_eq!(config.database.url, "sqlite://zapys.db");
        assert_eq!(config.llm.provider, LlmProvider::None);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let options = LoadOptions {
            config_path: Some(std::path::PathBuf::from("/nonexistent/zapys.toml")),
            require_file: true,
            ..LoadOptions::default()
        };
        assert!(AppConfig::load(options).is_err());
    }

    #[test]
    fn file_values_override_defaults_and_overrides_win() {
        let (_file, mut options) = options_with_file(
            r#"
            [database]
            url = "sqlite://from-file.db"

            [llm]
            provider = "ollama"
            base_url = "http://localhost:11434"
            model = "llama3.1"
            "#,
        );
        options.overrides =
            ConfigOverrides { database_url: Some("sqlite::memory:".to_string()), ..Default::default() };

        let config = AppConfig::load(options).expect("load");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "llama3.1");
    }

    #[test]
    fn cloud_provider_without_key_fails_validation() {
        let (_file, options) = options_with_file(
            r#"
            [llm]
            provider = "openai"
            "#,
        );
        let error = AppConfig::load(options).err().expect("validation error");
        assert!(error.to_string().contains("llm.api_key"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub ai: AiConfig,
    pub payment: PaymentConfig,
    pub notifications: NotificationsConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub api_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub history_limit: usize,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    pub signing_secret: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub tenant_cache_ttl_secs: u64,
    pub default_session_timeout_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub gateway_api_token: Option<String>,
    pub ai_enabled: Option<bool>,
    pub ai_endpoint: Option<String>,
    pub server_port: Option<u16>,
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
                url: "sqlite://atende.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig { api_token: String::new().into() },
            ai: AiConfig {
                enabled: false,
                endpoint: None,
                api_key: None,
                model: "atende-assistant".to_string(),
                timeout_secs: 20,
                max_retries: 1,
                history_limit: 10,
            },
            payment: PaymentConfig { endpoint: None, api_key: None, timeout_secs: 15 },
            notifications: NotificationsConfig {
                webhook_url: None,
                signing_secret: None,
                timeout_secs: 10,
            },
            engine: EngineConfig {
                tenant_cache_ttl_secs: 300,
                default_session_timeout_minutes: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("atende.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Flat key/value view with secrets replaced by a presence marker.
    pub fn redacted_summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("database.url", self.database.url.clone()),
            ("database.max_connections", self.database.max_connections.to_string()),
            ("database.timeout_secs", self.database.timeout_secs.to_string()),
            ("gateway.api_token", redact(Some(&self.gateway.api_token))),
            ("ai.enabled", self.ai.enabled.to_string()),
            ("ai.endpoint", self.ai.endpoint.clone().unwrap_or_default()),
            ("ai.api_key", redact(self.ai.api_key.as_ref())),
            ("ai.model", self.ai.model.clone()),
            ("ai.history_limit", self.ai.history_limit.to_string()),
            ("payment.endpoint", self.payment.endpoint.clone().unwrap_or_default()),
            ("payment.api_key", redact(self.payment.api_key.as_ref())),
            (
                "notifications.webhook_url",
                self.notifications.webhook_url.clone().unwrap_or_default(),
            ),
            ("notifications.signing_secret", redact(self.notifications.signing_secret.as_ref())),
            ("engine.tenant_cache_ttl_secs", self.engine.tenant_cache_ttl_secs.to_string()),
            (
                "engine.default_session_timeout_minutes",
                self.engine.default_session_timeout_minutes.to_string(),
            ),
            ("server.bind_address", self.server.bind_address.clone()),
            ("server.port", self.server.port.to_string()),
            ("logging.level", self.logging.level.clone()),
            ("logging.format", self.logging.format.as_str().to_string()),
        ]
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

        if let Some(gateway) = patch.gateway {
            if let Some(api_token) = gateway.api_token {
                self.gateway.api_token = secret_value(api_token);
            }
        }

        if let Some(ai) = patch.ai {
            if let Some(enabled) = ai.enabled {
                self.ai.enabled = enabled;
            }
            if let Some(endpoint) = ai.endpoint {
                self.ai.endpoint = Some(endpoint);
            }
            if let Some(api_key) = ai.api_key {
                self.ai.api_key = Some(secret_value(api_key));
            }
            if let Some(model) = ai.model {
                self.ai.model = model;
            }
            if let Some(timeout_secs) = ai.timeout_secs {
                self.ai.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = ai.max_retries {
                self.ai.max_retries = max_retries;
            }
            if let Some(history_limit) = ai.history_limit {
                self.ai.history_limit = history_limit;
            }
        }

        if let Some(payment) = patch.payment {
            if let Some(endpoint) = payment.endpoint {
                self.payment.endpoint = Some(endpoint);
            }
            if let Some(api_key) = payment.api_key {
                self.payment.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = payment.timeout_secs {
                self.payment.timeout_secs = timeout_secs;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
            if let Some(signing_secret) = notifications.signing_secret {
                self.notifications.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(ttl) = engine.tenant_cache_ttl_secs {
                self.engine.tenant_cache_ttl_secs = ttl;
            }
            if let Some(timeout) = engine.default_session_timeout_minutes {
                self.engine.default_session_timeout_minutes = timeout;
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
        if let Some(value) = read_env("ATENDE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ATENDE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ATENDE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ATENDE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ATENDE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDE_GATEWAY_API_TOKEN") {
            self.gateway.api_token = secret_value(value);
        }

        if let Some(value) = read_env("ATENDE_AI_ENABLED") {
            self.ai.enabled = parse_bool("ATENDE_AI_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ATENDE_AI_ENDPOINT") {
            self.ai.endpoint = Some(value);
        }
        if let Some(value) = read_env("ATENDE_AI_API_KEY") {
            self.ai.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ATENDE_AI_MODEL") {
            self.ai.model = value;
        }
        if let Some(value) = read_env("ATENDE_AI_TIMEOUT_SECS") {
            self.ai.timeout_secs = parse_u64("ATENDE_AI_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ATENDE_AI_MAX_RETRIES") {
            self.ai.max_retries = parse_u32("ATENDE_AI_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ATENDE_AI_HISTORY_LIMIT") {
            self.ai.history_limit = parse_u32("ATENDE_AI_HISTORY_LIMIT", &value)? as usize;
        }

        if let Some(value) = read_env("ATENDE_PAYMENT_ENDPOINT") {
            self.payment.endpoint = Some(value);
        }
        if let Some(value) = read_env("ATENDE_PAYMENT_API_KEY") {
            self.payment.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ATENDE_PAYMENT_TIMEOUT_SECS") {
            self.payment.timeout_secs = parse_u64("ATENDE_PAYMENT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDE_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("ATENDE_NOTIFICATIONS_SIGNING_SECRET") {
            self.notifications.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("ATENDE_NOTIFICATIONS_TIMEOUT_SECS") {
            self.notifications.timeout_secs =
                parse_u64("ATENDE_NOTIFICATIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDE_ENGINE_TENANT_CACHE_TTL_SECS") {
            self.engine.tenant_cache_ttl_secs =
                parse_u64("ATENDE_ENGINE_TENANT_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ATENDE_ENGINE_DEFAULT_SESSION_TIMEOUT_MINUTES") {
            self.engine.default_session_timeout_minutes =
                parse_u32("ATENDE_ENGINE_DEFAULT_SESSION_TIMEOUT_MINUTES", &value)?;
        }

        if let Some(value) = read_env("ATENDE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ATENDE_SERVER_PORT") {
            self.server.port = parse_u16("ATENDE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ATENDE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ATENDE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("ATENDE_LOGGING_LEVEL").or_else(|| read_env("ATENDE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ATENDE_LOGGING_FORMAT").or_else(|| read_env("ATENDE_LOG_FORMAT"));
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
        if let Some(api_token) = overrides.gateway_api_token {
            self.gateway.api_token = secret_value(api_token);
        }
        if let Some(enabled) = overrides.ai_enabled {
            self.ai.enabled = enabled;
        }
        if let Some(endpoint) = overrides.ai_endpoint {
            self.ai.endpoint = Some(endpoint);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_ai(&self.ai)?;
        validate_payment(&self.payment)?;
        validate_notifications(&self.notifications)?;
        validate_engine(&self.engine)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret {
        Some(value) if !value.expose_secret().is_empty() => "<redacted>".to_string(),
        _ => "<unset>".to_string(),
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("atende.toml"), PathBuf::from("config/atende.toml")]
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

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    let token = gateway.api_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.api_token is required; the transport adapter sends it as a bearer token"
                .to_string(),
        ));
    }
    if token.len() < 16 {
        return Err(ConfigError::Validation(
            "gateway.api_token must be at least 16 characters long".to_string(),
        ));
    }

    Ok(())
}

fn validate_ai(ai: &AiConfig) -> Result<(), ConfigError> {
    if ai.timeout_secs == 0 || ai.timeout_secs > 300 {
        return Err(ConfigError::Validation("ai.timeout_secs must be in range 1..=300".to_string()));
    }
    if ai.history_limit == 0 || ai.history_limit > 100 {
        return Err(ConfigError::Validation(
            "ai.history_limit must be in range 1..=100".to_string(),
        ));
    }

    if ai.enabled {
        match ai.endpoint.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ConfigError::Validation(
                    "ai.endpoint is required when ai.enabled is true".to_string(),
                ));
            }
            Some(endpoint) => validate_http_url("ai.endpoint", endpoint)?,
        }
    }

    Ok(())
}

fn validate_payment(payment: &PaymentConfig) -> Result<(), ConfigError> {
    if payment.timeout_secs == 0 || payment.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "payment.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if let Some(endpoint) = &payment.endpoint {
        validate_http_url("payment.endpoint", endpoint)?;
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if notifications.timeout_secs == 0 || notifications.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=60".to_string(),
        ));
    }
    if let Some(webhook_url) = &notifications.webhook_url {
        validate_http_url("notifications.webhook_url", webhook_url)?;
        let has_secret = notifications
            .signing_secret
            .as_ref()
            .map(|secret| !secret.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if !has_secret {
            return Err(ConfigError::Validation(
                "notifications.signing_secret is required when notifications.webhook_url is set"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.tenant_cache_ttl_secs == 0 || engine.tenant_cache_ttl_secs > 3600 {
        return Err(ConfigError::Validation(
            "engine.tenant_cache_ttl_secs must be in range 1..=3600".to_string(),
        ));
    }
    if engine.default_session_timeout_minutes == 0 {
        return Err(ConfigError::Validation(
            "engine.default_session_timeout_minutes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    ai: Option<AiPatch>,
    payment: Option<PaymentPatch>,
    notifications: Option<NotificationsPatch>,
    engine: Option<EnginePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AiPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    webhook_url: Option<String>,
    signing_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    tenant_cache_ttl_secs: Option<u64>,
    default_session_timeout_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const VALID_TOKEN: &str = "gateway-token-0123456789";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ATENDE_GATEWAY_TOKEN", VALID_TOKEN);
        env::set_var("TEST_ATENDE_SIGNING_SECRET", "whsec-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("atende.toml");
            fs::write(
                &path,
                r#"
[gateway]
api_token = "${TEST_ATENDE_GATEWAY_TOKEN}"

[notifications]
webhook_url = "https://hooks.example.com/atende"
signing_secret = "${TEST_ATENDE_SIGNING_SECRET}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.api_token.expose_secret() == VALID_TOKEN,
                "gateway token should be loaded from environment",
            )?;
            ensure(
                config
                    .notifications
                    .signing_secret
                    .as_ref()
                    .map(|secret| secret.expose_secret() == "whsec-from-env")
                    .unwrap_or(false),
                "signing secret should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_ATENDE_GATEWAY_TOKEN", "TEST_ATENDE_SIGNING_SECRET"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("atende.toml");
        fs::write(&path, "[gateway]\napi_token = \"${ATENDE_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        let named = matches!(
            error,
            ConfigError::MissingEnvInterpolation { ref var } if var.starts_with("ATENDE_TEST_UNSET")
        );
        ensure(named, "error should name the missing variable")
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATENDE_GATEWAY_API_TOKEN", VALID_TOKEN);
        env::set_var("ATENDE_LOG_LEVEL", "warn");
        env::set_var("ATENDE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["ATENDE_GATEWAY_API_TOKEN", "ATENDE_LOG_LEVEL", "ATENDE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATENDE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ATENDE_ENGINE_TENANT_CACHE_TTL_SECS", "60");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("atende.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[gateway]
api_token = "gateway-token-from-file"

[engine]
tenant_cache_ttl_secs = 120
default_session_timeout_minutes = 45

[server]
port = 9090

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.engine.tenant_cache_ttl_secs == 60, "env ttl should win over file")?;
            ensure(
                config.engine.default_session_timeout_minutes == 45,
                "file session timeout should win over defaults",
            )?;
            ensure(config.server.port == 9090, "file port should win over defaults")?;
            ensure(
                config.gateway.api_token.expose_secret() == "gateway-token-from-file",
                "file gateway token should be used when env is unset",
            )?;
            Ok(())
        })();

        clear_vars(&["ATENDE_DATABASE_URL", "ATENDE_ENGINE_TENANT_CACHE_TTL_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let missing_token = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure for missing token".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(
                missing_token,
                ConfigError::Validation(ref message) if message.contains("gateway.api_token")
            ),
            "validation failure should mention gateway.api_token",
        )?;

        env::set_var("ATENDE_GATEWAY_API_TOKEN", VALID_TOKEN);
        env::set_var("ATENDE_AI_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure for ai endpoint".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("ai.endpoint")
                ),
                "validation failure should mention ai.endpoint",
            )
        })();

        clear_vars(&["ATENDE_GATEWAY_API_TOKEN", "ATENDE_AI_ENABLED"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATENDE_GATEWAY_API_TOKEN", VALID_TOKEN);
        env::set_var("ATENDE_SERVER_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "ATENDE_SERVER_PORT", "error should name ATENDE_SERVER_PORT")
            }
            Err(_) => Err("expected an invalid env override error".to_string()),
        };

        clear_vars(&["ATENDE_GATEWAY_API_TOKEN", "ATENDE_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug_or_summary() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATENDE_GATEWAY_API_TOKEN", "gateway-secret-value-xyz");
        env::set_var("ATENDE_PAYMENT_API_KEY", "payment-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let summary = format!("{:?}", config.redacted_summary());

            ensure(
                !debug.contains("gateway-secret-value-xyz"),
                "debug output should not contain the gateway token",
            )?;
            ensure(
                !debug.contains("payment-secret-value"),
                "debug output should not contain the payment key",
            )?;
            ensure(
                !summary.contains("gateway-secret-value-xyz") && summary.contains("<redacted>"),
                "summary should redact secrets",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["ATENDE_GATEWAY_API_TOKEN", "ATENDE_PAYMENT_API_KEY"]);
        result
    }
}

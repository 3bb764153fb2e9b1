use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tool::ToolCategory;
use crate::rate_limit::{default_category_limits, CategoryLimit};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub provider: ProviderConfig,
    pub conversation: ConversationConfig,
    pub intent: IntentConfig,
    pub dispatch: DispatchConfig,
    pub rate_limits: BTreeMap<ToolCategory, CategoryLimit>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub ttl_secs: u64,
}

/// Tuning knobs for intent disambiguation.
#[derive(Clone, Debug, PartialEq)]
pub struct IntentConfig {
    /// A runner-up match above this confidence makes the result ambiguous.
    pub ambiguity_threshold: f64,
    /// Patterns at least this long earn the specificity bonus.
    pub specificity_min_len: usize,
    pub specificity_bonus: f64,
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub tool_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
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
    pub store_backend: Option<StoreBackend>,
    pub store_url: Option<String>,
    pub provider_base_url: Option<String>,
    pub provider_api_token: Option<String>,
    pub conversation_ttl_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
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

impl Default for IntentConfig {
    fn default() -> Self {
        Self { ambiguity_threshold: 0.7, specificity_min_len: 20, specificity_bonus: 0.1 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::Memory,
                url: "sqlite://workdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            provider: ProviderConfig { base_url: None, api_token: None, timeout_secs: 20 },
            conversation: ConversationConfig { ttl_secs: 1800 },
            intent: IntentConfig::default(),
            dispatch: DispatchConfig { tool_timeout_secs: 30 },
            rate_limits: default_category_limits(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ConversationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl DispatchConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported store backend `{other}` (expected memory|sqlite)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("workdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn limit_for(&self, category: ToolCategory) -> Option<CategoryLimit> {
        self.rate_limits.get(&category).copied()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(backend) = store.backend {
                self.store.backend = backend;
            }
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(provider) = patch.provider {
            if let Some(base_url) = provider.base_url {
                self.provider.base_url = Some(base_url);
            }
            if let Some(provider_api_token_value) = provider.api_token {
                self.provider.api_token = Some(secret_value(provider_api_token_value));
            }
            if let Some(timeout_secs) = provider.timeout_secs {
                self.provider.timeout_secs = timeout_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(ttl_secs) = conversation.ttl_secs {
                self.conversation.ttl_secs = ttl_secs;
            }
        }

        if let Some(intent) = patch.intent {
            if let Some(ambiguity_threshold) = intent.ambiguity_threshold {
                self.intent.ambiguity_threshold = ambiguity_threshold;
            }
            if let Some(specificity_min_len) = intent.specificity_min_len {
                self.intent.specificity_min_len = specificity_min_len;
            }
            if let Some(specificity_bonus) = intent.specificity_bonus {
                self.intent.specificity_bonus = specificity_bonus;
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(tool_timeout_secs) = dispatch.tool_timeout_secs {
                self.dispatch.tool_timeout_secs = tool_timeout_secs;
            }
        }

        if let Some(rate_limits) = patch.rate_limits {
            for (category, limit_patch) in rate_limits {
                let current = self
                    .rate_limits
                    .get(&category)
                    .copied()
                    .unwrap_or(CategoryLimit::new(0, 3600));
                self.rate_limits.insert(
                    category,
                    CategoryLimit::new(
                        limit_patch.limit.unwrap_or(current.limit),
                        limit_patch.window_secs.unwrap_or(current.window_secs),
                    ),
                );
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
        if let Some(value) = read_env("WORKDESK_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        if let Some(value) = read_env("WORKDESK_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env("WORKDESK_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("WORKDESK_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WORKDESK_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("WORKDESK_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKDESK_PROVIDER_BASE_URL") {
            self.provider.base_url = Some(value);
        }
        if let Some(value) = read_env("WORKDESK_PROVIDER_API_TOKEN") {
            self.provider.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("WORKDESK_PROVIDER_TIMEOUT_SECS") {
            self.provider.timeout_secs = parse_u64("WORKDESK_PROVIDER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKDESK_CONVERSATION_TTL_SECS") {
            self.conversation.ttl_secs = parse_u64("WORKDESK_CONVERSATION_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKDESK_INTENT_AMBIGUITY_THRESHOLD") {
            self.intent.ambiguity_threshold =
                parse_f64("WORKDESK_INTENT_AMBIGUITY_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("WORKDESK_INTENT_SPECIFICITY_MIN_LEN") {
            self.intent.specificity_min_len =
                parse_usize("WORKDESK_INTENT_SPECIFICITY_MIN_LEN", &value)?;
        }
        if let Some(value) = read_env("WORKDESK_INTENT_SPECIFICITY_BONUS") {
            self.intent.specificity_bonus =
                parse_f64("WORKDESK_INTENT_SPECIFICITY_BONUS", &value)?;
        }

        if let Some(value) = read_env("WORKDESK_DISPATCH_TOOL_TIMEOUT_SECS") {
            self.dispatch.tool_timeout_secs =
                parse_u64("WORKDESK_DISPATCH_TOOL_TIMEOUT_SECS", &value)?;
        }

        for category in ToolCategory::ALL {
            let upper = category.as_str().to_ascii_uppercase();
            let limit_key = format!("WORKDESK_RATE_LIMIT_{upper}_LIMIT");
            let window_key = format!("WORKDESK_RATE_LIMIT_{upper}_WINDOW_SECS");
            let limit = read_env(&limit_key).map(|value| parse_u32(&limit_key, &value)).transpose()?;
            let window =
                read_env(&window_key).map(|value| parse_u64(&window_key, &value)).transpose()?;
            if limit.is_none() && window.is_none() {
                continue;
            }

            let current =
                self.rate_limits.get(&category).copied().unwrap_or(CategoryLimit::new(0, 3600));
            self.rate_limits.insert(
                category,
                CategoryLimit::new(
                    limit.unwrap_or(current.limit),
                    window.unwrap_or(current.window_secs),
                ),
            );
        }

        let log_level =
            read_env("WORKDESK_LOGGING_LEVEL").or_else(|| read_env("WORKDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WORKDESK_LOGGING_FORMAT").or_else(|| read_env("WORKDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.store_backend {
            self.store.backend = backend;
        }
        if let Some(url) = overrides.store_url {
            self.store.url = url;
        }
        if let Some(base_url) = overrides.provider_base_url {
            self.provider.base_url = Some(base_url);
        }
        if let Some(api_token) = overrides.provider_api_token {
            self.provider.api_token = Some(secret_value(api_token));
        }
        if let Some(ttl_secs) = overrides.conversation_ttl_secs {
            self.conversation.ttl_secs = ttl_secs;
        }
        if let Some(tool_timeout_secs) = overrides.tool_timeout_secs {
            self.dispatch.tool_timeout_secs = tool_timeout_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_provider(&self.provider)?;
        validate_conversation(&self.conversation)?;
        validate_intent(&self.intent)?;
        validate_dispatch(&self.dispatch)?;
        validate_rate_limits(&self.rate_limits)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("workdesk.toml"), PathBuf::from("config/workdesk.toml")]
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

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.backend == StoreBackend::Sqlite {
        let url = store.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "store.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    // every pooled connection to an in-memory URL opens its own empty database
    if store.backend == StoreBackend::Sqlite
        && is_in_memory_sqlite(&store.url)
        && store.max_connections > 1
    {
        return Err(ConfigError::Validation(
            "store.max_connections must be 1 for an in-memory sqlite url".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

pub fn is_in_memory_sqlite(url: &str) -> bool {
    let url = url.trim();
    url == ":memory:" || url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

fn validate_provider(provider: &ProviderConfig) -> Result<(), ConfigError> {
    if provider.timeout_secs == 0 || provider.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "provider.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(base_url) = &provider.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "provider.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    let has_token = provider
        .api_token
        .as_ref()
        .map(|value| !value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if has_token && provider.base_url.is_none() {
        return Err(ConfigError::Validation(
            "provider.api_token is set but provider.base_url is missing".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_intent(intent: &IntentConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&intent.ambiguity_threshold) {
        return Err(ConfigError::Validation(
            "intent.ambiguity_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&intent.specificity_bonus) {
        return Err(ConfigError::Validation(
            "intent.specificity_bonus must be in range 0.0..=1.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.tool_timeout_secs == 0 || dispatch.tool_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dispatch.tool_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_rate_limits(
    rate_limits: &BTreeMap<ToolCategory, CategoryLimit>,
) -> Result<(), ConfigError> {
    for (category, limit) in rate_limits {
        if limit.window_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "rate_limits.{category}.window_secs must be greater than zero"
            )));
        }
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    provider: Option<ProviderPatch>,
    conversation: Option<ConversationPatch>,
    intent: Option<IntentPatch>,
    dispatch: Option<DispatchPatch>,
    rate_limits: Option<BTreeMap<ToolCategory, RateLimitPatch>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    backend: Option<StoreBackend>,
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentPatch {
    ambiguity_threshold: Option<f64>,
    specificity_min_len: Option<usize>,
    specificity_bonus: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    tool_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    limit: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use workdesk_core::config::{AppConfig, LoadOptions};

struct Attribution {
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

impl Attribution {
    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        let source = field_source(key_path, env_keys, self.file_doc.as_ref(), self.file_path.as_deref());
        format!("- {key_path} = {value} (source: {source})")
    }
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path(options.config_path.as_deref());
    let attribution =
        Attribution { file_doc: load_config_file_doc(file_path.as_deref()), file_path };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(attribution.line(
        "store.backend",
        &format!("{:?}", config.store.backend),
        &["WORKDESK_STORE_BACKEND"],
    ));
    lines.push(attribution.line("store.url", &config.store.url, &["WORKDESK_STORE_URL"]));
    lines.push(attribution.line(
        "store.max_connections",
        &config.store.max_connections.to_string(),
        &["WORKDESK_STORE_MAX_CONNECTIONS"],
    ));
    lines.push(attribution.line(
        "store.timeout_secs",
        &config.store.timeout_secs.to_string(),
        &["WORKDESK_STORE_TIMEOUT_SECS"],
    ));

    lines.push(attribution.line(
        "provider.base_url",
        config.provider.base_url.as_deref().unwrap_or("<unset> (dry-run)"),
        &["WORKDESK_PROVIDER_BASE_URL"],
    ));
    let api_token = config
        .provider
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(attribution.line("provider.api_token", &api_token, &["WORKDESK_PROVIDER_API_TOKEN"]));
    lines.push(attribution.line(
        "provider.timeout_secs",
        &config.provider.timeout_secs.to_string(),
        &["WORKDESK_PROVIDER_TIMEOUT_SECS"],
    ));

    lines.push(attribution.line(
        "conversation.ttl_secs",
        &config.conversation.ttl_secs.to_string(),
        &["WORKDESK_CONVERSATION_TTL_SECS"],
    ));
    lines.push(attribution.line(
        "intent.ambiguity_threshold",
        &config.intent.ambiguity_threshold.to_string(),
        &["WORKDESK_INTENT_AMBIGUITY_THRESHOLD"],
    ));
    lines.push(attribution.line(
        "intent.specificity_min_len",
        &config.intent.specificity_min_len.to_string(),
        &["WORKDESK_INTENT_SPECIFICITY_MIN_LEN"],
    ));
    lines.push(attribution.line(
        "intent.specificity_bonus",
        &config.intent.specificity_bonus.to_string(),
        &["WORKDESK_INTENT_SPECIFICITY_BONUS"],
    ));
    lines.push(attribution.line(
        "dispatch.tool_timeout_secs",
        &config.dispatch.tool_timeout_secs.to_string(),
        &["WORKDESK_DISPATCH_TOOL_TIMEOUT_SECS"],
    ));

    for (category, limit) in &config.rate_limits {
        let upper = category.as_str().to_ascii_uppercase();
        let limit_env = format!("WORKDESK_RATE_LIMIT_{upper}_LIMIT");
        let window_env = format!("WORKDESK_RATE_LIMIT_{upper}_WINDOW_SECS");
        lines.push(attribution.line(
            &format!("rate_limits.{}.limit", category.as_str()),
            &limit.limit.to_string(),
            &[limit_env.as_str()],
        ));
        lines.push(attribution.line(
            &format!("rate_limits.{}.window_secs", category.as_str()),
            &limit.window_secs.to_string(),
            &[window_env.as_str()],
        ));
    }

    lines.push(attribution.line(
        "logging.level",
        &config.logging.level,
        &["WORKDESK_LOGGING_LEVEL", "WORKDESK_LOG_LEVEL"],
    ));
    lines.push(attribution.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["WORKDESK_LOGGING_FORMAT", "WORKDESK_LOG_FORMAT"],
    ));

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    ["workdesk.toml", "config/workdesk.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("wdk-123456"), "wdk-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_through_nested_tables() {
        let doc = "[rate_limits.support]\nlimit = 3\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "rate_limits.support.limit"));
        assert!(!contains_path(&doc, "rate_limits.support.window_secs"));
    }
}

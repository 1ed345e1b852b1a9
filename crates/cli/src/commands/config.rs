use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use atende_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Effective configuration, one line per key, with secrets redacted and the layer each
/// value came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in config.redacted_summary() {
        let env_key = env_key_for(key);
        let source =
            field_source(key, &env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        let value = if value.is_empty() { "<unset>".to_string() } else { value };
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

/// `ai.api_key` is overridden by `ATENDE_AI_API_KEY`.
fn env_key_for(key_path: &str) -> String {
    format!("ATENDE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    ["atende.toml", "config/atende.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

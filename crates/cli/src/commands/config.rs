use std::path::Path;

use secrecy::ExposeSecret;

use rudder_core::config::{AppConfig, LogFormat};

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let api_key = match &config.llm.api_key {
        Some(key) => redact_secret(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let format = match config.logging.format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        format!("  database.url = {}", config.database.url),
        format!("  database.max_connections = {}", config.database.max_connections),
        format!("  database.timeout_secs = {}", config.database.timeout_secs),
        format!(
            "  llm.base_url = {}",
            config.llm.base_url.as_deref().unwrap_or("<default: https://api.openai.com/v1>")
        ),
        format!("  llm.model = {}", config.llm.model),
        format!("  llm.api_key = {api_key}"),
        format!("  llm.timeout_secs = {}", config.llm.timeout_secs),
        format!("  logging.level = {}", config.logging.level),
        format!("  logging.format = {format}"),
    ];
    lines.join("\n")
}

fn redact_secret(secret: &str) -> String {
    if secret.len() <= 8 {
        "<set>".to_string()
    } else {
        let prefix: String = secret.chars().take(4).collect();
        format!("{prefix}…<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::redact_secret;

    #[test]
    fn short_secrets_never_leak_a_prefix() {
        assert_eq!(redact_secret("sk-12345"), "<set>");
    }

    #[test]
    fn long_secrets_keep_an_identifying_prefix_only() {
        let redacted = redact_secret("sk-abcdefghijklmnop");
        assert!(redacted.starts_with("sk-a"));
        assert!(!redacted.contains("efghijklmnop"));
    }
}

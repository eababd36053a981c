use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use intentdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in effective_values(&config) {
        let source =
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    let asset_source = if config.assets.is_empty() { "built-in" } else { "file" };
    lines.push(format!(
        "- assets = {} configured override(s) (source: {asset_source})",
        config.assets.len()
    ));

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, Option<&'static str>)> {
    let credentials = config
        .account
        .credentials_file
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let cap = |value: Option<rust_decimal::Decimal>| {
        value.map(|value| value.normalize().to_string()).unwrap_or_else(|| "<unset>".to_string())
    };

    vec![
        ("account.credentials_file", credentials, Some("INTENTDESK_ACCOUNT_CREDENTIALS_FILE")),
        (
            "account.min_balance",
            config.account.min_balance.normalize().to_string(),
            Some("INTENTDESK_ACCOUNT_MIN_BALANCE"),
        ),
        ("network.rpc_url", config.network.rpc_url.clone(), Some("INTENTDESK_NETWORK_RPC_URL")),
        (
            "network.timeout_secs",
            config.network.timeout_secs.to_string(),
            Some("INTENTDESK_NETWORK_TIMEOUT_SECS"),
        ),
        ("solver_bus.url", config.solver_bus.url.clone(), Some("INTENTDESK_SOLVER_BUS_URL")),
        (
            "solver_bus.timeout_secs",
            config.solver_bus.timeout_secs.to_string(),
            Some("INTENTDESK_SOLVER_BUS_TIMEOUT_SECS"),
        ),
        (
            "intents.verifying_contract",
            config.intents.verifying_contract.clone(),
            Some("INTENTDESK_INTENTS_VERIFYING_CONTRACT"),
        ),
        (
            "intents.gas_limit",
            config.intents.gas_limit.to_string(),
            Some("INTENTDESK_INTENTS_GAS_LIMIT"),
        ),
        (
            "intents.storage_deposit_yocto",
            config.intents.storage_deposit_yocto.to_string(),
            Some("INTENTDESK_INTENTS_STORAGE_DEPOSIT_YOCTO"),
        ),
        (
            "intents.quote_validity_ms",
            config.intents.quote_validity_ms.to_string(),
            Some("INTENTDESK_INTENTS_QUOTE_VALIDITY_MS"),
        ),
        (
            "intents.min_deadline_ms",
            config.intents.min_deadline_ms.to_string(),
            Some("INTENTDESK_INTENTS_MIN_DEADLINE_MS"),
        ),
        ("llm.provider", format!("{:?}", config.llm.provider), Some("INTENTDESK_LLM_PROVIDER")),
        ("llm.model", config.llm.model.clone(), Some("INTENTDESK_LLM_MODEL")),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("INTENTDESK_LLM_BASE_URL"),
        ),
        ("llm.api_key", api_key, Some("INTENTDESK_LLM_API_KEY")),
        (
            "guardrails.max_swap_amount",
            cap(config.guardrails.max_swap_amount),
            Some("INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT"),
        ),
        (
            "guardrails.max_deposit_amount",
            cap(config.guardrails.max_deposit_amount),
            Some("INTENTDESK_GUARDRAILS_MAX_DEPOSIT_AMOUNT"),
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            Some("INTENTDESK_SERVER_BIND_ADDRESS"),
        ),
        ("server.port", config.server.port.to_string(), Some("INTENTDESK_SERVER_PORT")),
        ("logging.level", config.logging.level.clone(), Some("INTENTDESK_LOGGING_LEVEL")),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            Some("INTENTDESK_LOGGING_FORMAT"),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("intentdesk.toml"), PathBuf::from("config/intentdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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
    fn api_keys_keep_only_their_prefix() {
        assert_eq!(redact_token("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_into_nested_tables() {
        let doc: toml::Value = "[intents]\nverifying_contract = \"intents.near\"\n"
            .parse()
            .expect("toml parses");

        assert!(contains_path(&doc, "intents.verifying_contract"));
        assert!(!contains_path(&doc, "intents.gas_limit"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::MinorUnits;
use crate::assets::AssetDescriptor;

pub const DEFAULT_RPC_URL: &str = "https://rpc.mainnet.near.org";
pub const DEFAULT_SOLVER_BUS_URL: &str = "https://solver-relay-v2.chaindefuser.com/rpc";
pub const DEFAULT_VERIFYING_CONTRACT: &str = "intents.near";
/// 300 Tgas, attached to every function call.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000_000_000_000;
pub const DEFAULT_STORAGE_DEPOSIT: MinorUnits = MinorUnits(1_250_000_000_000_000_000_000);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub network: NetworkConfig,
    pub solver_bus: SolverBusConfig,
    pub intents: IntentsConfig,
    pub llm: LlmConfig,
    pub guardrails: GuardrailsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub assets: Vec<AssetDescriptor>,
}

#[derive(Clone, Debug)]
pub struct AccountConfig {
    pub credentials_file: Option<PathBuf>,
    /// Startup refuses to run below this native balance.
    pub min_balance: Decimal,
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SolverBusConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IntentsConfig {
    pub verifying_contract: String,
    pub gas_limit: u64,
    pub storage_deposit_yocto: MinorUnits,
    pub quote_validity_ms: u64,
    pub min_deadline_ms: u64,
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
pub struct GuardrailsConfig {
    pub max_swap_amount: Option<Decimal>,
    pub max_deposit_amount: Option<Decimal>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    /// Deterministic keyword interpretation, no remote service.
    Keyword,
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
    pub credentials_file: Option<PathBuf>,
    pub rpc_url: Option<String>,
    pub solver_bus_url: Option<String>,
    pub verifying_contract: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
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
            account: AccountConfig { credentials_file: None, min_balance: Decimal::new(1, 1) },
            network: NetworkConfig { rpc_url: DEFAULT_RPC_URL.to_string(), timeout_secs: 5 },
            solver_bus: SolverBusConfig {
                url: DEFAULT_SOLVER_BUS_URL.to_string(),
                timeout_secs: 5,
            },
            intents: IntentsConfig {
                verifying_contract: DEFAULT_VERIFYING_CONTRACT.to_string(),
                gas_limit: DEFAULT_GAS_LIMIT,
                storage_deposit_yocto: DEFAULT_STORAGE_DEPOSIT,
                quote_validity_ms: 120_000,
                min_deadline_ms: 60_000,
            },
            llm: LlmConfig {
                provider: LlmProvider::Keyword,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            guardrails: GuardrailsConfig { max_swap_amount: None, max_deposit_amount: None },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 5000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            assets: Vec::new(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "keyword" => Ok(Self::Keyword),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|keyword)"
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("intentdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(account) = patch.account {
            if let Some(credentials_file) = account.credentials_file {
                self.account.credentials_file = Some(credentials_file);
            }
            if let Some(min_balance) = account.min_balance {
                self.account.min_balance = min_balance;
            }
        }

        if let Some(network) = patch.network {
            if let Some(rpc_url) = network.rpc_url {
                self.network.rpc_url = rpc_url;
            }
            if let Some(timeout_secs) = network.timeout_secs {
                self.network.timeout_secs = timeout_secs;
            }
        }

        if let Some(solver_bus) = patch.solver_bus {
            if let Some(url) = solver_bus.url {
                self.solver_bus.url = url;
            }
            if let Some(timeout_secs) = solver_bus.timeout_secs {
                self.solver_bus.timeout_secs = timeout_secs;
            }
        }

        if let Some(intents) = patch.intents {
            if let Some(verifying_contract) = intents.verifying_contract {
                self.intents.verifying_contract = verifying_contract;
            }
            if let Some(gas_limit) = intents.gas_limit {
                self.intents.gas_limit = gas_limit;
            }
            if let Some(storage_deposit_yocto) = intents.storage_deposit_yocto {
                self.intents.storage_deposit_yocto = storage_deposit_yocto;
            }
            if let Some(quote_validity_ms) = intents.quote_validity_ms {
                self.intents.quote_validity_ms = quote_validity_ms;
            }
            if let Some(min_deadline_ms) = intents.min_deadline_ms {
                self.intents.min_deadline_ms = min_deadline_ms;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
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

        if let Some(guardrails) = patch.guardrails {
            if let Some(max_swap_amount) = guardrails.max_swap_amount {
                self.guardrails.max_swap_amount = Some(max_swap_amount);
            }
            if let Some(max_deposit_amount) = guardrails.max_deposit_amount {
                self.guardrails.max_deposit_amount = Some(max_deposit_amount);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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

        if let Some(assets) = patch.assets {
            self.assets = assets.into_iter().map(AssetPatch::into_descriptor).collect();
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INTENTDESK_ACCOUNT_CREDENTIALS_FILE") {
            self.account.credentials_file = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("INTENTDESK_ACCOUNT_MIN_BALANCE") {
            self.account.min_balance = parse_decimal("INTENTDESK_ACCOUNT_MIN_BALANCE", &value)?;
        }

        if let Some(value) = read_env("INTENTDESK_NETWORK_RPC_URL") {
            self.network.rpc_url = value;
        }
        if let Some(value) = read_env("INTENTDESK_NETWORK_TIMEOUT_SECS") {
            self.network.timeout_secs = parse_u64("INTENTDESK_NETWORK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTENTDESK_SOLVER_BUS_URL") {
            self.solver_bus.url = value;
        }
        if let Some(value) = read_env("INTENTDESK_SOLVER_BUS_TIMEOUT_SECS") {
            self.solver_bus.timeout_secs =
                parse_u64("INTENTDESK_SOLVER_BUS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTENTDESK_INTENTS_VERIFYING_CONTRACT") {
            self.intents.verifying_contract = value;
        }
        if let Some(value) = read_env("INTENTDESK_INTENTS_GAS_LIMIT") {
            self.intents.gas_limit = parse_u64("INTENTDESK_INTENTS_GAS_LIMIT", &value)?;
        }
        if let Some(value) = read_env("INTENTDESK_INTENTS_STORAGE_DEPOSIT_YOCTO") {
            self.intents.storage_deposit_yocto = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "INTENTDESK_INTENTS_STORAGE_DEPOSIT_YOCTO".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("INTENTDESK_INTENTS_QUOTE_VALIDITY_MS") {
            self.intents.quote_validity_ms =
                parse_u64("INTENTDESK_INTENTS_QUOTE_VALIDITY_MS", &value)?;
        }
        if let Some(value) = read_env("INTENTDESK_INTENTS_MIN_DEADLINE_MS") {
            self.intents.min_deadline_ms =
                parse_u64("INTENTDESK_INTENTS_MIN_DEADLINE_MS", &value)?;
        }

        if let Some(value) = read_env("INTENTDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("INTENTDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("INTENTDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("INTENTDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("INTENTDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("INTENTDESK_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT") {
            self.guardrails.max_swap_amount =
                Some(parse_decimal("INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT", &value)?);
        }
        if let Some(value) = read_env("INTENTDESK_GUARDRAILS_MAX_DEPOSIT_AMOUNT") {
            self.guardrails.max_deposit_amount =
                Some(parse_decimal("INTENTDESK_GUARDRAILS_MAX_DEPOSIT_AMOUNT", &value)?);
        }

        if let Some(value) = read_env("INTENTDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INTENTDESK_SERVER_PORT") {
            self.server.port = parse_u16("INTENTDESK_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("INTENTDESK_LOGGING_LEVEL").or_else(|| read_env("INTENTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTENTDESK_LOGGING_FORMAT").or_else(|| read_env("INTENTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(credentials_file) = overrides.credentials_file {
            self.account.credentials_file = Some(credentials_file);
        }
        if let Some(rpc_url) = overrides.rpc_url {
            self.network.rpc_url = rpc_url;
        }
        if let Some(solver_bus_url) = overrides.solver_bus_url {
            self.solver_bus.url = solver_bus_url;
        }
        if let Some(verifying_contract) = overrides.verifying_contract {
            self.intents.verifying_contract = verifying_contract;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_network(&self.network)?;
        validate_solver_bus(&self.solver_bus)?;
        validate_intents(&self.intents)?;
        validate_llm(&self.llm)?;
        validate_guardrails(&self.guardrails)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_assets(&self.assets)?;
        Ok(())
    }

    /// Credentials are only needed by commands that talk to the network.
    pub fn require_credentials_file(&self) -> Result<&Path, ConfigError> {
        self.account.credentials_file.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "account.credentials_file is required (set it in intentdesk.toml or \
                 INTENTDESK_ACCOUNT_CREDENTIALS_FILE)"
                    .to_string(),
            )
        })
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("intentdesk.toml"), PathBuf::from("config/intentdesk.toml")]
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

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https:// (got `{url}`)"
        )));
    }
    Ok(())
}

fn validate_timeout(field: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 120 {
        return Err(ConfigError::Validation(format!("{field} must be in range 1..=120")));
    }
    Ok(())
}

fn validate_network(network: &NetworkConfig) -> Result<(), ConfigError> {
    validate_url("network.rpc_url", &network.rpc_url)?;
    validate_timeout("network.timeout_secs", network.timeout_secs)
}

fn validate_solver_bus(solver_bus: &SolverBusConfig) -> Result<(), ConfigError> {
    validate_url("solver_bus.url", &solver_bus.url)?;
    validate_timeout("solver_bus.timeout_secs", solver_bus.timeout_secs)
}

fn validate_intents(intents: &IntentsConfig) -> Result<(), ConfigError> {
    if intents.verifying_contract.trim().is_empty() {
        return Err(ConfigError::Validation(
            "intents.verifying_contract must not be empty".to_string(),
        ));
    }

    if intents.gas_limit == 0 {
        return Err(ConfigError::Validation(
            "intents.gas_limit must be greater than zero".to_string(),
        ));
    }

    if intents.min_deadline_ms == 0 {
        return Err(ConfigError::Validation(
            "intents.min_deadline_ms must be greater than zero".to_string(),
        ));
    }

    if intents.quote_validity_ms <= intents.min_deadline_ms {
        return Err(ConfigError::Validation(format!(
            "intents.quote_validity_ms ({}) must exceed intents.min_deadline_ms ({}) so signed \
             quotes outlive the solver's minimum deadline",
            intents.quote_validity_ms, intents.min_deadline_ms
        )));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Keyword => {}
    }

    if let Some(base_url) = &llm.base_url {
        validate_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_guardrails(guardrails: &GuardrailsConfig) -> Result<(), ConfigError> {
    for (field, cap) in [
        ("guardrails.max_swap_amount", guardrails.max_swap_amount),
        ("guardrails.max_deposit_amount", guardrails.max_deposit_amount),
    ] {
        if matches!(cap, Some(value) if value <= Decimal::ZERO) {
            return Err(ConfigError::Validation(format!("{field} must be greater than zero")));
        }
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn validate_assets(assets: &[AssetDescriptor]) -> Result<(), ConfigError> {
    for asset in assets {
        if asset.symbol.trim().is_empty() || asset.contract_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "every [[assets]] entry needs a symbol and a contract_id".to_string(),
            ));
        }
        if asset.decimals > 38 {
            return Err(ConfigError::Validation(format!(
                "assets.{}.decimals must be at most 38",
                asset.symbol
            )));
        }
    }
    Ok(())
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    account: Option<AccountPatch>,
    network: Option<NetworkPatch>,
    solver_bus: Option<SolverBusPatch>,
    intents: Option<IntentsPatch>,
    llm: Option<LlmPatch>,
    guardrails: Option<GuardrailsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    assets: Option<Vec<AssetPatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountPatch {
    credentials_file: Option<PathBuf>,
    min_balance: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkPatch {
    rpc_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SolverBusPatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentsPatch {
    verifying_contract: Option<String>,
    gas_limit: Option<u64>,
    storage_deposit_yocto: Option<MinorUnits>,
    quote_validity_ms: Option<u64>,
    min_deadline_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailsPatch {
    max_swap_amount: Option<Decimal>,
    max_deposit_amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct AssetPatch {
    symbol: String,
    contract_id: String,
    decimals: u32,
    asset_id: Option<String>,
    bridged_contract_id: Option<String>,
}

impl AssetPatch {
    fn into_descriptor(self) -> AssetDescriptor {
        let mut descriptor = AssetDescriptor::fungible(self.symbol, self.contract_id, self.decimals);
        if let Some(asset_id) = self.asset_id {
            descriptor.asset_id = asset_id;
        }
        descriptor.bridged_contract_id = self.bridged_contract_id;
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
    use crate::amount::MinorUnits;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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
    fn defaults_match_mainnet_settlement() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.intents.verifying_contract == "intents.near", "default contract")?;
        ensure(config.intents.gas_limit == 300_000_000_000_000, "default gas is 300 Tgas")?;
        ensure(
            config.intents.storage_deposit_yocto == MinorUnits(1_250_000_000_000_000_000_000),
            "default storage deposit",
        )?;
        ensure(config.intents.quote_validity_ms == 120_000, "default validity window")?;
        ensure(config.solver_bus.timeout_secs == 5, "quote timeout defaults to a few seconds")?;
        ensure(config.llm.provider == LlmProvider::Keyword, "keyword interpreter by default")?;
        ensure(config.account.credentials_file.is_none(), "no credentials by default")?;
        ensure(config.require_credentials_file().is_err(), "credentials are demanded lazily")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_INTENTDESK_LLM_KEY", "sk-from-env");
        env::set_var("TEST_INTENTDESK_CREDENTIALS", "/secrets/alice.near.json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intentdesk.toml");
            fs::write(
                &path,
                r#"
[account]
credentials_file = "${TEST_INTENTDESK_CREDENTIALS}"

[llm]
provider = "openai"
api_key = "${TEST_INTENTDESK_LLM_KEY}"

[intents]
storage_deposit_yocto = "2000000000000000000000"

[[assets]]
symbol = "AURORA"
contract_id = "aaaaaa20d9e0e2461697782ef11675f668207961.factory.bridge.near"
decimals = 18
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.account.credentials_file
                    == Some(PathBuf::from("/secrets/alice.near.json")),
                "credentials path should be interpolated",
            )?;
            ensure(
                config.intents.storage_deposit_yocto
                    == MinorUnits(2_000_000_000_000_000_000_000),
                "storage deposit parses from a string",
            )?;
            ensure(
                config.assets.len() == 1
                    && config.assets[0].asset_id
                        == "nep141:aaaaaa20d9e0e2461697782ef11675f668207961.factory.bridge.near",
                "asset entries become descriptors",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_INTENTDESK_LLM_KEY", "TEST_INTENTDESK_CREDENTIALS"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTENTDESK_SOLVER_BUS_URL", "https://bus.from-env.example/rpc");
        env::set_var("INTENTDESK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intentdesk.toml");
            fs::write(
                &path,
                r#"
[network]
rpc_url = "https://rpc.from-file.example"

[solver_bus]
url = "https://bus.from-file.example/rpc"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.network.rpc_url == "https://rpc.from-file.example", "file beats default")?;
            ensure(
                config.solver_bus.url == "https://bus.from-env.example/rpc",
                "env beats file",
            )?;
            ensure(config.logging.level == "debug", "override beats file")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "env alias sets format")?;
            Ok(())
        })();

        clear_vars(&["INTENTDESK_SOLVER_BUS_URL", "INTENTDESK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_rejects_deadline_window_inversion() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTENTDESK_INTENTS_QUOTE_VALIDITY_MS", "30000");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("quote_validity_ms")
            );
            ensure(has_message, "validation failure should mention quote_validity_ms")
        })();

        clear_vars(&["INTENTDESK_INTENTS_QUOTE_VALIDITY_MS"]);
        result
    }

    #[test]
    fn openai_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("llm.api_key")),
            "openai without key must fail",
        )
    }

    #[test]
    fn invalid_env_values_are_reported_by_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT", "lots");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "INTENTDESK_GUARDRAILS_MAX_SWAP_AMOUNT"
            ),
            "bad decimal should name its variable",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTENTDESK_LLM_PROVIDER", "openai");
        env::set_var("INTENTDESK_LLM_API_KEY", "sk-secret-value");
        env::set_var("INTENTDESK_GUARDRAILS_MAX_DEPOSIT_AMOUNT", "25.5");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                config.guardrails.max_deposit_amount == Some(Decimal::new(255, 1)),
                "deposit cap parsed from env",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "INTENTDESK_LLM_PROVIDER",
            "INTENTDESK_LLM_API_KEY",
            "INTENTDESK_GUARDRAILS_MAX_DEPOSIT_AMOUNT",
        ]);
        result
    }
}

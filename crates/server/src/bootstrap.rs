use std::sync::Arc;

use intentdesk_agent::conversation::{CommandInterpreter, KeywordInterpreter, LlmInterpreter};
use intentdesk_agent::guardrails::GuardrailPolicy;
use intentdesk_agent::llm::client_from_config;
use intentdesk_agent::runtime::AgentRuntime;
use intentdesk_core::amount::{format_minor_units, to_minor_units};
use intentdesk_core::assets::AssetRegistry;
use intentdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use intentdesk_core::errors::IntentError;
use intentdesk_core::negotiation::SolverBus;
use intentdesk_core::network::SettlementNetwork;
use intentdesk_core::orchestrator::{IntentOrchestrator, OperationContext, OrchestratorConfig};
use intentdesk_core::progress::TracingProgressSink;
use intentdesk_core::signer::{AccountCredentials, CredentialsError};
use intentdesk_rpc::{NearRpcClient, RpcError, SolverBusClient};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] RpcError),
    #[error("llm interpreter setup failed: {0}")]
    Interpreter(String),
    #[error("public key registration failed: {0}")]
    Registration(#[source] IntentError),
    #[error("could not read account balance: {0}")]
    Balance(#[source] IntentError),
    #[error("account {account_id} holds {balance} NEAR, below the minimum of {minimum}")]
    BalanceTooLow { account_id: String, balance: String, minimum: String },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let credentials = AccountCredentials::load(config.require_credentials_file()?)?;
    let key = Arc::new(credentials.into_key_material()?);
    info!(
        event_name = "system.bootstrap.credentials_loaded",
        correlation_id = "bootstrap",
        account_id = key.account_id(),
        public_key = %key.public_key(),
        "account credentials loaded"
    );

    let network = NearRpcClient::from_config(&config.network, key.clone())?;
    let bus = SolverBusClient::from_config(&config.solver_bus)?;
    let registry = Arc::new(AssetRegistry::with_overrides(config.assets.clone()));
    let orchestrator = IntentOrchestrator::new(
        registry.clone(),
        key,
        OrchestratorConfig::from(&config.intents),
        bus,
        network,
    );

    compose(config, registry, orchestrator).await
}

/// Balance floor first, then key registration, then the command runtime.
pub async fn compose<B, N>(
    config: AppConfig,
    registry: Arc<AssetRegistry>,
    orchestrator: IntentOrchestrator<B, N>,
) -> Result<Application, BootstrapError>
where
    B: SolverBus + 'static,
    N: SettlementNetwork + 'static,
{
    ensure_minimum_balance(&config, &orchestrator).await?;

    let ctx = OperationContext::new("bootstrap", Arc::new(TracingProgressSink));
    let registration =
        orchestrator.register_public_key(&ctx).await.map_err(BootstrapError::Registration)?;
    info!(
        event_name = "system.bootstrap.key_registered",
        correlation_id = "bootstrap",
        outcome = registration.as_str(),
        "public key registered with verifying contract"
    );

    let interpreter = interpreter(&config)?;
    info!(
        event_name = "system.bootstrap.interpreter_ready",
        correlation_id = "bootstrap",
        interpreter = interpreter.name(),
        "command interpreter ready"
    );

    let runtime = AgentRuntime::new(
        interpreter,
        GuardrailPolicy::from(&config.guardrails),
        registry,
        Arc::new(orchestrator),
    );
    Ok(Application { config, runtime: Arc::new(runtime) })
}

async fn ensure_minimum_balance<B, N>(
    config: &AppConfig,
    orchestrator: &IntentOrchestrator<B, N>,
) -> Result<(), BootstrapError>
where
    B: SolverBus,
    N: SettlementNetwork,
{
    let status = orchestrator.status().await.map_err(BootstrapError::Balance)?;
    let native = orchestrator.registry().native().map_err(BootstrapError::Balance)?;
    let minimum = to_minor_units(config.account.min_balance, native.decimals)
        .map_err(BootstrapError::Balance)?;
    if status.balance_minor < minimum {
        return Err(BootstrapError::BalanceTooLow {
            account_id: status.account_id,
            balance: status.balance,
            minimum: format_minor_units(minimum, native.decimals),
        });
    }

    info!(
        event_name = "system.bootstrap.balance_checked",
        correlation_id = "bootstrap",
        account_id = %status.account_id,
        balance = %status.balance,
        "account balance above minimum"
    );
    Ok(())
}

fn interpreter(config: &AppConfig) -> Result<Arc<dyn CommandInterpreter>, BootstrapError> {
    let client = client_from_config(&config.llm)
        .map_err(|error| BootstrapError::Interpreter(format!("{error:#}")))?;
    Ok(match client {
        Some(client) => Arc::new(LlmInterpreter::new(client)),
        None => Arc::new(KeywordInterpreter),
    })
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::io::Write;
    use std::sync::{Arc, Mutex, OnceLock};

    use intentdesk_core::assets::AssetRegistry;
    use intentdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use intentdesk_core::negotiation::InMemorySolverBus;
    use intentdesk_core::network::{InMemoryNetwork, NetworkFailure, ADD_PUBLIC_KEY};
    use intentdesk_core::orchestrator::{IntentOrchestrator, OrchestratorConfig};
    use intentdesk_core::signer::KeyMaterial;
    use intentdesk_core::MinorUnits;
    use tempfile::TempDir;

    use super::{bootstrap, compose, BootstrapError};

    const ACCOUNT: &str = "alice.near";
    const ONE_NEAR: u128 = 1_000_000_000_000_000_000_000_000;

    type Orchestrator = IntentOrchestrator<InMemorySolverBus, InMemoryNetwork>;

    fn orchestrator(network: &InMemoryNetwork) -> Orchestrator {
        IntentOrchestrator::new(
            Arc::new(AssetRegistry::default()),
            Arc::new(KeyMaterial::from_seed(ACCOUNT, [3; 32])),
            OrchestratorConfig::default(),
            InMemorySolverBus::default(),
            network.clone(),
        )
    }

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serialises env access and hides any `INTENTDESK_*` settings of the
    /// surrounding process while `check` runs.
    fn isolated_env<T>(check: impl FnOnce() -> T) -> T {
        let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let saved: Vec<(String, String)> =
            env::vars().filter(|(key, _)| key.starts_with("INTENTDESK_")).collect();
        for (key, _) in &saved {
            env::remove_var(key);
        }
        let result = check();
        for (key, value) in saved {
            env::set_var(key, value);
        }
        result
    }

    /// Options pointing at an empty config file in its own directory, so the
    /// working directory never contributes settings.
    fn isolated_options(dir: &TempDir, overrides: ConfigOverrides) -> LoadOptions {
        let path = dir.path().join("intentdesk.toml");
        std::fs::write(&path, "").expect("write config");
        LoadOptions { config_path: Some(path), require_file: true, overrides }
    }

    fn load_and_bootstrap(options: LoadOptions) -> Result<(), BootstrapError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        isolated_env(|| runtime.block_on(bootstrap(options)).map(|_| ()))
    }

    #[test]
    fn bootstrap_fails_fast_without_credentials_file() {
        let dir = TempDir::new().expect("tempdir");

        let result = load_and_bootstrap(isolated_options(&dir, ConfigOverrides::default()));

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("account.credentials_file"), "got {message}");
    }

    #[test]
    fn bootstrap_reports_unreadable_credentials() {
        let dir = TempDir::new().expect("tempdir");
        let mut file = tempfile::NamedTempFile::new_in(dir.path()).expect("temp file");
        write!(file, "not json").expect("write");

        let result = load_and_bootstrap(isolated_options(
            &dir,
            ConfigOverrides {
                credentials_file: Some(file.path().to_path_buf()),
                ..ConfigOverrides::default()
            },
        ));

        assert!(matches!(result, Err(BootstrapError::Credentials(_))));
    }

    #[tokio::test]
    async fn compose_registers_key_and_accepts_funded_account() {
        let network = InMemoryNetwork::default().with_balance(ACCOUNT, MinorUnits(ONE_NEAR));

        let app =
            compose(AppConfig::default(), Arc::new(AssetRegistry::default()), orchestrator(&network))
                .await
                .expect("bootstrap succeeds");

        assert_eq!(network.calls_to(ADD_PUBLIC_KEY).len(), 1);
        assert_eq!(app.runtime.interpreter_name(), "keyword");
        assert_eq!(app.runtime.service().account_id(), ACCOUNT);
    }

    #[tokio::test]
    async fn already_registered_key_is_not_a_startup_failure() {
        let network = InMemoryNetwork::default()
            .with_balance(ACCOUNT, MinorUnits(ONE_NEAR))
            .failing(ADD_PUBLIC_KEY, NetworkFailure::rejected("public key already exists"));

        let result =
            compose(AppConfig::default(), Arc::new(AssetRegistry::default()), orchestrator(&network))
                .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn underfunded_account_is_refused() {
        let network = InMemoryNetwork::default().with_balance(ACCOUNT, MinorUnits(ONE_NEAR / 100));

        let result =
            compose(AppConfig::default(), Arc::new(AssetRegistry::default()), orchestrator(&network))
                .await;

        match result {
            Err(BootstrapError::BalanceTooLow { balance, minimum, .. }) => {
                assert_eq!(balance, "0.01");
                assert_eq!(minimum, "0.1");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("underfunded account must not start"),
        }
        assert!(network.calls_to(ADD_PUBLIC_KEY).is_empty(), "no registration while underfunded");
    }
}

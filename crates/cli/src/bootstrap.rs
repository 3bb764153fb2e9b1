use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use workdesk_agent::intent::IntentError;
use workdesk_agent::provider::ProviderError;
use workdesk_agent::{
    register_builtin_tools, AgentRuntime, Dispatcher, DryRunProvider, HttpWorkspaceProvider,
    IntentRecognizer, RegistryError, ToolRegistry, WorkspaceProvider,
};
use workdesk_core::audit::TracingAuditSink;
use workdesk_core::clock::{Clock, SystemClock};
use workdesk_core::config::{AppConfig, StoreBackend};
use workdesk_core::conversation::ConversationStore;
use workdesk_core::rate_limit::RateLimiter;
use workdesk_core::store::{InMemoryStore, KeyValueStore, WindowStore};
use workdesk_db::{connect_from_config, migrations, SqliteStore};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("store connection failed: {0}")]
    StoreConnect(#[source] sqlx::Error),
    #[error("store migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Shared state backends, selected by `store.backend`.
pub struct Stores {
    pub values: Arc<dyn KeyValueStore>,
    pub windows: Arc<dyn WindowStore>,
}

pub async fn build_stores(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Stores, BootstrapError> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new(clock));
            Ok(Stores { values: store.clone(), windows: store })
        }
        StoreBackend::Sqlite => {
            let pool =
                connect_from_config(&config.store).await.map_err(BootstrapError::StoreConnect)?;
            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.store_ready",
                backend = "sqlite",
                "store migrations applied"
            );
            let store = Arc::new(SqliteStore::new(pool, clock));
            Ok(Stores { values: store.clone(), windows: store })
        }
    }
}

pub fn build_provider(
    config: &AppConfig,
    dry_run: bool,
) -> Result<Arc<dyn WorkspaceProvider>, BootstrapError> {
    if dry_run {
        return Ok(Arc::new(DryRunProvider::default()));
    }
    if config.provider.base_url.is_none() {
        warn!(
            event_name = "system.bootstrap.provider_unconfigured",
            "provider.base_url is not set, falling back to the dry-run provider"
        );
        return Ok(Arc::new(DryRunProvider::default()));
    }
    Ok(Arc::new(HttpWorkspaceProvider::from_config(&config.provider)?))
}

pub fn build_dispatcher(
    config: &AppConfig,
    windows: Arc<dyn WindowStore>,
    provider: Arc<dyn WorkspaceProvider>,
    clock: Arc<dyn Clock>,
) -> Result<Dispatcher, BootstrapError> {
    let mut registry = ToolRegistry::default();
    register_builtin_tools(&mut registry, provider)?;

    let limiter = Arc::new(RateLimiter::new(windows, clock));
    Ok(Dispatcher::new(registry, limiter, Arc::new(TracingAuditSink))
        .with_limits(config.rate_limits.clone())
        .with_tool_timeout(config.dispatch.tool_timeout()))
}

pub async fn build_runtime(config: &AppConfig, dry_run: bool) -> Result<AgentRuntime, BootstrapError> {
    info!(event_name = "system.bootstrap.start", dry_run, "starting runtime bootstrap");
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let stores = build_stores(config, clock.clone()).await?;
    let provider = build_provider(config, dry_run)?;
    let dispatcher = build_dispatcher(config, stores.windows, provider, clock.clone())?;
    let conversations = ConversationStore::new(stores.values, clock, config.conversation.ttl());
    let recognizer = IntentRecognizer::new(config.intent.clone())?;

    info!(
        event_name = "system.bootstrap.ready",
        tools = dispatcher.registry().len(),
        "runtime ready"
    );
    Ok(AgentRuntime::new(recognizer, dispatcher, conversations))
}

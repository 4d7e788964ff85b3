//! The Meridian control-plane server.

mod settings;

use std::sync::Arc;

use anyhow::Context;
use meridian_api::{Core, EventHub, router};
use meridian_core::{Principal, TenantId, UserId, roles};
use meridian_dispatch::{DispatchConfig, Orchestrator, RunStateService};
use meridian_gateway::{GatewayConfig, SessionManager, WorkerCatalog};
use meridian_registry::RunRegistry;
use meridian_storage::{
    AuditQueue, AuditSink, InMemoryIdempotencyStore, InMemoryPrincipalStore,
    InMemoryWorkflowStore,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let core = build_core(&settings);
    let app = router(core);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "meridian control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")?;
    Ok(())
}

fn build_core(settings: &Settings) -> Core {
    let catalog = Arc::new(WorkerCatalog::new());
    let gateway_config = GatewayConfig {
        worker_tokens: settings.allowed_worker_tokens(),
        session_secret: settings.session_secret.clone(),
        session_token_ttl_seconds: settings.session_token_ttl_seconds,
        session_window_size: settings.session_window_size,
        ..GatewayConfig::default()
    };
    let (gateway, gateway_events) = SessionManager::new(gateway_config, catalog);

    let registry = Arc::new(RunRegistry::new());
    let audit = Arc::new(AuditQueue::new(4096));
    let dispatch_config = DispatchConfig {
        strategy: settings.dispatch_worker_strategy,
        max_heartbeat_age_seconds: settings.dispatch_worker_max_heartbeat_age_seconds,
        ack_timeout_seconds: settings.dispatch_ack_timeout_seconds,
        disconnect_grace_seconds: settings.session_disconnect_grace_seconds,
        ..DispatchConfig::default()
    };
    let (orchestrator, control_events) = Orchestrator::new(
        registry,
        Arc::clone(&gateway),
        dispatch_config,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
    );
    orchestrator.spawn_event_loop(gateway_events);
    orchestrator.spawn_maintenance();

    let principals = InMemoryPrincipalStore::new();
    if let Some(token) = &settings.api_token {
        principals.insert(
            token.clone(),
            Principal::new(
                UserId::v4(),
                TenantId::v4(),
                "bootstrap-admin",
                vec![roles::ADMIN.to_string()],
            ),
        );
        info!("bootstrap admin principal registered from MERIDIAN_API_TOKEN");
    }

    let events = Arc::new(EventHub::new());
    events.spawn_pump(control_events);

    // Drain the audit queue in the background; a relational sink would
    // replace this consumer.
    let audit_drain = Arc::clone(&audit);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(500));
        loop {
            ticker.tick().await;
            for event in audit_drain.drain(256) {
                tracing::debug!(
                    action = %event.action,
                    target_type = %event.target_type,
                    target_id = event.target_id.as_deref().unwrap_or("-"),
                    "audit"
                );
            }
        }
    });

    Core {
        service: RunStateService::new(orchestrator),
        gateway,
        principals: Arc::new(principals),
        idempotency: Arc::new(InMemoryIdempotencyStore::new()),
        audit,
        workflows: Arc::new(InMemoryWorkflowStore::new()),
        events,
    }
}

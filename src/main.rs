use std::sync::Arc;

use traffic_engine::config::EngineConfig;
use traffic_engine::dispatch::{HttpWorkerTransport, WorkerDispatcher, WorkerTransport};
use traffic_engine::engine::TrafficEngine;
use traffic_engine::notify::Notifier;
use traffic_engine::notify::chat::{ChatSink, HttpChatSink};
use traffic_engine::notify::mail::{HttpMailSink, MailSink};
use traffic_engine::registry::RouteRegistry;
use traffic_engine::server;
use traffic_engine::store::{RecordStore, RestStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cfg = EngineConfig::from_env()?;

    eprintln!("🚦 Traffic Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/inbound", cfg.port);
    eprintln!("   Hub: {}", cfg.hub_url);
    eprintln!(
        "   Store: {} ({})",
        cfg.store.base_url,
        if cfg.store.api_token.is_some() {
            "authenticated"
        } else {
            "degraded, no token"
        }
    );
    eprintln!(
        "   Mail sink: {}",
        cfg.sinks.mail_url.as_deref().unwrap_or("(would-send)")
    );
    eprintln!(
        "   Chat sink: {}\n",
        cfg.sinks.chat_url.as_deref().unwrap_or("(would-send)")
    );

    // ── Store ────────────────────────────────────────────────────────────
    let store: Arc<dyn RecordStore> =
        Arc::new(RestStore::new(cfg.store.clone(), cfg.hub_url.clone()));

    // ── Notification sinks ───────────────────────────────────────────────
    let mail: Arc<dyn MailSink> = Arc::new(HttpMailSink::new(
        cfg.sinks.mail_url.clone(),
        cfg.sinks.timeout,
    ));
    let chat: Arc<dyn ChatSink> = Arc::new(HttpChatSink::new(
        cfg.sinks.chat_url.clone(),
        cfg.sinks.timeout,
    ));
    let notifier = Arc::new(Notifier::new(mail, chat, cfg.hub_url.clone()));

    // ── Routing ──────────────────────────────────────────────────────────
    let registry = Arc::new(RouteRegistry::with_endpoints(&cfg.workers));
    let transport: Arc<dyn WorkerTransport> =
        Arc::new(HttpWorkerTransport::new(cfg.worker_timeout));
    let dispatcher = WorkerDispatcher::new(registry.clone(), transport, notifier.clone());

    let engine = Arc::new(TrafficEngine::new(store, dispatcher, notifier, registry));

    // ── Webhook server ───────────────────────────────────────────────────
    let app = server::router(engine);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port)).await?;
    tracing::info!(port = cfg.port, "Traffic engine listening");
    axum::serve(listener, app).await?;

    Ok(())
}

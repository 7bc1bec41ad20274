use std::{sync::Arc, time::Instant};

use counsel_agent::{
    agents::AgentDeps, GeminiBackend, Inference, OllamaBackend, Orchestrator,
};
use counsel_core::{
    config::{Config, InferenceKind},
    db::PgStore,
    memory::MemoryStore,
    router::Router as AgentRouter,
    session::SessionRegistry,
    store::ContentStore,
};
use counsel_server::{
    app,
    gateway::{Gateway, GatewaySettings},
    logging::{log_channel, BroadcastLayer},
    AppState,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── Wiring ────────────────────────────────────────────────────────────────

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ContentStore>> {
    if config.database_url.is_empty() {
        warn!("DATABASE_URL not set; using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::connect(&config.database_url)?;
    store.migrate().await?;
    info!("connected to postgres");
    Ok(Arc::new(store))
}

fn select_inference(config: &Config) -> Inference {
    let timeout = config.inference_timeout();
    match config.inference {
        InferenceKind::Gemini if config.google_api_key.is_empty() => {
            Inference::unavailable("GOOGLE_AI_API_KEY not set")
        },
        InferenceKind::Gemini => Inference::available(
            Arc::new(
                GeminiBackend::new(
                    &config.google_api_key,
                    &config.gemini_model,
                    &config.gemini_general_model,
                )
                .with_timeout(config.inference_timeout_s),
            ),
            timeout,
        ),
        InferenceKind::Ollama => Inference::available(
            Arc::new(
                OllamaBackend::new(&config.ollama_url, &config.ollama_model)
                    .with_timeout(config.inference_timeout_s),
            ),
            timeout,
        ),
        InferenceKind::Disabled => Inference::unavailable("disabled by INFERENCE_BACKEND"),
    }
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, log_ring) = log_channel();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "counsel_server=info,counsel_agent=info,counsel_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    let config = Config::from_env()?;

    let store = open_store(&config).await?;
    let inference = select_inference(&config);
    info!(inference = %inference.describe(), "inference backend selected");

    let orchestrator = Arc::new(Orchestrator::new(
        AgentDeps::new(Arc::clone(&store), inference),
        AgentRouter::new(config.router_stickiness),
    ));
    let gateway = Arc::new(Gateway::new(
        SessionRegistry::new(),
        Arc::clone(&store),
        Arc::clone(&orchestrator),
        GatewaySettings {
            context_history_limit: config.context_history_limit,
            join_history_limit: config.join_history_limit,
        },
    ));

    // Idle sweep
    {
        let gateway = Arc::clone(&gateway);
        let interval = config.sweep_interval();
        let idle = config.idle_timeout();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                gateway.sweep(idle).await;
            }
        });
    }

    let state = Arc::new(AppState {
        gateway,
        orchestrator,
        store,
        start_time: Instant::now(),
        log_tx,
        log_ring,
    });

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

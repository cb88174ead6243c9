//! Server wiring: build the stores, gateway, tools and orchestrator, then
//! serve the HTTP surface.

use crate::config::ScoutConfig;
use crate::orchestrator::Orchestrator;
use crate::routes;
use anyhow::{Context, Result};
use axum::Extension;
use scout_llm::OpenAiGateway;
use scout_store::{MemoryStore, TurnStore};
use scout_tools::{JobSearchConfig, JobSearchTool, ReadJobReportTool, ToolExecutor};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<TurnStore>,
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = ScoutConfig::load(config_path.as_deref())?;
    tracing::info!(
        model = %cfg.general.model,
        port = cfg.server.port,
        data_dir = %cfg.store.data_dir.display(),
        max_tool_loops = cfg.general.max_tool_loops,
        unit_cost = cfg.job_search.unit_cost,
        "server configuration loaded"
    );

    let state = Arc::new(build_state(&cfg)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "scout listening");

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state));
    axum::serve(listener, app).await?;
    Ok(())
}

/// Validate config and storage without serving.
pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = ScoutConfig::load(config_path.as_deref())?;
    let api_key_configured = cfg.keys.api_key().is_some();
    let state = build_state(&cfg)?;
    let threads = state.store.list_threads()?;
    tracing::info!(
        model = %cfg.general.model,
        api_key_configured,
        data_dir = %cfg.store.data_dir.display(),
        threads = threads.len(),
        pending_interrupts = threads.iter().filter(|t| t.pending_interrupt).count(),
        "config ok"
    );
    if !api_key_configured {
        tracing::warn!("no OpenAI API key configured; turns will fail until one is set");
    }
    Ok(())
}

/// Insert a grounding fact for a user.
pub async fn seed_memory(config_path: Option<PathBuf>, user_id: &str, fact: &str) -> Result<()> {
    let cfg = ScoutConfig::load(config_path.as_deref())?;
    std::fs::create_dir_all(&cfg.store.data_dir)?;
    let memory = MemoryStore::open(&cfg.store.memory_db_path())?;
    memory.add_fact(user_id, fact)?;
    tracing::info!(user_id, fact, "fact recorded");
    Ok(())
}

fn build_state(cfg: &ScoutConfig) -> Result<AppState> {
    std::fs::create_dir_all(&cfg.store.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.store.data_dir.display()))?;
    let store = Arc::new(TurnStore::open(&cfg.store.turns_db_path())?);
    let memory = Arc::new(MemoryStore::open(&cfg.store.memory_db_path())?);

    let api_key = cfg.keys.api_key().unwrap_or_default();
    let gateway = Arc::new(OpenAiGateway::new(&api_key, &cfg.general.model));

    let mut tools = ToolExecutor::new(cfg.job_search.tool_timeout_secs);
    tools.register(Arc::new(JobSearchTool::new(
        gateway.clone(),
        JobSearchConfig {
            unit_cost: cfg.job_search.unit_cost,
            match_threshold: cfg.job_search.match_threshold,
            resume_path: cfg.job_search.resume_path.clone(),
            report_path: cfg.job_search.report_path.clone(),
            request_timeout_secs: cfg.job_search.request_timeout_secs,
            max_postings: cfg.job_search.max_postings,
        },
    )));
    tools.register(Arc::new(ReadJobReportTool::new(
        cfg.job_search.report_path.clone(),
    )));

    let orchestrator = Orchestrator::new(
        store.clone(),
        memory,
        gateway,
        Arc::new(tools),
        cfg.general.system_prompt.clone(),
        cfg.general.max_tool_loops,
    );

    Ok(AppState {
        orchestrator,
        store,
    })
}

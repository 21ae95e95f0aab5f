use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use chat_tldr::ai::{LlmClient, Summarizer};
use chat_tldr::api::{AppState, router};
use chat_tldr::clients::LiveChatClient;
use chat_tldr::core::config::AppConfig;
use chat_tldr::utils::MessageFilter;
use chat_tldr::worker::{CoordinatorSettings, CrmDispatcher, CrmSink, TriggerCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chat_tldr::setup_logging();

    let config = AppConfig::from_env().context("loading configuration")?;

    let platform = Arc::new(LiveChatClient::new(&config)?);
    let model = Arc::new(LlmClient::new(&config)?);
    let filter = MessageFilter::new(config.filter.clone())?;
    let crm: Option<Arc<dyn CrmSink>> = if config.crm_configured() {
        Some(Arc::new(CrmDispatcher::new(&config)?))
    } else {
        None
    };

    let coordinator = TriggerCoordinator::new(
        platform,
        Summarizer::new(model, config.model_timeout),
        filter,
        crm,
        CoordinatorSettings::from_config(&config),
    );

    let addr = format!("{}:{}", config.host, config.port);
    info!(
        addr = %addr,
        model = %config.openai_model,
        crm_mode = config.crm_mode.as_str(),
        crm_configured = config.crm_configured(),
        "Starting chat-tldr API"
    );

    let app = router(AppState {
        config: Arc::new(config),
        coordinator: Arc::new(coordinator),
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

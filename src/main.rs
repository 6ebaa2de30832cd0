//! lawchat - terminal client for a legal Q&A assistant
//!
//! Streams answers from the backend's `/ask` endpoint as they are generated
//! and keeps conversation history in sync through its REST API.

mod api;
mod config;
mod repl;
mod store;
mod stream;

use api::{ChatBackend, HttpBackend, LoggingBackend};
use config::ClientConfig;
use std::sync::Arc;
use store::ChatRuntime;
use stream::HttpTransport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lawchat=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env()?;
    tracing::info!(
        base_url = %config.base_url,
        user_id = %config.user_id,
        page_size = config.page_size,
        answer_timeout_secs = ?config.answer_timeout.map(|t| t.as_secs()),
        "Starting lawchat"
    );

    let http = HttpBackend::new(&config.base_url, config.request_timeout)?;
    let backend: Arc<dyn ChatBackend> = Arc::new(LoggingBackend::new(Arc::new(http)));
    let transport = Arc::new(HttpTransport::new(&config.base_url)?);

    let (runtime, handle) = ChatRuntime::new(backend, transport, &config);
    let runtime_task = tokio::spawn(runtime.run());

    let result = repl::run(handle.clone()).await;

    // Aborts any open stream; queued message writes still finish
    if handle.shutdown().is_ok() {
        runtime_task.await?;
    }
    result?;
    Ok(())
}

use anyhow::Context;

use diagnosis_bot::app::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let app = App::from_env().context("startup failed")?;

    eprintln!("🩺 Diagnosis bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", app.config.llm.model, app.config.llm.backend);
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", app.config.port);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app.router).await?;
    Ok(())
}

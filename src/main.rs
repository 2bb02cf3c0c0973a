use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use email_assist::api::app_from_config;
use email_assist::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    // Optional .env next to the binary; real environment variables win.
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing: stderr always, plus a daily file when a log dir is set.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "email-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("📧 Email Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {:?}", config.llm.backend);
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Model timeout: {}s", config.model_timeout.as_secs());
    eprintln!("   Listening: http://{}", config.bind_addr());
    if let Some(dir) = &config.log_dir {
        eprintln!("   Log dir: {}", dir.display());
    }
    eprintln!();

    let app = app_from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), "HTTP server started");

    axum::serve(listener, app).await?;

    Ok(())
}

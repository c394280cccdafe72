#![forbid(unsafe_code)]

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use posture_lab::{analyzer_from_config, build_router, AppState, ServerConfig};

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("failed to load configuration")?;
    posture_lab::init_tracing(config.log_json);

    let analyzer = analyzer_from_config(&config).context("failed to set up model client")?;
    info!("Using model {}", analyzer.model_name());

    let app = build_router(AppState::new(analyzer, config.max_body_bytes));
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("posture-lab listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("server failed")
}

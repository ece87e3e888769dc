//! PDF merge workspace server
//!
//! Serves the session-scoped upload / merge / download API. Word documents are
//! rendered through a headless LibreOffice (`--soffice`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdfmerge_server::{router, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.app_config();
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = Arc::new(AppState::new(config)?);

    if let Some(retention) = state.config.retention {
        let state = Arc::clone(&state);
        let period = (retention / 2).max(Duration::from_secs(1));
        info!("Purging sessions idle for {}s", retention.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                state.pipeline.sweep_idle(retention).await;
            }
        });
    }

    let app = router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Upload limit: {} MB", args.max_upload_mb);
    info!("Render timeout: {}ms", args.render_timeout_ms);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Application state for the merge server

use std::sync::Arc;

use crate::config::AppConfig;
use crate::convert::{DocumentRenderer, SofficeRenderer};
use crate::pipeline::Pipeline;
use crate::session::SessionSigner;

pub struct AppState {
    pub pipeline: Pipeline,
    pub sessions: SessionSigner,
    pub config: AppConfig,
}

impl AppState {
    /// State rendering Word documents through LibreOffice
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let renderer = Arc::new(SofficeRenderer::new(config.soffice_binary.clone()));
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(
        config: AppConfig,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> anyhow::Result<Self> {
        let sessions = match &config.session_secret {
            Some(secret) => SessionSigner::new(secret.as_bytes()),
            None => {
                tracing::warn!("No session secret configured; sessions end with the process");
                SessionSigner::random()
            }
        }
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

        tracing::info!("Session workspaces under {}", config.upload_dir.display());
        Ok(Self {
            pipeline: Pipeline::new(&config, renderer),
            sessions,
            config,
        })
    }
}

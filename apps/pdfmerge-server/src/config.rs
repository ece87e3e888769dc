//! Runtime configuration
//!
//! Command-line flags (with environment fallbacks) are parsed into [`Args`] and
//! turned into the plain [`AppConfig`] the pipeline consumes.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Settings for the merge pipeline
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Parent directory of every session workspace
    pub upload_dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Upper bound for one Word-to-PDF rendering
    pub render_timeout: Duration,
    /// LibreOffice executable used for Word documents
    pub soffice_binary: PathBuf,
    /// Idle time after which a session is purged; `None` keeps sessions until cleared
    pub retention: Option<Duration>,
    /// Resolution used when turning images into pages
    pub image_dpi: f32,
    /// Key signing session cookies; a random one is drawn when unset
    pub session_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 50 * 1024 * 1024,
            render_timeout: Duration::from_secs(60),
            soffice_binary: PathBuf::from("soffice"),
            retention: None,
            image_dpi: pdfmerge_core::DEFAULT_DPI,
            session_secret: None,
        }
    }
}

/// Command-line arguments for the merge server
#[derive(Parser, Debug)]
#[command(name = "pdfmerge-server")]
#[command(about = "Session-scoped PDF merge workspace")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PDFMERGE_PORT", default_value = "5000")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "PDFMERGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Directory holding one sub-directory per session
    #[arg(long, env = "PDFMERGE_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Maximum upload size in MiB
    #[arg(long, env = "PDFMERGE_MAX_UPLOAD_MB", default_value = "50")]
    pub max_upload_mb: usize,

    /// Word-to-PDF render timeout in milliseconds
    #[arg(long, env = "PDFMERGE_RENDER_TIMEOUT_MS", default_value = "60000")]
    pub render_timeout_ms: u64,

    /// LibreOffice binary used to render Word documents
    #[arg(long, env = "PDFMERGE_SOFFICE", default_value = "soffice")]
    pub soffice: PathBuf,

    /// Purge sessions idle for this many seconds (disabled when unset)
    #[arg(long, env = "PDFMERGE_RETENTION_SECS")]
    pub retention_secs: Option<u64>,

    /// Secret used to sign session cookies (random per process when unset)
    #[arg(long, env = "PDFMERGE_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            upload_dir: self.upload_dir.clone(),
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
            render_timeout: Duration::from_millis(self.render_timeout_ms),
            soffice_binary: self.soffice.clone(),
            retention: self.retention_secs.map(Duration::from_secs),
            session_secret: self.session_secret.clone(),
            ..AppConfig::default()
        }
    }
}

//! Format conversion: images and Word documents to PDF
//!
//! Images are converted in-process. Word documents need an external document
//! engine, reached through the [`DocumentRenderer`] capability so it can be
//! swapped or mocked. Every rendering is bounded by a timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pdfmerge_core::PdfMergeError;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::assembly;
use crate::error::PipelineError;
use crate::models::SourceKind;
use crate::workspace::SCRATCH_PREFIX;

/// Failure reported by a document renderer
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer not available: {0}")]
    Unavailable(String),

    #[error("Renderer failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single conversion failed
#[derive(Debug, Error)]
pub enum ConversionFailure {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("rendering timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("renderer reported success but wrote no PDF")]
    NoOutput,

    #[error(transparent)]
    Image(#[from] PdfMergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conversion task failed: {0}")]
    Task(#[from] JoinError),
}

/// External capability that renders a Word document into a PDF
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render `source` into a PDF at `target`
    async fn render_to_pdf(&self, source: &Path, target: &Path) -> Result<(), RenderError>;
}

/// Renders through LibreOffice in headless mode
pub struct SofficeRenderer {
    binary: PathBuf,
}

impl SofficeRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for SofficeRenderer {
    async fn render_to_pdf(&self, source: &Path, target: &Path) -> Result<(), RenderError> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        // Private output directory and profile: concurrent soffice runs would
        // otherwise fight over the default user installation
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}render-", SCRATCH_PREFIX))
            .tempdir_in(dir)?;
        let profile = scratch.path().join("profile");

        let output = Command::new(&self.binary)
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RenderError::Unavailable(self.binary.display().to_string())
                }
                _ => RenderError::Io(e),
            })?;

        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "soffice exited with {}",
                output.status
            );
            return Err(RenderError::Failed(format!("exit status {}", output.status)));
        }

        let stem = source
            .file_stem()
            .ok_or_else(|| RenderError::Failed("source has no file name".into()))?;
        let produced = scratch.path().join(stem).with_extension("pdf");
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(RenderError::Failed("no PDF produced".into()));
        }

        tokio::fs::rename(&produced, target).await?;
        Ok(())
    }
}

/// Turns uploads into PDFs
pub struct Converter {
    renderer: Arc<dyn DocumentRenderer>,
    render_timeout: Duration,
    image_dpi: f32,
}

impl Converter {
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        render_timeout: Duration,
        image_dpi: f32,
    ) -> Self {
        Self {
            renderer,
            render_timeout,
            image_dpi,
        }
    }

    /// Convert `source` into a PDF at `target`
    ///
    /// Writes exactly one new file and never touches `source`. On failure the
    /// partially written target is removed. A PDF source is returned as is.
    pub async fn to_pdf(
        &self,
        source: &Path,
        kind: SourceKind,
        target: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let result = match kind {
            SourceKind::Pdf => return Ok(source.to_path_buf()),
            SourceKind::Image => self.image_to_pdf(source, target).await,
            SourceKind::WordDocument => self.word_to_pdf(source, target).await,
        };

        match result {
            Ok(()) => {
                info!("Converted {} to PDF", kind);
                Ok(target.to_path_buf())
            }
            Err(cause) => {
                error!("Failed to convert {}: {}", kind, cause);
                if let Err(e) = tokio::fs::remove_file(target).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        debug!("Could not remove partial conversion output: {}", e);
                    }
                }
                Err(PipelineError::ConversionError { kind, cause })
            }
        }
    }

    async fn image_to_pdf(&self, source: &Path, target: &Path) -> Result<(), ConversionFailure> {
        let source = source.to_path_buf();
        let target = target.to_path_buf();
        let dpi = self.image_dpi;

        tokio::task::spawn_blocking(move || -> Result<(), ConversionFailure> {
            let bytes = std::fs::read(&source)?;
            let pdf = pdfmerge_core::image_to_pdf(&bytes, dpi)?;
            assembly::write_atomically(&target, &pdf)?;
            Ok(())
        })
        .await?
    }

    async fn word_to_pdf(&self, source: &Path, target: &Path) -> Result<(), ConversionFailure> {
        let rendering = self.renderer.render_to_pdf(source, target);
        tokio::time::timeout(self.render_timeout, rendering)
            .await
            .map_err(|_elapsed| ConversionFailure::Timeout(self.render_timeout))??;

        match tokio::fs::try_exists(target).await {
            Ok(true) => Ok(()),
            _ => Err(ConversionFailure::NoOutput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use pdfmerge_core::fixtures::sample_pdf;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct FixedRenderer;

    #[async_trait]
    impl DocumentRenderer for FixedRenderer {
        async fn render_to_pdf(&self, _source: &Path, target: &Path) -> Result<(), RenderError> {
            tokio::fs::write(target, sample_pdf(2, "Word")).await?;
            Ok(())
        }
    }

    struct PartialThenFail;

    #[async_trait]
    impl DocumentRenderer for PartialThenFail {
        async fn render_to_pdf(&self, _source: &Path, target: &Path) -> Result<(), RenderError> {
            tokio::fs::write(target, b"%PDF-1.5 half written").await?;
            Err(RenderError::Failed("engine crashed".into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl DocumentRenderer for Hanging {
        async fn render_to_pdf(&self, _source: &Path, _target: &Path) -> Result<(), RenderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct Silent;

    #[async_trait]
    impl DocumentRenderer for Silent {
        async fn render_to_pdf(&self, _source: &Path, _target: &Path) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn converter(renderer: impl DocumentRenderer + 'static) -> Converter {
        Converter::new(Arc::new(renderer), Duration::from_millis(200), 100.0)
    }

    fn png_bytes() -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_image_conversion_keeps_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let target = dir.path().join("a.pdf");
        std::fs::write(&source, png_bytes()).unwrap();

        let out = converter(Silent)
            .to_pdf(&source, SourceKind::Image, &target)
            .await
            .unwrap();

        assert_eq!(out, target);
        assert!(source.exists());
        assert_eq!(assembly::page_count(&target), 1);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let target = dir.path().join("a.pdf");
        std::fs::write(&source, b"not a png").unwrap();

        let err = converter(Silent)
            .to_pdf(&source, SourceKind::Image, &target)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ConversionError {
                kind: SourceKind::Image,
                cause: ConversionFailure::Image(_),
            }
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_word_conversion_uses_renderer() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        let target = dir.path().join("a.pdf");
        std::fs::write(&source, b"PK fake docx").unwrap();

        converter(FixedRenderer)
            .to_pdf(&source, SourceKind::WordDocument, &target)
            .await
            .unwrap();

        assert_eq!(assembly::page_count(&target), 2);
    }

    #[tokio::test]
    async fn test_failed_render_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        let target = dir.path().join("a.pdf");
        std::fs::write(&source, b"PK").unwrap();

        let err = converter(PartialThenFail)
            .to_pdf(&source, SourceKind::WordDocument, &target)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ConversionError { .. }));
        assert!(!target.exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_render_timeout_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        let target = dir.path().join("a.pdf");
        std::fs::write(&source, b"PK").unwrap();

        let err = converter(Hanging)
            .to_pdf(&source, SourceKind::WordDocument, &target)
            .await
            .unwrap_err();

        match err {
            PipelineError::ConversionError {
                cause: ConversionFailure::Timeout(limit),
                ..
            } => assert_eq!(limit, Duration::from_millis(200)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renderer_without_output_is_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"PK").unwrap();

        let result = converter(Silent)
            .to_pdf(&source, SourceKind::WordDocument, &dir.path().join("a.pdf"))
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::ConversionError {
                cause: ConversionFailure::NoOutput,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_conversion_error_keeps_renderer_cause() {
        use std::error::Error as _;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"PK").unwrap();

        let err = converter(PartialThenFail)
            .to_pdf(&source, SourceKind::WordDocument, &dir.path().join("a.pdf"))
            .await
            .unwrap_err();

        let cause = err.source().expect("conversion error should carry its cause");
        assert_eq!(cause.to_string(), "Renderer failed: engine crashed");
        assert!(matches!(
            cause.downcast_ref::<ConversionFailure>(),
            Some(ConversionFailure::Render(RenderError::Failed(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_soffice_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"PK").unwrap();
        let renderer = SofficeRenderer::new("/nonexistent/soffice-binary");

        let err = renderer
            .render_to_pdf(&source, &dir.path().join("a.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Unavailable(_)));
    }
}

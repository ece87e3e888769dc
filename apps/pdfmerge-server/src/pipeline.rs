//! Session pipeline
//!
//! Sequences conversion, storage and assembly for one session at a time. Every
//! operation holds the session lock from start to finish, so a download can
//! never observe a half-written merge and a purge never races an upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::assembly;
use crate::config::AppConfig;
use crate::convert::{Converter, DocumentRenderer};
use crate::error::PipelineError;
use crate::models::{
    extension_of, FileId, MergeResult, SessionId, SessionState, SourceKind, UploadedItem,
};
use crate::registry::SessionRegistry;
use crate::workspace::Workspace;

pub struct Pipeline {
    root: PathBuf,
    registry: SessionRegistry,
    converter: Converter,
    max_upload_bytes: usize,
}

impl Pipeline {
    pub fn new(config: &AppConfig, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            root: config.upload_dir.clone(),
            registry: SessionRegistry::new(),
            converter: Converter::new(renderer, config.render_timeout, config.image_dpi),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn workspace(&self, session: SessionId) -> Workspace {
        Workspace::new(&self.root, session)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Store an upload as a PDF and describe it
    pub async fn upload(
        &self,
        session: SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadedItem, PipelineError> {
        if filename.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("No file selected".into()));
        }
        let extension = extension_of(filename).ok_or(PipelineError::UnsupportedType)?;
        let kind = SourceKind::from_extension(&extension).ok_or(PipelineError::UnsupportedType)?;
        if bytes.len() > self.max_upload_bytes {
            return Err(PipelineError::PayloadTooLarge(self.max_upload_bytes));
        }

        let _guard = self.registry.acquire(session).await;
        let ws = self.workspace(session);
        let id = FileId::new();

        let raw = ws.save(id, bytes, &extension).await?;
        let pdf = match kind {
            SourceKind::Pdf => raw,
            SourceKind::Image | SourceKind::WordDocument => {
                match self.converter.to_pdf(&raw, kind, &ws.item_path(id, "pdf")).await {
                    Ok(pdf) => {
                        ws.discard(&raw).await;
                        pdf
                    }
                    Err(e) => {
                        ws.remove(id).await;
                        return Err(e);
                    }
                }
            }
        };

        let pages = count_pages(pdf).await;
        info!(session = %session, file_id = %id, kind = %kind, pages, "Stored upload");

        Ok(UploadedItem {
            id,
            name: filename.to_string(),
            pages,
            kind: extension,
        })
    }

    /// Delete every artifact of an item; unknown ids are a no-op
    pub async fn remove(&self, session: SessionId, id: &str) -> usize {
        let Some(id) = FileId::parse(id) else {
            debug!(session = %session, "Ignoring removal of malformed id");
            return 0;
        };

        let guard = self.registry.acquire(session).await;
        let removed = self.workspace(session).remove(id).await;
        self.finish(session, guard).await;
        debug!(session = %session, file_id = %id, removed, "Removed item");
        removed
    }

    /// Concatenate the given items in order, optionally password-protecting the result
    pub async fn merge(
        &self,
        session: SessionId,
        ids: &[String],
        password: &str,
        protect: bool,
    ) -> Result<MergeResult, PipelineError> {
        if ids.is_empty() {
            return Err(PipelineError::NoFiles);
        }

        let _guard = self.registry.acquire(session).await;
        let ws = self.workspace(session);

        let mut inputs = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = FileId::parse(raw).ok_or_else(|| PipelineError::MissingFile(raw.clone()))?;
            let path = ws
                .resolve(id)
                .await
                .map_err(|_| PipelineError::MissingFile(raw.clone()))?;
            inputs.push(path);
        }

        ws.clear_results().await;

        let merged = ws.result_path(MergeResult::Unprotected);
        let dest = merged.clone();
        tokio::task::spawn_blocking(move || assembly::merge(&inputs, &dest))
            .await
            .map_err(|e| PipelineError::Internal(format!("merge task failed: {}", e)))??;

        if !(protect && !password.is_empty()) {
            info!(session = %session, files = ids.len(), "Merged");
            return Ok(MergeResult::Unprotected);
        }

        let protected = ws.result_path(MergeResult::Protected);
        let source = merged.clone();
        let password = password.to_string();
        let encrypted =
            tokio::task::spawn_blocking(move || assembly::encrypt(&source, &password, &protected))
                .await
                .map_err(|e| PipelineError::Internal(format!("encrypt task failed: {}", e)));

        ws.discard(&merged).await;
        encrypted??;

        info!(session = %session, files = ids.len(), "Merged and protected");
        Ok(MergeResult::Protected)
    }

    /// Hand out the merge result and purge the session
    pub async fn download(
        &self,
        session: SessionId,
    ) -> Result<(MergeResult, Vec<u8>), PipelineError> {
        let guard = self.registry.acquire(session).await;
        let ws = self.workspace(session);

        let downloaded = match ws.existing_result().await {
            Some((result, path)) => ws.read_all(&path).await.map(|bytes| (result, bytes)),
            None => Err(PipelineError::NotFound),
        };
        if downloaded.is_ok() {
            ws.purge().await;
        }
        self.finish(session, guard).await;

        let (result, bytes) = downloaded?;
        info!(
            session = %session,
            size = bytes.len(),
            protected = result.is_protected(),
            "Downloaded"
        );
        Ok((result, bytes))
    }

    /// Read an item PDF or the current merge result without consuming it
    pub async fn preview(&self, session: SessionId, id: &str) -> Result<Vec<u8>, PipelineError> {
        let guard = self.registry.acquire(session).await;
        let ws = self.workspace(session);

        let path = if let Some(result) = MergeResult::from_preview_id(id) {
            Some(ws.result_path(result))
        } else {
            FileId::parse(id).map(|id| ws.item_path(id, "pdf"))
        };
        let preview = match path {
            Some(path) => ws.read_all(&path).await,
            None => Err(PipelineError::NotFound),
        };

        self.finish(session, guard).await;
        preview
    }

    /// Discard everything the session holds
    pub async fn clear(&self, session: SessionId) {
        let guard = self.registry.acquire(session).await;
        self.workspace(session).purge().await;
        self.finish(session, guard).await;
        debug!(session = %session, "Cleared");
    }

    pub async fn status(&self, session: SessionId) -> SessionState {
        let guard = self.registry.acquire(session).await;
        let state = self.workspace(session).state().await;
        self.finish(session, guard).await;
        state
    }

    /// Purge sessions untouched for `max_idle`; returns how many workspaces went
    ///
    /// Busy sessions are skipped. Session directories the registry does not know
    /// about (left over from an earlier run) are purged once their last
    /// modification is older than `max_idle`.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut purged = 0;

        for (session, guard) in self.registry.lock_idle(max_idle).await {
            self.workspace(session).purge().await;
            drop(guard);
            purged += 1;
        }

        for session in self.orphaned_sessions(max_idle).await {
            let guard = self.registry.acquire(session).await;
            self.workspace(session).purge().await;
            self.finish(session, guard).await;
            purged += 1;
        }

        let forgotten = self.registry.forget_idle(max_idle).await;
        if purged > 0 {
            info!(purged, forgotten, "Swept idle sessions");
        }
        purged
    }

    /// Release the session lock; a session without a workspace is forgotten
    async fn finish(&self, session: SessionId, guard: OwnedMutexGuard<()>) {
        let dir = self.workspace(session).dir().to_path_buf();
        if let Ok(false) = tokio::fs::try_exists(&dir).await {
            self.registry.release(session, guard).await;
        }
    }

    async fn orphaned_sessions(&self, max_idle: Duration) -> Vec<SessionId> {
        let mut orphans = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot scan upload root: {}", e);
                }
                return orphans;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(session) = entry.file_name().to_str().and_then(SessionId::parse) else {
                continue;
            };
            if self.registry.is_tracked(session).await {
                continue;
            }
            if is_stale(&entry.path(), max_idle).await {
                orphans.push(session);
            }
        }
        orphans
    }
}

async fn count_pages(pdf: PathBuf) -> u32 {
    tokio::task::spawn_blocking(move || assembly::page_count(&pdf))
        .await
        .unwrap_or(0)
}

async fn is_stale(dir: &Path, max_idle: Duration) -> bool {
    let Ok(metadata) = tokio::fs::metadata(dir).await else {
        return false;
    };
    if !metadata.is_dir() {
        return false;
    }
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age >= max_idle)
        .unwrap_or(false)
}

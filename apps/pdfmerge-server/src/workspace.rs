//! Per-session artifact storage
//!
//! One directory per session under the upload root. Items are stored as
//! `{fileId}.{ext}` and merge results under fixed names, so every path is built
//! from a validated token, an allow-listed extension or a constant. Nothing a
//! client sends is ever joined onto a path verbatim.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::assembly;
use crate::error::PipelineError;
use crate::models::{FileId, MergeResult, SessionId, SessionState};

/// Prefix of scratch files and directories; never counted as items
pub const SCRATCH_PREFIX: &str = ".";

/// Storage area owned by a single session
#[derive(Debug, Clone)]
pub struct Workspace {
    session: SessionId,
    dir: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path, session: SessionId) -> Self {
        Self {
            session,
            dir: root.join(session.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn item_path(&self, id: FileId, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, extension))
    }

    pub fn result_path(&self, result: MergeResult) -> PathBuf {
        self.dir.join(result.file_name())
    }

    /// Write a new artifact, creating the session directory on demand
    ///
    /// The artifact only appears under its final name once fully written.
    pub async fn save(
        &self,
        id: FileId,
        bytes: &[u8],
        extension: &str,
    ) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.item_path(id, extension);
        let dest = path.clone();
        let contents = bytes.to_vec();
        tokio::task::spawn_blocking(move || assembly::write_atomically(&dest, &contents))
            .await
            .map_err(|e| PipelineError::Internal(format!("save task failed: {}", e)))??;
        debug!(
            session = %self.session,
            file = %path.display(),
            size = bytes.len(),
            "Saved artifact"
        );
        Ok(path)
    }

    /// Current PDF of an item; unconverted uploads are never resolvable
    pub async fn resolve(&self, id: FileId) -> Result<PathBuf, PipelineError> {
        let path = self.item_path(id, "pdf");
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(PipelineError::NotFound),
        }
    }

    /// Delete every artifact whose filename starts with `id`; returns how many went
    pub async fn remove(&self, id: FileId) -> usize {
        let prefix = id.to_string();
        let mut removed = 0;

        for name in self.file_names().await {
            if !name.starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(self.dir.join(&name)).await {
                Ok(()) => {
                    removed += 1;
                    debug!(session = %self.session, file = %name, "Removed artifact");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(session = %self.session, file = %name, "Failed to remove artifact: {}", e)
                }
            }
        }

        removed
    }

    /// Delete a single artifact, ignoring failures
    pub async fn discard(&self, path: &Path) {
        if !path.starts_with(&self.dir) {
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(session = %self.session, "Failed to discard artifact: {}", e),
        }
    }

    /// Remove the whole session directory; missing directories are fine
    pub async fn purge(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(session = %self.session, "Purged workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(session = %self.session, "Failed to purge workspace: {}", e),
        }
    }

    /// Load an artifact of this workspace fully into memory
    pub async fn read_all(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        if !path.starts_with(&self.dir) {
            return Err(PipelineError::NotFound);
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// The merge result on disk, protected first
    pub async fn existing_result(&self) -> Option<(MergeResult, PathBuf)> {
        for result in MergeResult::LOOKUP_ORDER {
            let path = self.result_path(result);
            if let Ok(true) = tokio::fs::try_exists(&path).await {
                return Some((result, path));
            }
        }
        None
    }

    /// Drop any previous merge result so a new one never coexists with it
    pub async fn clear_results(&self) {
        for result in MergeResult::LOOKUP_ORDER {
            self.discard(&self.result_path(result)).await;
        }
    }

    /// Number of merge-eligible items
    pub async fn item_count(&self) -> usize {
        self.file_names()
            .await
            .iter()
            .filter(|name| name.ends_with(".pdf"))
            .filter(|name| !name.starts_with(SCRATCH_PREFIX))
            .filter(|name| {
                MergeResult::LOOKUP_ORDER
                    .iter()
                    .all(|result| result.file_name() != name.as_str())
            })
            .count()
    }

    pub async fn state(&self) -> SessionState {
        if let Some((result, _)) = self.existing_result().await {
            return SessionState::Merged(result);
        }
        if self.item_count().await > 0 {
            SessionState::HasItems
        } else {
            SessionState::Empty
        }
    }

    async fn file_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names
    }
}

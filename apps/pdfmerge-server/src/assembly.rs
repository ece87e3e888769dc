//! File-level assembly engine
//!
//! Wraps the byte-level operations of `pdfmerge-core` with the on-disk
//! discipline the workspace relies on: outputs are written to a named temp file
//! next to the destination and renamed into place only once complete. A failed
//! operation drops the temp file, so no partial output survives.
//!
//! Everything here is blocking; the pipeline calls it through `spawn_blocking`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PipelineError;
use crate::workspace::SCRATCH_PREFIX;

/// Concatenate `inputs` in the given order into `dest`
pub fn merge(inputs: &[PathBuf], dest: &Path) -> Result<PathBuf, PipelineError> {
    let mut documents = Vec::with_capacity(inputs.len());
    for path in inputs {
        let bytes = fs::read(path).map_err(|e| {
            PipelineError::MergeError(format!("Cannot read {}: {}", display_name(path), e))
        })?;
        documents.push(bytes);
    }

    let merged = pdfmerge_core::merge_documents(documents)
        .map_err(|e| PipelineError::MergeError(e.to_string()))?;
    write_atomically(dest, &merged)
        .map_err(|e| PipelineError::MergeError(format!("Cannot write output: {}", e)))?;

    info!("Merged {} PDFs into {}", inputs.len(), display_name(dest));
    Ok(dest.to_path_buf())
}

/// Re-encode `source` so it only opens with `password`
pub fn encrypt(source: &Path, password: &str, dest: &Path) -> Result<PathBuf, PipelineError> {
    let bytes = fs::read(source).map_err(|e| PipelineError::EncryptionError(e.to_string()))?;
    let protected = pdfmerge_core::protect_document(&bytes, password)
        .map_err(|e| PipelineError::EncryptionError(e.to_string()))?;
    write_atomically(dest, &protected)
        .map_err(|e| PipelineError::EncryptionError(format!("Cannot write output: {}", e)))?;

    info!("Encrypted PDF saved to {}", display_name(dest));
    Ok(dest.to_path_buf())
}

/// Best-effort page count; unreadable or unparsable files count as zero
pub fn page_count(path: &Path) -> u32 {
    fs::read(path)
        .map(|bytes| pdfmerge_core::page_count_or_zero(&bytes))
        .unwrap_or(0)
}

/// Write through a temp file in the destination directory, then rename
pub fn write_atomically(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}tmp-", SCRATCH_PREFIX))
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

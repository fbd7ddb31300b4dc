//! Per-job scratch directories.
//!
//! ## Why a guard?
//!
//! A job can leave its handler through many doors: success, a stage error, a
//! timeout, a client disconnect that drops the request future, a panic.
//! [`Workspace`] owns the directory through a [`TempDir`] and removes it in
//! [`Workspace::close`] (on the blocking pool) or [`Workspace::release`], or
//! failing that, in `Drop`. Release is idempotent, so the orchestrator can
//! close explicitly (and log errors) while the drop covers cancellation and
//! panics.
//!
//! ## Naming
//!
//! `job-<uuid>-<random>` under the configured upload directory. The UUID ties
//! a stray directory back to a job in the logs; the random suffix from
//! `tempfile` guarantees `create_dir` never collides.

use crate::error::Doc2ImgError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Base name of the upload inside a workspace.
pub const SOURCE_STEM: &str = "source";

/// A uniquely named directory owned by exactly one job.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create `job-<job_id>-<random>` under `base`, creating `base` if needed.
    pub fn acquire(base: &Path, job_id: Uuid) -> Result<Self, Doc2ImgError> {
        std::fs::create_dir_all(base).map_err(|e| Doc2ImgError::workspace(base, e))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .rand_bytes(8)
            .tempdir_in(base)
            .map_err(|e| Doc2ImgError::workspace(base, e))?;
        let path = dir.path().to_path_buf();
        debug!("Acquired workspace {}", path.display());
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is still held.
    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Write the upload as `source.<ext>`. The client filename contributes
    /// only its (lower-cased, alphanumeric) extension, never path components.
    pub async fn write_source(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<PathBuf, Doc2ImgError> {
        let name = source_file_name(extension);
        let path = self.path.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Doc2ImgError::workspace(&path, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove the directory. Later calls (and the drop) are no-ops.
    pub fn release(&mut self) -> Result<(), Doc2ImgError> {
        match self.dir.take() {
            Some(dir) => {
                dir.close().map_err(|e| Doc2ImgError::workspace(&self.path, e))?;
                debug!("Released workspace {}", self.path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Workspace {
    /// Remove the directory on the blocking pool, consuming the guard.
    ///
    /// The orchestrator ends every job that reached its workspace here, so
    /// a large page set is never deleted on a runtime worker. `Drop` stays
    /// the fallback for cancelled or panicking jobs.
    pub async fn close(mut self) -> Result<(), Doc2ImgError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| Doc2ImgError::Internal(format!("workspace cleanup task failed: {e}")))?
            .map_err(|e| Doc2ImgError::workspace(&path, e))?;
        debug!("Released workspace {}", path.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Workspace cleanup failed: {}", e);
        }
    }
}

/// `source.<ext>`, or bare `source` when the extension is absent or unsafe.
pub fn source_file_name(extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{SOURCE_STEM}.{}", ext.to_ascii_lowercase())
        }
        _ => SOURCE_STEM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_tagged() {
        let base = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let a = Workspace::acquire(base.path(), id).unwrap();
        let b = Workspace::acquire(base.path(), id).unwrap();
        assert_ne!(a.path(), b.path());

        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("job-{id}-")), "got: {name}");
        assert!(a.path().starts_with(base.path()));
    }

    #[test]
    fn release_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(base.path(), Uuid::new_v4()).unwrap();
        std::fs::write(ws.path().join("page-1.png"), b"x").unwrap();
        let path = ws.path().to_path_buf();

        ws.release().unwrap();
        assert!(!path.exists());
        assert!(!ws.is_active());
        ws.release().unwrap();
    }

    #[tokio::test]
    async fn close_removes_directory_off_the_runtime() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(base.path(), Uuid::new_v4()).unwrap();
        for n in 1..=20 {
            std::fs::write(ws.path().join(format!("page-{n:02}.png")), b"x").unwrap();
        }
        let path = ws.path().to_path_buf();

        ws.close().await.unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn close_after_release_is_noop() {
        let base = tempfile::tempdir().unwrap();
        let mut ws = Workspace::acquire(base.path(), Uuid::new_v4()).unwrap();
        ws.release().unwrap();
        ws.close().await.unwrap();
    }

    #[test]
    fn drop_removes_directory() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::acquire(base.path(), Uuid::new_v4()).unwrap();
            std::fs::create_dir(ws.path().join(".lo-profile")).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn acquire_creates_missing_base() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("uploads").join("nested");
        let ws = Workspace::acquire(&base, Uuid::new_v4()).unwrap();
        assert!(ws.path().is_dir());
    }

    #[tokio::test]
    async fn source_name_ignores_client_path() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(base.path(), Uuid::new_v4()).unwrap();
        let path = ws.write_source(b"%PDF-1.4", Some("PDF")).await.unwrap();
        assert_eq!(path, ws.path().join("source.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn unsafe_extensions_are_dropped() {
        assert_eq!(source_file_name(Some("docx")), "source.docx");
        assert_eq!(source_file_name(Some("../x")), "source");
        assert_eq!(source_file_name(Some("")), "source");
        assert_eq!(source_file_name(None), "source");
    }
}

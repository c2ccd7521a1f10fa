use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// A file receiving an upload, outside the addressable archive namespace.
///
/// Dropping the handle without committing removes the file, so an abandoned
/// request leaves nothing behind.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    armed: bool,
}

impl StagedUpload {
    pub(super) fn new(path: PathBuf, file: tokio::fs::File) -> Self {
        Self {
            path,
            file: Some(file),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writable handle to the staging file.
    ///
    /// # Panics
    /// After [`finish`](Self::finish) has closed the file.
    pub fn file_mut(&mut self) -> &mut tokio::fs::File {
        self.file.as_mut().expect("staging file already closed")
    }

    /// Flush and close the write handle so the bytes are on disk.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    pub(super) async fn remove(mut self) {
        self.file.take();
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to remove staging file");
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.file.take();
        let path = std::mem::take(&mut self.path);
        // Dropped on a cancelled request task; keep the unlink off the runtime.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_abandoned(&path));
            }
            Err(_) => remove_abandoned(&path),
        }
    }
}

fn remove_abandoned(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "abandoned staging file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to remove staging file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use crate::store::{ArtifactStore, ModulePath};

    #[tokio::test]
    async fn dropped_upload_removes_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let module = ModulePath::parse("acme/widgets").unwrap();

        let mut staged = store.begin_upload(&module, "v1.0.0").await.unwrap();
        staged.file_mut().write_all(b"partial").await.unwrap();
        let path = staged.path().to_owned();
        assert!(path.exists());

        drop(staged);
        for _ in 0..200 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!path.exists());
    }

    #[test]
    fn dropped_outside_runtime_removes_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let staged = runtime.block_on(async {
            let store = ArtifactStore::new(tmp.path());
            let module = ModulePath::parse("acme/widgets").unwrap();
            store.begin_upload(&module, "v1.0.0").await.unwrap()
        });
        let path = staged.path().to_owned();
        drop(staged);
        assert!(!path.exists());
    }
}

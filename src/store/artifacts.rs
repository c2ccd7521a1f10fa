use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::staging::StagedUpload;
use crate::version;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {context}")]
    PermissionDenied {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("storage failure: {context}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify an I/O error, keeping it as the source.
    fn classify(err: io::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(context),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                context,
                source: err,
            },
            _ => Self::Storage {
                context,
                source: err,
            },
        }
    }

    fn storage(err: io::Error, context: impl Into<String>) -> Self {
        Self::Storage {
            context: context.into(),
            source: err,
        }
    }
}

// ---------------------------------------------------------------------------
// Module paths
// ---------------------------------------------------------------------------

/// A validated, slash-separated module path such as `acme/widgets`.
///
/// Every segment is a plain filename component, so paths derived from it
/// cannot escape the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath(String);

impl ModulePath {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.contains('\\') || raw.contains('\0') {
            return None;
        }
        let segments_ok = raw
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        segments_ok.then(|| Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory part and final segment (`acme`, `widgets` for `acme/widgets`).
    pub fn split(&self) -> (&str, &str) {
        self.0.rsplit_once('/').unwrap_or(("", &self.0))
    }

    pub fn basename(&self) -> &str {
        self.split().1
    }

    /// Entry-name prefix every file inside this module's archive must carry.
    pub fn archive_prefix(&self, version: &str) -> String {
        format!("{}@{version}/", self.0)
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a version token can be embedded in a file name as-is.
///
/// Syntax is not checked here; callers on the read path treat an unsafe
/// token the same as a missing file.
pub fn is_safe_version_token(version: &str) -> bool {
    !version.is_empty()
        && version != "."
        && version != ".."
        && !version.contains(['/', '\\', '\0'])
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Filesystem metadata for one published archive.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactMeta {
    pub publish_time: DateTime<Utc>,
    pub size: u64,
}

/// Archive storage rooted at a directory.
///
/// Layout:
/// ```text
/// <root>/
///   modules/<path-dir>/<basename>@<version>.zip
///   uploads/<sha256>.<uuid>.zip
/// ```
///
/// The directory listing is the only index; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn modules_dir(&self) -> PathBuf {
        self.root.join("modules")
    }

    fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Directory holding every archive of `module`.
    fn module_dir(&self, module: &ModulePath) -> PathBuf {
        let (dir, _) = module.split();
        if dir.is_empty() {
            self.modules_dir()
        } else {
            self.modules_dir().join(dir)
        }
    }

    /// Deterministic location of the archive for `(module, version)`.
    pub fn archive_path(&self, module: &ModulePath, version: &str) -> PathBuf {
        self.module_dir(module)
            .join(format!("{}@{version}.zip", module.basename()))
    }

    /// Create the storage directories if they are missing.
    pub async fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [self.modules_dir(), self.uploads_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::storage(e, format!("create {}", dir.display())))?;
        }
        Ok(())
    }

    /// All valid versions of `module`, ascending.
    #[tracing::instrument(skip(self), fields(%module), err(level = "debug"))]
    pub async fn list_versions(&self, module: &ModulePath) -> Result<Vec<String>, StoreError> {
        let dir = self.module_dir(module);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::classify(e, format!("module {module}")))?;

        let prefix = format!("{}@", module.basename());
        let mut versions = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::classify(e, format!("list {}", dir.display())))?;
            let Some(entry) = entry else { break };

            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(token) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".zip"))
            else {
                continue;
            };
            if token.contains('@') || !version::is_valid(token) {
                continue;
            }
            // Follows symlinks; anything that cannot be opened as a file is skipped.
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }
            versions.push(token.to_owned());
        }

        if versions.is_empty() {
            return Err(StoreError::NotFound(format!("module {module}")));
        }
        version::sort(&mut versions);
        Ok(versions)
    }

    /// Publish time and size of one archive.
    pub async fn stat(&self, module: &ModulePath, version: &str) -> Result<ArtifactMeta, StoreError> {
        if !is_safe_version_token(version) {
            return Err(StoreError::NotFound(format!("{module}@{version}")));
        }
        let path = self.archive_path(module, version);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StoreError::classify(e, format!("{module}@{version}")))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(format!("{module}@{version}")));
        }
        let modified = meta
            .modified()
            .map_err(|e| StoreError::storage(e, format!("mtime of {}", path.display())))?;
        Ok(ArtifactMeta {
            publish_time: DateTime::<Utc>::from(modified),
            size: meta.len(),
        })
    }

    /// Open an archive for reading.
    pub async fn open_archive(
        &self,
        module: &ModulePath,
        version: &str,
    ) -> Result<tokio::fs::File, StoreError> {
        if !is_safe_version_token(version) {
            return Err(StoreError::NotFound(format!("{module}@{version}")));
        }
        let file = tokio::fs::File::open(self.archive_path(module, version))
            .await
            .map_err(|e| StoreError::classify(e, format!("{module}@{version}")))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| StoreError::classify(e, format!("{module}@{version}")))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(format!("{module}@{version}")));
        }
        Ok(file)
    }

    /// Allocate a staging file for an incoming upload.
    ///
    /// The name starts with a digest of `module@version` and ends with a
    /// random suffix, so no two uploads ever share a staging file.
    pub async fn begin_upload(
        &self,
        module: &ModulePath,
        version: &str,
    ) -> Result<StagedUpload, StoreError> {
        let dir = self.uploads_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::storage(e, format!("create {}", dir.display())))?;

        let digest = hex::encode(Sha256::digest(format!("{module}@{version}").as_bytes()));
        let path = dir.join(format!("{digest}.{}.zip", uuid::Uuid::new_v4().simple()));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::storage(e, format!("create staging {}", path.display())))?;

        tracing::debug!(path = %path.display(), "staging file created");
        Ok(StagedUpload::new(path, file))
    }

    /// Publish a staged upload as the archive for `(module, version)`.
    ///
    /// The archive appears through a hard link, which refuses to replace an
    /// existing file; a concurrent or repeated publish fails with `Conflict`.
    /// The staging file is removed whatever the outcome.
    #[tracing::instrument(skip(self, staged), fields(%module, %version), err(level = "debug"))]
    pub async fn commit(
        &self,
        mut staged: StagedUpload,
        module: &ModulePath,
        version: &str,
    ) -> Result<(), StoreError> {
        let result = self.link_published(&mut staged, module, version).await;
        self.discard(staged).await;
        let dest = result?;
        tracing::info!(path = %dest.display(), "archive published");
        Ok(())
    }

    async fn link_published(
        &self,
        staged: &mut StagedUpload,
        module: &ModulePath,
        version: &str,
    ) -> Result<PathBuf, StoreError> {
        staged.finish().await.map_err(|e| {
            StoreError::storage(e, format!("flush staging {}", staged.path().display()))
        })?;

        let dest = self.archive_path(module, version);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::storage(e, format!("create {}", parent.display())))?;
        }

        match tokio::fs::hard_link(staged.path(), &dest).await {
            Ok(()) => Ok(dest),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::Conflict(format!("{module}@{version}")))
            }
            Err(e) => Err(StoreError::storage(
                e,
                format!("publish {}", dest.display()),
            )),
        }
    }

    /// Remove a staging file. Missing files are not an error.
    pub async fn discard(&self, staged: StagedUpload) {
        staged.remove().await;
    }
}

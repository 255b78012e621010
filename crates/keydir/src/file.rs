//! File-backed key directory.
//!
//! Keys live in a single directory as `<identity>.key.pub` PEM files. The
//! identity has already been validated by [`Identity::parse`], so the file
//! name cannot escape `root`.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{
    directory::KeyDirectory,
    error::{DirectoryError, DirectoryResult},
    identity::Identity,
    record::KeyRecord,
};

/// File name suffix for public key files.
pub const PUBLIC_KEY_SUFFIX: &str = ".key.pub";

/// [`KeyDirectory`] reading `<root>/<identity>.key.pub`.
///
/// Every lookup reads the file again; edits on disk are visible immediately.
#[derive(Debug, Clone)]
pub struct FileKeyDirectory {
    root: PathBuf,
}

impl FileKeyDirectory {
    /// Creates a directory rooted at `root`.
    ///
    /// The path is not checked here; a missing root surfaces as
    /// [`DirectoryError::NotFound`] on lookup.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding the key files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file that would hold the key for `identity`.
    #[must_use]
    pub fn key_path(&self, identity: &Identity) -> PathBuf {
        self.root.join(format!("{identity}{PUBLIC_KEY_SUFFIX}"))
    }
}

#[async_trait]
impl KeyDirectory for FileKeyDirectory {
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        let path = self.key_path(identity);

        let pem = match tokio::fs::read_to_string(&path).await {
            Ok(pem) => pem,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DirectoryError::not_found(identity.as_str()));
            },
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(DirectoryError::malformed(identity.as_str(), "key file is not UTF-8"));
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read key file");
                return Err(DirectoryError::unavailable_with_source("failed to read key file", e));
            },
        };

        KeyRecord::from_pem(identity.clone(), &pem)
    }
}

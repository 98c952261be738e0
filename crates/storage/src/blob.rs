use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use gallery::BlobStore;
use url::Url;

/// Media objects kept on the local filesystem and served under a public
/// base URL. Object paths map one-to-one onto files below `root`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self> {
        let mut public_base = Url::parse(public_base)
            .with_context(|| format!("invalid media public base url '{public_base}'"))?;
        if !public_base.path().ends_with('/') {
            let path = format!("{}/", public_base.path());
            public_base.set_path(&path);
        }
        Ok(Self {
            root: root.into(),
            public_base,
        })
    }

    /// True when `path` stays below the store root once joined.
    pub fn is_valid_object_path(path: &str) -> bool {
        let relative = Path::new(path);
        !path.is_empty()
            && !relative.is_absolute()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if !Self::is_valid_object_path(path) {
            bail!("invalid object path '{path}'");
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: Option<&str>) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write object '{path}'"))?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(anyhow!(error).context(format!("failed to remove object '{path}'"))),
        }
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(anyhow!(error).context(format!("failed to read object '{path}'"))),
        }
    }

    fn public_url(&self, path: &str) -> String {
        self.public_base
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{path}", self.public_base))
    }

    fn path_from_public_url(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        if url.origin() != self.public_base.origin() {
            return None;
        }
        let path = url
            .path()
            .strip_prefix(self.public_base.path())?
            .trim_start_matches('/');
        if path.is_empty() || self.resolve(path).is_err() {
            return None;
        }
        Some(path.to_string())
    }
}

#[cfg(test)]
#[path = "tests/blob_tests.rs"]
mod tests;

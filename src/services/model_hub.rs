use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiError};
use hf_hub::{Repo, RepoType};

use crate::model::error::HubError;
use crate::model::transfer_job::HubRepository;

/// A remote registry of model repositories
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelHub: Send + Sync {
    /// Mirrors every file of `repository` into `dest_dir`, keeping the
    /// repository's relative layout. Returns the local paths written.
    async fn fetch_repository(
        &self,
        repository: &HubRepository,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, HubError>;
}

/// Hugging Face Hub through `hf-hub`
///
/// Files land in the hub cache first and are then hard-linked (or copied
/// when linking is not possible) into the destination tree. Without an
/// explicit cache directory a cache next to the destination is used for the
/// run and removed once the files are staged, so the staged tree holds the
/// only local copy.
#[derive(Debug, Clone, Default)]
pub struct HfHubClient {
    cache_dir: Option<PathBuf>,
    progress: bool,
}

impl HfHubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn build_api(&self, token: Option<String>, cache_dir: PathBuf) -> Result<Api, HubError> {
        let mut builder = ApiBuilder::new()
            .with_progress(self.progress)
            .with_cache_dir(cache_dir);
        // keep the token hf-hub found in its own cache unless one was given
        if token.is_some() {
            builder = builder.with_token(token);
        }
        builder.build().map_err(hub_error)
    }

    async fn mirror(
        &self,
        repository: &HubRepository,
        dest_dir: &Path,
        cache_dir: PathBuf,
    ) -> Result<Vec<PathBuf>, HubError> {
        let api = self.build_api(repository.token.clone(), cache_dir)?;
        let repo = api.repo(Repo::with_revision(
            repository.repo_id.clone(),
            RepoType::Model,
            repository.revision.clone(),
        ));

        let info = repo.info().await.map_err(hub_error)?;
        tokio::fs::create_dir_all(dest_dir).await?;

        let mut fetched = Vec::with_capacity(info.siblings.len());
        for sibling in info.siblings {
            let remote = sibling.rfilename;
            let relative = staging_path(&remote).ok_or_else(|| {
                HubError::Other(format!("Refusing to stage file outside {}: {}", dest_dir.display(), remote))
            })?;

            tracing::debug!("Fetching {} from {}", remote, repository.repo_id);
            let cached = repo.get(&remote).await.map_err(hub_error)?;
            let local = dest_dir.join(relative);
            link_or_copy(&cached, &local).await?;
            fetched.push(local);
        }

        Ok(fetched)
    }
}

#[async_trait]
impl ModelHub for HfHubClient {
    async fn fetch_repository(
        &self,
        repository: &HubRepository,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, HubError> {
        match &self.cache_dir {
            Some(cache_dir) => self.mirror(repository, dest_dir, cache_dir.clone()).await,
            None => {
                let cache_dir = run_cache_dir(dest_dir);
                let result = self.mirror(repository, dest_dir, cache_dir.clone()).await;
                let cleanup = remove_run_cache(&cache_dir).await;
                let fetched = result?;
                cleanup?;
                Ok(fetched)
            }
        }
    }
}

/// Cache used for a single run: a hidden sibling of `dest_dir`, so it shares
/// its filesystem but is never walked by the uploader.
fn run_cache_dir(dest_dir: &Path) -> PathBuf {
    let name = dest_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "staging".to_string());
    let cache_name = format!(".{}.hub-cache", name);
    match dest_dir.parent() {
        Some(parent) => parent.join(cache_name),
        None => PathBuf::from(cache_name),
    }
}

async fn remove_run_cache(cache_dir: &Path) -> Result<(), HubError> {
    match tokio::fs::remove_dir_all(cache_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn hub_error(err: ApiError) -> HubError {
    HubError::from_message(err.to_string())
}

/// Relative path a remote file is written to, or None if the remote name
/// would escape the destination directory.
fn staging_path(remote: &str) -> Option<PathBuf> {
    let path = Path::new(remote);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

async fn link_or_copy(cached: &Path, local: &Path) -> Result<(), HubError> {
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // cache snapshots are symlinks into the blob store
    let blob = tokio::fs::canonicalize(cached).await?;
    if tokio::fs::symlink_metadata(local).await.is_ok() {
        tokio::fs::remove_file(local).await?;
    }
    if tokio::fs::hard_link(&blob, local).await.is_err() {
        tokio::fs::copy(&blob, local).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_staging_path_keeps_layout() {
        assert_eq!(staging_path("config.json"), Some(PathBuf::from("config.json")));
        assert_eq!(
            staging_path("weights/shard1.bin"),
            Some(["weights", "shard1.bin"].iter().collect())
        );
        assert_eq!(staging_path("./a.txt"), Some(PathBuf::from("a.txt")));
    }

    #[test]
    fn test_staging_path_rejects_escapes() {
        assert_eq!(staging_path("../outside.bin"), None);
        assert_eq!(staging_path("/etc/passwd"), None);
        assert_eq!(staging_path(""), None);
    }

    #[tokio::test]
    async fn test_link_or_copy_creates_parents() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let cached = dir.path().join("blob");
        tokio::fs::write(&cached, b"weights").await?;

        let local = dir.path().join("staging").join("weights").join("shard1.bin");
        link_or_copy(&cached, &local).await?;

        assert_eq!(tokio::fs::read(&local).await?, b"weights");
        Ok(())
    }

    #[tokio::test]
    async fn test_link_or_copy_replaces_existing_file() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let cached = dir.path().join("blob");
        tokio::fs::write(&cached, b"new").await?;
        let local = dir.path().join("config.json");
        tokio::fs::write(&local, b"old").await?;

        link_or_copy(&cached, &local).await?;

        assert_eq!(tokio::fs::read(&local).await?, b"new");
        Ok(())
    }

    #[test]
    fn test_run_cache_is_outside_the_staging_tree() {
        assert_eq!(
            run_cache_dir(Path::new("/tmp/work/model_download")),
            PathBuf::from("/tmp/work/.model_download.hub-cache")
        );
        assert_eq!(
            run_cache_dir(Path::new("model_download")),
            PathBuf::from(".model_download.hub-cache")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_staged_files_are_the_only_copy_after_cache_removal() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("model_download");
        let cache = run_cache_dir(&dest);
        let blob = cache.join("models--org--model-x").join("blobs").join("abc");
        let snapshot = cache
            .join("models--org--model-x")
            .join("snapshots")
            .join("main")
            .join("config.json");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await?;
        tokio::fs::create_dir_all(snapshot.parent().unwrap()).await?;
        tokio::fs::write(&blob, b"{}").await?;
        tokio::fs::symlink(&blob, &snapshot).await?;

        let local = dest.join("config.json");
        link_or_copy(&snapshot, &local).await?;
        remove_run_cache(&cache).await?;

        assert!(!cache.exists());
        assert_eq!(tokio::fs::read(&local).await?, b"{}");
        // nothing else keeps the bytes alive once the staged file is uploaded
        use std::os::unix::fs::MetadataExt;
        assert_eq!(tokio::fs::metadata(&local).await?.nlink(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_missing_run_cache_is_ok() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        remove_run_cache(&dir.path().join("never-created")).await?;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_or_copy_resolves_symlinks() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let blob = dir.path().join("blobs").join("abc");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await?;
        tokio::fs::write(&blob, b"tokenizer").await?;
        let snapshot = dir.path().join("snapshot-tokenizer.json");
        tokio::fs::symlink(&blob, &snapshot).await?;

        let local = dir.path().join("out").join("tokenizer.json");
        link_or_copy(&snapshot, &local).await?;

        let metadata = tokio::fs::symlink_metadata(&local).await?;
        assert!(metadata.is_file());
        assert_eq!(tokio::fs::read(&local).await?, b"tokenizer");
        Ok(())
    }
}

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::fs;

use crate::model::error::{StoreError, UploadError};
use crate::model::transfer_event::TransferEvent;
use crate::model::transfer_job::TransferOptions;
use crate::model::upload_record::{destination_key, UploadRecord};
use crate::model::upload_summary::UploadSummary;
use crate::services::object_store::ObjectStore;
use crate::services::reporter::Reporter;

/// What happened to one file
#[derive(Debug)]
enum FileOutcome {
    Uploaded(UploadRecord),
    /// Stored, but the local copy could not be removed
    Retained(UploadRecord),
    Failed(UploadError),
}

/// Moves a local tree into the object store, file by file
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn Reporter>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, reporter: Arc<dyn Reporter>) -> Self {
        Uploader { store, reporter }
    }

    /// Uploads every file under `root` to `bucket` below `prefix`.
    ///
    /// A file is deleted only after the store confirmed it. Failures are
    /// reported and collected; they never stop the rest of the batch. Entries
    /// that cannot be read count as failed files. The only error returned is a
    /// failure to open `root` itself.
    pub async fn upload_tree(
        &self,
        root: &Path,
        bucket: &str,
        prefix: &str,
        options: &TransferOptions,
    ) -> io::Result<UploadSummary> {
        let mut entries = Vec::new();
        let root_entries = fs::read_dir(root).await?;
        collect_files(root_entries, root, &mut entries).await;
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let mut summary = UploadSummary::default();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                WalkEntry::File(path, size) => {
                    records.extend(UploadRecord::for_file(root, path, prefix, size))
                }
                WalkEntry::Unreadable(path, error) => {
                    let error = unreadable_entry(root, prefix, path, error);
                    self.reporter.report(TransferEvent::UploadFailed(error.clone()));
                    summary.failed.push(error);
                }
            }
        }

        let outcomes: Vec<FileOutcome> = stream::iter(records)
            .map(|record| self.upload_file(record, bucket, options))
            .buffer_unordered(options.upload_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                FileOutcome::Uploaded(record) => summary.uploaded.push(record),
                FileOutcome::Retained(record) => summary.retained_after_upload.push(record),
                FileOutcome::Failed(error) => summary.failed.push(error),
            }
        }
        summary.sort();

        if let Err(e) = prune_empty_dirs(root).await {
            self.reporter.report(TransferEvent::PruneFailed {
                dir: root.to_path_buf(),
                error: e.to_string(),
            });
        }
        Ok(summary)
    }

    async fn upload_file(
        &self,
        record: UploadRecord,
        bucket: &str,
        options: &TransferOptions,
    ) -> FileOutcome {
        self.reporter.report(TransferEvent::UploadStarted {
            local_path: record.local_path.clone(),
            bucket: bucket.to_string(),
            key: record.key.clone(),
        });

        if let Err(source) = self
            .store
            .put_object(bucket, &record.key, &record.local_path, options)
            .await
        {
            let error = UploadError {
                path: record.local_path,
                key: record.key,
                source,
            };
            self.reporter.report(TransferEvent::UploadFailed(error.clone()));
            return FileOutcome::Failed(error);
        }

        match fs::remove_file(&record.local_path).await {
            Ok(()) => {
                self.reporter
                    .report(TransferEvent::UploadSucceeded(record.clone()));
                FileOutcome::Uploaded(record)
            }
            Err(e) => {
                self.reporter.report(TransferEvent::CleanupFailed {
                    record: record.clone(),
                    error: e.to_string(),
                });
                FileOutcome::Retained(record)
            }
        }
    }
}

/// One entry found while walking the staging tree
#[derive(Debug)]
enum WalkEntry {
    File(PathBuf, u64),
    Unreadable(PathBuf, io::Error),
}

impl WalkEntry {
    fn path(&self) -> &Path {
        match self {
            WalkEntry::File(path, _) | WalkEntry::Unreadable(path, _) => path,
        }
    }
}

fn unreadable_entry(root: &Path, prefix: &str, path: PathBuf, error: io::Error) -> UploadError {
    let key = path
        .strip_prefix(root)
        .map(|relative| destination_key(prefix, relative))
        .unwrap_or_default();
    UploadError {
        path,
        key,
        source: StoreError::LocalIo(error.to_string()),
    }
}

/// Every regular file below the directory behind `dir_entries`, with its size.
/// Symlinked directories are not followed. Entries that cannot be read,
/// including whole subdirectories, are kept as [`WalkEntry::Unreadable`].
fn collect_files<'a>(
    mut dir_entries: fs::ReadDir,
    dir: &'a Path,
    entries: &'a mut Vec<WalkEntry>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        loop {
            let entry = match dir_entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    entries.push(WalkEntry::Unreadable(dir.to_path_buf(), e));
                    break;
                }
            };
            let path = entry.path();
            let is_dir = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    entries.push(WalkEntry::Unreadable(path, e));
                    continue;
                }
            };
            if is_dir {
                match fs::read_dir(&path).await {
                    Ok(sub_entries) => collect_files(sub_entries, &path, entries).await,
                    Err(e) => entries.push(WalkEntry::Unreadable(path, e)),
                }
                continue;
            }
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    entries.push(WalkEntry::File(path, metadata.len()))
                }
                Ok(_) => {}
                Err(e) => entries.push(WalkEntry::Unreadable(path, e)),
            }
        }
    })
}

/// Removes `dir` and every directory below it that ends up empty.
/// Returns true if `dir` itself was removed.
fn prune_empty_dirs<'a>(dir: &'a Path) -> Pin<Box<dyn Future<Output = io::Result<bool>> + Send + 'a>> {
    Box::pin(async move {
        let mut is_empty = true;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // unreadable subdirectories are already reported as failed files
            let removed = entry.file_type().await?.is_dir()
                && prune_empty_dirs(&path).await.unwrap_or(false);
            if !removed {
                is_empty = false;
            }
        }
        if is_empty {
            fs::remove_dir(dir).await?;
        }
        Ok(is_empty)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::error::StoreError;
    use crate::services::object_store::MockObjectStore;
    use crate::services::reporter::MemoryReporter;
    use tempfile::tempdir;

    async fn write_file(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, content).await.unwrap();
        path
    }

    async fn walk(root: &Path) -> io::Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        collect_files(fs::read_dir(root).await?, root, &mut entries).await;
        entries.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(entries)
    }

    #[tokio::test]
    async fn test_collect_files_recurses() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        write_file(dir.path(), "config.json", b"{}").await;
        write_file(dir.path(), "weights/shard1.bin", b"0123").await;
        fs::create_dir_all(dir.path().join("empty")).await?;

        let files: Vec<(PathBuf, u64)> = walk(dir.path())
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                WalkEntry::File(path, size) => Some((path, size)),
                WalkEntry::Unreadable(..) => None,
            })
            .collect();

        assert_eq!(
            files,
            vec![
                (dir.path().join("config.json"), 2),
                (dir.path().join("weights").join("shard1.bin"), 4)
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_fails_alone() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        let config = write_file(&root, "config.json", b"{}").await;
        let tokenizer = root.join("tokenizer.json");
        fs::symlink(dir.path().join("gone"), &tokenizer).await?;

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|_, key, _, _| key == "model-x/config.json")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let reporter = Arc::new(MemoryReporter::new());
        let uploader = Uploader::new(Arc::new(store), reporter.clone());

        let summary = uploader
            .upload_tree(&root, "demo-bucket", "model-x", &TransferOptions::default())
            .await?;

        assert!(!config.exists());
        assert_eq!(summary.uploaded.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].path, tokenizer);
        assert_eq!(summary.failed[0].key, "model-x/tokenizer.json");
        assert!(matches!(summary.failed[0].source, StoreError::LocalIo(_)));
        assert_eq!(reporter.upload_failures().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_file_that_cannot_be_removed_is_retained() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        let config = write_file(&root, "config.json", b"{}").await;

        let mut store = MockObjectStore::new();
        store.expect_put_object().returning(|_, _, path, _| {
            // a non-empty directory in its place makes remove_file fail, even as root
            std::fs::remove_file(path).unwrap();
            std::fs::create_dir(path).unwrap();
            std::fs::write(path.join("lock"), b"").unwrap();
            Ok(())
        });
        let reporter = Arc::new(MemoryReporter::new());
        let uploader = Uploader::new(Arc::new(store), reporter.clone());

        let summary = uploader
            .upload_tree(&root, "demo-bucket", "model-x", &TransferOptions::default())
            .await?;

        assert!(summary.uploaded.is_empty());
        assert!(summary.failed.is_empty());
        assert_eq!(summary.retained_after_upload.len(), 1);
        assert_eq!(summary.retained_after_upload[0].key, "model-x/config.json");
        assert!(config.exists());
        assert!(reporter
            .events()
            .iter()
            .any(|event| matches!(event, TransferEvent::CleanupFailed { .. })));
        assert!(matches!(
            crate::model::run_state::RunOutcome::from_summary(summary),
            crate::model::run_state::RunOutcome::Completed(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_keeps_directories_with_files() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        write_file(&root, "weights/shard1.bin", b"x").await;
        fs::create_dir_all(root.join("a").join("b")).await?;

        let removed = prune_empty_dirs(&root).await?;

        assert!(!removed);
        assert!(root.join("weights").join("shard1.bin").exists());
        assert!(!root.join("a").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_uploads_remove_local_files() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        write_file(&root, "config.json", b"{}").await;
        write_file(&root, "weights/shard1.bin", b"0123").await;

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|bucket, key, path, _| {
                bucket == "demo-bucket" && path.exists() && key.starts_with("model-x/")
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        let reporter = Arc::new(MemoryReporter::new());
        let uploader = Uploader::new(Arc::new(store), reporter.clone());

        let summary = uploader
            .upload_tree(&root, "demo-bucket", "model-x", &TransferOptions::default())
            .await?;

        let keys: Vec<&str> = summary.uploaded.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["model-x/config.json", "model-x/weights/shard1.bin"]);
        assert_eq!(summary.uploaded_bytes(), 6);
        assert!(summary.failed.is_empty());
        assert!(!root.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_file_and_continues() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        let config = write_file(&root, "config.json", b"{}").await;
        let shard = write_file(&root, "weights/shard1.bin", b"0123").await;

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .returning(|_, key, _, _| {
                if key.ends_with("shard1.bin") {
                    Err(StoreError::NetworkError("connection reset".into()))
                } else {
                    Ok(())
                }
            });
        let reporter = Arc::new(MemoryReporter::new());
        let uploader = Uploader::new(Arc::new(store), reporter.clone());

        let summary = uploader
            .upload_tree(&root, "demo-bucket", "model-x", &TransferOptions::default())
            .await?;

        assert!(!config.exists());
        assert!(shard.exists());
        assert_eq!(summary.uploaded.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].key, "model-x/weights/shard1.bin");
        assert_eq!(reporter.upload_failures().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_first_failure_does_not_block_later_files() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        for name in ["a.bin", "b.bin", "c.bin"] {
            write_file(&root, name, b"data").await;
        }

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .times(3)
            .returning(|_, key, _, _| {
                if key == "m/a.bin" {
                    Err(StoreError::Throttling("SlowDown".into()))
                } else {
                    Ok(())
                }
            });
        let options = TransferOptions {
            upload_concurrency: 2,
            ..TransferOptions::default()
        };
        let uploader = Uploader::new(Arc::new(store), Arc::new(MemoryReporter::new()));

        let summary = uploader.upload_tree(&root, "bucket", "m", &options).await?;

        assert_eq!(summary.attempted(), 3);
        assert_eq!(summary.uploaded.len(), 2);
        assert!(root.join("a.bin").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_failure_is_reported() -> color_eyre::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("staging");
        write_file(&root, "config.json", b"{}").await;

        let mut store = MockObjectStore::new();
        store.expect_put_object().returning(|_, _, path, _| {
            std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
            Ok(())
        });
        let reporter = Arc::new(MemoryReporter::new());
        let uploader = Uploader::new(Arc::new(store), reporter.clone());

        let summary = uploader
            .upload_tree(&root, "demo-bucket", "model-x", &TransferOptions::default())
            .await?;

        assert_eq!(summary.retained_after_upload.len(), 1);
        assert!(reporter.events().iter().any(|event| matches!(
            event,
            TransferEvent::PruneFailed { dir, .. } if dir == &root
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let uploader = Uploader::new(
            Arc::new(MockObjectStore::new()),
            Arc::new(MemoryReporter::new()),
        );

        let result = uploader
            .upload_tree(&dir.path().join("nope"), "bucket", "m", &TransferOptions::default())
            .await;
        assert!(result.is_err());
    }
}

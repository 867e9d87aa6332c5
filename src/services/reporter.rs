//! Sinks for run progress
//!
//! The pipeline stages never log on their own; they hand [`TransferEvent`]s to
//! the reporter they were constructed with. Only the store and hub clients log
//! transport details directly. The binary uses [`TracingReporter`],
//! tests use [`MemoryReporter`] to assert on what a run said.

use std::sync::Mutex;

use crate::model::error::UploadError;
use crate::model::transfer_event::TransferEvent;

pub trait Reporter: Send + Sync {
    fn report(&self, event: TransferEvent);
}

/// Writes every event as a `tracing` line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: TransferEvent) {
        match event {
            TransferEvent::StateChanged(state) => tracing::debug!("Run state: {}", state),
            TransferEvent::RegionChecked { bucket, region } => {
                tracing::info!("Bucket {} is in the expected region {}", bucket, region)
            }
            TransferEvent::FetchStarted {
                repo_id,
                revision,
                local_dir,
            } => tracing::info!(
                "Downloading model {} ({}) from Hugging Face to {}...",
                repo_id,
                revision,
                local_dir.display()
            ),
            TransferEvent::FetchCompleted { files, local_dir } => {
                tracing::info!("Model downloaded to {} ({} files)", local_dir.display(), files)
            }
            TransferEvent::UploadStarted {
                local_path,
                bucket,
                key,
            } => tracing::info!("Uploading {} to s3://{}/{}", local_path.display(), bucket, key),
            TransferEvent::UploadSucceeded(record) => {
                tracing::debug!("Uploaded {} and removed local copy", record.key)
            }
            TransferEvent::UploadFailed(error) => tracing::error!(
                "Failed to upload {}: {}",
                error.path.display(),
                error.source
            ),
            TransferEvent::CleanupFailed { record, error } => tracing::warn!(
                "Uploaded {} but could not remove {}: {}",
                record.key,
                record.local_path.display(),
                error
            ),
            TransferEvent::PruneFailed { dir, error } => {
                tracing::warn!("Could not clean up {}: {}", dir.display(), error)
            }
            TransferEvent::RunFinished(summary) => {
                if summary.is_complete() {
                    tracing::info!(
                        "Model upload completed successfully: {} files, {}",
                        summary.uploaded.len() + summary.retained_after_upload.len(),
                        summary.uploaded_size()
                    )
                } else {
                    tracing::warn!(
                        "Model upload completed with {} of {} files failed; failed files were kept locally",
                        summary.failed.len(),
                        summary.attempted()
                    )
                }
            }
            TransferEvent::RunFailed(error) => tracing::error!("Error occurred: {}", error),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<TransferEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn upload_failures(&self) -> Vec<UploadError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TransferEvent::UploadFailed(error) => Some(error),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: TransferEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

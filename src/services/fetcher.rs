use std::path::{Path, PathBuf};

use crate::model::error::TransferError;
use crate::model::transfer_event::TransferEvent;
use crate::model::transfer_job::HubRepository;
use crate::services::model_hub::ModelHub;
use crate::services::reporter::Reporter;

/// Mirrors the whole repository into `local_dir`. Any hub error ends the run,
/// since the upload stage needs a complete tree.
pub async fn fetch_repository(
    hub: &dyn ModelHub,
    repository: &HubRepository,
    local_dir: &Path,
    reporter: &dyn Reporter,
) -> Result<Vec<PathBuf>, TransferError> {
    reporter.report(TransferEvent::FetchStarted {
        repo_id: repository.repo_id.clone(),
        revision: repository.revision.clone(),
        local_dir: local_dir.to_path_buf(),
    });

    let files = hub.fetch_repository(repository, local_dir).await?;

    reporter.report(TransferEvent::FetchCompleted {
        files: files.len(),
        local_dir: local_dir.to_path_buf(),
    });
    Ok(files)
}

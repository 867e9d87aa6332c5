use std::path::PathBuf;

use crate::model::error::{TransferError, UploadError};
use crate::model::run_state::RunState;
use crate::model::upload_record::UploadRecord;
use crate::model::upload_summary::UploadSummary;

/// Everything worth telling the user about while a run is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    StateChanged(RunState),
    RegionChecked {
        bucket: String,
        region: String,
    },
    FetchStarted {
        repo_id: String,
        revision: String,
        local_dir: PathBuf,
    },
    FetchCompleted {
        files: usize,
        local_dir: PathBuf,
    },
    UploadStarted {
        local_path: PathBuf,
        bucket: String,
        key: String,
    },
    UploadSucceeded(UploadRecord),
    UploadFailed(UploadError),
    /// The object is stored but the local copy is still there
    CleanupFailed {
        record: UploadRecord,
        error: String,
    },
    /// Empty staging directories could not be removed
    PruneFailed {
        dir: PathBuf,
        error: String,
    },
    RunFinished(UploadSummary),
    RunFailed(TransferError),
}

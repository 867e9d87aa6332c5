//! Runs one transfer job from start to finish
//!
//! Stages run strictly one after another: the bucket region is checked, the
//! repository is mirrored to the staging directory, then the staging directory
//! is uploaded. A failure in the first two stages ends the run. Upload failures
//! are per file and only turn a completed run into a degraded one.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use crate::model::error::TransferError;
use crate::model::run_state::{RunOutcome, RunState};
use crate::model::transfer_event::TransferEvent;
use crate::model::transfer_job::TransferJob;
use crate::model::upload_summary::UploadSummary;
use crate::services::fetcher::fetch_repository;
use crate::services::model_hub::ModelHub;
use crate::services::object_store::ObjectStore;
use crate::services::region_validator::validate_region;
use crate::services::reporter::Reporter;
use crate::services::uploader::Uploader;

pub struct Orchestrator {
    job: TransferJob,
    store: Arc<dyn ObjectStore>,
    hub: Arc<dyn ModelHub>,
    reporter: Arc<dyn Reporter>,
}

/// Current state of a run, readable after a stage panicked
struct StateTracker {
    state: Mutex<RunState>,
    reporter: Arc<dyn Reporter>,
}

impl StateTracker {
    fn new(reporter: Arc<dyn Reporter>) -> Self {
        StateTracker {
            state: Mutex::new(RunState::Start),
            reporter,
        }
    }

    fn current(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug_assert!(
            !state.is_terminal() && (next == RunState::Failed || state.next() == Some(next)),
            "invalid run state transition {} -> {}",
            *state,
            next
        );
        *state = next;
        drop(state);
        self.reporter.report(TransferEvent::StateChanged(next));
    }
}

impl Orchestrator {
    pub fn new(
        job: TransferJob,
        store: Arc<dyn ObjectStore>,
        hub: Arc<dyn ModelHub>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Orchestrator {
            job,
            store,
            hub,
            reporter,
        }
    }

    /// Runs the job. Never panics and never returns early: every way a run
    /// can end is a [`RunOutcome`].
    pub async fn run(&self) -> RunOutcome {
        let tracker = StateTracker::new(self.reporter.clone());

        let result = AssertUnwindSafe(self.execute(&tracker))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TransferError::Unexpected(panic_message(panic.as_ref()))));

        match result {
            Ok(summary) => {
                tracker.enter(RunState::Done);
                self.reporter
                    .report(TransferEvent::RunFinished(summary.clone()));
                RunOutcome::from_summary(summary)
            }
            Err(error) => {
                let state = tracker.current();
                tracker.enter(RunState::Failed);
                self.reporter.report(TransferEvent::RunFailed(error.clone()));
                RunOutcome::Failed { state, error }
            }
        }
    }

    async fn execute(&self, tracker: &StateTracker) -> Result<UploadSummary, TransferError> {
        let job = &self.job;

        let region = validate_region(self.store.as_ref(), &job.bucket, &job.region).await?;
        self.reporter.report(TransferEvent::RegionChecked {
            bucket: job.bucket.clone(),
            region,
        });
        tracker.enter(RunState::Validated);

        fetch_repository(
            self.hub.as_ref(),
            &job.repository,
            &job.local_dir,
            self.reporter.as_ref(),
        )
        .await?;
        tracker.enter(RunState::Fetched);

        let uploader = Uploader::new(self.store.clone(), self.reporter.clone());
        let summary = uploader
            .upload_tree(&job.local_dir, &job.bucket, &job.prefix, &job.options)
            .await
            .map_err(|e| {
                TransferError::Unexpected(format!(
                    "Could not read staging directory {}: {}",
                    job.local_dir.display(),
                    e
                ))
            })?;
        tracker.enter(RunState::Uploaded);

        Ok(summary)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::error::{HubError, StoreError};
    use crate::model::transfer_job::HubRepository;
    use crate::services::model_hub::MockModelHub;
    use crate::services::object_store::MockObjectStore;
    use crate::services::reporter::MemoryReporter;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    struct PanickingHub;

    #[async_trait::async_trait]
    impl ModelHub for PanickingHub {
        async fn fetch_repository(
            &self,
            _repository: &HubRepository,
            _dest_dir: &Path,
        ) -> Result<Vec<PathBuf>, HubError> {
            panic!("hub client bug")
        }
    }

    fn job(local_dir: &Path) -> TransferJob {
        TransferJob::new(
            HubRepository::new("org/model-x"),
            "demo-bucket",
            "model-x",
            "us-west-2",
            local_dir,
        )
    }

    fn state_changes(reporter: &MemoryReporter) -> Vec<RunState> {
        reporter
            .events()
            .into_iter()
            .filter_map(|event| match event {
                TransferEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_region_mismatch_stops_before_fetch() {
        let dir = tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store
            .expect_get_bucket_region()
            .returning(|_| Ok("us-east-1".into()));
        store.expect_put_object().never();
        let mut hub = MockModelHub::new();
        hub.expect_fetch_repository().never();
        let reporter = Arc::new(MemoryReporter::new());

        let outcome = Orchestrator::new(
            job(&dir.path().join("staging")),
            Arc::new(store),
            Arc::new(hub),
            reporter.clone(),
        )
        .run()
        .await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                state: RunState::Start,
                error: TransferError::ConfigurationMismatch { .. }
            }
        ));
        assert_eq!(state_changes(&reporter), vec![RunState::Failed]);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_from_validated() {
        let dir = tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store
            .expect_get_bucket_region()
            .returning(|_| Ok("us-west-2".into()));
        store.expect_put_object().never();
        let mut hub = MockModelHub::new();
        hub.expect_fetch_repository()
            .returning(|_, _| Err(HubError::NetworkError("hub unreachable".into())));
        let reporter = Arc::new(MemoryReporter::new());

        let outcome = Orchestrator::new(
            job(&dir.path().join("staging")),
            Arc::new(store),
            Arc::new(hub),
            reporter.clone(),
        )
        .run()
        .await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                state: RunState::Validated,
                error: TransferError::Fetch(HubError::NetworkError(_))
            }
        ));
        assert_eq!(
            state_changes(&reporter),
            vec![RunState::Validated, RunState::Failed]
        );
    }

    #[tokio::test]
    async fn test_upload_failures_degrade_the_run() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        let mut store = MockObjectStore::new();
        store
            .expect_get_bucket_region()
            .returning(|_| Ok("us-west-2".into()));
        store.expect_put_object().returning(|_, key, _, _| {
            if key == "model-x/weights/shard1.bin" {
                Err(StoreError::NetworkError("simulated".into()))
            } else {
                Ok(())
            }
        });
        let mut hub = MockModelHub::new();
        hub.expect_fetch_repository().returning(|_, dest| {
            std::fs::create_dir_all(dest.join("weights")).unwrap();
            std::fs::write(dest.join("config.json"), b"{}").unwrap();
            std::fs::write(dest.join("weights").join("shard1.bin"), b"0101").unwrap();
            Ok(vec![dest.join("config.json"), dest.join("weights").join("shard1.bin")])
        });
        let reporter = Arc::new(MemoryReporter::new());

        let outcome = Orchestrator::new(
            job(&staging),
            Arc::new(store),
            Arc::new(hub),
            reporter.clone(),
        )
        .run()
        .await;

        assert!(matches!(outcome, RunOutcome::Degraded(_)));
        assert_eq!(outcome.exit_code(false), 0);
        assert!(!staging.join("config.json").exists());
        assert!(staging.join("weights").join("shard1.bin").exists());
        assert_eq!(
            state_changes(&reporter),
            vec![
                RunState::Validated,
                RunState::Fetched,
                RunState::Uploaded,
                RunState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_unexpected() {
        let dir = tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store
            .expect_get_bucket_region()
            .returning(|_| Ok("us-west-2".into()));

        let outcome = Orchestrator::new(
            job(&dir.path().join("staging")),
            Arc::new(store),
            Arc::new(PanickingHub),
            Arc::new(MemoryReporter::new()),
        )
        .run()
        .await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                state: RunState::Validated,
                error: TransferError::Unexpected("hub client bug".into()),
            }
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with a non-string payload");
    }
}

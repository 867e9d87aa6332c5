//! Lifecycle of a single run and its final outcome
//!
//! A run moves strictly forward through
//! `Start -> Validated -> Fetched -> Uploaded -> Done`. `Failed` is terminal and
//! is entered from whichever state the run was in when a fatal error occurred.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::model::error::TransferError;
use crate::model::upload_summary::UploadSummary;

/// Exit code for a run that reached the end but left some files behind, in strict mode
pub const EXIT_DEGRADED: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    Start,
    Validated,
    Fetched,
    Uploaded,
    Done,
    Failed,
}

impl RunState {
    /// The state a successful stage moves the run into
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Start => Some(RunState::Validated),
            RunState::Validated => Some(RunState::Fetched),
            RunState::Fetched => Some(RunState::Uploaded),
            RunState::Uploaded => Some(RunState::Done),
            RunState::Done | RunState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Start => write!(f, "START"),
            RunState::Validated => write!(f, "VALIDATED"),
            RunState::Fetched => write!(f, "FETCHED"),
            RunState::Uploaded => write!(f, "UPLOADED"),
            RunState::Done => write!(f, "DONE"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

/// What a run produced. Returned by the orchestrator instead of unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every file was uploaded and removed locally
    Completed(UploadSummary),
    /// The upload stage ran to the end but some files failed
    Degraded(UploadSummary),
    /// A fatal error stopped the run; `state` is the last state reached
    Failed { state: RunState, error: TransferError },
}

impl RunOutcome {
    pub fn from_summary(summary: UploadSummary) -> Self {
        if summary.failed.is_empty() {
            RunOutcome::Completed(summary)
        } else {
            RunOutcome::Degraded(summary)
        }
    }

    pub fn final_state(&self) -> RunState {
        match self {
            RunOutcome::Completed(_) | RunOutcome::Degraded(_) => RunState::Done,
            RunOutcome::Failed { .. } => RunState::Failed,
        }
    }

    pub fn summary(&self) -> Option<&UploadSummary> {
        match self {
            RunOutcome::Completed(summary) | RunOutcome::Degraded(summary) => Some(summary),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TransferError> {
        match self {
            RunOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Process exit code. A degraded run only fails the process in strict mode.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self {
            RunOutcome::Completed(_) => libc::EXIT_SUCCESS,
            RunOutcome::Degraded(_) if strict => EXIT_DEGRADED,
            RunOutcome::Degraded(_) => libc::EXIT_SUCCESS,
            RunOutcome::Failed { .. } => libc::EXIT_FAILURE,
        }
    }

    pub fn report(&self) -> RunReport<'_> {
        let (failed_in, error) = match self {
            RunOutcome::Failed { state, error } => (Some(*state), Some(error.to_string())),
            _ => (None, None),
        };
        RunReport {
            state: self.final_state(),
            failed_in,
            error,
            uploaded_size: self.summary().map(UploadSummary::uploaded_size),
            summary: self.summary(),
        }
    }

    /// Writes [`RunOutcome::report`] as pretty printed JSON
    pub fn write_report(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.report())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Machine readable view of a finished run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a UploadSummary>,
}

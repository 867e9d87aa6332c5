use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Threshold at or above which multipart upload is used (25 MB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 25 * 1024 * 1024;

/// Default part size for multipart upload (8 MB)
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Parts of a single file in flight at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Files in flight at once
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 1;

pub const DEFAULT_REVISION: &str = "main";

/// How a single file is transmitted to the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOptions {
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub max_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

impl TransferOptions {
    pub fn should_use_multipart(&self, file_size: u64) -> bool {
        file_size >= self.multipart_threshold
    }
}

/// A repository on the model hub
#[derive(Clone, PartialEq, Eq)]
pub struct HubRepository {
    pub repo_id: String,
    pub revision: String,
    pub token: Option<String>,
}

impl HubRepository {
    pub fn new(repo_id: impl Into<String>) -> Self {
        HubRepository {
            repo_id: repo_id.into(),
            revision: DEFAULT_REVISION.to_string(),
            token: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Last path segment of the repository id, `org/model-x` -> `model-x`
    pub fn short_name(&self) -> &str {
        self.repo_id
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.repo_id)
    }
}

// Keeps the access token out of logs.
impl fmt::Debug for HubRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubRepository")
            .field("repo_id", &self.repo_id)
            .field("revision", &self.revision)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Everything one run needs to know. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferJob {
    pub repository: HubRepository,
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub local_dir: PathBuf,
    pub options: TransferOptions,
}

impl TransferJob {
    pub fn new(
        repository: HubRepository,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        region: impl Into<String>,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        TransferJob {
            repository,
            bucket: bucket.into(),
            prefix: prefix.into(),
            region: region.into(),
            local_dir: local_dir.into(),
            options: TransferOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn destination(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix.trim_end_matches('/'))
    }
}

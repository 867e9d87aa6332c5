//! Structured error types for hub, object store and pipeline operations

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while talking to the object store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StoreError {
    /// Bucket or key not found
    NotFound(String),
    /// Access denied - insufficient permissions
    AccessDenied(String),
    /// Network or connectivity error
    NetworkError(String),
    /// Request rate exceeded
    Throttling(String),
    /// The local file could not be read
    LocalIo(String),
    /// Generic store error
    Other(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::AccessDenied(msg) => write!(f, "Access denied: {}", msg),
            StoreError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            StoreError::Throttling(msg) => write!(f, "Throttled: {}", msg),
            StoreError::LocalIo(msg) => write!(f, "Local IO error: {}", msg),
            StoreError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Categorize an error using the service error code when one is available
    pub fn from_code(code: Option<&str>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            Some("AccessDenied") | Some("AllAccessDisabled") => StoreError::AccessDenied(msg),
            Some("NoSuchBucket") | Some("NoSuchKey") | Some("NotFound") | Some("NoSuchUpload") => {
                StoreError::NotFound(msg)
            }
            Some("SlowDown")
            | Some("Throttling")
            | Some("ThrottlingException")
            | Some("RequestLimitExceeded") => StoreError::Throttling(msg),
            _ => StoreError::from_message(msg),
        }
    }

    /// Create a StoreError from an error message, attempting to categorize it
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("access denied") || msg_lower.contains("accessdenied") {
            StoreError::AccessDenied(msg)
        } else if msg_lower.contains("no such bucket")
            || msg_lower.contains("nosuchbucket")
            || msg_lower.contains("no such key")
            || msg_lower.contains("nosuchkey")
        {
            StoreError::NotFound(msg)
        } else if msg_lower.contains("slow down")
            || msg_lower.contains("slowdown")
            || msg_lower.contains("throttl")
        {
            StoreError::Throttling(msg)
        } else if msg_lower.contains("network")
            || msg_lower.contains("connection")
            || msg_lower.contains("timeout")
            || msg_lower.contains("dispatch failure")
        {
            StoreError::NetworkError(msg)
        } else {
            StoreError::Other(msg)
        }
    }
}

/// Errors that can occur while fetching a repository from the model hub
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// Repository, revision or file not found
    NotFound(String),
    /// Hub unreachable
    NetworkError(String),
    /// Staging directory could not be written
    LocalIo(String),
    /// Generic hub error
    Other(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::NotFound(msg) => write!(f, "Not found: {}", msg),
            HubError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            HubError::LocalIo(msg) => write!(f, "Local IO error: {}", msg),
            HubError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for HubError {}

impl HubError {
    /// Create a HubError from an error message, attempting to categorize it
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("404")
            || msg_lower.contains("not found")
            || msg_lower.contains("repository not found")
            || msg_lower.contains("revision not found")
        {
            HubError::NotFound(msg)
        } else if msg_lower.contains("network")
            || msg_lower.contains("connection")
            || msg_lower.contains("timeout")
            || msg_lower.contains("timed out")
            || msg_lower.contains("dns")
        {
            HubError::NetworkError(msg)
        } else {
            HubError::Other(msg)
        }
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::LocalIo(err.to_string())
    }
}

/// A single file that could not be transmitted. Recoverable: the batch goes on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadError {
    pub path: PathBuf,
    pub key: String,
    pub source: StoreError,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to upload {} to {}: {}",
            self.path.display(),
            self.key,
            self.source
        )
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Fatal errors that end a run
#[derive(Debug, Clone, PartialEq)]
pub enum TransferError {
    /// The bucket lives in a different region than the one configured
    ConfigurationMismatch {
        bucket: String,
        actual: String,
        expected: String,
    },
    /// The bucket region could not be looked up at all
    RegionLookup(StoreError),
    /// The repository could not be mirrored locally
    Fetch(HubError),
    /// Anything else, including panics inside a stage
    Unexpected(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::ConfigurationMismatch {
                bucket,
                actual,
                expected,
            } => write!(
                f,
                "Bucket {} is in {}, expected {}",
                bucket, actual, expected
            ),
            TransferError::RegionLookup(e) => write!(f, "Could not determine bucket region: {}", e),
            TransferError::Fetch(e) => write!(f, "Fetch failed: {}", e),
            TransferError::Unexpected(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::RegionLookup(e) => Some(e),
            TransferError::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HubError> for TransferError {
    fn from(err: HubError) -> Self {
        TransferError::Fetch(err)
    }
}

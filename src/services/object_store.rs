use std::path::Path;

use async_trait::async_trait;

use crate::model::error::StoreError;
use crate::model::transfer_job::TransferOptions;

/// The subset of an object store the pipeline relies on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Region the bucket actually lives in
    async fn get_bucket_region(&self, bucket: &str) -> Result<String, StoreError>;

    /// Stores the content of `local_path` under `key`. Returns only once the
    /// store has confirmed the object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        options: &TransferOptions,
    ) -> Result<(), StoreError>;
}

use crate::model::error::TransferError;
use crate::services::object_store::ObjectStore;

/// Fails unless `bucket` lives in `expected`. Nothing else touches the store
/// before this check passes.
pub async fn validate_region(
    store: &dyn ObjectStore,
    bucket: &str,
    expected: &str,
) -> Result<String, TransferError> {
    let actual = store
        .get_bucket_region(bucket)
        .await
        .map_err(TransferError::RegionLookup)?;

    if actual != expected {
        return Err(TransferError::ConfigurationMismatch {
            bucket: bucket.to_string(),
            actual,
            expected: expected.to_string(),
        });
    }
    Ok(actual)
}

use std::path::Path;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::byte_stream::Length;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types::retry::RetryConfig;
use futures::{stream, StreamExt, TryStreamExt};

use crate::model::error::StoreError;
use crate::model::transfer_job::TransferOptions;
use crate::services::object_store::ObjectStore;
use crate::settings::job_settings::StoreSettings;

/// Region used when neither the job nor the environment names one
pub const FALLBACK_REGION: &str = "us-west-2";

/// Minimum part size for multipart upload (5 MB - AWS minimum)
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts allowed by S3
const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Amazon S3 (or any S3 compatible store) through the AWS sdk
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        S3ObjectStore { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Builds a client for the configured region, endpoint and credentials.
    /// Without a credentials file the default AWS provider chain is used.
    pub async fn connect(settings: &StoreSettings) -> Self {
        let region_provider = RegionProviderChain::first_try(Region::new(settings.region.clone()))
            .or_default_provider()
            .or_else(Region::new(FALLBACK_REGION));
        let mut loader = aws_config::from_env()
            .region(region_provider)
            .retry_config(RetryConfig::standard().with_max_attempts(settings.max_attempts));

        if let Some(creds) = &settings.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                None,   // Token, if using temporary credentials (like STS)
                None,   // Expiry time, if applicable
                "file", // Source, just a label for debugging
            ));
        }
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let shared_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(settings.force_path_style)
            .build();
        tracing::debug!(
            "Created S3 client for region: {}, endpoint: {}",
            settings.region,
            settings.endpoint_url.as_deref().unwrap_or("default")
        );
        S3ObjectStore::new(Client::from_conf(s3_config))
    }

    /// Single-request upload for small files
    async fn upload_simple(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::LocalIo(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Multipart upload for large files
    ///
    /// Parts are read straight from disk and sent with at most
    /// `options.max_concurrency` requests in flight. The first failed part
    /// aborts the whole upload so no orphaned parts are left in the bucket.
    async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        file_size: u64,
        options: &TransferOptions,
    ) -> Result<(), StoreError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(store_error)?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StoreError::Other("No upload ID returned from create_multipart_upload".into()))?
            .to_string();

        let part_size = calculate_part_size(file_size, options.part_size);
        let total_parts = file_size.div_ceil(part_size).max(1);
        tracing::debug!(
            "Multipart upload of {} started: {} parts of {} bytes",
            key,
            total_parts,
            part_size
        );

        let uploaded = stream::iter(1..=total_parts)
            .map(|part_number| {
                self.upload_part(
                    bucket,
                    key,
                    &upload_id,
                    local_path,
                    PartRange::new(part_number, part_size, file_size),
                )
            })
            .buffer_unordered(options.max_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await;

        let mut completed_parts = match uploaded {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!("Multipart upload of {} failed: {}", key, e);
                self.abort_multipart(bucket, key, &upload_id).await;
                return Err(e);
            }
        };
        completed_parts.sort_by_key(|part| part.part_number());

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        match self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
        {
            Ok(_) => {
                tracing::debug!(
                    "Multipart upload completed: {} ({} parts, {} bytes)",
                    key,
                    total_parts,
                    file_size
                );
                Ok(())
            }
            Err(e) => {
                let e = store_error(e);
                tracing::error!("Failed to complete multipart upload of {}: {}", key, e);
                self.abort_multipart(bucket, key, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        local_path: &Path,
        range: PartRange,
    ) -> Result<CompletedPart, StoreError> {
        let body = ByteStream::read_from()
            .path(local_path)
            .offset(range.offset)
            .length(Length::Exact(range.length))
            .build()
            .await
            .map_err(|e| StoreError::LocalIo(e.to_string()))?;

        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(range.part_number)
            .body(body)
            .send()
            .await
            .map_err(store_error)?;

        tracing::debug!("Part {} of {} uploaded ({} bytes)", range.part_number, key, range.length);

        Ok(CompletedPart::builder()
            .part_number(range.part_number)
            .set_e_tag(response.e_tag().map(str::to_string))
            .build())
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!("Failed to abort multipart upload of {}: {}", key, store_error(e));
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_bucket_region(&self, bucket: &str) -> Result<String, StoreError> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(store_error)?;
        Ok(normalize_location(
            output.location_constraint().map(|constraint| constraint.as_str()),
        ))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        options: &TransferOptions,
    ) -> Result<(), StoreError> {
        let file_size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StoreError::LocalIo(e.to_string()))?
            .len();

        if options.should_use_multipart(file_size) {
            self.upload_multipart(bucket, key, local_path, file_size, options)
                .await
        } else {
            self.upload_simple(bucket, key, local_path).await
        }
    }
}

/// Byte range of one part of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartRange {
    part_number: i32,
    offset: u64,
    length: u64,
}

impl PartRange {
    /// `part_number` is 1-based, as S3 expects
    fn new(part_number: u64, part_size: u64, file_size: u64) -> Self {
        let offset = (part_number - 1) * part_size;
        PartRange {
            // bounded by MAX_PARTS
            part_number: part_number as i32,
            offset,
            length: part_size.min(file_size.saturating_sub(offset)),
        }
    }
}

/// Calculate the part size for a multipart upload
///
/// Returns a part size that:
/// - Is at least MIN_PART_SIZE (5MB)
/// - Is the preferred size for most files
/// - Increases if needed to stay under MAX_PARTS (10,000)
fn calculate_part_size(file_size: u64, preferred: u64) -> u64 {
    let mut part_size = preferred.max(MIN_PART_SIZE);

    if file_size.div_ceil(part_size) > MAX_PARTS {
        part_size = file_size.div_ceil(MAX_PARTS);
        // Round up to next MB for cleaner sizes
        part_size = part_size.div_ceil(MIB) * MIB;
    }

    part_size.max(MIN_PART_SIZE)
}

/// S3 reports buckets in us-east-1 without a location constraint and buckets
/// created with the legacy `EU` constraint as `EU`.
pub fn normalize_location(constraint: Option<&str>) -> String {
    match constraint.map(str::trim) {
        None | Some("") => "us-east-1".to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

/// Picks the region a run targets: the configured one, then the credentials
/// file, then the AWS default chain (`AWS_REGION`, profile), then
/// [`FALLBACK_REGION`].
pub async fn resolve_region(configured: Option<&str>, credentials_region: Option<&str>) -> String {
    let explicit = [configured, credentials_region]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|region| !region.is_empty());
    if let Some(region) = explicit {
        return region.to_string();
    }
    RegionProviderChain::default_provider()
        .or_else(Region::new(FALLBACK_REGION))
        .region()
        .await
        .map(|region| region.to_string())
        .unwrap_or_else(|| FALLBACK_REGION.to_string())
}

fn store_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StoreError::NetworkError(message)
        }
        _ => StoreError::from_code(err.as_service_error().and_then(|e| e.code()), message),
    }
}

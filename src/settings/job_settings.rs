//! Layered job configuration
//!
//! Values are resolved in this order, later sources winning:
//! built-in defaults, the config file (`--config` or `<config dir>/config.toml`),
//! `HUB2S3_*` environment variables, command line flags.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{self, ensure, eyre};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cli::Cli;
use crate::model::transfer_job::{
    HubRepository, TransferJob, TransferOptions, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE, DEFAULT_REVISION, DEFAULT_UPLOAD_CONCURRENCY,
};
use crate::settings::file_credentials::{load_credentials, FileCredential};
use crate::utils::{get_config_dir, PROJECT_NAME};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_LOCAL_DIR: &str = "model_download";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Deserialize)]
pub struct JobSettings {
    pub repo_id: Option<String>,
    pub revision: String,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub local_dir: PathBuf,
    pub hf_token: Option<String>,
    pub hf_cache_dir: Option<PathBuf>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub creds_file: Option<PathBuf>,
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub max_concurrency: usize,
    pub upload_concurrency: usize,
    pub max_attempts: u32,
    pub strict: bool,
    pub report_file: Option<PathBuf>,
}

impl std::fmt::Debug for JobSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSettings")
            .field("repo_id", &self.repo_id)
            .field("revision", &self.revision)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("local_dir", &self.local_dir)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "***"))
            .field("endpoint_url", &self.endpoint_url)
            .field("multipart_threshold", &self.multipart_threshold)
            .field("part_size", &self.part_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// How to reach the object store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub max_attempts: u32,
    pub credentials: Option<FileCredential>,
}

impl JobSettings {
    /// Loads settings for the binary, reading the process environment
    pub fn load(cli: &Cli) -> eyre::Result<Self> {
        let (config_file, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (get_config_dir().join(CONFIG_FILE), false),
        };
        Self::from_sources(&config_file, required, Environment::with_prefix(PROJECT_NAME.as_str()), cli)
    }

    fn from_sources(
        config_file: &Path,
        required: bool,
        environment: Environment,
        cli: &Cli,
    ) -> eyre::Result<Self> {
        let config = Config::builder()
            .set_default("revision", DEFAULT_REVISION)?
            .set_default("local_dir", DEFAULT_LOCAL_DIR)?
            .set_default("force_path_style", false)?
            .set_default("multipart_threshold", DEFAULT_MULTIPART_THRESHOLD)?
            .set_default("part_size", DEFAULT_PART_SIZE)?
            .set_default("max_concurrency", DEFAULT_MAX_CONCURRENCY as u64)?
            .set_default("upload_concurrency", DEFAULT_UPLOAD_CONCURRENCY as u64)?
            .set_default("max_attempts", DEFAULT_MAX_ATTEMPTS)?
            .set_default("strict", false)?
            .add_source(File::from(config_file).required(required))
            .add_source(environment.try_parsing(true))
            .set_override_option("repo_id", cli.repo_id.clone())?
            .set_override_option("revision", cli.revision.clone())?
            .set_override_option("bucket", cli.bucket.clone())?
            .set_override_option("prefix", cli.prefix.clone())?
            .set_override_option("region", cli.region.clone())?
            .set_override_option("local_dir", path_value(&cli.local_dir))?
            .set_override_option("hf_token", cli.hf_token.clone())?
            .set_override_option("hf_cache_dir", path_value(&cli.hf_cache_dir))?
            .set_override_option("endpoint_url", cli.endpoint_url.clone())?
            .set_override_option("force_path_style", cli.force_path_style.then_some(true))?
            .set_override_option("creds_file", path_value(&cli.creds_file))?
            .set_override_option("multipart_threshold", cli.multipart_threshold)?
            .set_override_option("part_size", cli.part_size)?
            .set_override_option("max_concurrency", cli.max_concurrency.map(|v| v as u64))?
            .set_override_option("upload_concurrency", cli.upload_concurrency.map(|v| v as u64))?
            .set_override_option("max_attempts", cli.max_attempts)?
            .set_override_option("strict", cli.strict.then_some(true))?
            .set_override_option("report_file", path_value(&cli.report_file))?
            .build()?;

        let settings: JobSettings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> eyre::Result<()> {
        ensure!(self.multipart_threshold > 0, "multipart_threshold must be greater than 0");
        ensure!(self.part_size > 0, "part_size must be greater than 0");
        ensure!(self.max_concurrency > 0, "max_concurrency must be at least 1");
        ensure!(self.upload_concurrency > 0, "upload_concurrency must be at least 1");
        ensure!(self.max_attempts > 0, "max_attempts must be at least 1");
        Ok(())
    }

    pub fn load_credentials(&self) -> eyre::Result<Option<FileCredential>> {
        load_credentials(self.creds_file.as_deref())
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            multipart_threshold: self.multipart_threshold,
            part_size: self.part_size,
            max_concurrency: self.max_concurrency,
            upload_concurrency: self.upload_concurrency,
        }
    }

    /// The immutable job for one run against `region`
    pub fn to_job(&self, region: impl Into<String>) -> eyre::Result<TransferJob> {
        let repo_id = required_value(&self.repo_id, "repo_id")?;
        let bucket = required_value(&self.bucket, "bucket")?;
        let repository = HubRepository::new(repo_id)
            .with_revision(self.revision.clone())
            .with_token(self.hf_token.clone().filter(|t| !t.is_empty()));
        let prefix = self
            .prefix
            .clone()
            .unwrap_or_else(|| repository.short_name().to_string());

        Ok(
            TransferJob::new(repository, bucket, prefix, region, self.local_dir.clone())
                .with_options(self.transfer_options()),
        )
    }

    /// Explicit settings win over the credentials file
    pub fn store_settings(
        &self,
        region: impl Into<String>,
        credentials: Option<FileCredential>,
    ) -> StoreSettings {
        let endpoint_url = self
            .endpoint_url
            .clone()
            .or_else(|| credentials.as_ref().and_then(|c| c.endpoint_url.clone()));
        let force_path_style = self.force_path_style
            || credentials.as_ref().is_some_and(|c| c.force_path_style);
        StoreSettings {
            region: region.into(),
            endpoint_url,
            force_path_style,
            max_attempts: self.max_attempts,
            credentials,
        }
    }
}

fn required_value(value: &Option<String>, name: &str) -> eyre::Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            eyre!(
                "missing {}: pass --{} or set {}_{}",
                name,
                name.replace('_', "-"),
                PROJECT_NAME.as_str(),
                name.to_uppercase()
            )
        })
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

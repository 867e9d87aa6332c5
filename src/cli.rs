use clap::Parser;
use std::path::PathBuf;

use crate::utils::version;

/// Every flag is optional here; missing values come from the config file or
/// `HUB2S3_*` environment variables.
#[derive(Parser, Debug, Default)]
#[command(author, version = version(), about)]
pub struct Cli {
    /// Hugging Face repository, e.g. deepseek-ai/DeepSeek-R1-Distill-Llama-8B
    #[arg(long)]
    pub repo_id: Option<String>,

    /// Branch, tag or commit of the repository [default: main]
    #[arg(long)]
    pub revision: Option<String>,

    /// Destination bucket
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket [default: last segment of the repository id]
    #[arg(long)]
    pub prefix: Option<String>,

    /// Region the bucket is expected to be in
    #[arg(long)]
    pub region: Option<String>,

    /// Staging directory for downloaded files [default: model_download]
    #[arg(long, value_name = "DIR")]
    pub local_dir: Option<PathBuf>,

    /// Hugging Face access token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Hugging Face cache directory, kept after the run [default: a cache next to
    /// the staging directory, removed once files are staged]
    #[arg(long, value_name = "DIR")]
    pub hf_cache_dir: Option<PathBuf>,

    /// Custom S3 endpoint, for S3 compatible stores
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Use path style bucket addressing
    #[arg(long)]
    pub force_path_style: bool,

    /// File with access_key/secret_key, instead of the default AWS credential chain
    #[arg(long, value_name = "FILE")]
    pub creds_file: Option<PathBuf>,

    /// Config file [default: <config dir>/config.toml]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File size in bytes from which multipart upload is used
    #[arg(long)]
    pub multipart_threshold: Option<u64>,

    /// Multipart part size in bytes
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Parts of one file uploaded at the same time
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Files uploaded at the same time
    #[arg(long)]
    pub upload_concurrency: Option<usize>,

    /// Attempts per S3 request, including the first one
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Exit with code 2 when some files failed to upload
    #[arg(long)]
    pub strict: bool,

    /// Write the upload summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report_file: Option<PathBuf>,
}

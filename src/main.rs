#![forbid(unsafe_code)]

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre;

use hub2s3::cli::Cli;
use hub2s3::services::model_hub::HfHubClient;
use hub2s3::services::orchestrator::Orchestrator;
use hub2s3::services::reporter::TracingReporter;
use hub2s3::services::s3_object_store::{resolve_region, S3ObjectStore};
use hub2s3::settings::job_settings::JobSettings;
use hub2s3::utils::{format_duration, initialize_logging, initialize_panic_handler};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();
    initialize_logging()?;
    initialize_panic_handler()?;

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Error occurred: {}", e);
            libc::EXIT_FAILURE
        }
    };
    if code != libc::EXIT_SUCCESS {
        std::process::exit(code);
    }
    Ok(())
}

async fn run(args: Cli) -> eyre::Result<i32> {
    let started = Instant::now();
    let settings = JobSettings::load(&args)?;
    tracing::debug!("Loaded settings: {:?}", settings);
    let credentials = settings.load_credentials()?;

    let region = resolve_region(
        settings.region.as_deref(),
        credentials.as_ref().and_then(|c| c.default_region.as_deref()),
    )
    .await;
    tracing::info!("Current AWS region: {}", region);

    let job = settings.to_job(region.clone())?;
    let store = S3ObjectStore::connect(&settings.store_settings(region, credentials)).await;
    let hub = HfHubClient::new()
        .with_cache_dir(settings.hf_cache_dir.clone())
        .with_progress(std::io::stderr().is_terminal());

    tracing::info!(
        "Transferring {}@{} to {}",
        job.repository.repo_id,
        job.repository.revision,
        job.destination()
    );
    let orchestrator = Orchestrator::new(
        job,
        Arc::new(store),
        Arc::new(hub),
        Arc::new(TracingReporter),
    );
    let outcome = orchestrator.run().await;

    tracing::info!(
        "Run finished in state {} after {}",
        outcome.final_state(),
        format_duration(started.elapsed().as_secs())
    );
    if let Some(path) = &settings.report_file {
        outcome.write_report(path)?;
        tracing::info!("Wrote run report to {}", path.display());
    }

    Ok(outcome.exit_code(settings.strict))
}

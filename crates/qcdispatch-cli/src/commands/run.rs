use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use qcdispatch::engine::progress::ProgressReporter;
use qcdispatch::workflows::batch::{self, BatchSummary, format_elapsed};
use tracing::{info, warn};

pub async fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting {} {} calculations...",
        config.calculator, config.calc_type
    );
    info!("Invoking the batch workflow...");

    let summary = tokio::task::block_in_place(|| batch::run(&config, &reporter))?;
    report_summary(&summary);

    Ok(())
}

fn report_summary(summary: &BatchSummary) {
    println!(
        "Job {} finished in {}: {} succeeded, {} failed.",
        summary.label,
        format_elapsed(summary.elapsed),
        summary.succeeded(),
        summary.failed()
    );
    println!("Results written to: {}", summary.output_database.display());

    let failed: Vec<&str> = summary
        .outcomes
        .iter()
        .filter(|o| !o.status.is_success())
        .map(|o| o.label.as_str())
        .collect();
    if !failed.is_empty() {
        warn!("Failed structures: {}", failed.join(", "));
        println!("Warning: failed structures: {}", failed.join(", "));
    }
}

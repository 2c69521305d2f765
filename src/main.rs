mod config;
mod http;
mod metrics;
mod models;
mod pipeline;
mod price_engine;
mod processing;
mod report;

use clap::Parser;
use config::AppConfig;
use eyre::WrapErr;
use pipeline::Pipeline;
use processing::DuplicatePolicy;
use report::XlsxReport;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "deep-discount",
    about = "Audit which offers stack with a primary offer",
    long_about = "Fetch a primary offer, filter the staging and production offers for every SKU it discounts, \
                  collect current and EPP prices, and write an xlsx report.",
    after_help = "Examples:\n  deep-discount PROMO-123\n  deep-discount PROMO-123 --duplicate-policy prod-exclusive --json"
)]
struct Cli {
    #[arg(help = "Offer id whose discounted SKUs are audited")]
    primary_offer_id: String,
    #[arg(long, help = "Directory the report is written to [env: DD_OUTPUT_DIR]")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "SKUs per price request [env: DD_BATCH_SIZE]")]
    batch_size: Option<usize>,
    #[arg(long, value_enum, help = "How staging and production offers are reconciled [env: DD_DUPLICATE_POLICY]")]
    duplicate_policy: Option<DuplicatePolicy>,
    #[arg(long, help = "Print the run summary as JSON")]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(policy) = self.duplicate_policy {
            config.duplicate_policy = policy;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target = "deep_discount.cli", "run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let mut config = AppConfig::from_env().wrap_err("invalid configuration")?;
    cli.apply(&mut config);
    config.validate().wrap_err("invalid command line")?;

    let mut report = XlsxReport::new(&config.output_dir, &cli.primary_offer_id);
    let pipeline = Pipeline::from_config(config);
    let summary = match pipeline.run(&cli.primary_offer_id, &mut report).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(
                target = "deep_discount.cli",
                stage = err.stage(),
                kind = ?err.kind(),
                detail = %err.detail(),
                "pipeline_failed"
            );
            return Err(err.into());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            target = "deep_discount.cli",
            not_in_stage = ?summary.not_in_stage,
            failed_skus = ?summary.failed_skus,
            "offers_not_in_stage"
        );
        info!(
            target = "deep_discount.cli",
            path = %summary.report_path.display(),
            "report_written"
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

mod events;
mod processing;

use anyhow::{Context, Result};
use clap::Parser;
use events::ReconstructedEvent;
use glob::glob;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    net::SocketAddr,
    path::PathBuf,
};
use telescope_common::{
    init_tracer,
    metrics::{
        component_info_metric, describe_metrics,
        failures::{self, FailureKind},
        metric_names,
    },
    tracer::TracerOptions,
};
use telescope_reconstruction::{
    ReconstructionSettings, Setup, calibration::DEFAULT_CHI_SQUARE_THRESHOLD,
};
use tracing::{debug, error, info, level_filters::LevelFilter};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// JSON file describing the layers, identification grids and telescopes
    #[clap(long, env)]
    setup: PathBuf,

    /// Glob pattern matching the JSON event files to reconstruct
    #[clap(long)]
    events: String,

    /// File the reconstructed events are written to, one JSON object per line
    #[clap(long)]
    output: PathBuf,

    /// Normalised chi-square above which measured energy losses are flagged as incoherent
    #[clap(long, default_value_t = DEFAULT_CHI_SQUARE_THRESHOLD)]
    chi_square_threshold: f64,

    /// Log level used when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,

    /// If set, metrics are served for Prometheus on this address
    #[clap(long, env)]
    observability_address: Option<SocketAddr>,

    /// Reconstruct the events of a file one after the other rather than in parallel
    #[clap(long)]
    sequential: bool,
}

fn write_event(output: &mut impl Write, event: &ReconstructedEvent) -> Result<()> {
    serde_json::to_writer(&mut *output, event)?;
    writeln!(output)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let tracer = init_tracer!(TracerOptions::new(Some(args.log_level)));
    debug!("Default log level {}", tracer.level());

    if let Some(address) = args.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()
            .context("prometheus metrics exporter should be setup")?;
    }
    component_info_metric("reconstruct-events");
    describe_metrics();

    let settings = ReconstructionSettings {
        chi_square_threshold: args.chi_square_threshold,
    };
    let setup = fs::read_to_string(&args.setup)
        .with_context(|| format!("Cannot read setup {}", args.setup.display()))?;
    let setup = Setup::from_json(&setup, settings)
        .with_context(|| format!("Invalid setup {}", args.setup.display()))?;

    let mut output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Cannot create {}", args.output.display()))?,
    );
    let mut total = 0;
    for path in glob(&args.events)? {
        let path = path?;
        let records = match processing::read_events(&path) {
            Ok(records) => records,
            Err(e) => {
                error!("{e:#}");
                continue;
            }
        };
        info!("{}: {} event(s)", path.display(), records.len());
        for event in processing::reconstruct_all(&setup, &records, args.sequential) {
            write_event(&mut output, &event)
                .inspect_err(|_| {
                    metrics::counter!(
                        metric_names::FAILURES,
                        &[failures::get_label(FailureKind::OutputWriteFailed)]
                    )
                    .increment(1)
                })
                .with_context(|| format!("Cannot write to {}", args.output.display()))?;
        }
        total += records.len();
    }
    output.flush()?;
    info!("{total} event(s) written to {}", args.output.display());
    Ok(())
}

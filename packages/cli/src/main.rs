#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Commute route emission attribution CLI.
//!
//! - `build-factors`: fleet counts + emission inventory → per-unit
//!   factor table.
//! - `run`: trips + receptor regions + factor table → receptor, origin,
//!   destination and origin→receptor tables. Each table is written only
//!   if at least one trip contributed to it.
//! - `backends`: lists the built-in routing backends.

mod input;
mod output;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use commute_emissions_attribution::aggregate::aggregate;
use commute_emissions_attribution::pipeline::{
    DEFAULT_WORKERS, PipelineConfig, RouteProcessor, prepare_trips,
};
use commute_emissions_attribution::summary::RunSummary;
use commute_emissions_cli_utils::IndicatifProgress;
use commute_emissions_factors::builder::{BuilderConfig, build_factor_table};
use commute_emissions_factors::{DEFAULT_PREFIX_LEN, FactorTable};
use commute_emissions_router::{RouterConfig, build_router, config};
use commute_emissions_spatial::{DEFAULT_ID_PROPERTY, ReceptorIndex};

#[derive(Parser)]
#[command(name = "commute_emissions", about = "Commute route emission attribution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the fleet-weighted per-mile factor table
    BuildFactors {
        /// Fleet population CSV (unit, fuel, model year, category, count)
        #[arg(long)]
        fleet: PathBuf,
        /// Emission inventory CSV (category, model year, fuel, VMT, tons)
        #[arg(long)]
        rates: PathBuf,
        /// Preamble lines before the inventory header
        #[arg(long, default_value = "0")]
        rates_skip_rows: usize,
        /// Output factor CSV
        #[arg(long)]
        out: PathBuf,
        /// Where to write fleet groups that had no reference rate
        #[arg(long)]
        unmatched_out: Option<PathBuf>,
    },
    /// Route trips and attribute their emissions to receptor regions
    Run {
        /// Trip CSV (`h_geocode`, `home_lat`, `home_lon`, `work_lat`, `work_lon`)
        #[arg(long)]
        trips: PathBuf,
        /// Receptor region `GeoJSON` `FeatureCollection`
        #[arg(long)]
        regions: PathBuf,
        /// Factor CSV produced by `build-factors`
        #[arg(long)]
        factors: PathBuf,
        /// Built-in routing backend id (see `backends`)
        #[arg(long, default_value = "routes_api")]
        router: String,
        /// Backend TOML file replacing the built-in one
        #[arg(long)]
        router_config: Option<PathBuf>,
        /// Routes API key
        #[arg(long, env = "ROUTES_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Trips processed concurrently
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Only process the first N trips (for testing)
        #[arg(long)]
        limit: Option<usize>,
        /// Region id property in the `GeoJSON`
        #[arg(long, default_value = DEFAULT_ID_PROPERTY)]
        region_id_property: String,
        /// Characters of `h_geocode` matched against factor units
        #[arg(long, default_value_t = DEFAULT_PREFIX_LEN)]
        factor_prefix_len: usize,
        /// Output directory for the tables
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Also write the run summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// List built-in routing backends
    Backends,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = commute_emissions_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildFactors {
            fleet,
            rates,
            rates_skip_rows,
            out,
            unmatched_out,
        } => build_factors(
            &fleet,
            &rates,
            rates_skip_rows,
            &out,
            unmatched_out.as_deref(),
        )?,
        Commands::Run {
            trips,
            regions,
            factors,
            router,
            router_config,
            api_key,
            workers,
            limit,
            region_id_property,
            factor_prefix_len,
            out_dir,
            summary_json,
        } => {
            let router_config = match router_config {
                Some(path) => config::from_toml_str(&std::fs::read_to_string(path)?)?,
                None => config::backend(&router)?,
            };
            let inputs = RunInputs {
                trips,
                regions,
                factors,
                region_id_property,
                factor_prefix_len,
            };
            let summary = run(
                &multi,
                &inputs,
                &router_config,
                api_key,
                PipelineConfig { workers },
                limit,
                &out_dir,
            )
            .await?;

            if let Some(path) = summary_json {
                serde_json::to_writer_pretty(File::create(&path)?, &summary)?;
                log::info!("Wrote run summary to {}", path.display());
            }
        }
        Commands::Backends => {
            println!("{:<12} {:<8} NAME", "ID", "TYPE");
            println!("{}", "-".repeat(50));
            for backend in config::all_backends()? {
                println!(
                    "{:<12} {:<8} {}",
                    backend.id,
                    backend.backend.kind(),
                    backend.name
                );
            }
        }
    }

    Ok(())
}

fn build_factors(
    fleet: &Path,
    rates: &Path,
    rates_skip_rows: usize,
    out: &Path,
    unmatched_out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let fleet = input::read_fleet(File::open(fleet)?)?;
    let rates = input::read_rates(File::open(rates)?, rates_skip_rows)?;
    log::info!(
        "Loaded {} fleet rows and {} reference rates",
        fleet.len(),
        rates.len()
    );

    let build = build_factor_table(&fleet, &rates, &BuilderConfig::default())?;

    output::write_factor_rows(File::create(out)?, &build.rows)?;
    log::info!("Wrote {} factor rows to {}", build.rows.len(), out.display());

    if let Some(path) = unmatched_out.filter(|_| !build.is_complete()) {
        output::write_unmatched(File::create(path)?, &build.unmatched)?;
        log::info!(
            "Wrote {} unmatched fleet groups to {}",
            build.unmatched.len(),
            path.display()
        );
    }

    Ok(())
}

struct RunInputs {
    trips: PathBuf,
    regions: PathBuf,
    factors: PathBuf,
    region_id_property: String,
    factor_prefix_len: usize,
}

async fn run(
    multi: &commute_emissions_cli_utils::MultiProgress,
    inputs: &RunInputs,
    router_config: &RouterConfig,
    api_key: Option<String>,
    pipeline: PipelineConfig,
    limit: Option<usize>,
    out_dir: &Path,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let start = Instant::now();

    // Shared inputs load before any trip starts; a failure here aborts
    // the whole run.
    let regions = ReceptorIndex::from_geojson(
        &std::fs::read_to_string(&inputs.regions)?,
        &inputs.region_id_property,
    )?;
    let factors = FactorTable::new(
        input::read_factor_rows(File::open(&inputs.factors)?)?,
        inputs.factor_prefix_len,
    )?;
    let records = input::read_trips(File::open(&inputs.trips)?, limit)?;
    let submitted = records.len();

    let router = build_router(router_config, api_key)?;
    let processor = RouteProcessor::new(router, Arc::new(regions), Arc::new(factors), pipeline);

    let (trips, mut results) = prepare_trips(records);
    let progress = IndicatifProgress::trips_bar(multi, "Routing trips");
    results.extend(processor.run(trips, &progress).await);

    let mut summary = RunSummary::from_results(submitted, &results);
    summary.check_complete()?;

    let aggregates = aggregate(&results);
    std::fs::create_dir_all(out_dir)?;
    for table in aggregates.tables() {
        output::write_table(out_dir, table)?;
    }
    summary.record_tables(&aggregates);

    log::info!(
        "Run complete in {:.1}s: {} of {} trips attributed",
        start.elapsed().as_secs_f64(),
        summary.succeeded,
        summary.submitted
    );
    println!("{summary}");

    Ok(summary)
}

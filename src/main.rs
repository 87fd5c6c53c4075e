//! CLI entry point for the flood clustering tool.
//!
//! Provides subcommands for clustering a scope, inspecting dataset
//! fingerprints, bulk-updating a year table and listing table sizes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flood_cluster::{
    clustering::Algorithm,
    config::Settings,
    fetch::{BasicClient, fetch_source},
    map::{self, DEFAULT_NAME_PROPERTY},
    model::Scope,
    output::{export_result, print_json, render_report, render_table},
    pipeline::{Pipeline, RunOutcome, RunParams},
    session::Session,
    store::{CsvDirStore, UpdateStatus, read_records},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tabled::Tabled;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "flood_cluster")]
#[command(about = "Cluster flood incidents by severity per sub-district", long_about = None)]
struct Cli {
    /// Directory holding incidents_<year>.csv (overrides FLOOD_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Kmedoids,
    Dbscan,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster one year, or every year aggregated, and report the result
    Cluster {
        /// A year between 2018 and 2025, or "aggregated"
        #[arg(short, long, value_parser = parse_scope, default_value = "aggregated")]
        scope: Scope,

        #[arg(short, long, value_enum, default_value_t = Method::Kmedoids)]
        method: Method,

        /// Number of clusters for k-medoids (2-10)
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(2..=10))]
        k: u8,

        /// DBSCAN neighborhood radius on scaled features (0.05-0.5)
        #[arg(short, long, default_value_t = 0.1, value_parser = parse_epsilon)]
        epsilon: f64,

        /// DBSCAN minimum neighborhood size (2-10)
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(2..=10))]
        min_points: u8,

        /// Directory to write CSV/JSON exports to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// GeoJSON boundaries (file or URL) to annotate with the result
        #[arg(short, long, value_name = "FILE_OR_URL")]
        boundaries: Option<String>,

        /// Feature property holding the sub-district name
        #[arg(long, default_value = DEFAULT_NAME_PROPERTY)]
        name_property: String,

        /// Gzip the annotated GeoJSON
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Also log the full result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the dataset fingerprint of a scope
    Fingerprint {
        #[arg(value_parser = parse_scope, default_value = "aggregated")]
        scope: Scope,
    },
    /// Overwrite rows of a year table from a CSV upload, matched by name
    Update {
        year: u16,

        /// CSV file with the incident table header
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List row counts and checksums of every supported year
    Years,
}

fn parse_scope(s: &str) -> Result<Scope, String> {
    let scope: Scope = s.parse().map_err(|e: anyhow::Error| e.to_string())?;
    if !scope.is_supported() {
        return Err(format!("year {scope} is outside the supported range"));
    }
    Ok(scope)
}

fn parse_epsilon(s: &str) -> Result<f64, String> {
    let epsilon: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !(0.05..=0.5).contains(&epsilon) {
        return Err("epsilon must be between 0.05 and 0.5".into());
    }
    Ok(epsilon)
}

#[derive(Tabled)]
struct YearRow {
    #[tabled(rename = "Year")]
    year: u16,
    #[tabled(rename = "Rows")]
    rows: u64,
    #[tabled(rename = "Checksum")]
    checksum: String,
}

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "Sub-district")]
    sub_district: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Rows")]
    rows_affected: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    let mut settings = Settings::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = settings.log_file_path.clone();
    let log_dir = log_file_path.parent().unwrap_or(Path::new("logs"));
    let log_file_name = log_file_path
        .file_name()
        .unwrap_or(OsStr::new("flood_cluster.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    info!(data_dir = %settings.data_dir.display(), "Using data directory");
    let mut pipeline = Pipeline::new(CsvDirStore::new(&settings.data_dir), &settings);

    match cli.command {
        Commands::Cluster {
            scope,
            method,
            k,
            epsilon,
            min_points,
            output_dir,
            boundaries,
            name_property,
            gzip,
            json,
        } => {
            let algorithm = match method {
                Method::Kmedoids => Algorithm::KMedoids { k: k as usize },
                Method::Dbscan => Algorithm::Dbscan {
                    epsilon,
                    min_points: min_points as usize,
                },
            };
            let params = RunParams { scope, algorithm };
            let mut session = Session::new();

            let result = match pipeline.run(&mut session, &params).await {
                Ok(RunOutcome::Completed(result)) => result,
                Ok(RunOutcome::Empty) => {
                    warn!(scope = %scope, "No flood incidents recorded for this scope");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Clustering failed");
                    return Err(e.into());
                }
            };

            println!("{}", render_report(&result));
            if json {
                print_json(result.as_ref())?;
            }

            if let Some(dir) = &output_dir {
                export_result(dir, &result)?;
            }

            if let Some(source) = boundaries {
                let client = BasicClient::new(settings.store_timeout)?;
                let bytes = fetch_source(&client, &source).await?;
                let mut layer = map::load_geojson(&bytes)?;
                let summary = map::annotate(&mut layer, &result, &name_property)?;
                info!(
                    matched = summary.matched,
                    unmatched = summary.unmatched.len(),
                    "Choropleth layer built"
                );

                let dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
                std::fs::create_dir_all(&dir)?;
                let file_name = if gzip {
                    "clusters.geojson.gz"
                } else {
                    "clusters.geojson"
                };
                map::write_geojson(&dir.join(file_name), &layer, gzip)?;
            }
        }
        Commands::Fingerprint { scope } => {
            let fingerprint = pipeline.fingerprint(scope).await;
            println!("{scope}: {fingerprint}");
        }
        Commands::Update { year, file } => {
            let rows = read_records(&file)
                .with_context(|| format!("failed to load upload {}", file.display()))?;
            info!(year, rows = rows.len(), "Applying upload");

            let reports = pipeline.update_year(year, &rows).await?;
            let updated = reports
                .iter()
                .filter(|r| r.status == UpdateStatus::Updated)
                .count();
            let table: Vec<UpdateRow> = reports
                .into_iter()
                .map(|r| UpdateRow {
                    sub_district: r.sub_district,
                    status: format!("{:?}", r.status),
                    rows_affected: r.rows_affected,
                })
                .collect();
            println!("{}", render_table(&table));
            info!(year, updated, total = table.len(), "Update complete");
        }
        Commands::Years => {
            let table: Vec<YearRow> = pipeline
                .year_checksums()
                .await?
                .into_iter()
                .map(|(year, sum)| YearRow {
                    year,
                    rows: sum.row_count,
                    checksum: format!("{:.2}", sum.checksum),
                })
                .collect();
            println!("{}", render_table(&table));
        }
    }

    Ok(())
}

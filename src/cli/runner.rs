use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Duration;
use tracing::{info, warn};

use emitwater::aoi::{aois_to_geojson, read_drawn_polygons};
use emitwater::api::{aois_from_drawn, extract_from_paths, process_directory_to_path, summarize_search_results};
use emitwater::download::{DownloadOptions, download_granules};
use emitwater::granule::{
    AssetFilter, asset_urls, concurrent_match, granule_vertices, load_granules, results_summary,
    summaries_to_geojson,
};
use emitwater::{EwtParams, run as run_job};

use super::args::{AoiArgs, AssetsArgs, CliArgs, Command, CwcArgs, DownloadArgs, ExtractArgs, GranulesArgs};
use super::errors::AppError;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Config file first, then explicit flags
fn build_params(args: &CwcArgs) -> Result<EwtParams, AppError> {
    let mut params = match &args.config {
        Some(path) => EwtParams::from_file(path)?,
        None => EwtParams::default(),
    };
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(AppError::ZeroWorkers { workers });
        }
        params.worker_count = workers;
    }
    if let Some(limit) = args.detection_limit {
        params.fit.detection_limit = limit;
    }
    if let Some(table) = &args.table {
        params.table.path = table.clone();
    }
    if let Some(max) = args.max_evaluations {
        params.fit.max_evaluations = max;
    }
    params.fit.validate()?;
    Ok(params)
}

fn run_cwc(args: CwcArgs) -> CliResult {
    let params = build_params(&args)?;
    info!(
        "Workers: {}, detection limit: {}, table: {:?}",
        params.worker_count,
        params.detection_limit(),
        params.table.path
    );

    match (&args.input, &args.input_dir) {
        (Some(_), Some(_)) => Err(AppError::ConflictingArguments {
            first: "--input".to_string(),
            second: "--input-dir".to_string(),
        }
        .into()),
        (None, None) => Err(AppError::MissingArgument {
            arg: "--input or --input-dir".to_string(),
        }
        .into()),
        (Some(input), None) => {
            let report = run_job(input, &args.output_dir, &params)?;
            info!(
                "Wrote {:?} ({}x{}): fitted={} skipped={} not_converged={}",
                report.output, report.cols, report.rows, report.fitted, report.skipped, report.not_converged
            );
            info!("Convergence mask: {:?}", report.converged_output);
            println!("{}", report.output.display());
            Ok(())
        }
        (None, Some(input_dir)) => {
            info!("Starting batch processing from directory: {:?}", input_dir);
            let report = process_directory_to_path(input_dir, &args.output_dir, &params, args.batch)?;
            info!("Batch processing complete!");
            info!("Processed: {}", report.processed);
            info!("Skipped: {}", report.skipped);
            info!("Errors: {}", report.errors);
            for output in &report.outputs {
                println!("{}", output.display());
            }
            Ok(())
        }
    }
}

fn write_json_or_stdout(value: &serde_json::Value, output: Option<&Path>) -> CliResult {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, text)?;
            info!("Wrote {:?}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", text)?;
        }
    }
    Ok(())
}

fn run_granules(args: GranulesArgs) -> CliResult {
    let (granules, mut summary) = summarize_search_results(&args.results)?;

    if args.vertices {
        let mut stdout = std::io::stdout().lock();
        for granule in &granules {
            let vertices = granule_vertices(granule, true)?;
            writeln!(stdout, "{}\t{:?}", granule.id(), vertices)?;
        }
        return Ok(());
    }

    if let Some(other) = &args.match_with {
        let other_summary = results_summary(&load_granules(other)?)?;
        let window = Duration::minutes(args.window_minutes);
        let (a, b) = concurrent_match(&summary, &other_summary, window);
        info!(
            "{} of {} and {} of {} granules fall within {} minutes of each other",
            a.len(),
            summary.len(),
            b.len(),
            other_summary.len(),
            args.window_minutes
        );
        let mut matched: Vec<_> = a.into_iter().cloned().collect();
        matched.extend(b.into_iter().cloned());
        summary = matched;
    }

    write_json_or_stdout(&summaries_to_geojson(&summary), args.output.as_deref())
}

fn run_assets(args: AssetsArgs) -> CliResult {
    let granules = load_granules(&args.results)?;
    let filter = AssetFilter {
        contains: args.contains,
        extensions: args.extension,
        first_only: args.first_only,
        scheme: Some(args.scheme),
    };
    let mut stdout = std::io::stdout().lock();
    for granule in &granules {
        match asset_urls(granule, &filter) {
            Ok(urls) => {
                for url in urls {
                    writeln!(stdout, "{}", url)?;
                }
            }
            Err(e) => warn!("{}: {}", granule.id(), e),
        }
    }
    Ok(())
}

fn run_aoi(args: AoiArgs) -> CliResult {
    let drawn = read_drawn_polygons(&args.drawn)?;
    let aois = aois_from_drawn(&drawn, !args.no_transform)?;
    info!("Created {} AOI polygon(s)", aois.len());
    write_json_or_stdout(&aois_to_geojson(&aois), Some(&args.output))
}

fn run_extract(args: ExtractArgs) -> CliResult {
    let extraction = extract_from_paths(&args.raster, &args.aois, args.summary)?;
    if extraction.is_empty() {
        warn!("No pixel centers fall inside the AOIs");
    }
    extraction.save_csv(&args.output)?;
    info!("Wrote {} row(s) to {:?}", extraction.len(), args.output);
    Ok(())
}

fn run_download(args: DownloadArgs) -> CliResult {
    let mut urls = args.urls;
    if let Some(path) = &args.url_file {
        let text = fs::read_to_string(path)?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    if urls.is_empty() {
        return Err(AppError::MissingArgument {
            arg: "URLS or --url-file".to_string(),
        }
        .into());
    }
    let options = DownloadOptions {
        token: args.token,
        timeout: args.timeout_secs.map(std::time::Duration::from_secs),
    };
    let paths = download_granules(&urls, &args.output_dir, &options)?;
    info!("{} file(s) in {:?}", paths.len(), args.output_dir);
    Ok(())
}

pub fn run(args: CliArgs) -> CliResult {
    if args.log {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    match args.command {
        Command::Cwc(a) => run_cwc(a),
        Command::Granules(a) => run_granules(a),
        Command::Assets(a) => run_assets(a),
        Command::Aoi(a) => run_aoi(a),
        Command::Extract(a) => run_extract(a),
        Command::Download(a) => run_download(a),
    }
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use emitwater::types::AssetScheme;

#[derive(Parser)]
#[command(name = "emitwater", version, about = "EMIT/PACE water content and granule tools")]
pub struct CliArgs {
    /// Enable logging
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Estimate equivalent water thickness (EWT / CWC) from EMIT L2A reflectance
    Cwc(CwcArgs),
    /// Summarize granule search results as GeoJSON
    Granules(GranulesArgs),
    /// List asset URLs of granule search results
    Assets(AssetsArgs),
    /// Turn drawn polygons into an AOI GeoJSON
    Aoi(AoiArgs),
    /// Extract raster values under AOI polygons to CSV
    Extract(ExtractArgs),
    /// Download granule assets
    Download(DownloadArgs),
}

#[derive(Args)]
pub struct CwcArgs {
    /// Input EMIT_L2A_RFL NetCDF granule (single file mode)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Input directory containing granules (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Output directory; the product is written as `<basename>_cwc.tif`
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// JSON parameter file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of workers (default: available cores minus one)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Upper bound of the liquid water path length (cm)
    #[arg(long)]
    pub detection_limit: Option<f64>,

    /// Liquid water refractive index table (CSV)
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Cap on residual evaluations per pixel
    #[arg(long)]
    pub max_evaluations: Option<usize>,

    /// Batch mode: continue with other granules when one fails
    #[arg(long, default_value_t = false)]
    pub batch: bool,
}

#[derive(Args)]
pub struct GranulesArgs {
    /// Search results (JSON array, CMR `items` response or single record)
    pub results: PathBuf,

    /// Write the GeoJSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Second result set; keep only granules acquired within --window-minutes of each other
    #[arg(long)]
    pub match_with: Option<PathBuf>,

    /// Time window for --match-with (minutes)
    #[arg(long, default_value_t = 60)]
    pub window_minutes: i64,

    /// Print footprint vertices as (lat, lon) pairs instead of GeoJSON
    #[arg(long, default_value_t = false)]
    pub vertices: bool,
}

#[derive(Args)]
pub struct AssetsArgs {
    /// Search results (JSON array, CMR `items` response or single record)
    pub results: PathBuf,

    /// Keep URLs containing any of these substrings
    #[arg(long)]
    pub contains: Vec<String>,

    /// Keep URLs with any of these extensions
    #[arg(long)]
    pub extension: Vec<String>,

    /// URL scheme
    #[arg(long, value_enum, default_value_t = AssetScheme::Https)]
    pub scheme: AssetScheme,

    /// Only the first match per granule
    #[arg(long, default_value_t = false)]
    pub first_only: bool,
}

#[derive(Args)]
pub struct AoiArgs {
    /// JSON list of drawn polygons (`[{"xs": [...], "ys": [...]}, ...]`)
    pub drawn: PathBuf,

    /// Output GeoJSON
    #[arg(short, long)]
    pub output: PathBuf,

    /// Vertices are already EPSG:4326 (skip the web mercator transform)
    #[arg(long, default_value_t = false)]
    pub no_transform: bool,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Raster to sample (e.g. a `_cwc.tif`)
    pub raster: PathBuf,

    /// AOI GeoJSON
    pub aois: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    pub output: PathBuf,

    /// One row per polygon with mean and median per band
    #[arg(long, default_value_t = false)]
    pub summary: bool,
}

#[derive(Args)]
pub struct DownloadArgs {
    /// URLs to download
    pub urls: Vec<String>,

    /// File with one URL per line
    #[arg(long)]
    pub url_file: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Earthdata Login bearer token (default: $EARTHDATA_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Per-request timeout in seconds (default: none)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "fingerscan-rs",
    version = "0.1.0",
    about = "A rule-based web and service fingerprint scanner written in Rust"
)]
pub struct Args {
    /// Target to scan: host, host:port or URL (http/https/tcp)
    #[clap(short = 'u', long = "url")]
    pub target: Option<String>,

    /// Read targets from file (one per line)
    #[clap(short = 'f', long = "file")]
    pub target_file: Option<PathBuf>,

    /// Scan mode: web, service, all
    #[clap(short = 'm', long = "mode", default_value = "web")]
    pub mode: String,

    /// Number of concurrent scan workers
    #[clap(short = 'c', long, default_value = "5")]
    pub concurrency: usize,

    /// Connection timeout in seconds
    #[clap(short = 't', long, default_value = "2")]
    pub timeout: u64,

    /// Output file (HTML report if suffix is .html)
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Web fingerprint database path
    #[clap(short = 'w', long = "web-db", default_value = "configs/web_fingerprint_v4.json")]
    pub web_db: PathBuf,

    /// Service fingerprint database path
    #[clap(
        short = 's',
        long = "service-db",
        default_value = "configs/service_fingerprint_v4.json"
    )]
    pub service_db: PathBuf,

    /// Feature map file path (rebuilt when missing or corrupt)
    #[clap(long = "map", default_value = "feature_map.json")]
    pub feature_map: PathBuf,

    /// Disable favicon detection
    #[clap(long = "no-favicon")]
    pub no_favicon: bool,

    /// Write JSON instead of plain text to the output file
    #[clap(long)]
    pub json: bool,

    /// Silent mode, only print results
    #[clap(long)]
    pub silent: bool,

    /// Debug mode
    #[clap(long)]
    pub debug: bool,

    /// Only report fingerprint matches, drop status-code-only results
    #[clap(long = "BP-stat")]
    pub bp_stat: bool,
}

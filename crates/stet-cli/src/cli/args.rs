use super::*;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Daily tasks, journal, Oura and Planta in one terminal dashboard"
)]
pub(super) struct Cli {
    #[arg(long, value_name = "PATH", help = "Override the data directory")]
    pub(super) data_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILTER",
        help = "Log filter, e.g. debug or stet_providers=trace (defaults to RUST_LOG, then info)"
    )]
    pub(super) log_level: Option<String>,
}

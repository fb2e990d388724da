use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the rust-zipper tool.
///
/// The object to archive comes either from a trigger event file (`--event`)
/// or from `--bucket` and `--key`. Store and pipeline settings given here
/// override the configuration file and the environment.
#[derive(Parser, Debug)]
#[clap(
    name = "rust-zipper",
    about = "Streams an S3 object into a zip archive and republishes it"
)]
pub struct Args {
    /// Path to an S3 object-created notification (JSON)
    #[clap(short, long, conflicts_with_all = ["bucket", "key"])]
    pub event: Option<PathBuf>,

    /// Bucket holding the source object
    #[clap(short, long, requires = "key")]
    pub bucket: Option<String>,

    /// Key of the source object
    #[clap(short, long, requires = "bucket")]
    pub key: Option<String>,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// AWS region for S3 access
    #[clap(long)]
    pub region: Option<String>,

    /// AWS profile to use for S3 access
    #[clap(long)]
    pub profile: Option<String>,

    /// Identifier echoed in the result (default: random UUID)
    #[clap(long)]
    pub request_id: Option<String>,

    /// Folder prefix of the entry name inside the archive
    #[clap(long)]
    pub archive_folder: Option<String>,

    /// Key prefix under which the archive is written
    #[clap(long)]
    pub destination_prefix: Option<String>,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

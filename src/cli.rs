use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "capture-queue",
    about = "Capture, compress and reliably upload inspection photos",
    long_about = "capture-queue compresses photos for the current network conditions and keeps them in a \
                  durable local queue until an upload endpoint accepts them. Uploads are retried with \
                  exponential backoff and survive restarts.",
    version,
    after_help = "EXAMPLES:\n  \
    capture-queue profile 3g\n  \
    capture-queue capture frame.jpg --inspection INS-7 --checkpoint CP-3 --user alice -n 2g\n  \
    capture-queue import ./photos -r -n 4g\n  \
    capture-queue upload --endpoint https://uploads.example.com/photos\n  \
    capture-queue upload --walrus -e 5\n  \
    capture-queue status"
)]
pub struct Args {
    #[arg(
        short = 'c',
        long,
        global = true,
        help = "Path to a TOML configuration file"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        global = true,
        help = "Queue storage directory (default: .capture-queue)",
        long_help = "Directory holding queued task records and payloads. \
                     Overrides store_dir from the configuration file."
    )]
    pub store_dir: Option<PathBuf>,

    #[arg(short = 'q', long, global = true, help = "Only print warnings and errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Show the compression profile chosen for a network hint",
        long_about = "Print the compression profile selected for an effective network type. \
                      Unknown or missing hints fall back to a conservative profile."
    )]
    Profile {
        #[arg(help = "Network hint (slow-2g, 2g, 3g, 4g)")]
        hint: Option<String>,
    },

    #[command(
        about = "Capture photos from a still image and queue them for upload",
        long_about = "Drive the capture pipeline with a still image standing in for the camera. \
                      Each capture is compressed for the network hint and durably queued; \
                      run `upload` to deliver queued photos."
    )]
    Capture {
        #[arg(help = "Image used as the camera frame")]
        image: PathBuf,

        #[arg(
            long,
            help = "Image used for the front (user-facing) camera",
            long_help = "Optional separate frame for the user-facing camera. \
                         Defaults to the main image."
        )]
        front_image: Option<PathBuf>,

        #[arg(short = 'i', long, help = "Inspection identifier")]
        inspection: String,

        #[arg(short = 'p', long, help = "Checkpoint identifier")]
        checkpoint: String,

        #[arg(short = 'u', long, help = "Identifier of the capturing user")]
        user: String,

        #[arg(
            short = 'n',
            long,
            help = "Network hint (slow-2g, 2g, 3g, 4g)",
            long_help = "Effective network type used to pick the compression profile. \
                         Unknown values use a conservative profile."
        )]
        network: Option<String>,

        #[arg(
            short = 'f',
            long,
            help = "Camera facing mode (user, environment)",
            long_help = "Which camera to open first. Accepts user/front or environment/rear/back."
        )]
        facing: Option<String>,

        #[arg(
            short = 'k',
            long,
            default_value_t = 1,
            help = "Number of photos to capture",
            long_help = "Number of photos to capture. Capturing stops at the configured \
                         photo limit."
        )]
        count: usize,
    },

    #[command(
        about = "Compress a directory or glob of images into the queue",
        long_about = "Compress existing image files in parallel and queue them for upload. \
                      Supports directory traversal, glob patterns, and recursive processing."
    )]
    Import {
        #[arg(
            help = "Input directory, file, or glob",
            long_help = "Input can be a directory path, a single file, or a glob expression. \
                         Examples: './photos', '*.jpg', '/path/to/photos/*.png'"
        )]
        input: String,

        #[arg(short = 'n', long, help = "Network hint (slow-2g, 2g, 3g, 4g)")]
        network: Option<String>,

        #[arg(
            short = 'f',
            long,
            help = "Output format (jpeg, png, webp)",
            long_help = "Override the profile's output format. Defaults to JPEG."
        )]
        format: Option<String>,

        #[arg(
            short = 'r',
            long,
            help = "Process subdirectories recursively",
            long_help = "Recursively process all subdirectories when input is a directory."
        )]
        recursive: bool,
    },

    #[command(
        about = "Upload every pending task and wait for the results",
        long_about = "Run the upload scheduler until every pending task has either been uploaded \
                      or exhausted its retry budget. Exits with an error when any task failed."
    )]
    Upload {
        #[command(flatten)]
        target: UploadTarget,

        #[arg(short = 'j', long, help = "Override the number of concurrent uploads")]
        max_concurrent: Option<usize>,
    },

    #[command(
        about = "List queued, in-flight and completed tasks",
        long_about = "Print per-status counts and a table of every task in the queue."
    )]
    Status,

    #[command(
        about = "Remove completed tasks older than the retention window",
        long_about = "Delete uploaded and failed tasks whose completion is older than \
                      completed_retention_secs."
    )]
    Prune,
}

/// Endpoint selection for `upload`; falls back to the configured endpoint.
#[derive(ClapArgs, Debug, Default)]
pub struct UploadTarget {
    #[arg(
        long,
        conflicts_with = "walrus",
        help = "HTTP endpoint accepting multipart uploads",
        long_help = "URL that accepts a multipart/form-data POST with a `file` part and \
                     answers with JSON {\"url\": ...}."
    )]
    pub endpoint: Option<String>,

    #[arg(long, requires = "endpoint", help = "Bearer token for the HTTP endpoint")]
    pub auth_token: Option<String>,

    #[arg(long, help = "Upload to Walrus decentralized storage")]
    pub walrus: bool,

    #[arg(
        short = 'a',
        long,
        requires = "walrus",
        help = "Custom Walrus aggregator URL",
        long_help = "Override default aggregator URL. \
                     Default: https://aggregator.walrus-testnet.walrus.space"
    )]
    pub aggregator_url: Option<String>,

    #[arg(
        short = 'p',
        long,
        requires = "walrus",
        help = "Custom Walrus publisher URL",
        long_help = "Override default publisher URL. \
                     Default: https://publisher.walrus-testnet.walrus.space"
    )]
    pub publisher_url: Option<String>,

    #[arg(
        short = 'e',
        long,
        requires = "walrus",
        help = "Storage duration in epochs (default: 10)",
        long_help = "Number of epochs to store each blob. Each epoch is approximately 24 hours."
    )]
    pub epochs: Option<u64>,
}

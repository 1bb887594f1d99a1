use anyhow::{bail, Context, Result};
use capture_queue::batch::{import_images, ImportOptions};
use capture_queue::camera::{FacingMode, StillImageCamera};
use capture_queue::capture::{CaptureContext, CaptureController};
use capture_queue::cli::{Args, Commands, UploadTarget};
use capture_queue::config::{AppConfig, EndpointConfig};
use capture_queue::endpoint::{HttpEndpoint, UploadEndpoint};
use capture_queue::error::CaptureError;
use capture_queue::formats::TargetFormat;
use capture_queue::info::print_status_report;
use capture_queue::logger;
use capture_queue::profile::{select_profile, NetworkHint, StaticNetworkSignal};
use capture_queue::queue::UploadQueue;
use capture_queue::store::FileTaskStore;
use capture_queue::task::TaskMetadata;
use capture_queue::upload::drain_queue;
use capture_queue::utils::format_file_size;
use capture_queue::walrus::{WalrusEndpoint, WalrusOptions};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(store_dir) = args.store_dir {
        config.store_dir = store_dir;
    }

    match args.command {
        Commands::Profile { hint } => show_profile(hint.as_deref()),
        Commands::Capture {
            image,
            front_image,
            inspection,
            checkpoint,
            user,
            network,
            facing,
            count,
        } => {
            if let Some(facing) = facing {
                config.capture.facing = facing.parse::<FacingMode>().map_err(anyhow::Error::msg)?;
            }
            let mut camera = StillImageCamera::single(image);
            if let Some(front) = front_image {
                camera = camera.with_source(FacingMode::User, front);
            }
            let context = CaptureContext::new(inspection, checkpoint, user);
            capture_photos(config, camera, context, network, count, args.quiet).await?;
        }
        Commands::Import {
            input,
            network,
            format,
            recursive,
        } => {
            let mut profile = select_profile(network.as_deref());
            if let Some(format) = format {
                profile = profile.with_format(format.parse::<TargetFormat>()?);
            }
            let options = ImportOptions {
                profile,
                recursive,
                metadata: TaskMetadata::new(),
                quiet: args.quiet,
            };
            import(config, &input, &options).await?;
        }
        Commands::Upload {
            target,
            max_concurrent,
        } => {
            if let Some(max_concurrent) = max_concurrent {
                config.queue.max_concurrent_uploads = max_concurrent;
            }
            config.validate()?;
            let endpoint = build_endpoint(target, config.endpoint.clone(), config.queue.upload_timeout())?;
            upload(config, endpoint, args.quiet).await?;
        }
        Commands::Status => {
            let queue = open_queue(&config).await?;
            print_status_report(&queue.tasks().await?);
        }
        Commands::Prune => {
            let queue = open_queue(&config).await?;
            let removed = queue.prune_completed().await?;
            println!("🧹 Removed {} completed task(s)", removed);
        }
    }

    Ok(())
}

fn show_profile(hint: Option<&str>) {
    let parsed = NetworkHint::parse(hint);
    let profile = select_profile(hint);
    println!("📶 Network: {}", parsed);
    println!("   Max dimension: {}px", profile.max_dimension_px);
    println!("   Quality: {:.2}", profile.quality_factor);
    println!("   Format: {}", profile.target_format);
}

async fn open_queue(config: &AppConfig) -> Result<UploadQueue> {
    let store = FileTaskStore::open(config.store_dir.clone())
        .await
        .with_context(|| format!("Failed to open queue store at {}", config.store_dir.display()))?;
    Ok(UploadQueue::new(Arc::new(store), config.queue.clone()))
}

async fn capture_photos(
    config: AppConfig,
    camera: StillImageCamera,
    context: CaptureContext,
    network: Option<String>,
    count: usize,
    quiet: bool,
) -> Result<()> {
    context.validate().map_err(anyhow::Error::msg)?;
    let queue = open_queue(&config).await?;
    let network = Arc::new(StaticNetworkSignal(network));
    let mut controller = CaptureController::new(
        Arc::new(camera),
        queue,
        network,
        context,
        config.capture.clone(),
    );
    controller.open().await?;

    for _ in 0..count {
        match controller.capture().await {
            Ok(handle) => {
                if !quiet {
                    println!(
                        "📸 {} -> task {} ({}x{}, {})",
                        handle.filename,
                        handle.task_id,
                        handle.width,
                        handle.height,
                        format_file_size(handle.size_bytes)
                    );
                }
            }
            Err(CaptureError::LimitReached { max }) => {
                log::warn!("Photo limit of {} reached, stopping", max);
                break;
            }
            Err(e) => {
                controller.close();
                return Err(e.into());
            }
        }
    }

    let count = controller.photo_count();
    controller.close();
    if !quiet {
        println!(
            "✅ Queued {} photo(s), {} remaining. Run `upload` to deliver them.",
            count.captured, count.remaining
        );
    }
    Ok(())
}

async fn import(config: AppConfig, input: &str, options: &ImportOptions) -> Result<()> {
    let queue = open_queue(&config).await?;
    let report = import_images(&queue, input, options).await?;

    for (path, reason) in &report.failed {
        eprintln!("❌ {}: {}", path.display(), reason);
    }
    if !options.quiet {
        println!(
            "✅ Queued {} image(s): {} -> {} ({:.1}% saved)",
            report.enqueued.len(),
            format_file_size(report.bytes_before),
            format_file_size(report.bytes_after),
            report.compression_ratio()
        );
    }
    if !report.failed.is_empty() {
        bail!("{} image(s) could not be imported", report.failed.len());
    }
    Ok(())
}

/// Command-line flags win over the configured endpoint.
fn build_endpoint(
    target: UploadTarget,
    configured: Option<EndpointConfig>,
    timeout: Duration,
) -> Result<Arc<dyn UploadEndpoint>> {
    let endpoint = if let Some(url) = target.endpoint {
        EndpointConfig::Http {
            url,
            auth_token: target.auth_token,
        }
    } else if target.walrus {
        EndpointConfig::Walrus(WalrusOptions::new(
            target.aggregator_url,
            target.publisher_url,
            target.epochs,
        ))
    } else {
        match configured {
            Some(endpoint) => endpoint,
            None => bail!("No upload endpoint configured; pass --endpoint or --walrus"),
        }
    };
    endpoint.validate()?;

    let endpoint: Arc<dyn UploadEndpoint> = match endpoint {
        EndpointConfig::Http { url, auth_token } => {
            Arc::new(HttpEndpoint::new(url, auth_token, timeout)?)
        }
        EndpointConfig::Walrus(options) => Arc::new(WalrusEndpoint::new(options)?),
    };
    Ok(endpoint)
}

async fn upload(config: AppConfig, endpoint: Arc<dyn UploadEndpoint>, quiet: bool) -> Result<()> {
    let queue = open_queue(&config).await?;
    let report = drain_queue(&queue, endpoint, quiet).await?;

    if !quiet {
        for (task_id, url) in &report.succeeded {
            println!("✅ {} -> {}", task_id, url);
        }
    }
    for (task_id, reason) in &report.failed {
        eprintln!("❌ {}: {}", task_id, reason);
    }
    if !report.is_success() {
        bail!(
            "{} of {} upload(s) failed",
            report.failed.len() + report.missing,
            report.total()
        );
    }
    Ok(())
}

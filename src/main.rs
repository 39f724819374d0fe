use clap::{Parser, Subcommand};
use photo_ingest::config::{self, IngestConfig};
use photo_ingest::logging::{self, Verbosity};
use photo_ingest::{output, pipeline};
use std::path::PathBuf;
use std::process::ExitCode;

/// Location overrides shared by commands that touch the asset tree.
#[derive(clap::Args, Clone, Default)]
struct PathArgs {
    /// Public asset tree (overrides paths.asset_root)
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Where originals are moved (overrides paths.archive_root)
    #[arg(long)]
    archive_root: Option<PathBuf>,

    /// Manifest file (overrides paths.manifest)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Directory holding the face model (overrides paths.model_dir)
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[derive(clap::Args, Clone, Default)]
struct RunArgs {
    #[command(flatten)]
    paths: PathArgs,

    /// Report what would happen without encoding, writing or moving anything
    #[arg(long)]
    dry_run: bool,

    /// Skip face detection (and the safety gate)
    #[arg(long)]
    no_faces: bool,

    /// WebP quality, 0-100 (overrides encoding.quality)
    #[arg(long)]
    quality: Option<u32>,

    /// Days before a missing entry is purged (overrides missing.threshold_days)
    #[arg(long)]
    threshold_days: Option<u32>,

    /// Flag missing entries but never remove them
    #[arg(long)]
    no_purge: bool,
}

#[derive(Parser)]
#[command(name = "photo-ingest")]
#[command(about = "Convert new photos to WebP, record them in the asset manifest, archive the originals")]
#[command(long_about = "\
Convert new photos to WebP, record them in the asset manifest, archive the originals

Drop raw photos (jpg, jpeg, png, gif, bmp, tif, tiff) anywhere under the asset
root. A run converts each one to a slugged .webp next to it, detects the most
prominent face to record a focus point, updates the manifest, and moves the
original under the archive root:

  public/photos/My Photo_2024.JPG
    → public/photos/my-photo-2024.webp
    → public/assets.json  \"/photos/my-photo-2024.webp\": {width, height, focus}
    → originals/photos/My Photo_2024.JPG

Existing .webp files and stored focus points are never overwritten. Manifest
entries whose file disappears are flagged missing and purged after a
retention period.

Run 'photo-ingest gen-config' to generate a documented photo-ingest.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./photo-ingest.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: detect → convert → manifest → archive
    Run(RunArgs),
    /// Validate config, model and asset tree without changing anything
    Check(PathArgs),
    /// Print a stock photo-ingest.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet), cli.no_color);

    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Run(args) => {
            let mut config = config::load_config(cli.config.as_deref())?;
            apply_run_args(&mut config, &args);
            config.validate()?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::run(&config, Some(tx));
            if printer.join().is_err() {
                eprintln!("progress printer stopped unexpectedly");
            }

            match result {
                Ok(report) => {
                    output::print_summary(&report);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    output::print_abort(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Check(paths) => {
            let mut config = config::load_config(cli.config.as_deref())?;
            apply_path_args(&mut config, &paths);
            config.validate()?;

            println!("==> Checking {}", config.paths.asset_root.display());
            match pipeline::preflight(&config) {
                Ok(inventory) => {
                    output::print_check(&inventory);
                    if inventory.conflicts.is_empty() {
                        println!("==> Ready");
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::FAILURE)
                    }
                }
                Err(e) => {
                    output::print_abort(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_path_args(config: &mut IngestConfig, args: &PathArgs) {
    if let Some(p) = &args.asset_root {
        config.paths.asset_root = p.clone();
    }
    if let Some(p) = &args.archive_root {
        config.paths.archive_root = p.clone();
    }
    if let Some(p) = &args.manifest {
        config.paths.manifest = p.clone();
    }
    if let Some(p) = &args.model_dir {
        config.paths.model_dir = p.clone();
    }
}

fn apply_run_args(config: &mut IngestConfig, args: &RunArgs) {
    apply_path_args(config, &args.paths);
    if args.dry_run {
        config.dry_run = true;
    }
    if args.no_faces {
        config.faces.enabled = false;
    }
    if let Some(q) = args.quality {
        config.encoding.quality = q;
    }
    if let Some(days) = args.threshold_days {
        config.missing.threshold_days = days;
    }
    if args.no_purge {
        config.missing.purge = false;
    }
}

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use webp_watch::convert::{ConvertEvent, Pipeline};
use webp_watch::imaging::WebpTranscoder;
use webp_watch::watch::{DirectoryWatcher, WatchMessage};
use webp_watch::{config, output, scan};

#[derive(Parser)]
#[command(name = "webp-watch")]
#[command(about = "Convert new images to WebP and register them in a TypeScript manifest")]
#[command(long_about = "\
Convert new images to WebP and register them in a TypeScript manifest

Every PNG or JPEG that appears in the watched directory is transcoded to a
sibling .webp file, imported at the top of the manifest and listed in its
export block:

  assets/
  ├── index.ts                     # Manifest (must exist)
  ├── webp-watch.toml              # Config (optional)
  ├── hero.png                     # New file...
  └── hero.webp                    # ...converted once it stops changing

  index.ts after conversion:

    import hero from \"./hero.webp\";
    export const Img = {
        hero,
    };

Files whose .webp counterpart already exists are never touched again.

Run 'webp-watch gen-config' to generate a documented webp-watch.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: <DIR>/webp-watch.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert existing images, then watch for new ones until Ctrl-C
    Watch {
        /// Directory holding the images and the manifest
        dir: PathBuf,
        /// Skip the initial conversion of files already present
        #[arg(long)]
        no_scan: bool,
    },
    /// Convert existing images once and exit
    Scan {
        /// Directory holding the images and the manifest
        dir: PathBuf,
    },
    /// Re-register an already converted image in the manifest
    Sync {
        /// Directory holding the images and the manifest
        dir: PathBuf,
        /// The original image (its .webp counterpart must exist)
        image: PathBuf,
    },
    /// Print a stock webp-watch.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("webp_watch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Watch { dir, no_scan } => {
            let config = config::load_config(&dir, cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            let (tx, rx) = mpsc::channel();
            let pipeline = Pipeline::open(&dir, &config, WebpTranscoder::new())?.with_events(tx);
            let printer = spawn_printer(rx, pipeline.root().to_path_buf());

            // Registered before the scan so nothing arriving meanwhile is missed.
            // A Ctrl-C during the scan queues Shutdown, which the loop sees first
            // thing.
            let watcher = DirectoryWatcher::start(pipeline.root(), &config.watch)?;
            spawn_interrupt_listener(watcher.sender())?;
            if !no_scan {
                scan::scan_existing(pipeline.root(), &pipeline);
            }

            println!("==> Watching {} (Ctrl-C to stop)", pipeline.root().display());
            watcher.run(|path| {
                // Failures are logged and reported by the pipeline.
                pipeline.convert(path).ok();
            });

            drop(pipeline);
            printer.join().map_err(|_| "printer thread panicked")?;
            println!("==> Stopped");
        }
        Command::Scan { dir } => {
            let config = config::load_config(&dir, cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            let (tx, rx) = mpsc::channel();
            let pipeline = Pipeline::open(&dir, &config, WebpTranscoder::new())?.with_events(tx);
            let printer = spawn_printer(rx, pipeline.root().to_path_buf());

            let summary = scan::scan_existing(pipeline.root(), &pipeline);

            drop(pipeline);
            printer.join().map_err(|_| "printer thread panicked")?;
            output::print_scan_summary(&summary);
        }
        Command::Sync { dir, image } => {
            let config = config::load_config(&dir, cli.config.as_deref())?;
            let (tx, rx) = mpsc::channel();
            let pipeline = Pipeline::open(&dir, &config, WebpTranscoder::new())?.with_events(tx);
            let printer = spawn_printer(rx, pipeline.root().to_path_buf());

            let result = pipeline.resync(&resolve_image(&image)?);

            drop(pipeline);
            printer.join().map_err(|_| "printer thread panicked")?;
            result?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Print pipeline events on their own thread until every sender is dropped.
fn spawn_printer(rx: mpsc::Receiver<ConvertEvent>, root: PathBuf) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in rx {
            for line in output::format_convert_event(&event, &root) {
                println!("{}", line);
            }
        }
    })
}

/// Send [`WatchMessage::Shutdown`] on Ctrl-C.
fn spawn_interrupt_listener(tx: Sender<WatchMessage>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tx.send(WatchMessage::Shutdown).ok();
                }
                Err(e) => tracing::error!(error = %e, "failed to install Ctrl-C handler"),
            }
        });
    });
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Absolute path of an image given on the command line.
///
/// Only the parent directory has to exist: the original may already be gone
/// when only its converted counterpart is left.
fn resolve_image(image: &Path) -> std::io::Result<PathBuf> {
    let parent = match image.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = image.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file path: {}", image.display()),
        )
    })?;
    Ok(parent.canonicalize()?.join(name))
}

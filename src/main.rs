use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use mediacache::{Config, create_library, media::SharedLibrary, startup_checks, watcher::DirectoryWatcher};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "mediacache.toml", global = true)]
    config: PathBuf,

    /// Overrides the log level from the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep the cache in step with the media tree (default if no command specified)
    Watch {
        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Build missing thumbnails and previews once, then exit
    Precache {
        /// Folder relative to the media root
        #[arg(default_value = "")]
        path: String,

        /// Only process the folder itself
        #[arg(long)]
        no_recursive: bool,

        /// Generate thumbnails (both kinds when neither flag is given)
        #[arg(long)]
        thumbnails: bool,

        /// Generate previews (both kinds when neither flag is given)
        #[arg(long)]
        previews: bool,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the media entries of a folder
    List {
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let log_level = cli.log_level.as_deref().unwrap_or(config.app.log_level.as_str());
    init_logging(log_level, &config)?;

    if cli.config.exists() {
        info!("Configuration loaded from: {:?}", cli.config);
    } else {
        info!("Config file not found at {:?}, using defaults", cli.config);
    }

    match cli.command {
        Some(Commands::Watch { quit_after }) => run_watch(config, quit_after).await,
        Some(Commands::Precache {
            path,
            no_recursive,
            thumbnails,
            previews,
            json,
        }) => {
            // Neither flag means both
            let (thumbnails, previews) = if thumbnails || previews {
                (thumbnails, previews)
            } else {
                (true, true)
            };
            run_precache(config, &path, !no_recursive, thumbnails, previews, json).await
        }
        Some(Commands::List { path }) => run_list(config, &path).await,
        None => run_watch(config, None).await,
    }
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        let config_content = std::fs::read_to_string(path)?;
        Ok(Config::from_toml(&config_content)?)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(log_level: &str, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (level, valid) = match log_level.to_lowercase().as_str() {
        "trace" => (Level::TRACE, true),
        "debug" => (Level::DEBUG, true),
        "info" => (Level::INFO, true),
        "warn" => (Level::WARN, true),
        "error" => (Level::ERROR, true),
        _ => (Level::INFO, false),
    };

    match &config.app.log_file {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    if !valid {
        warn!("Unknown log level {:?}, using info", log_level);
    }
    Ok(())
}

async fn check_startup(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match startup_checks::perform_startup_checks(config).await {
        Ok(()) => Ok(()),
        Err(errors) => {
            for error in &errors {
                tracing::error!("Startup check failed: {}", error);
            }
            if errors.iter().any(|e| e.is_critical()) {
                tracing::error!("Critical startup check failed, exiting");
                Err("Critical startup check failed".into())
            } else {
                warn!("Non-critical startup checks failed, continuing");
                Ok(())
            }
        }
    }
}

async fn run_watch(config: Config, quit_after: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting {}", config.app.name);
    info!("Media source directory: {:?}", config.media.source_directory);
    info!("Cache directory: {:?}", config.media.cache_directory);
    check_startup(&config).await?;

    let library = create_library(&config);
    if !library.has_video_thumbnail_support() {
        warn!("Video thumbnails are not supported on this host");
    }

    let media = &config.media;
    let startup_thumbnails = media.enable_thumb_cache && media.gen_thumbs_on_startup;
    let startup_previews = media.enable_preview && media.gen_preview_on_startup;
    if startup_thumbnails || startup_previews {
        spawn_startup_precache(library.clone(), startup_thumbnails, startup_previews);
    }

    let watcher = if media.generates_on_add() {
        Some(DirectoryWatcher::start(library.clone(), &config.watcher)?)
    } else {
        info!("No artifacts are generated on add, not watching the media tree");
        None
    };

    shutdown_signal(quit_after).await;

    if let Some(watcher) = watcher {
        info!("Shutting down - stopping watcher...");
        watcher.stop().await;
    }
    Ok(())
}

fn spawn_startup_precache(library: SharedLibrary, thumbnails: bool, previews: bool) {
    tokio::spawn(async move {
        library.precache_all(thumbnails, previews).await;
    });
}

async fn run_precache(
    config: Config,
    path: &str,
    recursive: bool,
    thumbnails: bool,
    previews: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    check_startup(&config).await?;
    let library = create_library(&config);

    let thumbnails = thumbnails && config.media.enable_thumb_cache;
    let previews = previews && config.media.enable_preview;
    let stats = if path.is_empty() && recursive {
        library.precache_all(thumbnails, previews).await
    } else {
        library.sweep(path, recursive, thumbnails, previews).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", stats);
    }
    Ok(())
}

async fn run_list(config: Config, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let library = create_library(&config);
    let entries = library.list_directory(path).await?;
    if entries.is_empty() {
        println!("No media in {:?}", path);
    }
    for entry in entries {
        println!("{:<6} {:<40} {}", entry.kind, entry.name, entry.path);
    }
    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::{Duration, sleep};

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!("Will automatically shut down after {} seconds", seconds);
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}

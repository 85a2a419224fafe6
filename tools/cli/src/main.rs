//! Omnistore CLI - Command line interface for object storage operations.
//!
//! This tool resolves one configured backend and runs a single storage
//! operation against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use omnistore_storage::{create_default_registry, Body, ProviderConfig, Storage};

#[derive(Parser)]
#[command(name = "omnistore")]
#[command(about = "Omnistore - Vendor-neutral object storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Backend config file (default: <config dir>/omnistore/backend.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an object to a local file.
    Get {
        /// Object key, rooted path or URL.
        path: String,

        /// Destination file path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Stream an object to stdout.
    Cat {
        /// Object key, rooted path or URL.
        path: String,
    },

    /// Upload a local file.
    Put {
        /// Source file to upload.
        source: PathBuf,

        /// Destination key.
        dest: String,
    },

    /// Delete one or more objects.
    Rm {
        /// Object keys, rooted paths or URLs.
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// List objects under a prefix.
    Ls {
        /// Key prefix (default: everything).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Print the fetch URL of an object.
    Url {
        /// Object key, rooted path or URL.
        path: String,
    },

    /// Print the backend endpoint.
    Endpoint,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `cat` output stays clean.
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let storage = open_storage(cli.config).await?;

    match cli.command {
        Commands::Get { path, output } => cmd_get(&storage, &path, &output).await,

        Commands::Cat { path } => cmd_cat(&storage, &path).await,

        Commands::Put { source, dest } => cmd_put(&storage, &source, &dest).await,

        Commands::Rm { paths } => cmd_rm(&storage, &paths).await,

        Commands::Ls { prefix } => cmd_ls(&storage, &prefix).await,

        Commands::Url { path } => cmd_url(&storage, &path).await,

        Commands::Endpoint => {
            println!("{}", storage.endpoint());
            Ok(())
        }
    }
}

/// Default location of the backend config file.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("omnistore").join("backend.json"))
}

/// Resolve the configured backend.
async fn open_storage(config: Option<PathBuf>) -> Result<Arc<dyn Storage>> {
    let path = match config {
        Some(path) => path,
        None => default_config_path().context("No config directory; pass --config")?,
    };

    let config = ProviderConfig::from_file(&path)
        .await
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    info!("Using {} backend from {}", config.provider, path.display());

    let storage = config
        .open(&create_default_registry())
        .context("Failed to open backend")?;
    Ok(storage)
}

/// Download an object to a local file.
async fn cmd_get(storage: &Arc<dyn Storage>, path: &str, output: &Path) -> Result<()> {
    let mut file = storage
        .get(path)
        .await
        .with_context(|| format!("Failed to download {}", path))?;

    let mut dest = tokio::fs::File::create(output)
        .await
        .context("Failed to create output file")?;
    let bytes = tokio::io::copy(&mut file, &mut dest)
        .await
        .context("Failed to write output file")?;
    dest.flush().await?;

    println!("Downloaded {} to {} ({} bytes)", path, output.display(), bytes);

    Ok(())
}

/// Stream an object to stdout.
async fn cmd_cat(storage: &Arc<dyn Storage>, path: &str) -> Result<()> {
    let mut stream = storage
        .get_stream(path)
        .await
        .with_context(|| format!("Failed to open {}", path))?;

    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read {}", path))?;
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;

    Ok(())
}

/// Upload a local file.
async fn cmd_put(storage: &Arc<dyn Storage>, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} as {}", source.display(), dest);

    let file = tokio::fs::File::open(source)
        .await
        .context("Failed to open source file")?;

    let object = storage
        .put(dest, Body::from(file))
        .await
        .context("Failed to upload file")?;

    println!("Uploaded {} ({} bytes)", object.path(), object.size());

    Ok(())
}

/// Delete one or more objects.
async fn cmd_rm(storage: &Arc<dyn Storage>, paths: &[String]) -> Result<()> {
    match paths {
        [path] => storage
            .delete(path)
            .await
            .with_context(|| format!("Failed to remove {}", path))?,
        _ => storage
            .delete_many(paths)
            .await
            .context("Failed to remove objects")?,
    }

    for path in paths {
        println!("Removed: {}", path);
    }

    Ok(())
}

/// List objects under a prefix.
async fn cmd_ls(storage: &Arc<dyn Storage>, prefix: &str) -> Result<()> {
    let mut objects = storage
        .list(prefix)
        .await
        .context("Failed to list objects")?;

    if objects.is_empty() {
        println!("No objects.");
        return Ok(());
    }

    objects.sort_by(|a, b| a.path().cmp(b.path()));
    for object in objects {
        let modified = object
            .last_modified()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>12}  {:19}  {}", object.size(), modified, object.path());
    }

    Ok(())
}

/// Print the fetch URL of an object.
async fn cmd_url(storage: &Arc<dyn Storage>, path: &str) -> Result<()> {
    let url = storage
        .get_url(path)
        .await
        .with_context(|| format!("Failed to build URL for {}", path))?;
    println!("{}", url);

    Ok(())
}

//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI over a single store: `ls`, `cat`, `put`, `push`, `rm`, `exists`, `url`.
//!
//! Examples:
//! ```bash
//! dstore-cli gs://bucket/blocks --ext .dbin --compression zstd ls --max 20
//! dstore-cli gs://bucket/blocks --ext .dbin ls 0001/ --from 0001/0000005000
//! dstore-cli s3://bucket/data cat reports/2025-01
//! dstore-cli file:///tmp/store put ./local.bin name/in/store
//! dstore-cli file:///tmp/store push ./staged.bin name/in/store   # removes ./staged.bin
//! ```

use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dstore::{
    store_for_url, CompressionConfig, LoggedStore, Store, StoreError, StoreOptions, TracingOpLogger,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Base location, e.g. gs://bucket/path, s3://bucket/path, file:///dir, /dir
    base_url: String,

    /// Extension appended to every object name (overrides DSTORE_EXTENSION)
    #[arg(long)]
    ext: Option<String>,

    /// none | zstd | zstd:<level> (overrides DSTORE_COMPRESSION)
    #[arg(long)]
    compression: Option<CompressionConfig>,

    /// Replace existing objects instead of keeping the first write
    #[arg(long)]
    overwrite: bool,

    /// Log every store operation
    #[arg(long)]
    trace_ops: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List object names under a prefix.
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        /// Stop after this many names (0 = no limit)
        #[arg(long, default_value_t = 0)]
        max: usize,
        /// Resume the listing at this name (inclusive)
        #[arg(long)]
        from: Option<String>,
    },
    /// Write an object's decompressed content to stdout.
    Cat { name: String },
    /// Upload a local file, keeping it.
    Put { local: PathBuf, name: String },
    /// Upload a local file and delete it once the upload succeeded.
    Push { local: PathBuf, name: String },
    /// Delete an object.
    Rm { name: String },
    /// Print "true" or "false".
    Exists { name: String },
    /// Print the external URL of an object.
    Url { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut options = StoreOptions::from_env()?;
    if let Some(ext) = cli.ext {
        options.extension = ext;
    }
    if let Some(compression) = cli.compression {
        options.compression = compression;
    }
    options.overwrite |= cli.overwrite;

    let store = store_for_url(&cli.base_url, options)
        .await
        .with_context(|| format!("opening store at {}", cli.base_url))?;
    let store: Box<dyn Store> = if cli.trace_ops {
        Box::new(LoggedStore::new(Arc::from(store), Arc::new(TracingOpLogger)))
    } else {
        store
    };

    run(store.as_ref(), cli.cmd).await
}

async fn run(store: &dyn Store, cmd: Command) -> Result<()> {
    match cmd {
        Command::Ls { prefix, max, from } => {
            let mut names = Vec::new();
            let mut collect = |name: &str| {
                names.push(name.to_string());
                if max > 0 && names.len() >= max { Err(StoreError::StopIteration) } else { Ok(()) }
            };
            match from {
                Some(start) => store.walk_from(&prefix, &start, &mut collect).await?,
                None => store.walk(&prefix, &mut collect).await?,
            }
            for name in names {
                safe_println!("{}", name);
            }
        }
        Command::Cat { name } => {
            let mut reader = store.open(&name).await?;
            let mut stdout = tokio::io::stdout();
            match tokio::io::copy(&mut reader, &mut stdout).await {
                Err(e) if e.kind() == ErrorKind::BrokenPipe => std::process::exit(0),
                other => {
                    other?;
                }
            }
        }
        Command::Put { local, name } => {
            let file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("opening {}", local.display()))?;
            store.write(&name, Box::new(file)).await?;
            safe_println!("{}", store.object_url(&name));
        }
        Command::Push { local, name } => {
            store.push_local_file(&local, &name).await?;
            safe_println!("{}", store.object_url(&name));
        }
        Command::Rm { name } => store.delete(&name).await?,
        Command::Exists { name } => {
            let found = store.exists(&name).await?;
            safe_println!("{}", found);
        }
        Command::Url { name } => {
            safe_println!("{}", store.object_url(&name));
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tvix_tracing::PB_SPINNER_STYLE;
use tvix_unixfs::blockservice::{self, BlockService};
use tvix_unixfs::export::{export, fs::export_to_path, ExportEntry};
use tvix_unixfs::import::{fs::ingest_path, ImportOptions, DEFAULT_SHARD_SPLIT_THRESHOLD};
use tvix_unixfs::B3Digest;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long)]
    log_level: Option<Level>,

    #[arg(long, env, default_value = "memory://")]
    block_service_addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Imports a file or directory, printing a line per stored entry.
    Import {
        #[clap(value_name = "PATH")]
        path: PathBuf,

        /// Put the imported path into a directory of its own.
        #[arg(long)]
        wrap: bool,

        #[arg(long, default_value_t = DEFAULT_SHARD_SPLIT_THRESHOLD)]
        shard_split_threshold: usize,
    },
    /// Lists everything below an address, or writes it to DEST.
    Export {
        #[clap(value_name = "ADDRESS")]
        address: String,

        #[clap(value_name = "DEST")]
        dest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let tracing_handle = tvix_tracing::TracingBuilder::default()
        .level(cli.log_level.unwrap_or(Level::INFO))
        .enable_progressbar()
        .build()?;

    let block_service: Arc<dyn BlockService> =
        Arc::from(blockservice::from_addr(&cli.block_service_addr).await?);

    match cli.command {
        Commands::Import {
            path,
            wrap,
            shard_split_threshold,
        } => {
            let options = ImportOptions::default()
                .with_wrap(wrap)
                .with_shard_split_threshold(shard_split_threshold);

            import(
                block_service,
                &path.canonicalize()?,
                options,
                &mut tracing_handle.get_stdout_writer(),
            )
            .await?;
        }
        Commands::Export { address, dest } => {
            let root: B3Digest = address.parse()?;

            match dest {
                Some(dest) => {
                    export_to_path(block_service, root, &dest).await?;
                    info!(dest = %dest.display(), "export done");
                }
                None => list(block_service, root, &mut tracing_handle.get_stdout_writer()).await?,
            }
        }
    }

    Ok(())
}

#[instrument(skip_all, fields(path = %path.display(), indicatif.pb_show = 1))]
async fn import(
    block_service: Arc<dyn BlockService>,
    path: &Path,
    options: ImportOptions,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let span = Span::current();
    span.pb_set_style(&PB_SPINNER_STYLE);
    span.pb_set_message(&format!("Importing {}", path.display()));
    span.pb_start();

    let mut records = ingest_path(block_service, path, options);
    while let Some(record) = records.next().await {
        let record = record?;
        span.pb_inc(1);
        writeln!(out, "{}\t{}\t{}", record.digest, record.size, record.path)?;
    }

    Ok(())
}

/// Prints all entries below `root`, without fetching file contents.
async fn list(
    block_service: Arc<dyn BlockService>,
    root: B3Digest,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut entries = export(block_service, root);
    while let Some(entry) = entries.next().await {
        match entry? {
            ExportEntry::Directory { path, .. } => writeln!(out, "d\t\t{}", path)?,
            ExportEntry::File { path, size, .. } => writeln!(out, "f\t{}\t{}", size, path)?,
        }
    }

    Ok(())
}

//! recordkv Inspect Binary
//!
//! Read-only look at a database directory.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use recordkv::index::KeyIndex;
use recordkv::storage::{self, TypeRegistry};
use recordkv::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// recordkv Inspect
#[derive(Parser, Debug)]
#[command(name = "recordkv-inspect")]
#[command(about = "Inspect the files of a recordkv database directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./recordkv_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the record types stored in the directory
    Types,

    /// Summarize the key index and data file of one type
    Index {
        /// Short type name (file stem)
        type_name: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,recordkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();
    tracing::debug!("recordkv-inspect v{}", recordkv::VERSION);

    let outcome = match &args.command {
        Commands::Types => list_types(&args.data_dir),
        Commands::Index { type_name } => summarize_index(&args.data_dir, type_name),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn list_types(dir: &Path) -> Result<()> {
    let path = storage::types_file_path(dir);
    if !path.exists() {
        println!("no types recorded in {}", dir.display());
        return Ok(());
    }

    for (short, full) in TypeRegistry::read_entries(&path)? {
        println!("{:<24} {}", short, full);
    }
    Ok(())
}

fn summarize_index(dir: &Path, type_name: &str) -> Result<()> {
    recordkv::schema::validate_type_name(type_name)?;

    let index_path = storage::index_file_path(dir, type_name);
    let data_path = storage::data_file_path(dir, type_name);
    let (index, summary) = KeyIndex::load(&index_path)?;
    let data_len = storage::len_if_exists(&data_path)?;

    println!("type:            {}", type_name);
    println!("index entries:   {}", summary.entries_read);
    println!("trailing bytes:  {}", summary.trailing_bytes);
    println!("live keys:       {}", index.live_count());
    println!("deleted keys:    {}", index.tombstone_count());
    println!("superseded:      {}", summary.entries_read - index.len());
    println!("data file bytes: {}", data_len);
    Ok(())
}

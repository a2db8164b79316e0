//! vfscache CLI - Offline browser for persisted VFS caches
//!
//! Every command works on a private snapshot of the cache directory, so the
//! IDE that owns the cache can keep running.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vfscache_common::{RecordId, ViewerConfig};
use vfscache_storage::{
    DiskSizeComputer, DiskSizeEvent, DiskSizeListener, MemoState, Node, RecordInfo, Snapshot,
};

#[derive(Parser, Debug)]
#[command(name = "vfscache")]
#[command(about = "Browse a persisted VFS cache offline")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the configuration file)
    #[arg(short = 'd', long, env = "VFSCACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List records without a parent
    Roots,
    /// List the children of a directory
    Ls {
        /// Record ID (defaults to the tree root)
        id: Option<u32>,
    },
    /// Print a directory tree
    Tree {
        /// Record ID (defaults to the tree root)
        id: Option<u32>,
        /// Levels below the starting record to print
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// Show every property of a record
    Show {
        /// Record ID
        id: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the cached content of a file
    Cat {
        /// Record ID
        id: u32,
        /// Write the bytes unmodified and untruncated
        #[arg(long)]
        raw: bool,
    },
    /// Compute the cached size of a subtree
    Du {
        /// Record ID (defaults to the tree root)
        id: Option<u32>,
        /// Worker threads (overrides the configuration file)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Hex dump one attribute of a record
    Attr {
        /// Record ID
        id: u32,
        /// Attribute name
        name: String,
    },
    /// List registered attribute names, or the attributes of one record
    Attrs {
        /// Record ID
        #[arg(long)]
        record: Option<u32>,
    },
}

/// Logs progress of the root's direct children
struct ProgressLogger {
    snapshot: Arc<Snapshot>,
}

impl DiskSizeListener for ProgressLogger {
    fn on_event(&self, event: DiskSizeEvent, node: &Node) {
        let name = node.name(&self.snapshot);
        match event {
            DiskSizeEvent::Started => info!("Sizing {}", name),
            DiskSizeEvent::Done => match node.size_cell().state() {
                MemoState::Computed(size) => info!("Sized {}: {} bytes", name, size),
                state => info!("Sized {}: {:?}", name, state),
            },
        }
    }
}

fn load_config(args: &Args) -> Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    // CLI takes precedence
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

fn start_id(snapshot: &Snapshot, id: Option<u32>) -> Result<RecordId> {
    match id {
        Some(id) => Ok(RecordId::new(id)),
        None => snapshot.root().context("no root record in cache"),
    }
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |time| time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
    )
}

fn format_size(state: &MemoState<u64>) -> String {
    match state {
        MemoState::Computed(size) => size.to_string(),
        MemoState::Pending => "calculating".to_string(),
        MemoState::Unknown => "-".to_string(),
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<32}  {}", line * 16, hex::encode(chunk), ascii);
    }
    out
}

fn print_tree(snapshot: &Snapshot, node: &Node, indent: usize, depth: usize) {
    let marker = if node.is_directory() { "/" } else { "" };
    println!(
        "{:indent$}{}{} [{}]",
        "",
        node.name(snapshot),
        marker,
        node.id(),
        indent = indent * 2
    );
    if depth == 0 {
        return;
    }
    for child in node.children(snapshot) {
        print_tree(snapshot, &child, indent + 1, depth - 1);
    }
}

fn print_info(info: &RecordInfo) {
    println!("Record {}", info.id);
    println!("==========");
    println!("Name:              {}", info.name);
    println!("Parent:            {}", info.parent_id);
    println!("Content ID:        {}", info.content_id);
    println!("Content refs:      {}", info.content_ref_count);
    println!("Content size:      {}", info.content_size);
    println!("Children:          {}", info.child_count);
    println!(
        "Timestamp:         {} ({})",
        format_timestamp(info.timestamp),
        info.timestamp
    );
    println!("Mod count:         {}", info.mod_count);
    println!("Length:            {}", info.length);
    for (flag, set) in &info.flags {
        println!("{:<18} {}", format!("{flag}:"), set);
    }
    for warning in &info.warnings {
        println!("Warning: {warning}");
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    let Some(cache_dir) = config.cache_dir.clone() else {
        bail!("no cache directory: pass --cache-dir, set VFSCACHE_DIR or configure cache_dir");
    };
    let snapshot = Arc::new(
        Snapshot::open_with(&cache_dir, &config)
            .with_context(|| format!("opening cache {}", cache_dir.display()))?,
    );

    match args.command {
        Commands::Roots => {
            for id in snapshot.roots() {
                let name = snapshot.resolve_name(id).unwrap_or("?");
                println!("{:>10}  {name}", id.get());
            }
        }
        Commands::Ls { id } => {
            let node = snapshot.node(start_id(&snapshot, id)?);
            println!("{}", node.path(&snapshot));
            for child in node.children(&snapshot) {
                let kind = if child.is_directory() { 'd' } else { '-' };
                println!(
                    "{kind} {:>10}  {:>12}  {}",
                    child.id().get(),
                    format_size(&child.size_on_disk(&snapshot)),
                    child.name(&snapshot)
                );
            }
        }
        Commands::Tree { id, depth } => {
            let node = snapshot.node(start_id(&snapshot, id)?);
            print_tree(&snapshot, &node, 0, depth);
        }
        Commands::Show { id, json } => {
            let info = RecordInfo::collect(&snapshot, RecordId::new(id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_info(&info);
            }
        }
        Commands::Cat { id, raw } => match snapshot.read_content(RecordId::new(id))? {
            None => println!("Content is not cached"),
            Some(bytes) if raw => std::io::stdout().lock().write_all(&bytes)?,
            Some(bytes) => {
                let limit = bytes.len().min(config.max_content_preview);
                print!("{}", String::from_utf8_lossy(&bytes[..limit]));
                if limit < bytes.len() {
                    println!("\n... ({} more bytes)", bytes.len() - limit);
                }
            }
        },
        Commands::Du { id, workers } => {
            let root = start_id(&snapshot, id)?;
            let listener = Arc::new(ProgressLogger {
                snapshot: Arc::clone(&snapshot),
            });
            let computer = DiskSizeComputer::new(workers.unwrap_or(config.workers))?
                .with_listener(listener);
            let total = computer.compute(&snapshot, root)?;

            let node = snapshot.node(root);
            for child in node.children(&snapshot) {
                println!(
                    "{:>12}  {}",
                    format_size(&child.size_on_disk(&snapshot)),
                    child.name(&snapshot)
                );
            }
            println!("{total:>12}  {}", node.path(&snapshot));
        }
        Commands::Attr { id, name } => {
            match snapshot.read_attribute(RecordId::new(id), &name)? {
                Some(bytes) => print!("{}", hex_dump(&bytes)),
                None => println!("Attribute {name} is not set on record {id}"),
            }
        }
        Commands::Attrs { record: None } => {
            for (id, name) in snapshot.attributes().names().iter() {
                println!("{:>5}  {name}", id.get());
            }
        }
        Commands::Attrs { record: Some(id) } => {
            let names = snapshot.attributes().names();
            for entry in snapshot.list_attributes(RecordId::new(id))? {
                let name = names.name_of(entry.id).unwrap_or("?");
                println!("{:>5}  {:<40}  {:?}", entry.id.get(), name, entry.slot);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_layout() {
        let dump = hex_dump(b"0123456789abcdef\x00\xff");
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000  30313233"));
        assert!(lines[0].ends_with("0123456789abcdef"));
        assert!(lines[1].starts_with("00000010  00ff"));
        assert!(lines[1].ends_with(".."));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000 UTC");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_cli_overrides_config_dir() {
        let args = Args::parse_from(["vfscache", "--cache-dir", "/tmp/cache", "roots"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(config.workers, 8);
    }
}

use std::io::Write;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use musicfs::aliases::ArtistAliases;
use musicfs::config::{split_extension_list, AppConfig, ExtensionPriority};
use musicfs::db::models::StoredConfig;
use musicfs::db::Database;
use musicfs::fileops::{FileKind, FileOps, REAL_PATH_XATTR};
use musicfs::pattern::PathPattern;
use musicfs::tags::LoftyTags;
use musicfs::{groveler, pathbuilder};

#[derive(Parser)]
#[command(name = "musicfs", version, about = "Read-only music filesystem index projected through a path pattern")]
struct Cli {
    /// Path to the SQLite index
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the backing directories and rebuild the virtual tree
    Index {
        /// Music roots to index (defaults to config file backing_fs_paths)
        paths: Vec<PathBuf>,

        /// Virtual path layout, e.g. "%albumartist%/[%year%] %album%/%track% - %title%.%ext%"
        #[arg(long)]
        pattern: Option<String>,

        /// Semicolon-separated extension priority list ("flac;mp3;*")
        #[arg(long)]
        extensions: Option<String>,

        /// Artist aliases file
        #[arg(long)]
        aliases: Option<PathBuf>,
    },

    /// List a virtual directory
    Ls {
        /// Virtual path ("/" for the root)
        path: String,
    },

    /// Show the attributes of a virtual path
    Stat { path: String },

    /// Copy a virtual file to stdout
    Cat { path: String },

    /// Print the backing file behind a virtual path
    RealPath { path: String },

    /// Show index statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve database path: CLI > config > ./music.db
    let db_path = cli
        .database
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| PathBuf::from("music.db"));
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Index { paths, pattern, extensions, aliases } => {
            run_index(db, &config, paths, pattern, extensions, aliases)
        }
        Commands::Ls { path } => {
            let ops = serving_ops(db)?;
            let handle = ops.opendir(&path)?;
            for name in ops.readdir(handle)? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Stat { path } => {
            let ops = serving_ops(db)?;
            let attrs = ops.getattr(&path)?;
            let kind = match attrs.kind {
                FileKind::Directory => "directory",
                FileKind::RegularFile => "file",
            };
            println!("{path}: {kind} mode {:o} uid {} gid {} size {}", attrs.mode, attrs.uid, attrs.gid, attrs.size);
            if let Ok(mtime) = attrs.mtime.duration_since(UNIX_EPOCH) {
                println!("mtime: {}", mtime.as_secs());
            }
            Ok(())
        }
        Commands::Cat { path } => {
            let mut ops = serving_ops(db)?;
            let handle = ops.open(&path)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut offset = 0u64;
            loop {
                let chunk = ops.read(handle, offset, 64 * 1024)?;
                if chunk.is_empty() {
                    break;
                }
                offset += chunk.len() as u64;
                out.write_all(&chunk)?;
            }
            ops.release(handle)?;
            Ok(())
        }
        Commands::RealPath { path } => {
            let ops = serving_ops(db)?;
            let value = ops.getxattr(&path, REAL_PATH_XATTR)?;
            println!("{}", String::from_utf8_lossy(&value));
            Ok(())
        }
        Commands::Stats => {
            let stats = db.stats().context("Failed to read statistics")?;
            println!("Artists: {}", stats.artists);
            println!("Albums:  {}", stats.albums);
            println!("Tracks:  {}", stats.tracks);
            println!("Files:   {}", stats.files);
            println!("Paths:   {}", stats.paths);
            Ok(())
        }
    }
}

fn run_index(
    db: Database,
    config: &AppConfig,
    paths: Vec<PathBuf>,
    pattern: Option<String>,
    extensions: Option<String>,
    aliases: Option<PathBuf>,
) -> Result<()> {
    // Resolve options: CLI > config file > built-in default.
    let roots = if !paths.is_empty() {
        paths
    } else {
        config.backing_fs_paths.clone()
    };
    if roots.is_empty() {
        bail!("No directories to index. Pass paths as arguments or set backing_fs_paths in config.");
    }

    let pattern_text = pattern
        .or_else(|| config.path_pattern.clone())
        .unwrap_or_else(|| musicfs::DEFAULT_PATH_PATTERN.to_string());
    let parsed_pattern = PathPattern::parse(&pattern_text)
        .with_context(|| format!("Invalid path pattern \"{pattern_text}\""))?;

    let extension_text = extensions
        .or_else(|| config.extensions.clone())
        .unwrap_or_else(|| musicfs::DEFAULT_EXTENSIONS.to_string());
    let priority = ExtensionPriority::from_spec(&extension_text);

    let aliases_path = aliases.or_else(|| config.aliases.clone());
    let alias_map = match &aliases_path {
        Some(path) => Some(
            ArtistAliases::load(path)
                .with_context(|| format!("Failed to load aliases file {}", path.display()))?,
        ),
        None => None,
    };

    let mut stored = StoredConfig {
        backing_fs_paths: roots.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
        extension_priority: split_extension_list(&extension_text),
        path_pattern: pattern_text,
        aliases_conf_path: aliases_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    db.init_config(&mut stored, false).context("Configuration check failed")?;

    let summary = groveler::grovel(&db, &LoftyTags, &roots, &priority).context("Indexing failed")?;
    let built = pathbuilder::build_paths(&db, &parsed_pattern, alias_map.as_ref(), &summary.pairs)
        .context("Path building failed")?;

    // Keep the persisted options in step with what was just indexed, so
    // the serving side and later rescans replay them.
    db.save_config(&stored).context("Failed to persist configuration")?;

    println!(
        "Index complete: {} ingested, {} unchanged, {} removed, {} skipped, {} virtual paths",
        summary.added, summary.unchanged, summary.removed, summary.skipped, built
    );
    Ok(())
}

/// Build the ops layer for query commands from the persisted configuration.
fn serving_ops(db: Database) -> Result<FileOps> {
    let mut stored = StoredConfig::default();
    db.init_config(&mut stored, true).context("Configuration check failed")?;
    let priority = ExtensionPriority::new(&stored.extension_priority);
    Ok(FileOps::new(db, priority))
}

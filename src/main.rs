use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use packscope::config::Settings;
use packscope::hashdb::{self, HashDatabase, SourceList, SourceUri};
use packscope::output;
use packscope::query::parse_matcher;
use packscope::search::{
    CancellationToken, SearchEngine, SearchOptions, SortEngine, SortKey, ThumbnailCache, WorkerPools,
};
use packscope::utils::{default_cache_path, progress, split_path, PathHasher};
use packscope::vfs::{mount_directory, mount_pack, Entry, LazyTree, TextDecoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packscope")]
#[command(about = "Browse and search hash-indexed archives as a read-only filesystem")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a hash database cache from a path list, URL or directory
    Build {
        /// Path list file, http(s) URL or directory
        source: String,

        /// Cache file to write (defaults to the app data directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Search the virtual tree
    Search {
        /// Query, e.g. `"*.mdl size:>1024 -content:todo"`
        #[arg(allow_hyphen_values = true)]
        query: String,

        #[command(flatten)]
        mount: MountArgs,

        /// Query budget in milliseconds (0 = unbounded)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Report matching folders as well as files
        #[arg(long)]
        folders: bool,

        /// Stop after this many hits
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Resolve a path and show the hash of every prefix
    Find {
        path: String,

        #[command(flatten)]
        mount: MountArgs,
    },
    /// List a folder
    Ls {
        /// Folder to list (defaults to the root)
        #[arg(default_value = "")]
        folder: String,

        #[command(flatten)]
        mount: MountArgs,

        /// Sort key: name, size, hash or kind
        #[arg(short, long, default_value_t = SortKey::Name)]
        sort: SortKey,

        /// Reverse the order
        #[arg(short, long)]
        desc: bool,
    },
    /// Preview the start of a file
    Peek {
        path: String,

        #[command(flatten)]
        mount: MountArgs,
    },
    /// Show hash database statistics
    Stats {
        /// Cache file
        db: PathBuf,
    },
}

/// Where the virtual tree comes from
#[derive(Args)]
struct MountArgs {
    /// Mount a real directory, indexed in memory
    #[arg(long, conflicts_with_all = ["pack", "db"])]
    dir: Option<PathBuf>,

    /// Pack segment stem; segments are read from `<STEM>.dat0`, `<STEM>.dat1`, ...
    #[arg(long, requires = "db")]
    pack: Option<PathBuf>,

    /// Hash database cache describing the pack
    #[arg(long, requires = "pack")]
    db: Option<PathBuf>,
}

impl MountArgs {
    fn mount(&self) -> Result<LazyTree> {
        if let (Some(stem), Some(db_path)) = (&self.pack, &self.db) {
            let db = HashDatabase::open(db_path)
                .with_context(|| format!("Failed to open hash database {}", db_path.display()))?;
            return Ok(mount_pack(stem, db));
        }

        let root = self.dir.clone().unwrap_or_else(|| PathBuf::from("."));
        mount_directory(&root).with_context(|| format!("Failed to mount {}", root.display()))
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PACKSCOPE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    let color = !cli.no_color;

    match cli.command {
        Commands::Build { source, out } => build(&source, out, &settings),
        Commands::Search {
            query,
            mount,
            timeout,
            folders,
            limit,
        } => {
            let mut options = SearchOptions::from_settings(&settings);
            if let Some(ms) = timeout {
                options.timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
            options.include_folders = folders;
            options.limit = limit;
            search(&query, &mount, options, &settings, color)
        }
        Commands::Find { path, mount } => find(&path, &mount, color),
        Commands::Ls {
            folder,
            mount,
            sort,
            desc,
        } => list(&folder, &mount, sort, desc, &settings, color),
        Commands::Peek { path, mount } => peek(&path, &mount, &settings, color),
        Commands::Stats { db } => {
            let database =
                HashDatabase::open(&db).with_context(|| format!("Failed to open hash database {}", db.display()))?;
            output::print_stats(&db, &database.stats())?;
            Ok(())
        }
    }
}

fn build(source: &str, out: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let destination = match out {
        Some(path) => path,
        None => default_cache_path(source)?,
    };
    let token = CancellationToken::new();
    let pb = progress::fraction_bar("building hash database");
    let report = |fraction: f64| progress::set_fraction(&pb, fraction);

    let result = if Path::new(source).is_dir() {
        let list = SourceList::from_directory(Path::new(source))
            .with_context(|| format!("Failed to list {source}"))?;
        hashdb::build_from_list(&list, &destination, &report, settings.progress_interval, &token)
    } else {
        hashdb::build(
            &SourceUri::parse(source),
            &destination,
            &report,
            settings.progress_interval,
            &token,
        )
    };

    let stats = match result {
        Ok(stats) => {
            pb.finish_with_message("done");
            stats
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e).with_context(|| format!("Failed to build hash database from {source}"));
        }
    };

    output::print_stats(&destination, &stats)?;
    Ok(())
}

fn search(query: &str, mount: &MountArgs, options: SearchOptions, settings: &Settings, color: bool) -> Result<()> {
    let matcher = parse_matcher(query).with_context(|| format!("Invalid query {query:?}"))?;
    let tree = Arc::new(mount.mount()?);
    let pools = WorkerPools::from_settings(settings)?;
    let engine = SearchEngine::new(tree, Arc::new(TextDecoder), Arc::clone(pools.search()));

    let token = CancellationToken::new();
    let mut results = engine.search(matcher, options, &token);
    let mut out = output::color_stdout(color);
    for hit in results.by_ref() {
        output::print_hit(&mut out, &hit)?;
    }

    let report = results.into_report();
    output::print_summary(&mut out, &report)?;
    if !report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}

fn find(path: &str, mount: &MountArgs, color: bool) -> Result<()> {
    let tree = mount.mount()?;
    let entry = tree.find(path).with_context(|| format!("Cannot resolve {path}"))?;

    let mut hasher = PathHasher::new();
    let recorded = tree.path_of(entry).unwrap_or_default();
    let chain: Vec<(String, u32)> = split_path(&recorded)
        .map(|segment| {
            hasher.push(segment);
            (segment.to_string(), hasher.finish())
        })
        .collect();

    let size = match entry {
        Entry::File(id) => tree.file(id).map(|f| f.size),
        Entry::Folder(_) => None,
    };
    output::print_resolution(&chain, size, color)?;
    Ok(())
}

fn list(folder: &str, mount: &MountArgs, key: SortKey, desc: bool, settings: &Settings, color: bool) -> Result<()> {
    let tree = Arc::new(mount.mount()?);
    let Some(id) = tree.find(folder).with_context(|| format!("Cannot resolve {folder}"))?.as_folder() else {
        bail!("{folder} is a file, not a folder");
    };

    let pools = WorkerPools::from_settings(settings)?;
    let engine = SortEngine::new(tree, Arc::clone(pools.sort()));
    let entries = engine.sort(id, key, desc, &CancellationToken::new())?;
    output::print_listing(&entries, color)?;
    Ok(())
}

fn peek(path: &str, mount: &MountArgs, settings: &Settings, color: bool) -> Result<()> {
    let tree = Arc::new(mount.mount()?);
    let Some(id) = tree.find(path).with_context(|| format!("Cannot resolve {path}"))?.as_file() else {
        bail!("{path} is a folder");
    };

    let pools = WorkerPools::from_settings(settings)?;
    let thumbnails = ThumbnailCache::new(tree, Arc::new(TextDecoder), Arc::clone(pools.thumbnail()), settings);
    let thumbnail = thumbnails
        .thumbnail(id, &CancellationToken::new())
        .with_context(|| format!("Cannot read {path}"))?;
    output::print_thumbnail(&thumbnail, color)?;
    Ok(())
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use brickpool::pool::{
    BufferFileManager, DEFAULT_BUFFER_FILE_PREFIX, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_RAM_LIMIT,
};
use brickpool::{BrickPoolManager, ChannelSelection, PoolConfig, PoolManifest, PoolResult};

/// Create and inspect out-of-core brick pools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BRICKPOOL_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "BRICKPOOL_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a pool with zeroed bricks and write its manifest
    Create {
        /// Pool directory, created if missing
        #[arg(long)]
        pool: PathBuf,

        /// Size of one brick in bytes
        #[arg(long)]
        brick_size: usize,

        /// Number of bricks to allocate
        #[arg(long, default_value = "0")]
        bricks: usize,

        #[arg(long, env = "BRICKPOOL_MAX_BUFFER_SIZE", default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
        max_buffer_size: usize,

        #[arg(long, env = "BRICKPOOL_RAM_LIMIT", default_value_t = DEFAULT_RAM_LIMIT)]
        ram_limit: usize,

        #[arg(long, default_value = DEFAULT_BUFFER_FILE_PREFIX)]
        prefix: String,

        /// Manifest path (defaults to <pool>/pool.json)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Print the geometry and disk footprint recorded in a manifest
    Info {
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Reopen a pool and page every buffer in once
    Verify {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long, env = "BRICKPOOL_RAM_LIMIT", default_value_t = DEFAULT_RAM_LIMIT)]
        ram_limit: usize,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "brickpool failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> PoolResult<()> {
    match command {
        Command::Create {
            pool,
            brick_size,
            bricks,
            max_buffer_size,
            ram_limit,
            prefix,
            manifest,
        } => {
            BufferFileManager::create(&pool, &prefix)?;
            let config = PoolConfig::new(&pool)
                .with_max_buffer_size(max_buffer_size)
                .with_ram_limit(ram_limit)
                .with_buffer_file_prefix(prefix);
            let manager = BrickPoolManager::initialize(&config, brick_size)?;
            for _ in 0..bricks {
                manager.allocate_brick()?;
            }
            let manifest_path = manifest.unwrap_or_else(|| pool.join("pool.json"));
            let report = |fraction: f32| info!("flushing: {:.0}%", fraction * 100.0);
            manager.flush_pool_to_disk(Some(&report))?;
            manager.serialize()?.save(&manifest_path)?;
            info!(
                bricks,
                buffers = manager.buffer_count(),
                manifest = %manifest_path.display(),
                "created brick pool"
            );
            Ok(())
        }
        Command::Info { manifest } => {
            let manifest = PoolManifest::load(&manifest)?;
            println!("pool directory:     {}", manifest.brick_pool_path.display());
            println!("buffer file prefix: {}", manifest.buffer_file_prefix);
            println!("brick size:         {}", manifest.brick_memory_size_bytes);
            println!("buffer size:        {}", manifest.single_buffer_size_bytes);
            println!("bricks per buffer:  {}", manifest.num_brick_slots_per_buffer);
            println!("buffer files:       {}", manifest.buffer_files.len());
            println!("next address:       {}", manifest.next_virtual_memory_address);
            println!("disk footprint:     {}", manifest.disk_footprint());
            Ok(())
        }
        Command::Verify {
            manifest,
            ram_limit,
        } => {
            let manifest = PoolManifest::load(&manifest)?;
            let config = PoolConfig::new(&manifest.brick_pool_path).with_ram_limit(ram_limit);
            let manager = BrickPoolManager::deserialize(&config, &manifest)?;
            let buffer_size = manager.buffer_size() as u64;
            for buffer in 0..manager.buffer_count() {
                let address = buffer as u64 * buffer_size;
                if address >= manager.next_virtual_address() {
                    break;
                }
                if let Some(guard) = manager.get_brick(address, ChannelSelection::ALL, true)? {
                    guard.release()?;
                }
            }
            println!("{}", serde_json::to_string_pretty(&manager.stats())?);
            Ok(())
        }
    }
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

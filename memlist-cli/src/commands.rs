use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use memlist_config::MemlistConfig;
use memlist_core::alloc::Allocator;
use memlist_core::list::{ConcurrentList, Payload, NODE_SIZE};
use memlist_telemetry::MetricsRecorder;

#[derive(Parser, Debug)]
#[command(name = "memlist", version, about)]
pub struct Cli {
    /// Configuration file; `config/memlist.yaml` is used when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a list, render it and clean it up
    Demo(DemoArgs),
    /// Insert concurrently from several threads and verify the count
    Stress(StressArgs),
    /// Allocate and free blocks, then print the block table
    Blocks(BlocksArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Arena capacity in bytes
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Values appended in order
    #[arg(long, value_delimiter = ',', default_values_t = [10u16, 20, 30, 40, 50])]
    pub values: Vec<Payload>,
}

#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    /// Inserting threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Inserts per thread; every insert carries a distinct `u16`, so at most
    /// 65536 inserts in total
    #[arg(short, long)]
    pub inserts: Option<usize>,

    /// Arena capacity in bytes
    #[arg(long)]
    pub capacity: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct BlocksArgs {
    /// Arena capacity in bytes
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Sizes to allocate, in order
    #[arg(long, value_delimiter = ',', required = true)]
    pub sizes: Vec<usize>,

    /// Indices (into `--sizes`) to free afterwards
    #[arg(long, value_delimiter = ',')]
    pub free: Vec<usize>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<MemlistConfig> {
    let config = match path {
        Some(path) => MemlistConfig::load_from_path(path),
        None => MemlistConfig::load(),
    };
    config.context("failed to load configuration")
}

pub fn run(command: Commands, config: MemlistConfig) -> anyhow::Result<()> {
    match command {
        Commands::Demo(args) => run_demo(args, config),
        Commands::Stress(args) => run_stress(args, config),
        Commands::Blocks(args) => run_blocks(args, config),
    }
}

fn run_demo(args: DemoArgs, config: MemlistConfig) -> anyhow::Result<()> {
    let capacity = args.capacity.unwrap_or(config.allocator.capacity);
    let list = ConcurrentList::init(capacity).context("arena reservation failed")?;

    let nodes = args
        .values
        .iter()
        .map(|value| list.insert(*value))
        .collect::<Result<Vec<_>, _>>()?;

    println!("list:  {}", list.display()?);
    println!("count: {}", list.count()?);
    if nodes.len() >= 4 {
        println!(
            "range: {}",
            list.display_range(Some(nodes[1]), Some(nodes[3]))?
        );
    }

    let reclaimed = list.cleanup()?;
    info!(reclaimed, "Demo finished");
    Ok(())
}

fn run_stress(args: StressArgs, mut config: MemlistConfig) -> anyhow::Result<()> {
    if let Some(threads) = args.threads {
        config.stress.threads = threads;
    }
    if let Some(inserts) = args.inserts {
        config.stress.inserts_per_thread = inserts;
    }
    if let Some(capacity) = args.capacity {
        config.allocator.capacity = capacity;
    }
    config.validate_fit(NODE_SIZE, Payload::MAX as usize + 1)?;

    let stress = config.stress.clone();
    let list = ConcurrentList::init(config.allocator.capacity).context("arena reservation failed")?;
    let metrics = MetricsRecorder::new()?;

    let started = Instant::now();
    crossbeam::thread::scope(|s| -> anyhow::Result<()> {
        let mut workers = Vec::with_capacity(stress.threads);
        for t in 0..stress.threads {
            let (list, metrics) = (&list, &metrics);
            let per_thread = stress.inserts_per_thread;
            let worker = s
                .builder()
                .name(format!("stress-{}", t))
                .spawn(move |_| -> anyhow::Result<()> {
                    for i in 0..per_thread {
                        let begin = Instant::now();
                        list.insert((t * per_thread + i) as Payload)?;
                        metrics
                            .insert_latency
                            .observe(begin.elapsed().as_nanos() as f64);
                    }
                    Ok(())
                })?;
            workers.push(worker);
        }
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("stress thread panicked"))??;
        }
        Ok(())
    })
    .map_err(|_| anyhow::anyhow!("stress scope panicked"))??;

    let count = list.count()?;
    let expected = stress.total_inserts();
    info!(
        count,
        expected,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stress run finished"
    );
    if count != expected {
        bail!("lost nodes: counted {} of {}", count, expected);
    }

    let allocator = list.allocator();
    allocator
        .check_invariants()
        .context("block table corrupted")?;
    metrics.observe(&allocator.stats(), &allocator.blocks());
    print!("{}", metrics.gather_metrics()?);

    list.cleanup()?;
    Ok(())
}

fn run_blocks(args: BlocksArgs, config: MemlistConfig) -> anyhow::Result<()> {
    let capacity = args.capacity.unwrap_or(config.allocator.capacity);
    let allocator = Allocator::init(capacity).context("arena reservation failed")?;

    let ptrs: Vec<_> = args.sizes.iter().map(|size| allocator.alloc(*size)).collect();
    for (size, ptr) in args.sizes.iter().zip(&ptrs) {
        match ptr {
            Some(ptr) => info!(size, %ptr, "Allocated"),
            None => info!(size, "No block large enough"),
        }
    }
    for index in args.free {
        if let Some(Some(ptr)) = ptrs.get(index) {
            allocator.free(*ptr);
        }
    }

    print!("{}", serde_yaml::to_string(&allocator.blocks())?);
    allocator.deinit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlist_config::ConfigError;

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::parse_from(["memlist", "demo"]);
        match cli.command {
            Commands::Demo(args) => assert_eq!(args.values, vec![10, 20, 30, 40, 50]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parse_blocks_lists() {
        let cli = Cli::parse_from(["memlist", "blocks", "--sizes", "8,16,32", "--free", "1"]);
        match cli.command {
            Commands::Blocks(args) => {
                assert_eq!(args.sizes, vec![8, 16, 32]);
                assert_eq!(args.free, vec![1]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn stress_rejects_oversized_workload() {
        let args = StressArgs {
            threads: Some(4),
            inserts: Some(100),
            capacity: Some(NODE_SIZE * 10),
        };
        assert!(run_stress(args, MemlistConfig::default()).is_err());
    }

    #[test]
    fn stress_rejects_repeated_values() {
        let args = StressArgs {
            threads: Some(2),
            inserts: Some(40_000),
            capacity: Some(1 << 30),
        };
        let err = run_stress(args, MemlistConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::TooManyInserts { inserts: 80_000, .. })
        ));
    }

    #[test]
    fn stress_small_run() {
        let args = StressArgs {
            threads: Some(3),
            inserts: Some(20),
            capacity: Some(NODE_SIZE * 60),
        };
        run_stress(args, MemlistConfig::default()).unwrap();
    }

    #[test]
    fn blocks_and_demo_run() {
        run_blocks(
            BlocksArgs {
                capacity: Some(128),
                sizes: vec![16, 16, 200],
                free: vec![0, 7],
            },
            MemlistConfig::default(),
        )
        .unwrap();
        run_demo(
            DemoArgs {
                capacity: Some(NODE_SIZE * 5),
                values: vec![1, 2, 3, 4, 5],
            },
            MemlistConfig::default(),
        )
        .unwrap();
    }
}

//! # Terra CLI
//!
//! Headless front end for config authors.
//!
//! ```bash
//! # Validate a config and its schematics
//! terra check demos/worlds/temperate.toml --schematics demos/schematics
//!
//! # Generate a 9x9 square of chunks on all cores
//! RUST_LOG=terra=debug terra generate demos/worlds/temperate.toml -s demos/schematics --radius 4
//!
//! # Evaluate a formula
//! terra eval "64 + 12 * sin(x / 10)" x=15
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use terra::{ChunkScheduler, MaterialNames, SchedulerConfig, TerraWorld};
use terra_expr::Expression;
use terra_procedural::{ChunkCoord, Diagnostic, PlacementOutcome, WorldSeed};

#[derive(Parser)]
#[command(name = "terra")]
#[command(about = "Config-driven terrain generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and compile a config, then print what it defines.
    Check {
        /// Config file.
        config: PathBuf,
        /// Directory of schematic assets.
        #[arg(short, long)]
        schematics: Option<PathBuf>,
    },
    /// Generate a square of chunks and print a digest per chunk.
    Generate {
        /// Config file.
        config: PathBuf,
        /// Directory of schematic assets.
        #[arg(short, long)]
        schematics: Option<PathBuf>,
        /// World seed; the config's seed when absent.
        #[arg(long)]
        seed: Option<i64>,
        /// Center chunk X.
        #[arg(long, default_value_t = 0)]
        x: i32,
        /// Center chunk Z.
        #[arg(long, default_value_t = 0)]
        z: i32,
        /// Chunks on each side of the center.
        #[arg(short, long, default_value_t = 2)]
        radius: i32,
        /// Worker threads; one per core when absent.
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Evaluate an expression with `name=value` bindings.
    Eval {
        /// Expression text.
        expression: String,
        /// Bindings such as `x=3`.
        bindings: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Check { config, schematics } => check(&config, schematics.as_deref()),
        Commands::Generate {
            config,
            schematics,
            seed,
            x,
            z,
            radius,
            workers,
        } => generate(&config, schematics.as_deref(), seed, ChunkCoord::new(x, z), radius, workers),
        Commands::Eval {
            expression,
            bindings,
        } => eval(&expression, &bindings),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn load(
    config: &std::path::Path,
    schematics: Option<&std::path::Path>,
    seed: Option<i64>,
) -> Result<TerraWorld<String>, String> {
    TerraWorld::load(&MaterialNames, config, schematics, seed.map(|s| WorldSeed::new(s as u64)))
        .map_err(|e| format!("{}: {e}", config.display()))
}

fn check(config: &std::path::Path, schematics: Option<&std::path::Path>) -> Result<(), String> {
    let world = load(config, schematics, None)?;
    let compiled = world.config();

    println!("{} (seed {})", compiled.name(), compiled.seed().value());
    println!("  sea level   {}", compiled.sea_level());
    println!("  materials   {}", compiled.materials().len());
    for layer in compiled.noise_layers() {
        println!(
            "  noise       {} ({:?}, {}D, {} octave(s))",
            layer.name,
            layer.kind,
            if layer.three_d { 3 } else { 2 },
            layer.octaves
        );
    }
    println!("  height      {}", compiled.height_expression());
    if let Some(density) = compiled.density_expression() {
        println!("  density     {density}");
    }
    for biome in compiled.biomes().iter() {
        match &biome.condition {
            Some(condition) => println!("  biome       {} when {condition}", biome.name),
            None => println!("  biome       {} (otherwise)", biome.name),
        }
    }
    for rule in compiled.structure_rules() {
        println!(
            "  structure   {} -> {} ({} spawn, {} attempt(s))",
            rule.name,
            rule.schematic.name(),
            rule.spawn,
            rule.attempts
        );
    }
    for carver in compiled.carvers() {
        println!("  carver      {} ({}%, reach {} chunks)", carver.name, carver.chance, carver.reach_chunks());
    }
    println!("  ores        {}", compiled.ores().len());
    println!("ok");
    Ok(())
}

/// FNV-1a over the material lattice.
fn digest(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn generate(
    config: &std::path::Path,
    schematics: Option<&std::path::Path>,
    seed: Option<i64>,
    center: ChunkCoord,
    radius: i32,
    workers: Option<usize>,
) -> Result<(), String> {
    if radius < 0 {
        return Err(format!("radius must be non-negative, got {radius}"));
    }
    let world = Arc::new(load(config, schematics, seed)?);
    let mut settings = SchedulerConfig::default();
    if let Some(workers) = workers {
        settings.workers = workers;
    }
    let side = (2 * radius + 1) as usize;
    settings.queue_capacity = side * side;

    let start = Instant::now();
    let scheduler = ChunkScheduler::start(Arc::clone(&world), settings);
    let results = scheduler.results();
    for dz in -radius..=radius {
        for dx in -radius..=radius {
            scheduler
                .request(ChunkCoord::new(center.x + dx, center.z + dz))
                .map_err(|e| e.to_string())?;
        }
    }
    let stats = scheduler.shutdown();
    let elapsed = start.elapsed();

    let mut chunks: Vec<_> = results.try_iter().collect();
    chunks.sort_by_key(|r| (r.coord.z, r.coord.x));

    let mut fallbacks = 0u64;
    let mut placed = 0usize;
    let mut conflicts = 0usize;
    let mut per_rule: HashMap<String, usize> = HashMap::new();
    for result in &chunks {
        let generated = match &result.outcome {
            Ok(generated) => generated,
            Err(e) => {
                println!("{:>12}  {e}", result.coord.to_string());
                continue;
            }
        };
        let report = &generated.report;
        fallbacks += u64::from(report.fallbacks.total());
        conflicts += report
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::ConcurrencyConflict { .. }))
            .count();
        for record in &report.placements {
            if matches!(record.outcome, PlacementOutcome::Placed(_)) {
                placed += 1;
                *per_rule.entry(record.rule.clone()).or_default() += 1;
            }
        }
        println!(
            "{:>12}  {:016x}  carved {:>5}  ore {:>4}  stamped {:>4}  fallbacks {}",
            result.coord.to_string(),
            digest(generated.chunk.as_bytes()),
            report.carved,
            report.ore_blocks,
            report.stamped,
            report.fallbacks.total()
        );
    }

    println!();
    println!(
        "{} chunk(s) in {:.2?} ({:.1} chunks/s)",
        stats.generated,
        elapsed,
        stats.generated as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("structures placed: {placed}");
    let mut rules: Vec<_> = per_rule.into_iter().collect();
    rules.sort();
    for (rule, count) in rules {
        println!("  {rule}: {count}");
    }
    println!("fallback evaluations: {fallbacks}");
    if conflicts > 0 {
        println!("regions skipped after contention: {conflicts}");
    }
    let coordinator = world.config().coordinator().stats();
    println!(
        "regions planned: {}, reused: {}",
        coordinator.planned, coordinator.reused
    );
    if stats.failed > 0 {
        return Err(format!("{} chunk(s) failed", stats.failed));
    }
    Ok(())
}

fn eval(text: &str, bindings: &[String]) -> Result<(), String> {
    let expression = Expression::parse(text).map_err(|e| e.to_string())?;

    let mut values = HashMap::new();
    for binding in bindings {
        let (name, value) = binding
            .split_once('=')
            .ok_or_else(|| format!("binding `{binding}` is not name=value"))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|e| format!("binding `{binding}`: {e}"))?;
        values.insert(name.trim().to_string(), value);
    }

    let result = expression.evaluate_map(&values).map_err(|e| e.to_string())?;
    println!("{result}");
    Ok(())
}

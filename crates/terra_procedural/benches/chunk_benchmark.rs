//! Benchmark for chunk generation.
//!
//! Run with: cargo bench --package terra_procedural --bench chunk_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use terra_procedural::{ChunkCache, ChunkCoord, CompiledConfig, Generator, SchematicLibrary, WorldSeed};

const HILLS: &str = r#"
version = 1
name = "hills"

[[noise]]
name = "hills"
frequency = 0.008
octaves = 5

[[noise]]
name = "caves"
dimensions = 3
frequency = 0.04
octaves = 2

[fields]
height = "64 + 24 * hills"
density = "height - y + 6 * caves"

[[palette]]
material = "grass"
max = 1.0

[[palette]]
material = "dirt"
max = 4.0

[[palette]]
material = "stone"
"#;

const FLAT: &str = r#"
version = 1
name = "flat"

[fields]
height = "64"

[[palette]]
material = "stone"
"#;

fn compile(text: &str) -> CompiledConfig {
    CompiledConfig::from_toml_str(text, &SchematicLibrary::new()).unwrap()
}

fn benchmark_single_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_chunk");

    let flat = compile(FLAT);
    let gen = Generator::new(&flat, WorldSeed::new(42));
    group.bench_function("flat_closed_form", |b| {
        let mut coord = 0i32;
        b.iter(|| {
            coord = coord.wrapping_add(1) % 4096;
            black_box(gen.generate(ChunkCoord::new(coord, coord / 2)))
        });
    });

    let hills = compile(HILLS);
    let gen = Generator::new(&hills, WorldSeed::new(42));
    group.bench_function("hills_3d_density", |b| {
        let mut coord = 0i32;
        b.iter(|| {
            coord = coord.wrapping_add(1) % 4096;
            black_box(gen.generate(ChunkCoord::new(coord, coord / 2)))
        });
    });

    group.finish();
}

fn benchmark_chunk_grid(c: &mut Criterion) {
    let config = compile(HILLS);
    let gen = Generator::new(&config, WorldSeed::new(42));

    let mut group = c.benchmark_group("chunk_grid");
    group.sample_size(10);

    // 8x8 chunks = 128x128 columns
    group.throughput(Throughput::Elements(8 * 8));
    group.bench_function("8x8_chunks", |b| {
        b.iter(|| {
            for z in 0..8 {
                for x in 0..8 {
                    black_box(gen.generate(ChunkCoord::new(x, z)));
                }
            }
        });
    });

    group.finish();
}

fn benchmark_cache(c: &mut Criterion) {
    let config = compile(HILLS);
    let seed = WorldSeed::new(42);
    let cache = ChunkCache::new(256);
    let chunk = Generator::new(&config, seed)
        .generate(ChunkCoord::new(0, 0))
        .unwrap()
        .chunk;
    cache.insert(seed, &chunk);

    c.bench_function("cache_hit_decompress", |b| {
        b.iter(|| black_box(cache.get(seed, ChunkCoord::new(0, 0))));
    });
}

criterion_group!(benches, benchmark_single_chunk, benchmark_chunk_grid, benchmark_cache);
criterion_main!(benches);

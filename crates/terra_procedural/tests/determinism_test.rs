//! # Determinism Tests
//!
//! A chunk is a pure function of (seed, coordinate, config): generation
//! order, thread count and what else was generated never change it.

use std::collections::HashMap;

use terra_procedural::{generate, ChunkCoord, CompiledConfig, SchematicLibrary, WorldSeed};

const WORLD: &str = r#"
version = 1
name = "rolling"
sea_level = 60

[constants]
amplitude = 20.0

[[noise]]
name = "hills"
frequency = 0.01
octaves = 4

[[noise]]
name = "wet"
frequency = 0.003
octaves = 2
salt = 99

[[noise]]
name = "caves"
dimensions = 3
kind = "ridged"
frequency = 0.05
octaves = 2

[fields]
height = "64 + amplitude * hills"
density = "height - y - (y < height - 8 ? 10 * max(caves - 0.7, 0) : 0)"

[[palette]]
material = "grass"
max = 1.0

[[palette]]
material = "stone"

[[biomes]]
name = "swamp"
condition = "wet > 0.2 && height < sea_level + 6"
palette = [{ material = "mud", max = 3.0 }, { material = "clay" }]

[[biomes]]
name = "plains"

[[carvers]]
name = "tunnels"
chance = 40.0

[[ores]]
material = "iron_ore"
veins = { min = 2, max = 6 }
"#;

fn compile() -> CompiledConfig {
    CompiledConfig::from_toml_str(WORLD, &SchematicLibrary::new()).unwrap()
}

fn grid() -> Vec<ChunkCoord> {
    let mut coords = Vec::new();
    for z in -3..3 {
        for x in -3..3 {
            coords.push(ChunkCoord::new(x, z));
        }
    }
    coords
}

/// Test: same inputs, same bytes.
#[test]
fn test_same_seed_same_chunk() {
    let config = compile();
    let seed = WorldSeed::new(12345);

    for coord in grid() {
        let a = generate(coord, &config, seed).unwrap();
        let b = generate(coord, &config, seed).unwrap();
        assert_eq!(a.chunk.as_bytes(), b.chunk.as_bytes(), "chunk {coord} differs");
        assert_eq!(a.report.carved, b.report.carved);
        assert_eq!(a.report.ore_blocks, b.report.ore_blocks);
    }
}

/// Test: a different seed gives a different world.
#[test]
fn test_different_seed_different_chunk() {
    let config = compile();
    let coord = ChunkCoord::new(2, -1);

    let a = generate(coord, &config, WorldSeed::new(1)).unwrap();
    let b = generate(coord, &config, WorldSeed::new(2)).unwrap();
    assert_ne!(a.chunk.as_bytes(), b.chunk.as_bytes());
}

/// Test: generation order does not matter.
#[test]
fn test_order_independence() {
    let config = compile();
    let seed = WorldSeed::new(777);

    let forward: HashMap<ChunkCoord, Vec<u8>> = grid()
        .into_iter()
        .map(|coord| (coord, generate(coord, &config, seed).unwrap().chunk.as_bytes().to_vec()))
        .collect();

    // A fresh config, so nothing is shared through the placement ledger.
    let config = compile();
    let mut reversed = grid();
    reversed.reverse();
    for coord in reversed {
        let bytes = generate(coord, &config, seed).unwrap();
        assert_eq!(bytes.chunk.as_bytes(), forward[&coord].as_slice(), "chunk {coord} differs");
    }
}

/// Test: concurrent generation matches sequential generation.
#[test]
fn test_concurrent_generation_matches_sequential() {
    let seed = WorldSeed::new(4242);
    let sequential_config = compile();
    let sequential: HashMap<ChunkCoord, Vec<u8>> = grid()
        .into_iter()
        .map(|coord| {
            let out = generate(coord, &sequential_config, seed).unwrap();
            (coord, out.chunk.as_bytes().to_vec())
        })
        .collect();

    let config = compile();
    let coords = grid();
    let threads = 4;
    let results: Vec<(ChunkCoord, Vec<u8>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let config = &config;
                let coords = &coords;
                scope.spawn(move || {
                    // Each thread walks the grid from a different offset.
                    let n = coords.len();
                    (0..n)
                        .map(|i| coords[(i + t * n / threads) % n])
                        .map(|coord| {
                            let out = generate(coord, config, seed).unwrap();
                            (coord, out.chunk.as_bytes().to_vec())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), coords.len() * threads);
    for (coord, bytes) in results {
        assert_eq!(bytes, sequential[&coord], "chunk {coord} differs across threads");
    }
}

/// Test: the report is clean for a well-formed world.
#[test]
fn test_reports_are_clean() {
    let config = compile();
    let seed = WorldSeed::new(9);
    let mut carved = 0;
    let mut ore = 0;

    for coord in grid() {
        let out = generate(coord, &config, seed).unwrap();
        assert!(out.report.is_clean(), "chunk {coord}: {:?}", out.report.diagnostics);
        carved += out.report.carved;
        ore += out.report.ore_blocks;
    }

    println!("Carved blocks: {carved}");
    println!("Ore blocks: {ore}");
    assert!(ore > 0);
}

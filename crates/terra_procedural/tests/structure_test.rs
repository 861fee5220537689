//! # Structure Placement Tests
//!
//! Structures that straddle chunk seams must be decided once and appear
//! whole, whichever chunk is generated first and on whichever thread.

use std::collections::HashSet;

use terra_procedural::{
    generate, ChunkCoord, CompiledConfig, PlacementOutcome, Schematic, SchematicLibrary,
    WorldSeed, CHUNK_HEIGHT,
};

const TOWER: &str = r####"
name = "tower"
anchor = [1, 0, 1]
layers = [
    ["###", "###", "###"],
    ["###", "###", "###"],
    ["###", "###", "###"],
    ["###", "###", "###"],
    ["###", "###", "###"],
    ["###", "###", "###"],
]

[legend]
"#" = "planks"
"####;

const TOWER_BLOCKS: usize = 3 * 6 * 3;

const WORLD: &str = r#"
version = 1
name = "towers"
sea_level = 20

[[noise]]
name = "hills"
frequency = 0.02
octaves = 3

[fields]
height = "64 + 6 * hills"

[[palette]]
material = "stone"

[structures]
region_size = 64

[[structures.rules]]
name = "tower"
schematic = "tower"
attempts = 12
spacing = 4
"#;

fn library() -> SchematicLibrary {
    let mut library = SchematicLibrary::new();
    library.insert(Schematic::from_toml_str(TOWER).unwrap()).unwrap();
    library
}

fn compile() -> CompiledConfig {
    CompiledConfig::from_toml_str(WORLD, &library()).unwrap()
}

/// 8x8 chunks: exactly regions [0, 0] to [1, 1] at region size 64.
fn area() -> Vec<ChunkCoord> {
    let mut coords = Vec::new();
    for z in 0..8 {
        for x in 0..8 {
            coords.push(ChunkCoord::new(x, z));
        }
    }
    coords
}

/// Generates `coords` and returns (placed structures, planks count).
fn census(config: &CompiledConfig, seed: WorldSeed, coords: &[ChunkCoord]) -> (usize, usize) {
    let planks = config.materials().id("planks").unwrap();
    let mut placed = 0;
    let mut blocks = 0;
    for &coord in coords {
        let out = generate(coord, config, seed).unwrap();
        placed += out
            .report
            .placements
            .iter()
            .filter(|r| matches!(r.outcome, PlacementOutcome::Placed(_)))
            .count();
        blocks += out.chunk.count(planks);
    }
    (placed, blocks)
}

/// Test: every placed tower is stamped whole, once.
#[test]
fn test_structures_whole_across_seams() {
    let config = compile();
    let (placed, blocks) = census(&config, WorldSeed::new(31337), &area());

    println!("Placed towers: {placed}");
    println!("Planks: {blocks}");
    assert!(placed > 0, "no tower placed in 4 regions");
    assert_eq!(blocks, placed * TOWER_BLOCKS);
}

/// Test: each placement record is reported by exactly one chunk.
#[test]
fn test_records_reported_once() {
    let config = compile();
    let seed = WorldSeed::new(5);
    let mut seen = HashSet::new();

    for coord in area() {
        let out = generate(coord, &config, seed).unwrap();
        for record in out.report.placements {
            assert_eq!(ChunkCoord::from_block_pos(record.origin.x, record.origin.z), coord);
            assert!(
                seen.insert((record.rule.clone(), record.origin.x, record.origin.z)),
                "record at ({}, {}) reported twice",
                record.origin.x,
                record.origin.z
            );
        }
    }

    let stats = config.coordinator().stats();
    println!("Coordinator: {stats:?}");
    assert_eq!(stats.planned, 4);
}

/// Test: concurrent generation in scrambled orders places the same towers.
#[test]
fn test_concurrent_boundary_structures() {
    let seed = WorldSeed::new(2024);
    let coords = area();

    let sequential_config = compile();
    let (expected_placed, expected_blocks) = census(&sequential_config, seed, &coords);

    let config = compile();
    let threads = 8;
    let per_thread: Vec<(usize, usize)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let config = &config;
                let mine: Vec<ChunkCoord> = coords
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(i, _)| i % threads == t)
                    .map(|(_, c)| c)
                    .rev()
                    .collect();
                scope.spawn(move || census(config, seed, &mine))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let placed: usize = per_thread.iter().map(|(p, _)| p).sum();
    let blocks: usize = per_thread.iter().map(|(_, b)| b).sum();
    assert_eq!(placed, expected_placed);
    assert_eq!(blocks, expected_blocks);
    assert_eq!(config.coordinator().stats().planned, 4);
    assert_eq!(config.coordinator().stats().contended, 0);
}

/// Test: a tower's origin stands on the terrain surface.
#[test]
fn test_tower_on_surface() {
    let config = compile();
    let seed = WorldSeed::new(31337);
    let planks = config.materials().id("planks").unwrap();
    let stone = config.materials().id("stone").unwrap();

    for coord in area() {
        let out = generate(coord, &config, seed).unwrap();
        for record in &out.report.placements {
            let PlacementOutcome::Placed(placement) = record.outcome else {
                continue;
            };
            let x = (placement.origin.x - coord.world_x()) as usize;
            let z = (placement.origin.z - coord.world_z()) as usize;
            let y = placement.origin.y as usize;
            assert!(y > 0 && y < CHUNK_HEIGHT);
            assert_eq!(out.chunk.get(x, y, z), planks);
            assert_eq!(out.chunk.get(x, y - 1, z), stone, "floating tower at {coord}");
        }
    }
}

//! # Carver Tests
//!
//! Tunnels start in one chunk and run into its neighbours; every chunk
//! replays nearby worms so the tunnel is continuous across seams.

use std::collections::HashMap;

use terra_procedural::{generate, Chunk, ChunkCoord, CompiledConfig, SchematicLibrary, WorldSeed, CHUNK_SIZE};

const SOLID: &str = r#"
version = 1
name = "solid"
sea_level = 0

[fields]
height = "120"

[[palette]]
material = "stone"

[[carvers]]
name = "tunnels"
chance = 100.0
height = { min = 40, max = 80 }
length = { min = 80, max = 120 }
"#;

fn world(seed: u64) -> (CompiledConfig, HashMap<ChunkCoord, (Chunk, u32)>) {
    let config = CompiledConfig::from_toml_str(SOLID, &SchematicLibrary::new()).unwrap();
    let mut chunks = HashMap::new();
    for z in 0..4 {
        for x in 0..4 {
            let coord = ChunkCoord::new(x, z);
            let out = generate(coord, &config, WorldSeed::new(seed)).unwrap();
            chunks.insert(coord, (out.chunk, out.report.carved));
        }
    }
    (config, chunks)
}

fn underground_air(chunk: &Chunk, x: usize, y: usize, z: usize) -> bool {
    y < 120 && chunk.get(x, y, z).is_air()
}

/// Test: every chunk is carved when the chance is 100%.
#[test]
fn test_tunnels_carved() {
    let (config, chunks) = world(8);
    assert_eq!(config.carver_range(), 8);

    let total: u32 = chunks.values().map(|(_, carved)| carved).sum();
    println!("Carved blocks in 4x4 chunks: {total}");
    assert!(total > 0);
    for (chunk, carved) in chunks.values() {
        let air_below_surface = (0..120)
            .flat_map(|y| (0..CHUNK_SIZE).flat_map(move |z| (0..CHUNK_SIZE).map(move |x| (x, y, z))))
            .filter(|&(x, y, z)| underground_air(chunk, x, y, z))
            .count();
        assert_eq!(air_below_surface, *carved as usize);
    }
}

/// Test: tunnels continue across chunk seams.
#[test]
fn test_tunnels_cross_seams() {
    let (_, chunks) = world(21);
    let last = CHUNK_SIZE - 1;
    let mut shared = 0;

    for z in 0..4 {
        for x in 0..3 {
            let (west, _) = &chunks[&ChunkCoord::new(x, z)];
            let (east, _) = &chunks[&ChunkCoord::new(x + 1, z)];
            for y in 0..120 {
                for lz in 0..CHUNK_SIZE {
                    if underground_air(west, last, y, lz) && underground_air(east, 0, y, lz) {
                        shared += 1;
                    }
                }
            }
        }
    }

    println!("Air cells shared across X seams: {shared}");
    assert!(shared > 0, "no tunnel crosses a seam");
}

/// Test: a chunk carved alone matches the same chunk carved among neighbours.
#[test]
fn test_carving_is_local() {
    let (config, chunks) = world(3);
    let coord = ChunkCoord::new(2, 1);
    let alone = generate(coord, &config, WorldSeed::new(3)).unwrap();
    assert_eq!(alone.chunk.as_bytes(), chunks[&coord].0.as_bytes());
}

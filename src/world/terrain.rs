use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::infra::{BlockPos, WorldConfig};
use crate::world::{BlockType, VoxelQuery, WorldSource};

/// Seeded heightmap terrain with scattered surface features. Built once
/// per seed; the simulation treats it as immutable afterwards.
pub struct TerrainWorld {
    size: i32,
    max_height: i32,
    water_level: f32,
    heights: Vec<f32>,
    features: HashMap<BlockPos, BlockType>,
}

impl TerrainWorld {
    pub fn generate(config: &WorldConfig) -> Self {
        let size = config.size as i32;
        let base = config.max_height * 0.35;
        let amplitude = 4.0 + config.complexity * 12.0;

        let mut heights = Vec::with_capacity(((size + 1) * (size + 1)) as usize);
        for z in 0..=size {
            for x in 0..=size {
                let broad = value_noise(config.seed, x as f32 / 16.0, z as f32 / 16.0);
                let detail = value_noise(config.seed ^ 0x5EED, x as f32 / 6.0, z as f32 / 6.0);
                let height = base + amplitude * (broad - 0.5) + amplitude * 0.35 * (detail - 0.5);
                heights.push(height.clamp(2.0, config.max_height - 12.0));
            }
        }

        let mut world = Self {
            size,
            max_height: config.max_height as i32,
            water_level: base - 1.5,
            heights,
            features: HashMap::new(),
        };
        world.scatter_features(config.seed);

        debug!(
            size = size,
            features = world.features.len(),
            "terrain generated"
        );
        world
    }

    /// Featureless fallback used when generation misses its readiness
    /// ceiling: a level plane at the base height.
    pub fn flat(config: &WorldConfig) -> Self {
        let size = config.size as i32;
        let base = config.max_height * 0.35;
        Self {
            size,
            max_height: config.max_height as i32,
            water_level: 0.0,
            heights: vec![base; ((size + 1) * (size + 1)) as usize],
            features: HashMap::new(),
        }
    }

    /// Build on a worker thread; the receiver fires once the world is
    /// ready to be queried.
    pub fn generate_async(config: WorldConfig) -> mpsc::Receiver<TerrainWorld> {
        let (ready_tx, ready_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let world = TerrainWorld::generate(&config);
            let _ = ready_tx.send(world);
        });
        ready_rx
    }

    fn surface_height(&self, x: i32, z: i32) -> f32 {
        let cx = x.clamp(0, self.size);
        let cz = z.clamp(0, self.size);
        self.heights[(cz * (self.size + 1) + cx) as usize]
    }

    fn scatter_features(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed ^ 0xF0A7);
        let tree_count = ((self.size * self.size) / 256).max(2);

        for _ in 0..tree_count {
            let x = rng.random_range(2..self.size - 2);
            let z = rng.random_range(2..self.size - 2);
            let ground = self.surface_height(x, z);
            if ground <= self.water_level {
                continue;
            }
            self.plant_tree(BlockPos::new(x, ground.ceil() as i32, z), &mut rng);
        }

        let rock_count = tree_count / 2;
        for _ in 0..rock_count {
            let x = rng.random_range(1..self.size - 1);
            let z = rng.random_range(1..self.size - 1);
            let y = self.surface_height(x, z).ceil() as i32;
            self.features.insert(BlockPos::new(x, y, z), BlockType::Stone);
            if rng.random_range(0.0..1.0) < 0.5 {
                self.features
                    .insert(BlockPos::new(x, y + 1, z), BlockType::Stone);
            }
        }

        // Ice sheets and seagrass only make sense where there is water
        for z in 0..self.size {
            for x in 0..self.size {
                let ground = self.surface_height(x, z);
                if ground >= self.water_level {
                    continue;
                }
                let roll = rng.random_range(0.0..1.0);
                let surface_y = self.water_level.floor() as i32;
                if roll < 0.05 {
                    self.features
                        .insert(BlockPos::new(x, surface_y, z), BlockType::Ice);
                } else if roll < 0.12 {
                    let floor_y = ground.ceil() as i32;
                    self.features
                        .insert(BlockPos::new(x, floor_y, z), BlockType::Seagrass);
                }
            }
        }
    }

    fn plant_tree(&mut self, base: BlockPos, rng: &mut StdRng) {
        let trunk_height = rng.random_range(3..=5);
        for dy in 0..trunk_height {
            self.features
                .insert(base.offset(0, dy, 0), BlockType::Wood);
        }
        let crown = base.offset(0, trunk_height, 0);
        for dx in -1..=1 {
            for dz in -1..=1 {
                for dy in 0..=1 {
                    if dx == 0 && dz == 0 && dy == 0 {
                        continue;
                    }
                    self.features
                        .insert(crown.offset(dx, dy, dz), BlockType::Leaves);
                }
            }
        }
        self.features.insert(crown, BlockType::Leaves);
    }
}

impl VoxelQuery for TerrainWorld {
    fn block_type_at(&self, pos: BlockPos) -> BlockType {
        if pos.y < 0 {
            return BlockType::Stone;
        }
        if pos.y >= self.max_height || pos.x < 0 || pos.z < 0 || pos.x > self.size || pos.z > self.size
        {
            return BlockType::Air;
        }
        if let Some(block) = self.features.get(&pos) {
            return *block;
        }

        let surface = self.surface_height(pos.x, pos.z);
        let y = pos.y as f32;
        if y < surface - 4.0 {
            BlockType::Stone
        } else if y < surface - 1.0 {
            BlockType::Dirt
        } else if y < surface {
            if surface <= self.water_level + 1.0 {
                BlockType::Sand
            } else {
                BlockType::Grass
            }
        } else if y < self.water_level {
            BlockType::Water
        } else {
            BlockType::Air
        }
    }

    fn terrain_height_at(&self, x: f32, z: f32) -> f32 {
        // Bilinear sample; spawn clearance absorbs the mismatch between
        // this smooth height and the blocky column it overlays.
        let x0 = x.floor() as i32;
        let z0 = z.floor() as i32;
        let fx = x - x0 as f32;
        let fz = z - z0 as f32;

        let h00 = self.surface_height(x0, z0);
        let h10 = self.surface_height(x0 + 1, z0);
        let h01 = self.surface_height(x0, z0 + 1);
        let h11 = self.surface_height(x0 + 1, z0 + 1);

        let top = h00 + (h10 - h00) * fx;
        let bottom = h01 + (h11 - h01) * fx;
        top + (bottom - top) * fz
    }
}

/// Owns the current terrain and regenerates it only when asked: the first
/// episode, or an explicit curriculum change.
pub struct TerrainWorldSource {
    config: WorldConfig,
    ready_timeout: Duration,
    current: Option<Arc<TerrainWorld>>,
}

impl TerrainWorldSource {
    pub fn new(config: WorldConfig, ready_timeout: Duration) -> Self {
        Self {
            config,
            ready_timeout,
            current: None,
        }
    }
}

impl WorldSource for TerrainWorldSource {
    fn acquire(&mut self, episode: u64, regenerate: bool) -> Arc<dyn VoxelQuery> {
        if let Some(world) = &self.current
            && !regenerate
        {
            return Arc::clone(world) as Arc<dyn VoxelQuery>;
        }

        info!(episode, seed = self.config.seed, "generating terrain");
        let ready_rx = TerrainWorld::generate_async(self.config.clone());
        let world = match ready_rx.recv_timeout(self.ready_timeout) {
            Ok(world) => Arc::new(world),
            Err(_) => {
                warn!(
                    episode,
                    timeout_ms = self.ready_timeout.as_millis() as u64,
                    "terrain readiness ceiling hit, proceeding with flat fallback"
                );
                Arc::new(TerrainWorld::flat(&self.config))
            }
        };
        self.current = Some(Arc::clone(&world));
        world as Arc<dyn VoxelQuery>
    }
}

/// Deterministic lattice value noise in [0, 1].
fn value_noise(seed: u64, x: f32, z: f32) -> f32 {
    let x0 = x.floor() as i64;
    let z0 = z.floor() as i64;
    let fx = smooth(x - x0 as f32);
    let fz = smooth(z - z0 as f32);

    let v00 = lattice(seed, x0, z0);
    let v10 = lattice(seed, x0 + 1, z0);
    let v01 = lattice(seed, x0, z0 + 1);
    let v11 = lattice(seed, x0 + 1, z0 + 1);

    let top = v00 + (v10 - v00) * fx;
    let bottom = v01 + (v11 - v01) * fx;
    top + (bottom - top) * fz
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lattice(seed: u64, x: i64, z: i64) -> f32 {
    let mut hash = seed
        ^ (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (z as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    hash ^= hash >> 30;
    hash = hash.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    hash ^= hash >> 27;
    (hash >> 40) as f32 / (1u64 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let config = WorldConfig {
            size: 32.0,
            ..WorldConfig::default()
        };
        let a = TerrainWorld::generate(&config);
        let b = TerrainWorld::generate(&config);
        for z in 0..32 {
            for x in 0..32 {
                assert!((a.surface_height(x, z) - b.surface_height(x, z)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_columns_are_layered() {
        let config = WorldConfig {
            size: 32.0,
            ..WorldConfig::default()
        };
        let world = TerrainWorld::generate(&config);
        // Deep underground is always stone, high air is always empty
        assert_eq!(world.block_type_at(BlockPos::new(5, 0, 5)), BlockType::Stone);
        assert_eq!(world.block_type_at(BlockPos::new(5, 60, 5)), BlockType::Air);
    }

    #[test]
    fn test_source_reuses_terrain_unless_regenerating() {
        let config = WorldConfig {
            size: 16.0,
            ..WorldConfig::default()
        };
        let mut source = TerrainWorldSource::new(config, Duration::from_secs(5));
        let first = source.acquire(0, true);
        let second = source.acquire(1, false);
        assert!(Arc::ptr_eq(&first, &second));
        let third = source.acquire(2, true);
        assert!(!Arc::ptr_eq(&first, &third));
    }
}

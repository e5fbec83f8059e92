use std::collections::HashMap;

use crate::infra::BlockPos;
use crate::world::BlockType;

/// Fixed clearance added above the queried terrain height when choosing a
/// spawn altitude, absorbing small mismatches between asynchronously
/// generated geometry and the deterministic height function.
pub const SPAWN_CLEARANCE: f32 = 3.0;

/// Read-only spatial truth. The simulation core never mutates terrain;
/// every component consults the world exclusively through this trait.
pub trait VoxelQuery: Send + Sync {
    fn block_type_at(&self, pos: BlockPos) -> BlockType;

    /// Deterministic terrain surface height, used only for spawn placement.
    fn terrain_height_at(&self, x: f32, z: f32) -> f32;

    fn find_safe_height(&self, x: f32, z: f32) -> f32 {
        self.terrain_height_at(x, z) + SPAWN_CLEARANCE
    }

    fn is_solid_at(&self, pos: BlockPos) -> bool {
        self.block_type_at(pos).is_solid()
    }
}

/// Provides the world used by an episode. Acquisition at reset decides
/// whether to reuse the existing terrain or regenerate it; regenerating
/// every episode under a fixed seed is pure waste.
pub trait WorldSource: Send {
    fn acquire(
        &mut self,
        episode: u64,
        regenerate: bool,
    ) -> std::sync::Arc<dyn VoxelQuery>;
}

/// Uniform ground plane with optional block overrides. Backs unit tests
/// and non-training inspection setups.
pub struct FlatWorld {
    pub ground_height: i32,
    overrides: HashMap<BlockPos, BlockType>,
}

impl FlatWorld {
    pub fn new(ground_height: i32) -> Self {
        Self {
            ground_height,
            overrides: HashMap::new(),
        }
    }

    pub fn set_block(&mut self, pos: BlockPos, block: BlockType) {
        self.overrides.insert(pos, block);
    }

    /// Fill an axis-aligned box of cells, inclusive on both corners.
    pub fn fill(&mut self, from: BlockPos, to: BlockPos, block: BlockType) {
        for x in from.x..=to.x {
            for y in from.y..=to.y {
                for z in from.z..=to.z {
                    self.set_block(BlockPos::new(x, y, z), block);
                }
            }
        }
    }
}

impl VoxelQuery for FlatWorld {
    fn block_type_at(&self, pos: BlockPos) -> BlockType {
        if let Some(block) = self.overrides.get(&pos) {
            return *block;
        }
        if pos.y < self.ground_height {
            BlockType::Stone
        } else {
            BlockType::Air
        }
    }

    fn terrain_height_at(&self, _x: f32, _z: f32) -> f32 {
        self.ground_height as f32
    }
}

/// A source that always hands back the same world. Used by tests and by
/// debug tooling that pins terrain.
pub struct FixedWorldSource {
    world: std::sync::Arc<dyn VoxelQuery>,
}

impl FixedWorldSource {
    pub fn new(world: std::sync::Arc<dyn VoxelQuery>) -> Self {
        Self { world }
    }
}

impl WorldSource for FixedWorldSource {
    fn acquire(
        &mut self,
        _episode: u64,
        _regenerate: bool,
    ) -> std::sync::Arc<dyn VoxelQuery> {
        std::sync::Arc::clone(&self.world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_world_ground() {
        let world = FlatWorld::new(8);
        assert!(world.is_solid_at(BlockPos::new(0, 7, 0)));
        assert!(!world.is_solid_at(BlockPos::new(0, 8, 0)));
    }

    #[test]
    fn test_find_safe_height_adds_clearance() {
        let world = FlatWorld::new(8);
        assert!((world.find_safe_height(1.0, 1.0) - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_fill_overrides() {
        let mut world = FlatWorld::new(4);
        world.fill(
            BlockPos::new(2, 4, 2),
            BlockPos::new(3, 6, 3),
            BlockType::Wood,
        );
        assert_eq!(world.block_type_at(BlockPos::new(3, 5, 2)), BlockType::Wood);
        assert_eq!(world.block_type_at(BlockPos::new(4, 5, 2)), BlockType::Air);
    }
}

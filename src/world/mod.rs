mod block;
mod terrain;
mod voxel;

pub use block::BlockType;
pub use terrain::{TerrainWorld, TerrainWorldSource};
pub use voxel::{FixedWorldSource, FlatWorld, SPAWN_CLEARANCE, VoxelQuery, WorldSource};

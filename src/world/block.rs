/// Voxel block taxonomy. Ids are stable and match the wire contract:
/// 0 is always empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Air,
    Grass,
    Dirt,
    Stone,
    Sand,
    Wood,
    Leaves,
    Water,
    Seagrass,
    Ice,
}

impl BlockType {
    pub fn id(self) -> u8 {
        match self {
            BlockType::Air => 0,
            BlockType::Grass => 1,
            BlockType::Dirt => 2,
            BlockType::Stone => 3,
            BlockType::Sand => 4,
            BlockType::Wood => 5,
            BlockType::Leaves => 6,
            BlockType::Water => 7,
            BlockType::Seagrass => 8,
            BlockType::Ice => 9,
        }
    }

    pub fn from_id(id: u8) -> Self {
        match id {
            1 => BlockType::Grass,
            2 => BlockType::Dirt,
            3 => BlockType::Stone,
            4 => BlockType::Sand,
            5 => BlockType::Wood,
            6 => BlockType::Leaves,
            7 => BlockType::Water,
            8 => BlockType::Seagrass,
            9 => BlockType::Ice,
            _ => BlockType::Air,
        }
    }

    /// Whether a body collides with this block.
    pub fn is_solid(self) -> bool {
        !matches!(
            self,
            BlockType::Air | BlockType::Water | BlockType::Seagrass
        )
    }

    /// Whether this block stops a sight line. Leaves, liquid, seagrass and
    /// ice can all be seen through.
    pub fn blocks_sight(self) -> bool {
        !matches!(
            self,
            BlockType::Air
                | BlockType::Leaves
                | BlockType::Water
                | BlockType::Seagrass
                | BlockType::Ice
        )
    }

    /// Ray-channel encoding for terrain hits, kept strictly inside
    /// (0.1, 0.9) so it never collides with the agent (1.0) or
    /// nothing (0.0) codes.
    pub fn ray_channel_value(self) -> f32 {
        0.1 + 0.08 * self.id() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BlockType; 10] = [
        BlockType::Air,
        BlockType::Grass,
        BlockType::Dirt,
        BlockType::Stone,
        BlockType::Sand,
        BlockType::Wood,
        BlockType::Leaves,
        BlockType::Water,
        BlockType::Seagrass,
        BlockType::Ice,
    ];

    #[test]
    fn test_id_round_trip() {
        for block in ALL {
            assert_eq!(BlockType::from_id(block.id()), block);
        }
    }

    #[test]
    fn test_transparent_set() {
        assert!(!BlockType::Leaves.blocks_sight());
        assert!(!BlockType::Water.blocks_sight());
        assert!(!BlockType::Seagrass.blocks_sight());
        assert!(!BlockType::Ice.blocks_sight());
        assert!(BlockType::Stone.blocks_sight());
        // Leaves and ice still collide even though they are see-through
        assert!(BlockType::Leaves.is_solid());
        assert!(BlockType::Ice.is_solid());
    }

    #[test]
    fn test_ray_channel_values_bounded() {
        for block in ALL.iter().filter(|b| **b != BlockType::Air) {
            let value = block.ray_channel_value();
            assert!(value > 0.1 && value < 0.9, "{block:?} -> {value}");
        }
    }
}

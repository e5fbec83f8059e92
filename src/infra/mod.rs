mod config;
mod types;

pub use config::{
    CatchConfig, EpisodeConfig, ObservationConfig, PhysicsConfig, RewardConfig, SessionConfig,
    SimConfig, SpawnConfig, VisionConfig, WorldConfig,
};
pub use types::{AgentId, BlockPos, Role, wrap_angle, yaw_direction};

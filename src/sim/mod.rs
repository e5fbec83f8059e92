mod agent;
mod episode;
mod observation;
mod physics;
mod reward;
mod spawn;
mod vision;

pub use agent::{Agent, AgentArena, HideSeekState, MoveBlocked, TargetMemory};
pub use episode::{
    AgentAction, AgentPose, CatchRule, EpisodeCoordinator, EpisodeError, Phase,
    ProximityCatchRule, RenderSnapshot, StepOutput, TerminationCause,
};
pub use observation::{GameContext, ObservationEncoder, ObservationLayout};
pub use physics::{MoveIntent, PhysicsEngine};
pub use reward::{EpisodeOutcome, RewardContext, RewardSystem};
pub use spawn::{SpawnError, SpawnPlanner};
pub use vision::{PerceptionSnapshot, RayHit, RaySample, VisibleAgent, VisionSystem};

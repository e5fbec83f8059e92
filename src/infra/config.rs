use std::env;
use std::f32::consts::PI;
use std::time::Duration;

/// World extent and terrain settings.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// World edge length in blocks (x and z both span [0, size]).
    pub size: f32,
    /// Maximum build height in blocks.
    pub max_height: f32,
    /// Terrain seed; episodes with the same seed reuse the same terrain.
    pub seed: u64,
    /// Terrain roughness in [0, 1].
    pub complexity: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size: 64.0,
            max_height: 64.0,
            seed: 42,
            complexity: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Downward acceleration in blocks/s^2.
    pub gravity: f32,
    /// Fall speed cap in blocks/s.
    pub terminal_fall_speed: f32,
    /// Vertical speed set by a jump, in blocks/s.
    pub jump_speed: f32,
    /// Nominal agent bounding box.
    pub agent_width: f32,
    pub agent_height: f32,
    /// Collision box shrink factors applied to the nominal box.
    pub bbox_width_scale: f32,
    pub bbox_height_scale: f32,
    /// Probe depth below the feet used for ground detection.
    pub ground_probe: f32,
    /// Role top speeds in blocks/s.
    pub seeker_max_speed: f32,
    pub hider_max_speed: f32,
    /// Yaw and pitch rates in rad/s at full action deflection.
    pub turn_rate: f32,
    pub look_rate: f32,
    /// Physics sub-frames per trainer step, each sub_frame_dt long.
    pub sub_frames: u32,
    pub sub_frame_dt: f32,
}

impl PhysicsConfig {
    /// Simulated time covered by one trainer step.
    pub fn step_dt(&self) -> f32 {
        self.sub_frames as f32 * self.sub_frame_dt
    }

    pub fn max_speed(&self, role: crate::infra::Role) -> f32 {
        match role {
            crate::infra::Role::Seeker => self.seeker_max_speed,
            crate::infra::Role::Hider => self.hider_max_speed,
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 30.0,
            terminal_fall_speed: 50.0,
            jump_speed: 8.4,
            agent_width: 0.6,
            agent_height: 1.8,
            bbox_width_scale: 0.85,
            bbox_height_scale: 0.95,
            ground_probe: 0.1,
            seeker_max_speed: 5.0,
            hider_max_speed: 4.2,
            turn_rate: PI,
            look_rate: PI / 2.0,
            sub_frames: 5,
            sub_frame_dt: 1.0 / 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Maximum distance anything can be seen at, in blocks.
    pub range: f32,
    /// Full horizontal field of view in radians.
    pub horizontal_fov: f32,
    /// Eye height above the feet, used as every ray origin.
    pub eye_height: f32,
    /// Chest height above the feet, used as the aim point on targets.
    pub chest_height: f32,
    /// Perception ray grid dimensions.
    pub ray_rows: usize,
    pub ray_cols: usize,
    /// Cosine of the bearing tolerance for attributing an agent to a ray.
    pub agent_ray_cos_tolerance: f32,
}

impl VisionConfig {
    /// Vertical FOV is derived, capped so agents cannot scan through
    /// floors and ceilings.
    pub fn vertical_fov(&self) -> f32 {
        (0.6 * self.horizontal_fov).min(72.0_f32.to_radians())
    }

    pub fn ray_count(&self) -> usize {
        self.ray_rows * self.ray_cols
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            range: 32.0,
            horizontal_fov: 108.0_f32.to_radians(),
            eye_height: 1.6,
            chest_height: 0.85,
            ray_rows: 8,
            ray_cols: 8,
            agent_ray_cos_tolerance: 10.0_f32.to_radians().cos(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservationConfig {
    /// Distance from a world edge at which the boundary signal saturates.
    pub boundary_danger: f32,
    /// Wider zone in which the signal ramps back down to its resting value.
    pub boundary_warning: f32,
    /// Exponential decay time constant for target-memory recency, seconds.
    pub memory_decay_tau: f32,
    /// Remaining seeking seconds below which the urgency flag raises.
    pub urgency_secs: f32,
    /// Threat distance below which a hider's danger channel saturates.
    pub hider_danger_radius: f32,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            boundary_danger: 2.0,
            boundary_warning: 8.0,
            memory_decay_tau: 5.0,
            urgency_secs: 30.0,
            hider_danger_radius: 8.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Constant per-step penalty applied to every live agent.
    pub time_penalty: f32,
    /// Seeker: per visible hider, per step.
    pub seeker_visible_bonus: f32,
    /// Seeker: proximity bonus toward the nearest visible hider, at
    /// contact; scales linearly to zero at seeker_proximity_cutoff.
    pub seeker_proximity_max: f32,
    pub seeker_proximity_cutoff: f32,
    /// Hider: per-step bonus while unseen, equal-magnitude penalty while
    /// seen by at least one seeker.
    pub hider_hidden_bonus: f32,
    /// Hider: distance-to-nearest-seeker bonus, zero below the threshold,
    /// growing linearly to hider_distance_max at the cutoff.
    pub hider_distance_max: f32,
    pub hider_distance_threshold: f32,
    pub hider_distance_cutoff: f32,
    /// Terminal: seeker bonus per caught hider.
    pub catch_bonus: f32,
    /// Terminal: extra seeker bonus when every hider was caught.
    pub all_caught_bonus: f32,
    /// Terminal: seeker penalty when nothing was caught (negative).
    pub caught_none_penalty: f32,
    /// Terminal: hider bonus for surviving the episode.
    pub survival_bonus: f32,
    /// Terminal: hider penalty for being caught (negative).
    pub caught_penalty: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            time_penalty: -0.01,
            seeker_visible_bonus: 0.0005,
            seeker_proximity_max: 0.002,
            seeker_proximity_cutoff: 24.0,
            hider_hidden_bonus: 0.001,
            hider_distance_max: 0.002,
            hider_distance_threshold: 8.0,
            hider_distance_cutoff: 32.0,
            catch_bonus: 50.0,
            all_caught_bonus: 100.0,
            caught_none_penalty: -30.0,
            survival_bonus: 50.0,
            caught_penalty: -50.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Minimum distance from any world edge.
    pub edge_buffer: f32,
    /// Minimum distance between any two placed agents.
    pub min_agent_distance: f32,
    /// Minimum distance between a candidate and the nearest agent of the
    /// opposing role; repaired by push-back, not re-randomized.
    pub min_cross_role_distance: f32,
    /// Candidate attempts per agent before spawning is a hard failure.
    pub max_attempts: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            edge_buffer: 4.0,
            min_agent_distance: 8.0,
            min_cross_role_distance: 16.0,
            max_attempts: 64,
        }
    }
}

/// Reference contact rule parameters. The authoritative catch rule lives
/// in the game-manager collaborator; these values back the default
/// implementation shipped for self-contained runs.
#[derive(Debug, Clone)]
pub struct CatchConfig {
    /// Qualifying seeker-to-hider distance in blocks.
    pub range: f32,
    /// Continuous qualifying time before the hider flips to found.
    pub dwell_secs: f32,
    /// Whether qualifying proximity also requires line of sight.
    pub require_los: bool,
}

impl Default for CatchConfig {
    fn default() -> Self {
        Self {
            range: 2.5,
            dwell_secs: 0.5,
            require_los: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeConfig {
    /// Hiders spawned per episode (one seeker always).
    pub num_hiders: usize,
    /// Countdown phase length; seekers are frozen for its duration.
    pub countdown_secs: f32,
    /// Seeking phase time limit.
    pub seeking_limit_secs: f32,
    /// Per-episode block place/remove budget. Zero disables both.
    pub interaction_limit: u32,
}

impl EpisodeConfig {
    /// Trainer steps available during the seeking phase.
    pub fn seeking_step_limit(&self, physics: &PhysicsConfig) -> u32 {
        (self.seeking_limit_secs / physics.step_dt()).round() as u32
    }
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            num_hiders: 2,
            countdown_secs: 3.0,
            seeking_limit_secs: 120.0,
            interaction_limit: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Listen address for the trainer connection.
    pub bind: String,
    /// Ceiling on one trainer round trip. Exceeding it is fatal.
    pub step_timeout: Duration,
    /// Ceiling on waiting for terrain readiness at reset.
    pub world_ready_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7781".to_string(),
            step_timeout: Duration::from_secs(10),
            world_ready_timeout: Duration::from_secs(5),
        }
    }
}

/// Aggregate of every tunable in the simulation core.
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub world: WorldConfig,
    pub physics: PhysicsConfig,
    pub vision: VisionConfig,
    pub observation: ObservationConfig,
    pub reward: RewardConfig,
    pub spawn: SpawnConfig,
    pub catch: CatchConfig,
    pub episode: EpisodeConfig,
    pub session: SessionConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

impl SimConfig {
    /// Defaults overridden by VOXSEEK_* environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_parse::<f32>("VOXSEEK_WORLD_SIZE") {
            config.world.size = size;
        }
        if let Some(seed) = env_parse::<u64>("VOXSEEK_SEED") {
            config.world.seed = seed;
        }
        if let Some(complexity) = env_parse::<f32>("VOXSEEK_COMPLEXITY") {
            config.world.complexity = complexity.clamp(0.0, 1.0);
        }
        if let Some(hiders) = env_parse::<usize>("VOXSEEK_HIDERS") {
            config.episode.num_hiders = hiders.max(1);
        }
        if let Some(limit) = env_parse::<f32>("VOXSEEK_SEEK_LIMIT_SECS") {
            config.episode.seeking_limit_secs = limit;
        }
        if let Ok(bind) = env::var("VOXSEEK_BIND") {
            config.session.bind = bind;
        }
        if let Some(secs) = env_parse::<u64>("VOXSEEK_STEP_TIMEOUT_SECS") {
            config.session.step_timeout = Duration::from_secs(secs);
        }

        config
    }
}

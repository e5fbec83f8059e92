use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::infra::{AgentId, CatchConfig, Role, SimConfig, VisionConfig, wrap_angle};
use crate::sim::observation::GameContext;
use crate::sim::vision::has_line_of_sight;
use crate::sim::{
    Agent, AgentArena, EpisodeOutcome, HideSeekState, MoveIntent, ObservationEncoder,
    PerceptionSnapshot, PhysicsEngine, RewardContext, RewardSystem, SpawnError, SpawnPlanner,
    VisionSystem,
};
use crate::world::{VoxelQuery, WorldSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Countdown,
    Seeking,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    TimeLimit,
    AllFound,
    ManualStop,
}

/// One agent's action tuple for a step: four continuous channels plus
/// three boolean thresholds. Place/remove stay inert while the episode's
/// interaction limit is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentAction {
    pub forward: f32,
    pub strafe: f32,
    pub rotate: f32,
    pub look: f32,
    pub jump: bool,
    pub place_block: bool,
    pub remove_block: bool,
}

impl AgentAction {
    /// Decode the raw 7-float wire layout; continuous channels clamped,
    /// trailing channels thresholded at 0.5.
    pub fn from_array(raw: [f32; 7]) -> Self {
        Self {
            forward: raw[0].clamp(-1.0, 1.0),
            strafe: raw[1].clamp(-1.0, 1.0),
            rotate: raw[2].clamp(-1.0, 1.0),
            look: raw[3].clamp(-1.0, 1.0),
            jump: raw[4] > 0.5,
            place_block: raw[5] > 0.5,
            remove_block: raw[6] > 0.5,
        }
    }
}

/// Per-step response handed back to the trainer.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub observations: BTreeMap<AgentId, Vec<f32>>,
    pub rewards: BTreeMap<AgentId, f32>,
    pub dones: BTreeMap<AgentId, bool>,
    pub episode_done: bool,
}

/// The contact rule that flips a hider to found belongs to the
/// game-manager collaborator; the coordinator consumes it as a
/// precondition input each step.
pub trait CatchRule: Send {
    /// Returns the hiders newly caught this step.
    fn evaluate(&mut self, world: &dyn VoxelQuery, agents: &AgentArena, dt: f32) -> Vec<AgentId>;
    fn reset(&mut self);
}

/// Reference implementation: continuous proximity (optionally with line
/// of sight) maintained for a dwell threshold.
pub struct ProximityCatchRule {
    config: CatchConfig,
    vision: VisionConfig,
    dwell: HashMap<AgentId, f32>,
}

impl ProximityCatchRule {
    pub fn new(config: CatchConfig, vision: VisionConfig) -> Self {
        Self {
            config,
            vision,
            dwell: HashMap::new(),
        }
    }
}

impl CatchRule for ProximityCatchRule {
    fn evaluate(&mut self, world: &dyn VoxelQuery, agents: &AgentArena, dt: f32) -> Vec<AgentId> {
        let mut caught = Vec::new();
        for hider in agents.iter() {
            if hider.role != Role::Hider || !hider.is_live() {
                continue;
            }
            let qualifying = agents
                .iter()
                .filter(|seeker| seeker.role == Role::Seeker && seeker.is_live())
                .any(|seeker| {
                    let distance = (seeker.position - hider.position).length();
                    if distance >= self.config.range {
                        return false;
                    }
                    !self.config.require_los
                        || has_line_of_sight(
                            world,
                            seeker.eye_position(self.vision.eye_height),
                            hider.chest_position(self.vision.chest_height),
                        )
                });

            let dwell = self.dwell.entry(hider.id).or_insert(0.0);
            if qualifying {
                *dwell += dt;
                if *dwell >= self.config.dwell_secs {
                    caught.push(hider.id);
                }
            } else {
                *dwell = 0.0;
            }
        }
        caught
    }

    fn reset(&mut self) {
        self.dwell.clear();
    }
}

#[derive(Debug)]
pub enum EpisodeError {
    Spawn(SpawnError),
    /// Step called while no episode is running.
    NotRunning,
}

impl fmt::Display for EpisodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpisodeError::Spawn(inner) => write!(formatter, "spawn failed: {inner}"),
            EpisodeError::NotRunning => write!(formatter, "no episode is running"),
        }
    }
}

impl Error for EpisodeError {}

impl From<SpawnError> for EpisodeError {
    fn from(inner: SpawnError) -> Self {
        EpisodeError::Spawn(inner)
    }
}

/// Current pose of one agent, exported for the rendering collaborator.
#[derive(Debug, Clone, Copy)]
pub struct AgentPose {
    pub id: AgentId,
    pub role: Role,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub found: bool,
}

/// Read-only visualization bundle: agent poses plus perception ray
/// segments. The core accepts nothing back from rendering except the
/// debug spawn/remove calls below.
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    pub poses: Vec<AgentPose>,
    pub rays: Vec<(Vec3, Vec3)>,
}

/// Drives the synchronous reset/step protocol: physics sub-frames, phase
/// machine, the write-once perception cache, rewards and observations
/// from that same cache, and termination bookkeeping.
pub struct EpisodeCoordinator {
    config: SimConfig,
    world_source: Box<dyn WorldSource>,
    catch_rule: Box<dyn CatchRule>,
    world: Option<Arc<dyn VoxelQuery>>,
    agents: AgentArena,
    physics: PhysicsEngine,
    vision: VisionSystem,
    encoder: ObservationEncoder,
    rewards: RewardSystem,
    spawner: SpawnPlanner,
    phase: Phase,
    episode_index: u64,
    /// Steps are counted and time derived by multiplication, so phase
    /// boundaries land exactly where the step arithmetic says they do
    /// instead of drifting with accumulated float error.
    sim_steps: u32,
    phase_steps: u32,
    perception_cache: HashMap<AgentId, PerceptionSnapshot>,
    stop_requested: bool,
    termination: Option<TerminationCause>,
}

impl EpisodeCoordinator {
    pub fn new(
        config: SimConfig,
        world_source: Box<dyn WorldSource>,
        catch_rule: Box<dyn CatchRule>,
    ) -> Self {
        let physics = PhysicsEngine::new(config.physics.clone());
        let vision = VisionSystem::new(config.vision.clone(), None);
        let encoder = ObservationEncoder::new(&config);
        let rewards = RewardSystem::new(config.reward.clone());
        let spawner = SpawnPlanner::new(config.spawn.clone(), config.world.seed);
        Self {
            config,
            world_source,
            catch_rule,
            world: None,
            agents: AgentArena::new(),
            physics,
            vision,
            encoder,
            rewards,
            spawner,
            phase: Phase::Waiting,
            episode_index: 0,
            sim_steps: 0,
            phase_steps: 0,
            perception_cache: HashMap::new(),
            stop_requested: false,
            termination: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Simulated seconds since reset.
    pub fn sim_time(&self) -> f32 {
        self.sim_steps as f32 * self.config.physics.step_dt()
    }

    fn phase_time(&self) -> f32 {
        self.phase_steps as f32 * self.config.physics.step_dt()
    }

    pub fn termination(&self) -> Option<TerminationCause> {
        self.termination
    }

    pub fn observation_size(&self) -> usize {
        self.encoder.observation_size()
    }

    pub fn found_count(&self) -> usize {
        self.agents.found_count()
    }

    pub fn total_hiders(&self) -> usize {
        self.agents.count_role(Role::Hider)
    }

    /// End any running episode, (re)acquire the world, respawn everyone
    /// and enter the countdown (or seeking directly when the countdown is
    /// zero). Returns the initial observation per agent with zero reward
    /// implied.
    pub fn reset(
        &mut self,
        episode: u64,
        regenerate_world: bool,
    ) -> Result<BTreeMap<AgentId, Vec<f32>>, EpisodeError> {
        if matches!(self.phase, Phase::Countdown | Phase::Seeking) {
            info!(episode, "reset is interrupting a running episode");
        }

        let regenerate = self.world.is_none() || regenerate_world;
        let world = self.world_source.acquire(episode, regenerate);
        self.vision.set_world(Arc::clone(&world));
        self.world = Some(world);

        self.agents.clear();
        self.perception_cache.clear();
        self.catch_rule.reset();
        self.stop_requested = false;
        self.termination = None;
        self.episode_index = episode;
        self.sim_steps = 0;

        let mut roles = vec![Role::Seeker];
        roles.extend(std::iter::repeat_n(Role::Hider, self.config.episode.num_hiders));
        let world_ref = Arc::clone(self.world.as_ref().expect("world acquired above"));
        let positions =
            self.spawner
                .place_agents(world_ref.as_ref(), &self.config.world, &roles)?;

        let center = self.config.world.size / 2.0;
        for (role, position) in roles.iter().zip(positions) {
            let id = self.agents.spawn(*role, position);
            let agent = self.agents.get_mut(id).expect("just spawned");
            agent.yaw = (center - position.x).atan2(center - position.z);
        }

        if self.config.episode.countdown_secs > 0.0 {
            self.enter_phase(Phase::Countdown);
        } else {
            self.enter_phase(Phase::Seeking);
        }
        let roster: Vec<AgentId> = self.agents.ids().collect();
        self.refresh_perception(&roster);

        info!(
            episode,
            agents = self.agents.len(),
            phase = ?self.phase,
            "episode reset"
        );
        Ok(self.encode_roster(&roster))
    }

    /// One synchronous trainer step. Actions are held constant across all
    /// physics sub-frames; perception is computed exactly once per agent
    /// and shared by the reward and observation passes.
    pub fn step(
        &mut self,
        actions: &BTreeMap<AgentId, AgentAction>,
    ) -> Result<StepOutput, EpisodeError> {
        if !matches!(self.phase, Phase::Countdown | Phase::Seeking) {
            return Err(EpisodeError::NotRunning);
        }
        if self.stop_requested {
            return Ok(self.finish(TerminationCause::ManualStop));
        }

        let step_dt = self.config.physics.step_dt();
        let world = Arc::clone(self.world.as_ref().expect("running episode has a world"));
        let roster: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|agent| agent.is_live())
            .map(|agent| agent.id)
            .collect();

        // 1. Apply actions: orientation and interaction once per step,
        //    movement intent held for the sub-frames
        for agent in self.agents.iter_mut() {
            agent.begin_step();
        }
        let mut intents: BTreeMap<AgentId, MoveIntent> = BTreeMap::new();
        for (&id, action) in actions {
            let Some(agent) = self.agents.get_mut(id) else {
                warn!(agent = %id, "action for unknown agent ignored");
                continue;
            };
            if !agent.is_live() {
                continue;
            }
            agent.yaw = wrap_angle(agent.yaw + action.rotate * self.config.physics.turn_rate * step_dt);
            agent.pitch = (agent.pitch + action.look * self.config.physics.look_rate * step_dt)
                .clamp(-1.2, 1.2);

            let limit = self.config.episode.interaction_limit;
            if action.place_block && agent.blocks_placed < limit {
                agent.blocks_placed += 1;
                debug!(agent = %id, "block placement requested");
            }
            if action.remove_block && agent.blocks_removed < limit {
                agent.blocks_removed += 1;
                debug!(agent = %id, "block removal requested");
            }

            intents.insert(
                id,
                MoveIntent {
                    forward: action.forward,
                    strafe: action.strafe,
                    jump: action.jump,
                },
            );
        }

        // 2. Fixed sub-frame count keeps integration stable at a coarse
        //    decision rate
        for _ in 0..self.config.physics.sub_frames {
            for &id in &roster {
                let intent = intents.get(&id).copied().unwrap_or_default();
                let agent = self.agents.get_mut(id).expect("roster id");
                self.physics
                    .sub_step(world.as_ref(), &self.config.world, agent, &intent);
            }
        }
        for agent in self.agents.iter_mut() {
            agent.derive_velocity(step_dt);
        }
        self.sim_steps += 1;
        self.phase_steps += 1;

        // 3. Phase machine, then the externally-owned catch rule
        if self.phase == Phase::Countdown && self.phase_time() >= self.config.episode.countdown_secs
        {
            self.enter_phase(Phase::Seeking);
        }
        let mut newly_caught: Vec<AgentId> = Vec::new();
        if self.phase == Phase::Seeking {
            newly_caught = self
                .catch_rule
                .evaluate(world.as_ref(), &self.agents, step_dt);
            for &id in &newly_caught {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.mark_found();
                    info!(
                        agent = %id,
                        found = self.agents.found_count(),
                        "hider caught"
                    );
                }
            }
        }

        // 4. One perception snapshot per agent in this step's roster
        self.refresh_perception(&roster);

        // Hider sub-state and survival bookkeeping from the same data the
        // rewards will use
        let seen_by_seeker = self.compute_seen_map(&roster);
        let seeking = self.phase == Phase::Seeking;
        for &id in &roster {
            let seen = seen_by_seeker.get(&id).copied().unwrap_or(false);
            let agent = self.agents.get_mut(id).expect("roster id");
            if agent.role == Role::Hider && agent.is_live() && seeking {
                agent.state = if seen {
                    HideSeekState::Fleeing
                } else {
                    HideSeekState::Hidden
                };
                agent.steps_survived += 1;
            }
        }

        // 5. Rewards from the cached snapshots
        let mut rewards: BTreeMap<AgentId, f32> = BTreeMap::new();
        for &id in &roster {
            let agent = self.agents.get(id).expect("roster id");
            if agent.is_found() {
                // Caught this step: frozen, zero shaping, terminal
                // adjustment below
                rewards.insert(id, 0.0);
                continue;
            }
            let context = RewardContext {
                seeking,
                seen_by_seeker: seen_by_seeker.get(&id).copied().unwrap_or(false),
                nearest_seeker_distance: self.nearest_seeker_distance(agent),
            };
            let perception = self
                .perception_cache
                .get(&id)
                .expect("perception cached for roster");
            rewards.insert(id, self.rewards.step_reward(agent, perception, &context));
        }

        // A hider's episode ends the step it is caught: credit its
        // terminal penalty now, exactly once
        let interim_outcome = EpisodeOutcome {
            hiders_caught: self.agents.found_count(),
            total_hiders: self.total_hiders(),
        };
        for &id in &newly_caught {
            let agent = self.agents.get(id).expect("roster id");
            let terminal = self.rewards.terminal_reward(agent, &interim_outcome);
            *rewards.get_mut(&id).expect("rewarded above") += terminal;
        }

        // 6. Termination
        let cause = if self.agents.found_count() == self.total_hiders() {
            Some(TerminationCause::AllFound)
        } else if seeking && self.phase_time() >= self.config.episode.seeking_limit_secs {
            Some(TerminationCause::TimeLimit)
        } else {
            None
        };

        // 7. One-shot terminal adjustment for everyone still live
        let episode_done = cause.is_some();
        if let Some(cause) = cause {
            let outcome = EpisodeOutcome {
                hiders_caught: self.agents.found_count(),
                total_hiders: self.total_hiders(),
            };
            for &id in &roster {
                let agent = self.agents.get(id).expect("roster id");
                if agent.is_live() {
                    *rewards.get_mut(&id).expect("rewarded above") +=
                        self.rewards.terminal_reward(agent, &outcome);
                }
            }
            self.termination = Some(cause);
            self.enter_phase(Phase::GameOver);
            info!(
                episode = self.episode_index,
                cause = ?cause,
                found = self.agents.found_count(),
                sim_time = self.sim_time(),
                "episode finished"
            );
        }

        // 8. Observations from the very same snapshots
        let observations = self.encode_roster(&roster);
        let dones: BTreeMap<AgentId, bool> = roster
            .iter()
            .map(|&id| {
                let found = self
                    .agents
                    .get(id)
                    .map(|agent| agent.is_found())
                    .unwrap_or(false);
                (id, episode_done || found)
            })
            .collect();

        Ok(StepOutput {
            observations,
            rewards,
            dones,
            episode_done,
        })
    }

    /// Honored between steps: the next step call returns this terminal
    /// payload instead of simulating.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Immediate manual termination with a well-formed terminal payload,
    /// used by the session when the trainer says stop.
    pub fn stop_now(&mut self) -> Option<StepOutput> {
        if matches!(self.phase, Phase::Countdown | Phase::Seeking) {
            Some(self.finish(TerminationCause::ManualStop))
        } else {
            None
        }
    }

    fn finish(&mut self, cause: TerminationCause) -> StepOutput {
        let roster: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|agent| agent.is_live())
            .map(|agent| agent.id)
            .collect();
        self.refresh_perception(&roster);

        let outcome = EpisodeOutcome {
            hiders_caught: self.agents.found_count(),
            total_hiders: self.total_hiders(),
        };
        let mut rewards = BTreeMap::new();
        let mut dones = BTreeMap::new();
        for &id in &roster {
            let agent = self.agents.get(id).expect("roster id");
            rewards.insert(id, self.rewards.terminal_reward(agent, &outcome));
            dones.insert(id, true);
        }
        let observations = self.encode_roster(&roster);

        self.termination = Some(cause);
        self.enter_phase(Phase::GameOver);
        info!(
            episode = self.episode_index,
            cause = ?cause,
            "episode terminated manually"
        );

        StepOutput {
            observations,
            rewards,
            dones,
            episode_done: true,
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_steps = 0;
        match phase {
            Phase::Waiting => {}
            Phase::Countdown => {
                for agent in self.agents.iter_mut() {
                    match agent.role {
                        // Seekers stand frozen while hiders scatter
                        Role::Seeker => {
                            agent.physics_enabled = false;
                            agent.state = HideSeekState::Countdown;
                        }
                        Role::Hider => {
                            agent.physics_enabled = true;
                            agent.state = HideSeekState::Fleeing;
                        }
                    }
                }
                info!("countdown phase");
            }
            Phase::Seeking => {
                for agent in self.agents.iter_mut() {
                    if agent.is_live() {
                        agent.physics_enabled = true;
                        agent.state = match agent.role {
                            Role::Seeker => HideSeekState::Seeking,
                            Role::Hider => HideSeekState::Hidden,
                        };
                    }
                }
                info!("seeking phase");
            }
            Phase::GameOver => {
                for agent in self.agents.iter_mut() {
                    if agent.is_live() {
                        agent.state = HideSeekState::GameOver;
                    }
                }
            }
        }
    }

    /// Invalidate and rebuild the per-agent perception cache: write once
    /// per step, read by reward and observation alike.
    fn refresh_perception(&mut self, roster: &[AgentId]) {
        self.perception_cache.clear();
        for &id in roster {
            let agent = self.agents.get(id).expect("roster id");
            let snapshot = self.vision.vision_data(agent, &self.agents);
            self.perception_cache.insert(id, snapshot);
        }
    }

    fn compute_seen_map(&mut self, roster: &[AgentId]) -> BTreeMap<AgentId, bool> {
        let mut seen = BTreeMap::new();
        for &id in roster {
            let agent = self.agents.get(id).expect("roster id");
            if agent.role == Role::Hider && agent.is_live() {
                let visible = self.vision.is_visible_to_any(agent, &self.agents);
                seen.insert(id, visible);
            }
        }
        seen
    }

    fn nearest_seeker_distance(&self, agent: &Agent) -> Option<f32> {
        if agent.role != Role::Hider {
            return None;
        }
        self.agents
            .iter()
            .filter(|other| other.role == Role::Seeker && other.is_live())
            .map(|seeker| (seeker.position - agent.position).length())
            .min_by(f32::total_cmp)
    }

    fn game_context(&self) -> GameContext {
        let limit = self.config.episode.seeking_limit_secs;
        let remaining = match self.phase {
            Phase::Seeking => (limit - self.phase_time()).max(0.0),
            Phase::GameOver => 0.0,
            _ => limit,
        };
        GameContext {
            now: self.sim_time(),
            seeking: self.phase == Phase::Seeking,
            remaining_secs: remaining,
            time_remaining_frac: remaining / limit,
            hiders_found: self.agents.found_count(),
            total_hiders: self.total_hiders(),
            interaction_limit: self.config.episode.interaction_limit,
        }
    }

    fn encode_roster(&mut self, roster: &[AgentId]) -> BTreeMap<AgentId, Vec<f32>> {
        let context = self.game_context();
        let world = Arc::clone(self.world.as_ref().expect("world acquired"));

        // Memory update first, then the pure encode
        for &id in roster {
            let perception = self.perception_cache.get(&id).expect("perception cached");
            let agent = self.agents.get_mut(id).expect("roster id");
            ObservationEncoder::update_target_memory(agent, perception, context.now);
        }

        roster
            .iter()
            .map(|&id| {
                let agent = self.agents.get(id).expect("roster id");
                let perception = self.perception_cache.get(&id).expect("perception cached");
                (
                    id,
                    self.encoder.encode(agent, &context, perception, world.as_ref()),
                )
            })
            .collect()
    }

    /// Visualization export: poses plus the cached perception rays as
    /// world-space segments.
    pub fn render_snapshot(&self) -> RenderSnapshot {
        let eye = self.config.vision.eye_height;
        let mut snapshot = RenderSnapshot::default();
        for agent in self.agents.iter() {
            snapshot.poses.push(AgentPose {
                id: agent.id,
                role: agent.role,
                position: agent.position,
                yaw: agent.yaw,
                pitch: agent.pitch,
                found: agent.is_found(),
            });
            if let Some(perception) = self.perception_cache.get(&agent.id) {
                let origin = agent.eye_position(eye);
                for ray in &perception.rays {
                    snapshot
                        .rays
                        .push((origin, origin + ray.direction * ray.distance));
                }
            }
        }
        snapshot
    }

    /// Debug hooks for non-training inspection tools.
    pub fn debug_spawn_agent(&mut self, role: Role, position: Vec3) -> AgentId {
        let id = self.agents.spawn(role, position);
        debug!(agent = %id, role = role.as_str(), "debug agent spawned");
        id
    }

    pub fn debug_agent_pose(&self, id: AgentId) -> Option<AgentPose> {
        self.agents.get(id).map(|agent| AgentPose {
            id: agent.id,
            role: agent.role,
            position: agent.position,
            yaw: agent.yaw,
            pitch: agent.pitch,
            found: agent.is_found(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::RewardConfig;
    use crate::world::{FixedWorldSource, FlatWorld};

    /// Catch rule scripted per test: catches the given hider on the nth
    /// evaluate call.
    struct ScriptedCatch {
        target: Option<AgentId>,
        on_call: u32,
        calls: u32,
    }

    impl ScriptedCatch {
        fn never() -> Self {
            Self {
                target: None,
                on_call: 0,
                calls: 0,
            }
        }

        fn catch_on(target: AgentId, on_call: u32) -> Self {
            Self {
                target: Some(target),
                on_call,
                calls: 0,
            }
        }
    }

    impl CatchRule for ScriptedCatch {
        fn evaluate(
            &mut self,
            _world: &dyn VoxelQuery,
            agents: &AgentArena,
            _dt: f32,
        ) -> Vec<AgentId> {
            self.calls += 1;
            match self.target {
                Some(target)
                    if self.calls == self.on_call
                        && agents.get(target).is_some_and(|a| a.is_live()) =>
                {
                    vec![target]
                }
                _ => Vec::new(),
            }
        }

        fn reset(&mut self) {
            self.calls = 0;
        }
    }

    /// Catches every live hider on the first call.
    struct CatchEveryone;

    impl CatchRule for CatchEveryone {
        fn evaluate(
            &mut self,
            _world: &dyn VoxelQuery,
            agents: &AgentArena,
            _dt: f32,
        ) -> Vec<AgentId> {
            agents
                .iter()
                .filter(|agent| agent.role == Role::Hider && agent.is_live())
                .map(|agent| agent.id)
                .collect()
        }

        fn reset(&mut self) {}
    }

    fn test_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.world.size = 32.0;
        config.episode.num_hiders = 2;
        config
    }

    fn coordinator(config: SimConfig, catch_rule: Box<dyn CatchRule>) -> EpisodeCoordinator {
        let source = FixedWorldSource::new(Arc::new(FlatWorld::new(8)));
        EpisodeCoordinator::new(config, Box::new(source), catch_rule)
    }

    fn no_actions() -> BTreeMap<AgentId, AgentAction> {
        BTreeMap::new()
    }

    fn blind_config() -> SimConfig {
        // Vision range too short to ever see anything: isolates the
        // reward arithmetic from agent placement
        let mut config = test_config();
        config.vision.range = 0.1;
        config
    }

    #[test]
    fn test_reset_produces_an_observation_per_agent() {
        let mut coordinator = coordinator(test_config(), Box::new(ScriptedCatch::never()));
        let observations = coordinator.reset(0, true).unwrap();
        assert_eq!(observations.len(), 3);
        for obs in observations.values() {
            assert_eq!(obs.len(), coordinator.observation_size());
        }
        assert_eq!(coordinator.phase(), Phase::Countdown);
        assert_eq!(coordinator.total_hiders(), 2);
        assert_eq!(coordinator.found_count(), 0);
    }

    #[test]
    fn test_step_without_reset_is_an_error() {
        let mut coordinator = coordinator(test_config(), Box::new(ScriptedCatch::never()));
        assert!(matches!(
            coordinator.step(&no_actions()),
            Err(EpisodeError::NotRunning)
        ));
    }

    // End-to-end scenario A: world 32, seeker frozen through a 3-second
    // countdown, two free hiders; the first seeking step with nothing
    // visible pays exactly the time penalty.
    #[test]
    fn test_scenario_a_first_seeking_step_is_time_penalty_only() {
        let config = blind_config();
        let countdown_steps =
            (config.episode.countdown_secs / config.physics.step_dt()).round() as usize;
        let mut coordinator = coordinator(config.clone(), Box::new(ScriptedCatch::never()));
        coordinator.reset(0, true).unwrap();

        let seeker_id = AgentId(0);
        let seeker_start = coordinator.agents.get(seeker_id).unwrap().position;

        // Drive hiders around during the countdown; the seeker stays put
        // and earns nothing
        let mut actions = BTreeMap::new();
        for id in [AgentId(1), AgentId(2)] {
            actions.insert(
                id,
                AgentAction {
                    forward: 1.0,
                    ..AgentAction::default()
                },
            );
        }
        actions.insert(
            seeker_id,
            AgentAction {
                forward: 1.0,
                ..AgentAction::default()
            },
        );

        for _ in 0..countdown_steps - 1 {
            let output = coordinator.step(&actions).unwrap();
            assert_eq!(coordinator.phase(), Phase::Countdown);
            assert!((output.rewards[&seeker_id]).abs() < 1e-9);
        }
        let frozen_position = coordinator.agents.get(seeker_id).unwrap().position;
        assert!((frozen_position - seeker_start).length() < 1e-6);

        // This step crosses into seeking; rewards are live from here
        let output = coordinator.step(&no_actions()).unwrap();
        assert_eq!(coordinator.phase(), Phase::Seeking);
        let expected = RewardConfig::default().time_penalty;
        assert!(
            (output.rewards[&seeker_id] - expected).abs() < 1e-7,
            "got {}",
            output.rewards[&seeker_id]
        );
    }

    // End-to-end scenario B: a hider seen for 60 consecutive seeking steps
    // and then caught accumulates exactly
    // 60 * (seen penalty + time penalty) + caught penalty.
    #[test]
    fn test_scenario_b_caught_hider_reward_formula() {
        let mut config = test_config();
        config.episode.countdown_secs = 0.0;
        let hider_id = AgentId(1);
        let mut coordinator =
            coordinator(config.clone(), Box::new(ScriptedCatch::catch_on(hider_id, 61)));
        coordinator.reset(0, true).unwrap();

        // Stage the pair by hand: seeker stares straight at the hider
        // from four blocks away
        {
            let seeker = coordinator.agents.get_mut(AgentId(0)).unwrap();
            seeker.position = Vec3::new(10.0, 8.0, 10.0);
            seeker.yaw = 0.0;
            seeker.pitch = 0.0;
            let hider = coordinator.agents.get_mut(hider_id).unwrap();
            hider.position = Vec3::new(10.0, 8.0, 14.0);
            // Park the second hider far away, facing nothing
            let other = coordinator.agents.get_mut(AgentId(2)).unwrap();
            other.position = Vec3::new(28.0, 8.0, 28.0);
        }

        let reward_config = RewardConfig::default();
        let mut accumulated = 0.0;
        let mut caught_step = None;
        for step in 1..=70 {
            let output = coordinator.step(&no_actions()).unwrap();
            if let Some(reward) = output.rewards.get(&hider_id) {
                accumulated += reward;
            }
            if output.dones.get(&hider_id) == Some(&true) {
                caught_step = Some(step);
                break;
            }
        }

        assert_eq!(caught_step, Some(61));
        let expected = 60.0 * (reward_config.time_penalty - reward_config.hider_hidden_bonus)
            + reward_config.caught_penalty;
        assert!(
            (accumulated - expected).abs() < 1e-4,
            "accumulated {accumulated}, expected {expected}"
        );

        // The caught hider drops out of subsequent responses and stays
        // frozen
        let frozen = coordinator.agents.get(hider_id).unwrap().position;
        let output = coordinator.step(&no_actions()).unwrap();
        assert!(!output.rewards.contains_key(&hider_id));
        assert!((coordinator.agents.get(hider_id).unwrap().position - frozen).length() < 1e-6);
    }

    // End-to-end scenario C: the episode runs out of time with nothing
    // caught; the seeker is penalized exactly once.
    #[test]
    fn test_scenario_c_caught_none_penalty_applied_once() {
        let mut config = blind_config();
        config.episode.countdown_secs = 0.0;
        config.episode.seeking_limit_secs = 1.0;
        let step_dt = config.physics.step_dt();
        let limit_steps = (1.0 / step_dt).round() as usize;

        let mut coordinator = coordinator(config, Box::new(ScriptedCatch::never()));
        coordinator.reset(0, true).unwrap();

        let seeker_id = AgentId(0);
        let mut total = 0.0;
        let mut steps = 0;
        loop {
            let output = coordinator.step(&no_actions()).unwrap();
            steps += 1;
            total += output.rewards[&seeker_id];
            if output.episode_done {
                assert_eq!(
                    coordinator.termination(),
                    Some(TerminationCause::TimeLimit)
                );
                break;
            }
            assert!(steps < 100, "episode never terminated");
        }

        assert_eq!(steps, limit_steps);
        let reward_config = RewardConfig::default();
        let expected =
            steps as f32 * reward_config.time_penalty + reward_config.caught_none_penalty;
        assert!(
            (total - expected).abs() < 1e-4,
            "total {total}, expected {expected}"
        );

        // The episode is over; further steps are a protocol error
        assert!(matches!(
            coordinator.step(&no_actions()),
            Err(EpisodeError::NotRunning)
        ));
    }

    #[test]
    fn test_all_found_ends_the_episode() {
        let mut config = blind_config();
        config.episode.countdown_secs = 0.0;
        let mut coordinator = coordinator(config, Box::new(CatchEveryone));
        coordinator.reset(0, true).unwrap();

        let output = coordinator.step(&no_actions()).unwrap();
        assert!(output.episode_done);
        assert_eq!(coordinator.termination(), Some(TerminationCause::AllFound));
        assert_eq!(coordinator.found_count(), 2);

        let reward_config = RewardConfig::default();
        let seeker_reward = output.rewards[&AgentId(0)];
        let expected = reward_config.time_penalty
            + 2.0 * reward_config.catch_bonus
            + reward_config.all_caught_bonus;
        assert!((seeker_reward - expected).abs() < 1e-4);
        for hider_id in [AgentId(1), AgentId(2)] {
            assert!((output.rewards[&hider_id] - reward_config.caught_penalty).abs() < 1e-4);
            assert!(output.dones[&hider_id]);
        }
    }

    #[test]
    fn test_manual_stop_emits_terminal_payload() {
        let mut config = blind_config();
        config.episode.countdown_secs = 0.0;
        let mut coordinator = coordinator(config, Box::new(ScriptedCatch::never()));
        coordinator.reset(0, true).unwrap();
        coordinator.step(&no_actions()).unwrap();

        coordinator.request_stop();
        let output = coordinator.step(&no_actions()).unwrap();
        assert!(output.episode_done);
        assert_eq!(
            coordinator.termination(),
            Some(TerminationCause::ManualStop)
        );

        let reward_config = RewardConfig::default();
        // Terminal-only rewards: nobody was caught
        assert!(
            (output.rewards[&AgentId(0)] - reward_config.caught_none_penalty).abs() < 1e-4
        );
        for hider_id in [AgentId(1), AgentId(2)] {
            assert!((output.rewards[&hider_id] - reward_config.survival_bonus).abs() < 1e-4);
        }
        assert!(output.dones.values().all(|done| *done));
    }

    #[test]
    fn test_reset_reuses_world_unless_asked() {
        let mut coordinator = coordinator(test_config(), Box::new(ScriptedCatch::never()));
        coordinator.reset(0, true).unwrap();
        let first = Arc::clone(coordinator.world.as_ref().unwrap());
        coordinator.reset(1, false).unwrap();
        let second = Arc::clone(coordinator.world.as_ref().unwrap());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_perception_cache_tracks_roster() {
        let mut config = blind_config();
        config.episode.countdown_secs = 0.0;
        let hider_id = AgentId(1);
        let mut coordinator =
            coordinator(config, Box::new(ScriptedCatch::catch_on(hider_id, 1)));
        coordinator.reset(0, true).unwrap();
        assert_eq!(coordinator.perception_cache.len(), 3);

        // Caught on the first step but still present for its final payload
        let output = coordinator.step(&no_actions()).unwrap();
        assert!(output.observations.contains_key(&hider_id));
        assert_eq!(coordinator.perception_cache.len(), 3);

        // Next step drops it from the roster and the cache
        let output = coordinator.step(&no_actions()).unwrap();
        assert!(!output.observations.contains_key(&hider_id));
        assert_eq!(coordinator.perception_cache.len(), 2);
    }

    #[test]
    fn test_proximity_catch_rule_requires_dwell() {
        let world = FlatWorld::new(8);
        let mut agents = AgentArena::new();
        agents.spawn(Role::Seeker, Vec3::new(10.0, 8.0, 10.0));
        agents.spawn(Role::Hider, Vec3::new(10.0, 8.0, 11.5));

        let config = SimConfig::default();
        let mut rule = ProximityCatchRule::new(config.catch.clone(), config.vision.clone());
        let step_dt = config.physics.step_dt();

        let calls_needed = (config.catch.dwell_secs / step_dt).ceil() as usize;
        for call in 1..=calls_needed {
            let caught = rule.evaluate(&world, &agents, step_dt);
            if call < calls_needed {
                assert!(caught.is_empty(), "caught too early at call {call}");
            } else {
                assert_eq!(caught, vec![AgentId(1)]);
            }
        }
    }

    #[test]
    fn test_proximity_catch_rule_resets_dwell_when_apart() {
        let world = FlatWorld::new(8);
        let mut agents = AgentArena::new();
        agents.spawn(Role::Seeker, Vec3::new(10.0, 8.0, 10.0));
        let hider = agents.spawn(Role::Hider, Vec3::new(10.0, 8.0, 11.5));

        let config = SimConfig::default();
        let mut rule = ProximityCatchRule::new(config.catch.clone(), config.vision.clone());
        let step_dt = config.physics.step_dt();

        // Almost caught, then the hider breaks away
        for _ in 0..3 {
            assert!(rule.evaluate(&world, &agents, step_dt).is_empty());
        }
        agents.get_mut(hider).unwrap().position = Vec3::new(10.0, 8.0, 20.0);
        assert!(rule.evaluate(&world, &agents, step_dt).is_empty());

        // Back in range: the dwell clock starts over
        agents.get_mut(hider).unwrap().position = Vec3::new(10.0, 8.0, 11.5);
        for _ in 0..3 {
            assert!(rule.evaluate(&world, &agents, step_dt).is_empty());
        }
    }
}

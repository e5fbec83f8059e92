use std::f32::consts::PI;
use std::ops::Range;

use glam::Vec3;
use tracing::warn;

use crate::infra::{
    BlockPos, ObservationConfig, PhysicsConfig, SimConfig, VisionConfig, WorldConfig, wrap_angle,
};
use crate::sim::{Agent, PerceptionSnapshot, RayHit};
use crate::world::VoxelQuery;

/// Observation width at the reference sizing (64 rays).
pub const OBSERVATION_SIZE: usize = 161;

/// Named, non-overlapping sub-ranges of the observation vector. Built from
/// the ray count so the layout stays consistent if the grid is resized.
#[derive(Debug, Clone)]
pub struct ObservationLayout {
    pub position: Range<usize>,
    pub orientation: Range<usize>,
    pub velocity: Range<usize>,
    pub on_ground: Range<usize>,
    pub boundary: Range<usize>,
    pub ray_distance: Range<usize>,
    pub ray_type: Range<usize>,
    pub game_context: Range<usize>,
    pub target_memory: Range<usize>,
    pub role_block: Range<usize>,
    pub interaction: Range<usize>,
    pub movement_blocked: Range<usize>,
    pub total: usize,
}

impl ObservationLayout {
    pub fn new(ray_count: usize) -> Self {
        let mut cursor = 0;
        let mut take = |len: usize| {
            let range = cursor..cursor + len;
            cursor += len;
            range
        };
        let position = take(3);
        let orientation = take(2);
        let velocity = take(3);
        let on_ground = take(1);
        let boundary = take(4);
        let ray_distance = take(ray_count);
        let ray_type = take(ray_count);
        let game_context = take(4);
        let target_memory = take(4);
        let role_block = take(6);
        let interaction = take(3);
        let movement_blocked = take(3);
        Self {
            position,
            orientation,
            velocity,
            on_ground,
            boundary,
            ray_distance,
            ray_type,
            game_context,
            target_memory,
            role_block,
            interaction,
            movement_blocked,
            total: cursor,
        }
    }
}

/// Episode-level facts the encoder folds into the game-context fields.
#[derive(Debug, Clone, Copy)]
pub struct GameContext {
    /// Simulated seconds since reset.
    pub now: f32,
    pub seeking: bool,
    pub remaining_secs: f32,
    pub time_remaining_frac: f32,
    pub hiders_found: usize,
    pub total_hiders: usize,
    pub interaction_limit: u32,
}

pub struct ObservationEncoder {
    config: ObservationConfig,
    vision: VisionConfig,
    physics: PhysicsConfig,
    world: WorldConfig,
    catch_range: f32,
    layout: ObservationLayout,
}

impl ObservationEncoder {
    pub fn new(sim: &SimConfig) -> Self {
        Self {
            config: sim.observation.clone(),
            vision: sim.vision.clone(),
            physics: sim.physics.clone(),
            world: sim.world.clone(),
            catch_range: sim.catch.range,
            layout: ObservationLayout::new(sim.vision.ray_count()),
        }
    }

    pub fn layout(&self) -> &ObservationLayout {
        &self.layout
    }

    pub fn observation_size(&self) -> usize {
        self.layout.total
    }

    /// Fold the step's perception into the agent's rolling target memory.
    /// Runs before encoding; the encoder itself never mutates the agent.
    pub fn update_target_memory(agent: &mut Agent, perception: &PerceptionSnapshot, now: f32) {
        if let Some(nearest) = perception.visible.first() {
            agent.memory.last_seen = Some(nearest.position);
            agent.memory.last_seen_time = now;
            agent.memory.currently_visible = true;
        } else {
            agent.memory.currently_visible = false;
        }
    }

    /// Encode one agent into the fixed-length vector. Pure in its inputs;
    /// the sanitize sweep at the end guarantees every element is finite
    /// and bounded before the trainer sees it.
    pub fn encode(
        &self,
        agent: &Agent,
        context: &GameContext,
        perception: &PerceptionSnapshot,
        world: &dyn VoxelQuery,
    ) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.layout.total);

        // Position, normalized to the world volume
        obs.push(agent.position.x / self.world.size);
        obs.push(agent.position.y / self.world.max_height);
        obs.push(agent.position.z / self.world.size);

        // Orientation
        obs.push(wrap_angle(agent.yaw) / PI);
        obs.push(agent.pitch / (PI / 2.0));

        // Velocity derived from the position delta, clamped against the
        // role top speed
        let max_speed = self.physics.max_speed(agent.role);
        for component in [agent.velocity.x, agent.velocity.y, agent.velocity.z] {
            obs.push((component / max_speed).clamp(-1.0, 1.0));
        }

        obs.push(if agent.on_ground { 1.0 } else { 0.0 });

        // Boundary proximity per cardinal direction
        for distance in [
            agent.position.x,
            self.world.size - agent.position.x,
            agent.position.z,
            self.world.size - agent.position.z,
        ] {
            obs.push(self.boundary_signal(distance));
        }

        // Parallel ray channels
        for ray in &perception.rays {
            match ray.hit {
                RayHit::Nothing => obs.push(1.0),
                _ => obs.push((ray.distance / self.vision.range).min(1.0)),
            }
        }
        for ray in &perception.rays {
            obs.push(match ray.hit {
                RayHit::Nothing => 0.0,
                RayHit::Agent => 1.0,
                RayHit::Terrain(block) => block.ray_channel_value(),
            });
        }

        // Game context
        let urgent = context.seeking && context.remaining_secs < self.config.urgency_secs;
        obs.push(context.time_remaining_frac.clamp(0.0, 1.0));
        obs.push(if context.total_hiders > 0 {
            context.hiders_found as f32 / context.total_hiders as f32
        } else {
            0.0
        });
        obs.push(if context.seeking { 1.0 } else { 0.0 });
        obs.push(if urgent { 1.0 } else { 0.0 });

        // Target memory
        if let Some(last_seen) = agent.memory.last_seen {
            let age = (context.now - agent.memory.last_seen_time).max(0.0);
            obs.push(last_seen.x / self.world.size);
            obs.push(last_seen.z / self.world.size);
            obs.push((-age / self.config.memory_decay_tau).exp());
            obs.push(if agent.memory.currently_visible { 1.0 } else { 0.0 });
        } else {
            obs.extend_from_slice(&[0.0, 0.0, 0.0, 0.0]);
        }

        self.encode_role_block(&mut obs, agent, perception, context);

        // Block interaction affordances
        let limit = context.interaction_limit;
        obs.push(if agent.blocks_placed < limit { 1.0 } else { 0.0 });
        obs.push(if agent.blocks_removed < limit { 1.0 } else { 0.0 });
        obs.push(self.nearby_block_density(agent.position, world));

        // Movement blocked flags from the last physics resolution
        obs.push(if agent.blocked.x { 1.0 } else { 0.0 });
        obs.push(if agent.blocked.y { 1.0 } else { 0.0 });
        obs.push(if agent.blocked.z { 1.0 } else { 0.0 });

        debug_assert_eq!(obs.len(), self.layout.total);
        self.sanitize(&mut obs, agent);
        obs
    }

    /// Two-zone boundary signal: saturates toward 1.0 approaching a world
    /// edge, relaxes through a wider warning band down to a resting -0.3.
    fn boundary_signal(&self, distance: f32) -> f32 {
        let danger = self.config.boundary_danger;
        let warning = self.config.boundary_warning;
        if distance <= danger {
            1.0 - distance / danger
        } else if distance <= warning {
            -0.3 * (distance - danger) / (warning - danger)
        } else {
            -0.3
        }
    }

    fn encode_role_block(
        &self,
        obs: &mut Vec<f32>,
        agent: &Agent,
        perception: &PerceptionSnapshot,
        context: &GameContext,
    ) {
        let nearest = perception.visible.first();
        match agent.role {
            crate::infra::Role::Seeker => {
                if let Some(target) = nearest {
                    obs.push(1.0);
                    obs.push(target.direction.x);
                    obs.push(target.direction.z);
                    obs.push((target.distance / self.vision.range).min(1.0));
                    obs.push(if context.total_hiders > 0 {
                        (perception.visible.len() as f32 / context.total_hiders as f32).min(1.0)
                    } else {
                        0.0
                    });
                    obs.push(if target.distance < self.catch_range { 1.0 } else { 0.0 });
                } else {
                    obs.extend_from_slice(&[0.0; 6]);
                }
            }
            crate::infra::Role::Hider => {
                if let Some(threat) = nearest {
                    let distance_frac = (threat.distance / self.vision.range).min(1.0);
                    obs.push(1.0);
                    obs.push(threat.direction.x);
                    obs.push(threat.direction.z);
                    obs.push(distance_frac);
                    obs.push(1.0 - distance_frac);
                    obs.push(if threat.distance < self.config.hider_danger_radius {
                        1.0
                    } else {
                        0.0
                    });
                } else {
                    // No visible threat: explicit safe value in the danger
                    // channel, everything else cleared
                    obs.extend_from_slice(&[0.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
                }
            }
        }
    }

    /// Fraction of solid cells in the 5x5x3 neighborhood around the feet,
    /// a cheap stand-in for how much material is available to interact
    /// with.
    fn nearby_block_density(&self, position: Vec3, world: &dyn VoxelQuery) -> f32 {
        let feet = BlockPos::containing(position);
        let mut solid = 0;
        let mut sampled = 0;
        for dy in -1..=1 {
            for dx in -2..=2 {
                for dz in -2..=2 {
                    sampled += 1;
                    if world.is_solid_at(feet.offset(dx, dy, dz)) {
                        solid += 1;
                    }
                }
            }
        }
        solid as f32 / sampled as f32
    }

    /// Final guarantee sweep: no NaN/inf and nothing wildly out of range
    /// ever reaches the trainer, regardless of upstream bugs.
    fn sanitize(&self, obs: &mut [f32], agent: &Agent) {
        for (index, value) in obs.iter_mut().enumerate() {
            if !value.is_finite() {
                warn!(agent = %agent.id, index, "non-finite observation element zeroed");
                *value = 0.0;
            } else if value.abs() > 2.0 {
                warn!(
                    agent = %agent.id,
                    index,
                    value = *value,
                    "out-of-range observation element clamped"
                );
                *value = value.signum();
            }
        }
    }
}

use glam::Vec3;
use tracing::{error, warn};

use crate::infra::{BlockPos, PhysicsConfig, WorldConfig, yaw_direction};
use crate::sim::Agent;
use crate::world::VoxelQuery;

/// Movement input for one physics sub-frame, already mapped from the
/// trainer action. Held constant across all sub-frames of a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveIntent {
    pub forward: f32,
    pub strafe: f32,
    pub jump: bool,
}

pub struct PhysicsEngine {
    config: PhysicsConfig,
}

impl PhysicsEngine {
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    /// Whether the agent collision box placed at `position` (feet center)
    /// overlaps any solid voxel cell. The box is shrunk from the nominal
    /// agent size so block-edge contact does not read as overlap.
    pub fn collides(&self, world: &dyn VoxelQuery, position: Vec3) -> bool {
        let half_width = self.config.agent_width * self.config.bbox_width_scale / 2.0;
        let height = self.config.agent_height * self.config.bbox_height_scale;

        let min_x = (position.x - half_width).floor() as i32;
        let max_x = (position.x + half_width).floor() as i32;
        let min_y = position.y.floor() as i32;
        let max_y = (position.y + height).floor() as i32;
        let min_z = (position.z - half_width).floor() as i32;
        let max_z = (position.z + half_width).floor() as i32;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                for z in min_z..=max_z {
                    if world.is_solid_at(BlockPos::new(x, y, z)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Advance one sub-frame. Order matters: anti-stuck first, then
    /// horizontal resolution, then vertical motion, then the ground probe
    /// and the unconditional boundary clamp.
    pub fn sub_step(
        &self,
        world: &dyn VoxelQuery,
        world_config: &WorldConfig,
        agent: &mut Agent,
        intent: &MoveIntent,
    ) {
        if !agent.physics_enabled {
            agent.on_ground = true;
            return;
        }

        let dt = self.config.sub_frame_dt;
        self.recover_if_stuck(world, agent);

        // Horizontal move from yaw-relative forward/strafe input
        let speed = self.config.max_speed(agent.role);
        let forward = yaw_direction(agent.yaw);
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let mut wish = forward * intent.forward + right * intent.strafe;
        if wish.length_squared() > 1.0 {
            wish = wish.normalize();
        }
        self.move_horizontal(world, agent, wish.x * speed * dt, wish.z * speed * dt);

        // Vertical motion under gravity with a terminal-velocity clamp
        if intent.jump && agent.on_ground {
            agent.fall_speed = self.config.jump_speed;
            agent.on_ground = false;
        }
        agent.fall_speed -= self.config.gravity * dt;
        if agent.fall_speed < -self.config.terminal_fall_speed {
            agent.fall_speed = -self.config.terminal_fall_speed;
        }
        let vertical_target = agent.position + Vec3::new(0.0, agent.fall_speed * dt, 0.0);
        if self.collides(world, vertical_target) {
            agent.blocked.y = true;
            agent.fall_speed = 0.0;
        } else {
            agent.position = vertical_target;
        }

        agent.on_ground = self.probe_ground(world, agent.position);
        self.enforce_bounds(world_config, agent);
    }

    /// On ground means clear where we stand, but colliding a small probe
    /// distance further down.
    fn probe_ground(&self, world: &dyn VoxelQuery, position: Vec3) -> bool {
        !self.collides(world, position)
            && self.collides(
                world,
                position - Vec3::new(0.0, self.config.ground_probe, 0.0),
            )
    }

    /// Axis-separated resolution: a diagonal move that collides retries
    /// X-only and Z-only so wall contact becomes a slide, not a full stop.
    fn move_horizontal(&self, world: &dyn VoxelQuery, agent: &mut Agent, dx: f32, dz: f32) {
        if dx == 0.0 && dz == 0.0 {
            return;
        }

        let combined = agent.position + Vec3::new(dx, 0.0, dz);
        if !self.collides(world, combined) {
            agent.position = combined;
            return;
        }

        if dx != 0.0 {
            let x_only = agent.position + Vec3::new(dx, 0.0, 0.0);
            if !self.collides(world, x_only) {
                agent.position = x_only;
            } else {
                agent.blocked.x = true;
            }
        }
        if dz != 0.0 {
            let z_only = agent.position + Vec3::new(0.0, 0.0, dz);
            if !self.collides(world, z_only) {
                agent.position = z_only;
            } else {
                agent.blocked.z = true;
            }
        }
    }

    /// Hard safety net, independent of collision physics. Idempotent on an
    /// in-bounds agent.
    pub fn enforce_bounds(&self, world_config: &WorldConfig, agent: &mut Agent) {
        agent.position.x = agent.position.x.clamp(0.0, world_config.size);
        agent.position.z = agent.position.z.clamp(0.0, world_config.size);

        let max_y = world_config.max_height - 10.0;
        let clamped_y = agent.position.y.clamp(0.0, max_y);
        if clamped_y != agent.position.y {
            agent.position.y = clamped_y;
            agent.fall_speed = 0.0;
        }
    }

    /// If the agent is already embedded in terrain, search 1..5 cells
    /// straight up, then the four cardinal neighbors. First free cell
    /// wins; exhaustion leaves the agent in place and the step goes on.
    fn recover_if_stuck(&self, world: &dyn VoxelQuery, agent: &mut Agent) {
        if !self.collides(world, agent.position) {
            return;
        }

        for dy in 1..=5 {
            let candidate = agent.position + Vec3::new(0.0, dy as f32, 0.0);
            if !self.collides(world, candidate) {
                warn!(
                    agent = %agent.id,
                    lift = dy,
                    "agent embedded in terrain, recovered upward"
                );
                agent.position = candidate;
                agent.fall_speed = 0.0;
                agent.on_ground = false;
                return;
            }
        }

        for neighbor in BlockPos::containing(agent.position).cardinal_neighbors() {
            let candidate = neighbor.center();
            if !self.collides(world, candidate) {
                warn!(
                    agent = %agent.id,
                    cell = ?neighbor,
                    "agent embedded in terrain, recovered sideways"
                );
                agent.position = candidate;
                agent.fall_speed = 0.0;
                agent.on_ground = false;
                return;
            }
        }

        error!(
            agent = %agent.id,
            position = ?agent.position,
            "anti-stuck recovery exhausted, agent left in place"
        );
    }
}

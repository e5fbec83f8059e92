use std::error::Error;
use std::fmt;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::infra::{Role, SpawnConfig, WorldConfig};
use crate::world::VoxelQuery;

/// Spawning is allowed to fail loudly. A silent fallback position once
/// masked a terrain/seed mismatch for weeks; reporting is mandatory.
#[derive(Debug)]
pub enum SpawnError {
    NoValidPosition { role: Role, attempts: u32 },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpawnError::NoValidPosition { role, attempts } => write!(
                formatter,
                "no valid spawn position for {} after {} attempts",
                role.as_str(),
                attempts
            ),
        }
    }
}

impl Error for SpawnError {}

pub struct SpawnPlanner {
    config: SpawnConfig,
    rng: StdRng,
}

impl SpawnPlanner {
    pub fn new(config: SpawnConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Place every agent in role order. Each candidate keeps the edge
    /// buffer, the pairwise distance floor, and the larger cross-role
    /// floor; cross-role violations are repaired by pushing the candidate
    /// directly away from the offending opponent rather than rerolling.
    pub fn place_agents(
        &mut self,
        world: &dyn VoxelQuery,
        world_config: &WorldConfig,
        roles: &[Role],
    ) -> Result<Vec<Vec3>, SpawnError> {
        let mut placed: Vec<(Role, Vec3)> = Vec::with_capacity(roles.len());

        for &role in roles {
            let position = self.place_one(world, world_config, role, &placed)?;
            placed.push((role, position));
        }

        Ok(placed.into_iter().map(|(_, position)| position).collect())
    }

    fn place_one(
        &mut self,
        world: &dyn VoxelQuery,
        world_config: &WorldConfig,
        role: Role,
        placed: &[(Role, Vec3)],
    ) -> Result<Vec3, SpawnError> {
        let low = self.config.edge_buffer;
        let high = world_config.size - self.config.edge_buffer;
        if high <= low {
            return Err(SpawnError::NoValidPosition { role, attempts: 0 });
        }

        for attempt in 0..self.config.max_attempts {
            let mut x = self.rng.random_range(low..high);
            let mut z = self.rng.random_range(low..high);

            // Repair a cross-role violation by pushing the candidate away
            // from the nearest opponent
            if let Some((opponent, distance)) = nearest_of_role(placed, role, x, z, true)
                && distance < self.config.min_cross_role_distance
            {
                let (dx, dz) = push_direction(x - opponent.x, z - opponent.z);
                x = (opponent.x + dx * self.config.min_cross_role_distance).clamp(low, high);
                z = (opponent.z + dz * self.config.min_cross_role_distance).clamp(low, high);
                debug!(
                    role = role.as_str(),
                    attempt, "spawn candidate pushed back from opposing role"
                );
            }

            if !self.candidate_ok(placed, role, x, z) {
                continue;
            }

            let y = world.find_safe_height(x, z);
            return Ok(Vec3::new(x, y, z));
        }

        warn!(
            role = role.as_str(),
            attempts = self.config.max_attempts,
            "spawn search exhausted"
        );
        Err(SpawnError::NoValidPosition {
            role,
            attempts: self.config.max_attempts,
        })
    }

    fn candidate_ok(&self, placed: &[(Role, Vec3)], role: Role, x: f32, z: f32) -> bool {
        for (other_role, other) in placed {
            let distance = horizontal_distance(x - other.x, z - other.z);
            if distance < self.config.min_agent_distance {
                return false;
            }
            if other_role.opposes(role) && distance < self.config.min_cross_role_distance {
                return false;
            }
        }
        true
    }
}

fn horizontal_distance(dx: f32, dz: f32) -> f32 {
    (dx * dx + dz * dz).sqrt()
}

fn push_direction(dx: f32, dz: f32) -> (f32, f32) {
    let length = horizontal_distance(dx, dz);
    if length < 1e-4 {
        // Candidate landed exactly on the opponent; push east
        (1.0, 0.0)
    } else {
        (dx / length, dz / length)
    }
}

fn nearest_of_role(
    placed: &[(Role, Vec3)],
    role: Role,
    x: f32,
    z: f32,
    opposing: bool,
) -> Option<(Vec3, f32)> {
    placed
        .iter()
        .filter(|(other_role, _)| other_role.opposes(role) == opposing)
        .map(|(_, position)| {
            (
                *position,
                horizontal_distance(x - position.x, z - position.z),
            )
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

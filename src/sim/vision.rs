use std::sync::Arc;

use glam::Vec3;
use tracing::warn;

use crate::infra::{AgentId, VisionConfig, wrap_angle};
use crate::sim::{Agent, AgentArena};
use crate::world::{BlockType, VoxelQuery};

/// Classification of what a perception ray ended on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    Nothing,
    Terrain(BlockType),
    Agent,
}

/// One of the fixed ray-grid samples. Regenerated fully every step.
#[derive(Debug, Clone, Copy)]
pub struct RaySample {
    pub direction: Vec3,
    pub distance: f32,
    pub hit: RayHit,
}

/// An opposing agent that passed every visibility gate.
#[derive(Debug, Clone, Copy)]
pub struct VisibleAgent {
    pub id: AgentId,
    pub position: Vec3,
    pub distance: f32,
    /// Unit vector from the observer's eye toward the target's chest.
    pub direction: Vec3,
}

/// Per-observer, per-step perception bundle, cached by the coordinator so
/// reward and observation read the same data.
#[derive(Debug, Clone)]
pub struct PerceptionSnapshot {
    /// Sorted by ascending distance.
    pub visible: Vec<VisibleAgent>,
    pub rays: Vec<RaySample>,
}

/// Grid ray-march through whole voxel cells, advancing one cell at a time
/// along the axis with the smallest accumulated distance. Returns the
/// first sight-blocking block and the distance at which its cell was
/// entered, or None within `max_distance`. Shared by line-of-sight and
/// perception ray generation.
pub fn march(
    world: &dyn VoxelQuery,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<(f32, BlockType)> {
    let mut cell = crate::infra::BlockPos::containing(origin);

    let step = [
        if direction.x > 0.0 { 1 } else { -1 },
        if direction.y > 0.0 { 1 } else { -1 },
        if direction.z > 0.0 { 1 } else { -1 },
    ];

    let axis_setup = |dir: f32, origin: f32, cell: i32| -> (f32, f32) {
        if dir == 0.0 {
            return (f32::INFINITY, f32::INFINITY);
        }
        let t_delta = 1.0 / dir.abs();
        let next_boundary = if dir > 0.0 {
            cell as f32 + 1.0
        } else {
            cell as f32
        };
        ((next_boundary - origin) / dir, t_delta)
    };

    let (mut t_max_x, t_delta_x) = axis_setup(direction.x, origin.x, cell.x);
    let (mut t_max_y, t_delta_y) = axis_setup(direction.y, origin.y, cell.y);
    let (mut t_max_z, t_delta_z) = axis_setup(direction.z, origin.z, cell.z);

    loop {
        let t = t_max_x.min(t_max_y).min(t_max_z);
        if t > max_distance {
            return None;
        }
        if t_max_x <= t_max_y && t_max_x <= t_max_z {
            cell.x += step[0];
            t_max_x += t_delta_x;
        } else if t_max_y <= t_max_z {
            cell.y += step[1];
            t_max_y += t_delta_y;
        } else {
            cell.z += step[2];
            t_max_z += t_delta_z;
        }

        let block = world.block_type_at(cell);
        if block.blocks_sight() {
            return Some((t, block));
        }
    }
}

/// Whether an unobstructed sight line exists between two points.
pub fn has_line_of_sight(world: &dyn VoxelQuery, from: Vec3, to: Vec3) -> bool {
    let offset = to - from;
    let distance = offset.length();
    if distance < 1e-4 {
        return true;
    }
    march(world, from, offset / distance, distance).is_none()
}

pub struct VisionSystem {
    config: VisionConfig,
    world: Option<Arc<dyn VoxelQuery>>,
    missing_world_warned: bool,
}

impl VisionSystem {
    pub fn new(config: VisionConfig, world: Option<Arc<dyn VoxelQuery>>) -> Self {
        Self {
            config,
            world,
            missing_world_warned: false,
        }
    }

    pub fn set_world(&mut self, world: Arc<dyn VoxelQuery>) {
        self.world = Some(world);
    }

    /// Full perception for one observer: every opposing agent that passes
    /// the distance, field-of-view and line-of-sight gates (nearest
    /// first), plus the fixed ray grid.
    pub fn vision_data(&mut self, observer: &Agent, agents: &AgentArena) -> PerceptionSnapshot {
        let Some(world) = self.world.clone() else {
            self.warn_missing_world();
            return PerceptionSnapshot {
                visible: Vec::new(),
                rays: self.empty_rays(observer),
            };
        };
        let world = world.as_ref();

        let mut visible: Vec<VisibleAgent> = agents
            .iter()
            .filter(|target| self.can_see(world, observer, target))
            .map(|target| {
                let eye = observer.eye_position(self.config.eye_height);
                let chest = target.chest_position(self.config.chest_height);
                let offset = chest - eye;
                let distance = offset.length();
                VisibleAgent {
                    id: target.id,
                    position: target.position,
                    distance,
                    direction: offset / distance.max(1e-6),
                }
            })
            .collect();
        visible.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let rays = self.cast_rays(world, observer, agents);
        PerceptionSnapshot { visible, rays }
    }

    /// Short-circuiting companion query used by reward computation: is
    /// `target` seen by any live agent of the opposing role?
    pub fn is_visible_to_any(&mut self, target: &Agent, agents: &AgentArena) -> bool {
        let Some(world) = self.world.clone() else {
            self.warn_missing_world();
            return false;
        };
        agents
            .iter()
            .filter(|observer| observer.role.opposes(target.role) && observer.is_live())
            .any(|observer| self.can_see(world.as_ref(), observer, target))
    }

    /// The three visibility gates, cheapest first: distance, then both
    /// field-of-view angles, then the line-of-sight march.
    fn can_see(&self, world: &dyn VoxelQuery, observer: &Agent, target: &Agent) -> bool {
        if observer.id == target.id || !observer.role.opposes(target.role) || !target.is_live() {
            return false;
        }

        let eye = observer.eye_position(self.config.eye_height);
        let chest = target.chest_position(self.config.chest_height);
        let offset = chest - eye;
        let distance = offset.length();
        if distance >= self.config.range {
            return false;
        }

        let horizontal = (offset.x * offset.x + offset.z * offset.z).sqrt();
        let bearing = offset.x.atan2(offset.z);
        if wrap_angle(bearing - observer.yaw).abs() > self.config.horizontal_fov / 2.0 {
            return false;
        }
        let elevation = offset.y.atan2(horizontal);
        if wrap_angle(elevation - observer.pitch).abs() > self.config.vertical_fov() / 2.0 {
            return false;
        }

        has_line_of_sight(world, eye, chest)
    }

    /// Direction of the grid ray at (row, col), centered within its cell
    /// of the field of view.
    fn ray_direction(&self, observer: &Agent, row: usize, col: usize) -> Vec3 {
        let azimuth = observer.yaw
            + ((col as f32 + 0.5) / self.config.ray_cols as f32 - 0.5) * self.config.horizontal_fov;
        let elevation = observer.pitch
            + ((row as f32 + 0.5) / self.config.ray_rows as f32 - 0.5) * self.config.vertical_fov();
        Vec3::new(
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
            elevation.cos() * azimuth.cos(),
        )
    }

    fn cast_rays(
        &self,
        world: &dyn VoxelQuery,
        observer: &Agent,
        agents: &AgentArena,
    ) -> Vec<RaySample> {
        let eye = observer.eye_position(self.config.eye_height);

        // Opposing agents that could be attributed to a ray: in range and
        // with a clear sight line. Bearing is tested per ray below.
        let candidates: Vec<(Vec3, f32)> = agents
            .iter()
            .filter(|target| {
                target.id != observer.id && observer.role.opposes(target.role) && target.is_live()
            })
            .filter_map(|target| {
                let chest = target.chest_position(self.config.chest_height);
                let offset = chest - eye;
                let distance = offset.length();
                if distance >= self.config.range || distance < 1e-4 {
                    return None;
                }
                if !has_line_of_sight(world, eye, chest) {
                    return None;
                }
                Some((offset / distance, distance))
            })
            .collect();

        let mut rays = Vec::with_capacity(self.config.ray_count());
        for row in 0..self.config.ray_rows {
            for col in 0..self.config.ray_cols {
                let direction = self.ray_direction(observer, row, col);

                let block_hit = march(world, eye, direction, self.config.range);
                let agent_hit = candidates
                    .iter()
                    .filter(|(dir, _)| dir.dot(direction) >= self.config.agent_ray_cos_tolerance)
                    .map(|(_, distance)| *distance)
                    .min_by(f32::total_cmp);

                let sample = match (agent_hit, block_hit) {
                    // The agent takes the ray only when strictly closer
                    (Some(agent_dist), Some((block_dist, _))) if agent_dist < block_dist => {
                        RaySample {
                            direction,
                            distance: agent_dist,
                            hit: RayHit::Agent,
                        }
                    }
                    (_, Some((block_dist, block))) => RaySample {
                        direction,
                        distance: block_dist,
                        hit: RayHit::Terrain(block),
                    },
                    (Some(agent_dist), None) => RaySample {
                        direction,
                        distance: agent_dist,
                        hit: RayHit::Agent,
                    },
                    (None, None) => RaySample {
                        direction,
                        distance: self.config.range,
                        hit: RayHit::Nothing,
                    },
                };
                rays.push(sample);
            }
        }
        rays
    }

    /// Degraded output when no world query is wired in: nothing visible,
    /// every ray reports maximum distance.
    fn empty_rays(&self, observer: &Agent) -> Vec<RaySample> {
        let mut rays = Vec::with_capacity(self.config.ray_count());
        for row in 0..self.config.ray_rows {
            for col in 0..self.config.ray_cols {
                rays.push(RaySample {
                    direction: self.ray_direction(observer, row, col),
                    distance: self.config.range,
                    hit: RayHit::Nothing,
                });
            }
        }
        rays
    }

    fn warn_missing_world(&mut self) {
        if !self.missing_world_warned {
            warn!("vision has no world query wired in, perceiving nothing");
            self.missing_world_warned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{BlockPos, Role};
    use crate::world::FlatWorld;
    use std::f32::consts::PI;

    fn arena_with(positions: &[(Role, Vec3)]) -> AgentArena {
        let mut arena = AgentArena::new();
        for (role, position) in positions {
            arena.spawn(*role, *position);
        }
        arena
    }

    fn facing(agents: &AgentArena, id: u32, yaw: f32) -> Agent {
        let mut agent = agents.get(AgentId(id)).unwrap().clone();
        agent.yaw = yaw;
        agent
    }

    fn vision(world: FlatWorld) -> VisionSystem {
        VisionSystem::new(VisionConfig::default(), Some(Arc::new(world)))
    }

    #[test]
    fn test_line_of_sight_blocked_by_wall() {
        let mut world = FlatWorld::new(8);
        world.fill(
            BlockPos::new(0, 8, 7),
            BlockPos::new(10, 12, 7),
            crate::world::BlockType::Stone,
        );
        let from = Vec3::new(5.0, 9.6, 5.0);
        let to = Vec3::new(5.0, 8.85, 10.0);
        assert!(!has_line_of_sight(&world, from, to));

        let open = FlatWorld::new(8);
        assert!(has_line_of_sight(&open, from, to));
    }

    #[test]
    fn test_line_of_sight_ignores_transparent_blocks() {
        let mut world = FlatWorld::new(8);
        world.fill(
            BlockPos::new(0, 8, 7),
            BlockPos::new(10, 12, 7),
            crate::world::BlockType::Leaves,
        );
        let from = Vec3::new(5.0, 9.6, 5.0);
        let to = Vec3::new(5.0, 8.85, 10.0);
        assert!(has_line_of_sight(&world, from, to));
    }

    #[test]
    fn test_line_of_sight_is_deterministic() {
        let mut world = FlatWorld::new(8);
        world.fill(
            BlockPos::new(3, 8, 3),
            BlockPos::new(9, 11, 9),
            crate::world::BlockType::Stone,
        );
        let from = Vec3::new(1.3, 9.6, 1.7);
        let to = Vec3::new(11.2, 9.1, 11.9);
        let first = has_line_of_sight(&world, from, to);
        for _ in 0..10 {
            assert_eq!(has_line_of_sight(&world, from, to), first);
        }
    }

    #[test]
    fn test_distance_gate() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 5.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 45.0)),
        ]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(FlatWorld::new(8));
        let snapshot = vision.vision_data(&observer, &agents);
        assert!(snapshot.visible.is_empty());
    }

    #[test]
    fn test_fov_gate_excludes_target_behind() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 10.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 2.0)),
        ]);
        // Facing +Z, hider is at -Z behind the observer
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(FlatWorld::new(8));
        assert!(vision.vision_data(&observer, &agents).visible.is_empty());

        // Turning around brings it into view
        let observer = facing(&agents, 0, PI);
        assert_eq!(vision.vision_data(&observer, &agents).visible.len(), 1);
    }

    #[test]
    fn test_vertical_fov_gate() {
        let mut world = FlatWorld::new(8);
        // Pillar for the hider to stand on, away from the sight column
        world.fill(
            BlockPos::new(6, 8, 8),
            BlockPos::new(6, 18, 8),
            crate::world::BlockType::Stone,
        );
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 7.0)),
            (Role::Hider, Vec3::new(6.0, 19.0, 8.0)),
        ]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(world);
        // Steeply overhead: within range, roughly ahead horizontally, but
        // outside the capped vertical field of view
        assert!(vision.vision_data(&observer, &agents).visible.is_empty());
    }

    #[test]
    fn test_visible_agents_sorted_nearest_first() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 2.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 20.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 9.0)),
        ]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(FlatWorld::new(8));
        let snapshot = vision.vision_data(&observer, &agents);
        assert_eq!(snapshot.visible.len(), 2);
        assert_eq!(snapshot.visible[0].id, AgentId(2));
        assert!(snapshot.visible[0].distance < snapshot.visible[1].distance);
    }

    #[test]
    fn test_frozen_agents_are_invisible() {
        let mut agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 2.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 9.0)),
        ]);
        agents.get_mut(AgentId(1)).unwrap().mark_found();
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(FlatWorld::new(8));
        assert!(vision.vision_data(&observer, &agents).visible.is_empty());
    }

    #[test]
    fn test_is_visible_to_any() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 2.0)),
            (Role::Seeker, Vec3::new(5.0, 8.0, 30.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 9.0)),
        ]);
        let hider = agents.get(AgentId(2)).unwrap().clone();
        let mut vision = vision(FlatWorld::new(8));
        // The hider is ahead of seeker 0 and behind seeker 1; one is enough
        assert!(vision.is_visible_to_any(&hider, &agents));

        let far = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 2.0)),
            (Role::Hider, Vec3::new(50.0, 8.0, 50.0)),
        ]);
        let hidden = far.get(AgentId(1)).unwrap().clone();
        assert!(!vision.is_visible_to_any(&hidden, &far));
    }

    #[test]
    fn test_rays_report_terrain_hits() {
        let mut world = FlatWorld::new(8);
        world.fill(
            BlockPos::new(0, 8, 10),
            BlockPos::new(12, 14, 10),
            crate::world::BlockType::Wood,
        );
        let agents = arena_with(&[(Role::Seeker, Vec3::new(5.0, 8.0, 5.0))]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(world);
        let snapshot = vision.vision_data(&observer, &agents);

        let wood_hits = snapshot
            .rays
            .iter()
            .filter(|ray| ray.hit == RayHit::Terrain(crate::world::BlockType::Wood))
            .count();
        assert!(wood_hits > 0);
        for ray in &snapshot.rays {
            assert!(ray.distance > 0.0 && ray.distance <= VisionConfig::default().range + 1e-3);
        }
    }

    #[test]
    fn test_rays_attribute_near_agent() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 5.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 10.0)),
        ]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = vision(FlatWorld::new(8));
        let snapshot = vision.vision_data(&observer, &agents);

        let agent_rays: Vec<&RaySample> = snapshot
            .rays
            .iter()
            .filter(|ray| ray.hit == RayHit::Agent)
            .collect();
        assert!(!agent_rays.is_empty());
        for ray in agent_rays {
            assert!((ray.distance - 5.06).abs() < 0.2);
        }
    }

    #[test]
    fn test_missing_world_degrades_to_nothing() {
        let agents = arena_with(&[
            (Role::Seeker, Vec3::new(5.0, 8.0, 5.0)),
            (Role::Hider, Vec3::new(5.0, 8.0, 9.0)),
        ]);
        let observer = facing(&agents, 0, 0.0);
        let mut vision = VisionSystem::new(VisionConfig::default(), None);
        let snapshot = vision.vision_data(&observer, &agents);
        assert!(snapshot.visible.is_empty());
        assert_eq!(snapshot.rays.len(), VisionConfig::default().ray_count());
        assert!(snapshot.rays.iter().all(|ray| ray.hit == RayHit::Nothing));
        assert!(!vision.is_visible_to_any(&observer, &agents));
    }
}

use glam::Vec3;

use crate::infra::{AgentId, Role};

/// Per-agent hide-and-seek lifecycle. `Found` is terminal for the agent:
/// it freezes, earns nothing further, and stays visually inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideSeekState {
    Waiting,
    Countdown,
    Seeking,
    Found,
    Hidden,
    Fleeing,
    GameOver,
}

/// Rolling memory of the last opposing agent this agent saw. Updated from
/// the perception snapshot before encoding, never inside the encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetMemory {
    pub last_seen: Option<Vec3>,
    pub last_seen_time: f32,
    pub currently_visible: bool,
}

/// Axis flags from the most recent physics resolution, consumed by the
/// observation encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveBlocked {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub role: Role,
    pub position: Vec3,
    pub prev_position: Vec3,
    /// Derived once per step from the position delta, never integrated.
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    /// Vertical integrator state owned by physics; distinct from the
    /// derived observation velocity above.
    pub fall_speed: f32,
    /// Cleared to freeze caught agents without special-casing call sites.
    pub physics_enabled: bool,
    pub state: HideSeekState,
    pub steps_survived: u32,
    pub blocks_placed: u32,
    pub blocks_removed: u32,
    pub memory: TargetMemory,
    pub blocked: MoveBlocked,
}

impl Agent {
    pub fn new(id: AgentId, role: Role, spawn: Vec3) -> Self {
        Self {
            id,
            role,
            position: spawn,
            prev_position: spawn,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
            fall_speed: 0.0,
            physics_enabled: true,
            state: HideSeekState::Waiting,
            steps_survived: 0,
            blocks_placed: 0,
            blocks_removed: 0,
            memory: TargetMemory::default(),
            blocked: MoveBlocked::default(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.state == HideSeekState::Found
    }

    /// Live agents act, perceive and earn reward; found agents do none of
    /// those.
    pub fn is_live(&self) -> bool {
        !self.is_found()
    }

    pub fn mark_found(&mut self) {
        self.state = HideSeekState::Found;
        self.physics_enabled = false;
        self.velocity = Vec3::ZERO;
        self.fall_speed = 0.0;
    }

    /// Record the step boundary: capture the previous position, then let
    /// physics move the agent.
    pub fn begin_step(&mut self) {
        self.prev_position = self.position;
        self.blocked = MoveBlocked::default();
    }

    pub fn derive_velocity(&mut self, dt: f32) {
        self.velocity = (self.position - self.prev_position) / dt;
    }

    pub fn eye_position(&self, eye_height: f32) -> Vec3 {
        self.position + Vec3::new(0.0, eye_height, 0.0)
    }

    pub fn chest_position(&self, chest_height: f32) -> Vec3 {
        self.position + Vec3::new(0.0, chest_height, 0.0)
    }
}

/// All agents of the running episode, indexed by id. Ids are dense and
/// assigned in insertion order, which is also the fixed iteration order
/// every step.
#[derive(Debug, Default)]
pub struct AgentArena {
    agents: Vec<Agent>,
}

impl AgentArena {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    pub fn spawn(&mut self, role: Role, position: Vec3) -> AgentId {
        let id = AgentId(self.agents.len() as u32);
        self.agents.push(Agent::new(id, role, position));
        id
    }

    pub fn clear(&mut self) {
        self.agents.clear();
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.iter().map(|agent| agent.id)
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.agents.iter().filter(|agent| agent.role == role).count()
    }

    pub fn found_count(&self) -> usize {
        self.agents.iter().filter(|agent| agent.is_found()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids_are_dense_and_ordered() {
        let mut arena = AgentArena::new();
        let a = arena.spawn(Role::Seeker, Vec3::ZERO);
        let b = arena.spawn(Role::Hider, Vec3::ONE);
        assert_eq!(a, AgentId(0));
        assert_eq!(b, AgentId(1));
        let order: Vec<AgentId> = arena.ids().collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_velocity_is_derived_from_positions() {
        let mut agent = Agent::new(AgentId(0), Role::Hider, Vec3::ZERO);
        agent.begin_step();
        agent.position = Vec3::new(1.0, 0.0, 2.0);
        agent.derive_velocity(0.5);
        assert!((agent.velocity.x - 2.0).abs() < 1e-6);
        assert!((agent.velocity.z - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_mark_found_freezes() {
        let mut agent = Agent::new(AgentId(0), Role::Hider, Vec3::ZERO);
        agent.fall_speed = -3.0;
        agent.mark_found();
        assert!(!agent.physics_enabled);
        assert!(!agent.is_live());
        assert!((agent.fall_speed).abs() < 1e-6);
    }
}

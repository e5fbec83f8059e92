use std::f32::consts::PI;
use std::fmt;

use glam::Vec3;

/// Stable identifier for one controllable agent within an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "agent-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Seeker,
    Hider,
}

impl Role {
    pub fn opposes(&self, other: Role) -> bool {
        *self != other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Hider => "hider",
        }
    }
}

/// Integer voxel cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The voxel cell containing a world-space point.
    pub fn containing(point: Vec3) -> Self {
        Self {
            x: point.x.floor() as i32,
            y: point.y.floor() as i32,
            z: point.z.floor() as i32,
        }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The four horizontal neighbor cells, in a fixed order.
    pub fn cardinal_neighbors(&self) -> [BlockPos; 4] {
        [
            self.offset(0, 0, -1), // North
            self.offset(1, 0, 0),  // East
            self.offset(0, 0, 1),  // South
            self.offset(-1, 0, 0), // West
        ]
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.x as f32 + 0.5,
            self.y as f32 + 0.5,
            self.z as f32 + 0.5,
        )
    }
}

/// Wrap an angle into [-PI, PI).
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped >= PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}

/// Horizontal facing direction for a yaw angle. Yaw 0 looks down +Z.
pub fn yaw_direction(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

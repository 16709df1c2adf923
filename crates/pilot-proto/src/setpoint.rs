use serde::{Deserialize, Serialize};

/// Local ENU position target (x east, y north, z up), meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Pose {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Same point expressed as local NED (north, east, down).
    pub fn to_ned(&self) -> (f32, f32, f32) {
        (self.y, self.x, -self.z)
    }
}

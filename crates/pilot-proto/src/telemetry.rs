use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Latest flight controller status as seen by the companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    pub connected: bool,
    pub armed: bool,
    pub mode: String,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            connected: false,
            armed: false,
            mode: String::new(),
        }
    }
}

impl VehicleState {
    pub fn is_mode(&self, mode: &str) -> bool {
        self.mode == mode
    }
}

/// Downward range reading. `clearance` is in the same units as pose z (meters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeReading {
    pub clearance: f32,
    pub timestamp: OffsetDateTime,
}

impl Default for AltitudeReading {
    fn default() -> Self {
        Self {
            clearance: 0.0,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

impl AltitudeReading {
    pub fn now(clearance: f32) -> Self {
        Self { clearance, timestamp: OffsetDateTime::now_utc() }
    }
}

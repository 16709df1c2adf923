pub mod altitude;
pub mod clock;
pub mod control;
pub mod handshake;
pub mod link;
pub mod mission;
pub mod oscillation;
pub mod snapshot;
pub mod streamer;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use pilot_proto::Pose;
use serde::Deserialize;

pub use clock::{Clock, StopSignal, SystemClock, Tick, Ticker};
pub use control::{Commander, ControlError, Request};
pub use mission::{Mission, Phase, TickReport};
pub use snapshot::{LatestSnapshot, Telemetry};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Loop rate. The FC drops out of offboard if setpoints arrive slower than 2 Hz.
    pub tick_hz: f32,

    /// Setpoints streamed at the hold pose before the first mode request.
    pub priming_ticks: u32,

    /// Minimum spacing between mode/arm request attempts.
    pub retry_interval_s: f32,

    /// Hold z minus bottom clearance must drop to this before oscillating.
    pub altitude_tolerance_m: f32,

    /// Ticks spent on each oscillation endpoint.
    pub dwell_ticks: u32,

    /// Custom mode name requested from the FC.
    pub offboard_mode: String,

    pub hold: Pose,
    pub pose_a: Pose,
    pub pose_b: Pose,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            tick_hz: 20.0,
            priming_ticks: 100,
            retry_interval_s: 5.0,
            altitude_tolerance_m: 0.30,
            dwell_ticks: 100,
            offboard_mode: "OFFBOARD".into(),
            hold: Pose::new(0.0, 0.0, 1.0),
            pose_a: Pose::new(3.0, 0.0, 1.0),
            pose_b: Pose::new(-3.0, 0.0, 1.0),
        }
    }
}

impl MissionConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs_f32(self.retry_interval_s)
    }
}

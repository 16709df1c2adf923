pub mod setpoint;
pub mod telemetry;

pub use setpoint::Pose;
pub use telemetry::{AltitudeReading, VehicleState};

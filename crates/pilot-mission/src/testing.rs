use std::time::{Duration, Instant};

use pilot_proto::{AltitudeReading, Pose, VehicleState};

use crate::clock::Tick;
use crate::control::{Commander, ControlError, Request};
use crate::snapshot::Telemetry;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    SetMode(String),
    Arm(bool),
}

/// In-memory FC. Optionally mirrors accepted requests back into telemetry the
/// way a real controller would confirm them on its next heartbeat.
#[derive(Debug, Default)]
pub(crate) struct FakeCommander {
    pub calls: Vec<Call>,
    pub published: Vec<Pose>,
    pub reject_mode: bool,
    pub reject_arm: bool,
    pub publish_fails: bool,
    pub confirm_into: Option<Telemetry>,
}

impl FakeCommander {
    pub fn confirming(telemetry: &Telemetry) -> Self {
        Self { confirm_into: Some(telemetry.clone()), ..Self::default() }
    }
}

impl Commander for FakeCommander {
    fn publish_setpoint(&mut self, pose: &Pose) -> Result<(), ControlError> {
        if self.publish_fails {
            return Err(ControlError::TransportUnavailable("link down".into()));
        }
        self.published.push(*pose);
        Ok(())
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), ControlError> {
        self.calls.push(Call::SetMode(mode.to_string()));
        if self.reject_mode {
            return Err(ControlError::RequestRejected {
                request: Request::SetMode,
                result: "MAV_RESULT_DENIED".into(),
            });
        }
        if let Some(t) = &self.confirm_into {
            let mode = mode.to_string();
            t.vehicle.modify(|s| s.mode = mode);
        }
        Ok(())
    }

    fn arm(&mut self, value: bool) -> Result<(), ControlError> {
        self.calls.push(Call::Arm(value));
        if self.reject_arm {
            return Err(ControlError::RequestRejected {
                request: Request::Arm,
                result: "MAV_RESULT_TEMPORARILY_REJECTED".into(),
            });
        }
        if let Some(t) = &self.confirm_into {
            t.vehicle.modify(|s| s.armed = value);
        }
        Ok(())
    }
}

/// Hand-advanced time source for tick-level tests.
pub(crate) struct ManualClock {
    now: Instant,
    step: Duration,
}

impl ManualClock {
    pub fn at_20hz() -> Self {
        Self { now: Instant::now(), step: Duration::from_millis(50) }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self) -> Instant {
        self.now += self.step;
        self.now
    }

    pub fn advance_by(&mut self, d: Duration) -> Instant {
        self.now += d;
        self.now
    }
}

/// Counts waits and runs a hook on each, without sleeping.
pub(crate) struct CountingTicker<F: FnMut(u32)> {
    pub waits: u32,
    on_wait: F,
}

impl<F: FnMut(u32)> CountingTicker<F> {
    pub fn new(on_wait: F) -> Self {
        Self { waits: 0, on_wait }
    }
}

impl<F: FnMut(u32)> Tick for CountingTicker<F> {
    fn wait(&mut self) {
        self.waits += 1;
        (self.on_wait)(self.waits);
    }
}

pub(crate) fn vehicle(connected: bool, armed: bool, mode: &str) -> VehicleState {
    VehicleState { connected, armed, mode: mode.into() }
}

pub(crate) fn clearance(m: f32) -> AltitudeReading {
    AltitudeReading::now(m)
}

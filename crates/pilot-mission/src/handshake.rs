use std::time::{Duration, Instant};

use pilot_proto::VehicleState;
use tracing::{info, warn};

use crate::control::{Commander, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotOffboard,
    OffboardUnarmed,
    Armed,
}

impl HandshakeState {
    /// Derived from confirmed telemetry only, never from request outcomes.
    pub fn observe(vehicle: &VehicleState, offboard_mode: &str) -> Self {
        if !vehicle.is_mode(offboard_mode) {
            HandshakeState::NotOffboard
        } else if !vehicle.armed {
            HandshakeState::OffboardUnarmed
        } else {
            HandshakeState::Armed
        }
    }
}

/// Spacing between request attempts. Stamped on every attempt, successful or not.
#[derive(Debug)]
pub struct RetryTimer {
    last_request: Instant,
    min_interval: Duration,
}

impl RetryTimer {
    pub fn new(now: Instant, min_interval: Duration) -> Self {
        Self { last_request: now, min_interval }
    }

    pub fn ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_request) >= self.min_interval
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_request = now;
    }

    pub fn last_request(&self) -> Instant {
        self.last_request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Offboard and armed; nothing to ask for.
    Idle,
    /// A request is due but the retry interval has not elapsed.
    Throttled(Request),
    /// A request went out this tick.
    Attempted { request: Request, accepted: bool },
}

/// Walks the FC into offboard, then armed. At most one request per tick, and
/// arming is only asked for once offboard is confirmed.
#[derive(Debug)]
pub struct HandshakeSequencer {
    offboard_mode: String,
    timer: RetryTimer,
    state: HandshakeState,
}

impl HandshakeSequencer {
    pub fn new(offboard_mode: impl Into<String>, min_interval: Duration, now: Instant) -> Self {
        Self {
            offboard_mode: offboard_mode.into(),
            timer: RetryTimer::new(now, min_interval),
            state: HandshakeState::NotOffboard,
        }
    }

    /// Start the retry interval over, as if a request had just gone out.
    pub fn restart(&mut self, now: Instant) {
        self.timer.mark(now);
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn last_request(&self) -> Instant {
        self.timer.last_request()
    }

    pub fn step<C: Commander + ?Sized>(
        &mut self,
        vehicle: &VehicleState,
        now: Instant,
        commander: &mut C,
    ) -> HandshakeAction {
        let observed = HandshakeState::observe(vehicle, &self.offboard_mode);
        if observed != self.state {
            info!("handshake: {:?} -> {:?} (mode={} armed={})", self.state, observed, vehicle.mode, vehicle.armed);
            self.state = observed;
        }

        let request = match observed {
            HandshakeState::NotOffboard => Request::SetMode,
            HandshakeState::OffboardUnarmed => Request::Arm,
            HandshakeState::Armed => return HandshakeAction::Idle,
        };

        if !self.timer.ready(now) {
            return HandshakeAction::Throttled(request);
        }

        let outcome = match request {
            Request::SetMode => commander.set_mode(&self.offboard_mode),
            Request::Arm => commander.arm(true),
        };
        self.timer.mark(now);

        let accepted = match outcome {
            Ok(()) => {
                match request {
                    Request::SetMode => info!("{} enabled", self.offboard_mode),
                    Request::Arm => info!("Vehicle armed"),
                }
                true
            }
            Err(e) => {
                warn!("handshake: {} attempt failed, retrying in {:?}: {}", request, self.timer.min_interval, e);
                false
            }
        };

        HandshakeAction::Attempted { request, accepted }
    }
}

use std::time::Instant;

use pilot_proto::Pose;
use tracing::{info, warn};

use crate::altitude::AltitudeGate;
use crate::clock::{Clock, StopSignal, Tick};
use crate::control::Commander;
use crate::handshake::{HandshakeAction, HandshakeSequencer};
use crate::link::ConnectionGate;
use crate::oscillation::OscillationScheduler;
use crate::snapshot::Telemetry;
use crate::streamer::SetpointStreamer;
use crate::MissionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitLink,
    Priming { remaining: u32 },
    Handshake,
    Oscillate,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub phase: Phase,
    pub published: Option<Pose>,
    pub handshake: Option<HandshakeAction>,
    pub altitude_error: Option<f32>,
}

impl TickReport {
    fn new(phase: Phase) -> Self {
        Self { phase, published: None, handshake: None, altitude_error: None }
    }
}

/// Tick-driven mission: wait for link, prime the setpoint stream, negotiate
/// offboard/arm while climbing to the hold pose, then oscillate forever.
pub struct Mission<C> {
    cfg: MissionConfig,
    telemetry: Telemetry,
    commander: C,
    gate: ConnectionGate,
    streamer: SetpointStreamer,
    sequencer: HandshakeSequencer,
    altitude: AltitudeGate,
    oscillation: OscillationScheduler,
    phase: Phase,
}

impl<C: Commander> Mission<C> {
    pub fn new(cfg: MissionConfig, telemetry: Telemetry, commander: C, now: Instant) -> Self {
        Self {
            streamer: SetpointStreamer::new(cfg.hold),
            sequencer: HandshakeSequencer::new(cfg.offboard_mode.clone(), cfg.retry_interval(), now),
            altitude: AltitudeGate::new(cfg.altitude_tolerance_m),
            oscillation: OscillationScheduler::new(cfg.pose_a, cfg.pose_b, cfg.dwell_ticks),
            gate: ConnectionGate,
            phase: Phase::AwaitLink,
            cfg,
            telemetry,
            commander,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn commander(&self) -> &C {
        &self.commander
    }

    pub fn oscillation(&self) -> &OscillationScheduler {
        &self.oscillation
    }

    /// Drive ticks at the ticker's rate until stop is requested.
    pub fn run<T: Tick + ?Sized, K: Clock + ?Sized>(&mut self, ticker: &mut T, clock: &K, stop: &StopSignal) {
        info!("mission: waiting for FC link");
        while !stop.is_stopped() {
            self.tick(clock.now());
            ticker.wait();
        }
        info!("mission: stopped in {:?} after {} setpoints", self.phase, self.streamer.published());
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        if self.phase == Phase::AwaitLink {
            if !self.gate.is_open(&self.telemetry.vehicle.read()) {
                return TickReport::new(Phase::AwaitLink);
            }
            info!("mission: FC link up, priming setpoint stream for {} ticks", self.cfg.priming_ticks);
            self.enter_priming(now);
        }

        match self.phase {
            Phase::AwaitLink => TickReport::new(Phase::AwaitLink),
            Phase::Priming { remaining } => self.prime(now, remaining),
            Phase::Handshake => self.handshake(now),
            Phase::Oscillate => self.oscillate(),
        }
    }

    fn enter_priming(&mut self, now: Instant) {
        if self.cfg.priming_ticks == 0 {
            self.enter_handshake(now);
        } else {
            self.phase = Phase::Priming { remaining: self.cfg.priming_ticks };
        }
    }

    fn enter_handshake(&mut self, now: Instant) {
        info!("mission: requesting {} and arming", self.cfg.offboard_mode);
        self.sequencer.restart(now);
        self.phase = Phase::Handshake;
    }

    fn prime(&mut self, now: Instant, remaining: u32) -> TickReport {
        let phase = self.phase;
        self.streamer.set_target(self.cfg.hold);
        let published = self.streamer.stream(&mut self.commander);

        match remaining.saturating_sub(1) {
            0 => self.enter_handshake(now),
            left => self.phase = Phase::Priming { remaining: left },
        }

        TickReport { published: Some(published), ..TickReport::new(phase) }
    }

    fn handshake(&mut self, now: Instant) -> TickReport {
        let vehicle = self.telemetry.vehicle.read();
        let action = self.sequencer.step(&vehicle, now, &mut self.commander);

        self.streamer.set_target(self.cfg.hold);
        let published = self.streamer.stream(&mut self.commander);

        // Re-read after the (possibly blocking) request.
        let reading = self.telemetry.altitude.read();
        let error = AltitudeGate::error(self.cfg.hold.z, &reading);
        if self.altitude.is_ready(self.cfg.hold.z, &reading) {
            let armed = self.telemetry.vehicle.read().armed;
            info!("mission: altitude error {:.2} m within {:.2} m, starting oscillation", error, self.altitude.tolerance());
            if !armed {
                warn!("mission: altitude reached before arming was confirmed");
            }
            self.phase = Phase::Oscillate;
        }

        TickReport {
            published: Some(published),
            handshake: Some(action),
            altitude_error: Some(error),
            ..TickReport::new(Phase::Handshake)
        }
    }

    fn oscillate(&mut self) -> TickReport {
        let target = self.oscillation.next_target();
        self.streamer.set_target(target);
        let published = self.streamer.stream(&mut self.commander);
        TickReport { published: Some(published), ..TickReport::new(Phase::Oscillate) }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::control::Request;
    use crate::testing::{clearance, vehicle, Call, CountingTicker, FakeCommander, ManualClock};

    fn mission(telemetry: &Telemetry, fc: FakeCommander, now: Instant) -> Mission<FakeCommander> {
        Mission::new(MissionConfig::default(), telemetry.clone(), fc, now)
    }

    #[test]
    fn nothing_published_until_link_then_primes_hold() {
        let telemetry = Telemetry::new();
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander::default(), clock.now());

        for _ in 0..50 {
            let r = m.tick(clock.advance());
            assert_eq!(r.phase, Phase::AwaitLink);
            assert!(r.published.is_none());
        }
        assert!(m.commander().published.is_empty());

        telemetry.vehicle.replace(vehicle(true, false, "MANUAL"));
        for i in 0..100 {
            let r = m.tick(clock.advance());
            assert!(matches!(r.phase, Phase::Priming { .. }), "tick {}", i);
            assert_eq!(r.published, Some(MissionConfig::default().hold));
        }
        assert_eq!(m.phase(), Phase::Handshake);
        assert!(m.commander().calls.is_empty());
    }

    #[test]
    fn first_mode_request_waits_retry_interval_after_priming() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, false, "MANUAL"));
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander::default(), clock.now());

        for _ in 0..100 {
            m.tick(clock.advance());
        }
        let handshake_start = clock.now();

        let mut first = None;
        for _ in 0..200 {
            let now = clock.advance();
            if let Some(HandshakeAction::Attempted { .. }) = m.tick(now).handshake {
                first = Some(now);
                break;
            }
        }
        let first = first.expect("a mode request within 10 s");
        assert!(first - handshake_start >= Duration::from_secs(5));
        assert_eq!(m.commander().calls, vec![Call::SetMode("OFFBOARD".into())]);
    }

    #[test]
    fn stays_on_hold_while_below_altitude() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, true, "OFFBOARD"));
        telemetry.altitude.replace(clearance(0.5));
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander::default(), clock.now());
        let hold = MissionConfig::default().hold;

        for _ in 0..2_000 {
            let r = m.tick(clock.advance());
            assert_eq!(r.published, Some(hold));
            assert_ne!(r.phase, Phase::Oscillate);
            if let Some(err) = r.altitude_error {
                assert!(err > 0.30);
            }
        }
        assert_eq!(m.phase(), Phase::Handshake);
    }

    #[test]
    fn request_attempts_are_spaced_and_ordered() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, false, "MANUAL"));
        let mut clock = ManualClock::at_20hz();
        let mut fc = FakeCommander::confirming(&telemetry);
        // First two mode attempts are refused by the FC.
        fc.reject_mode = true;
        let mut m = mission(&telemetry, fc, clock.now());

        let mut attempts: Vec<(Request, Instant, String)> = Vec::new();
        for _ in 0..1_200 {
            let now = clock.advance();
            let mode_before = telemetry.vehicle.read().mode;
            let r = m.tick(now);
            if let Some(HandshakeAction::Attempted { request, .. }) = r.handshake {
                attempts.push((request, now, mode_before));
            }
            if attempts.len() == 2 {
                m.commander.reject_mode = false;
            }
        }

        for pair in attempts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(5));
        }
        for (request, _, mode) in &attempts {
            if *request == Request::Arm {
                assert_eq!(mode, "OFFBOARD", "arm requested while not in offboard");
            }
        }
        let kinds: Vec<Request> = attempts.iter().map(|a| a.0).collect();
        assert_eq!(kinds, vec![Request::SetMode, Request::SetMode, Request::SetMode, Request::Arm]);
        assert!(telemetry.vehicle.read().armed);
    }

    #[test]
    fn no_mode_request_once_offboard_confirmed() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, false, "OFFBOARD"));
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander { reject_arm: true, ..Default::default() }, clock.now());

        for _ in 0..1_000 {
            m.tick(clock.advance());
        }
        assert!(!m.commander().calls.is_empty());
        assert!(m.commander().calls.iter().all(|c| *c == Call::Arm(true)));
    }

    #[test]
    fn altitude_alone_opens_oscillation_even_unarmed() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, false, "MANUAL"));
        telemetry.altitude.replace(clearance(0.75));
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander::default(), clock.now());

        for _ in 0..100 {
            m.tick(clock.advance());
        }
        let r = m.tick(clock.advance());
        assert_eq!(r.phase, Phase::Handshake);
        assert_eq!(r.handshake, Some(HandshakeAction::Throttled(Request::SetMode)));
        assert_eq!(m.phase(), Phase::Oscillate);
        assert!(m.commander().calls.is_empty());
    }

    #[test]
    fn full_run_reaches_oscillation_and_alternates() {
        let telemetry = Telemetry::new();
        telemetry.vehicle.replace(vehicle(true, false, "MANUAL"));
        let mut clock = ManualClock::at_20hz();
        let mut m = mission(&telemetry, FakeCommander::confirming(&telemetry), clock.now());
        let cfg = MissionConfig::default();

        while m.phase() != Phase::Oscillate {
            if telemetry.vehicle.read().armed {
                telemetry.altitude.replace(clearance(0.9));
            }
            m.tick(clock.advance());
        }
        assert_eq!(
            m.commander().calls,
            vec![Call::SetMode("OFFBOARD".into()), Call::Arm(true)]
        );

        let targets: Vec<Pose> = (0..400).filter_map(|_| m.tick(clock.advance()).published).collect();
        assert_eq!(targets.len(), 400);
        assert!(targets[..100].iter().all(|p| *p == cfg.pose_a));
        assert!(targets[100..200].iter().all(|p| *p == cfg.pose_b));
        assert!(targets[200..300].iter().all(|p| *p == cfg.pose_a));
        assert!(targets[300..].iter().all(|p| *p == cfg.pose_b));
        assert_eq!(m.oscillation().cycle_counter(), 0);
    }

    #[test]
    fn run_exits_on_stop() {
        let telemetry = Telemetry::new();
        let mut m = mission(&telemetry, FakeCommander::default(), Instant::now());
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let mut ticker = CountingTicker::new(|n| {
            if n == 25 {
                trigger.stop();
            }
        });

        m.run(&mut ticker, &crate::clock::SystemClock, &stop);
        assert_eq!(ticker.waits, 25);
        assert_eq!(m.phase(), Phase::AwaitLink);
    }
}

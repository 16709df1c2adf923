use pilot_proto::Pose;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    TowardA,
    TowardB,
}

impl Leg {
    fn flip(self) -> Self {
        match self {
            Leg::TowardA => Leg::TowardB,
            Leg::TowardB => Leg::TowardA,
        }
    }
}

/// Alternates the target between two poses, `dwell_ticks` ticks each, forever.
#[derive(Debug)]
pub struct OscillationScheduler {
    pose_a: Pose,
    pose_b: Pose,
    dwell_ticks: u32,
    leg: Leg,
    dwell: u32,
}

impl OscillationScheduler {
    pub fn new(pose_a: Pose, pose_b: Pose, dwell_ticks: u32) -> Self {
        Self { pose_a, pose_b, dwell_ticks: dwell_ticks.max(1), leg: Leg::TowardA, dwell: 0 }
    }

    pub fn leg(&self) -> Leg {
        self.leg
    }

    pub fn dwell(&self) -> u32 {
        self.dwell
    }

    /// Position within the full cycle as one signed count: 0..dwell while
    /// heading to A, -dwell..0 while heading to B.
    pub fn cycle_counter(&self) -> i64 {
        match self.leg {
            Leg::TowardA => self.dwell as i64,
            Leg::TowardB => self.dwell as i64 - self.dwell_ticks as i64,
        }
    }

    /// Target for this tick; advances the dwell afterwards.
    pub fn next_target(&mut self) -> Pose {
        let target = match self.leg {
            Leg::TowardA => self.pose_a,
            Leg::TowardB => self.pose_b,
        };
        self.dwell += 1;
        if self.dwell >= self.dwell_ticks {
            self.dwell = 0;
            self.leg = self.leg.flip();
            debug!("oscillation: switching to {:?}", self.leg);
        }
        target
    }
}

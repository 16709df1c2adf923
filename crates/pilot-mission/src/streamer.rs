use pilot_proto::Pose;
use tracing::{info, warn};

use crate::control::Commander;

/// Republishes the current target once per tick. The FC rejects offboard
/// (or fails safe out of it) when the setpoint stream stalls.
#[derive(Debug)]
pub struct SetpointStreamer {
    target: Pose,
    published: u64,
    failing: bool,
}

impl SetpointStreamer {
    pub fn new(target: Pose) -> Self {
        Self { target, published: 0, failing: false }
    }

    pub fn set_target(&mut self, target: Pose) {
        self.target = target;
    }

    pub fn target(&self) -> Pose {
        self.target
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Publish the current target. Failures are logged once per streak and
    /// otherwise ignored; the next tick tries again.
    pub fn stream<C: Commander + ?Sized>(&mut self, commander: &mut C) -> Pose {
        match commander.publish_setpoint(&self.target) {
            Ok(()) => {
                if self.failing {
                    info!("setpoint: stream restored after failures");
                    self.failing = false;
                }
                self.published += 1;
            }
            Err(e) => {
                if !self.failing {
                    warn!("setpoint: publish failed: {}", e);
                    self.failing = true;
                }
            }
        }
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCommander;

    #[test]
    fn publishes_current_target_each_call() {
        let mut fc = FakeCommander::default();
        let mut s = SetpointStreamer::new(Pose::new(0.0, 0.0, 1.0));
        s.stream(&mut fc);
        s.set_target(Pose::new(3.0, 0.0, 1.0));
        s.stream(&mut fc);
        s.stream(&mut fc);

        assert_eq!(fc.published.len(), 3);
        assert_eq!(fc.published[0], Pose::new(0.0, 0.0, 1.0));
        assert_eq!(fc.published[2], Pose::new(3.0, 0.0, 1.0));
        assert_eq!(s.published(), 3);
    }

    #[test]
    fn failed_publish_is_not_counted_and_recovers() {
        let mut fc = FakeCommander { publish_fails: true, ..Default::default() };
        let mut s = SetpointStreamer::new(Pose::new(0.0, 0.0, 1.0));
        s.stream(&mut fc);
        s.stream(&mut fc);
        assert_eq!(s.published(), 0);

        fc.publish_fails = false;
        s.stream(&mut fc);
        assert_eq!(s.published(), 1);
    }
}

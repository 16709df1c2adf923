use pilot_proto::AltitudeReading;

/// Opens once the vehicle has climbed to within `tolerance` of the target z,
/// measured against bottom clearance.
#[derive(Debug, Clone, Copy)]
pub struct AltitudeGate {
    tolerance: f32,
}

impl AltitudeGate {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Positive while below target.
    pub fn error(target_z: f32, reading: &AltitudeReading) -> f32 {
        target_z - reading.clearance
    }

    /// Signed comparison: a vehicle above the target also opens the gate.
    /// A NaN reading keeps it closed.
    pub fn is_ready(&self, target_z: f32, reading: &AltitudeReading) -> bool {
        Self::error(target_z, reading) <= self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::clearance;

    #[test]
    fn half_meter_short_stays_closed() {
        let gate = AltitudeGate::new(0.30);
        let r = clearance(0.5);
        assert!((AltitudeGate::error(1.0, &r) - 0.5).abs() < 1e-6);
        assert!(!gate.is_ready(1.0, &r));
    }

    #[test]
    fn quarter_meter_short_opens() {
        let gate = AltitudeGate::new(0.30);
        let r = clearance(0.75);
        assert!((AltitudeGate::error(1.0, &r) - 0.25).abs() < 1e-6);
        assert!(gate.is_ready(1.0, &r));
    }

    #[test]
    fn on_ground_and_overshoot() {
        let gate = AltitudeGate::new(0.30);
        assert!(!gate.is_ready(1.0, &AltitudeReading::default()));
        assert!(gate.is_ready(1.0, &clearance(1.8)));
    }

    #[test]
    fn nan_clearance_keeps_gate_closed() {
        let gate = AltitudeGate::new(0.30);
        assert!(!gate.is_ready(1.0, &clearance(f32::NAN)));
    }
}

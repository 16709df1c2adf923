use pilot_proto::VehicleState;
use tracing::info;

use crate::clock::{StopSignal, Tick};
use crate::snapshot::LatestSnapshot;

/// Holds everything back until the FC reports a live link. There is no
/// timeout: a dead link blocks until stop is requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionGate;

impl ConnectionGate {
    pub fn is_open(&self, vehicle: &VehicleState) -> bool {
        vehicle.connected
    }

    /// Poll at the ticker's rate. Returns true once connected, false if
    /// stopped first.
    pub fn wait_for_link<T: Tick + ?Sized>(
        &self,
        vehicle: &LatestSnapshot<VehicleState>,
        ticker: &mut T,
        stop: &StopSignal,
    ) -> bool {
        loop {
            if stop.is_stopped() {
                return false;
            }
            if self.is_open(&vehicle.read()) {
                info!("link: FC connected");
                return true;
            }
            ticker.wait();
        }
    }
}

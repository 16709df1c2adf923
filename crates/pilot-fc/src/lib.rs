pub mod autodetect;
pub mod mav;
pub mod px4;
pub mod wire;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs, AutodetectResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeSource {
    /// ALTITUDE.bottom_clearance (meters).
    #[default]
    Altitude,
    /// DISTANCE_SENSOR.current_distance (centimeters).
    DistanceSensor,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// MAVLink address, e.g. "udpin:0.0.0.0:14540" or "serial:/dev/ttyACM0:921600".
    pub connection: String,

    /// If true, probe candidate serial ports/bauds and use the first that
    /// yields a heartbeat instead of `connection`.
    pub autodetect: bool,

    /// Autodetect candidates (paths). Example:
    /// ["/dev/serial0","/dev/ttyAMA0","/dev/ttyUSB0","/dev/ttyACM0"]
    pub candidate_devs: Option<Vec<String>>,

    /// Autodetect candidate baud rates.
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 for PX4.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Companion heartbeat rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// How long set-mode/arm wait for COMMAND_ACK.
    pub command_timeout_ms: u64,

    /// FC heartbeat age after which the vehicle counts as disconnected.
    pub link_timeout_ms: u64,

    pub altitude_source: AltitudeSource,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            connection: "udpin:0.0.0.0:14540".into(),
            autodetect: false,
            candidate_devs: None,
            candidate_bauds: None,
            heartbeat_timeout_ms: None,
            sys_id: 1,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            send_heartbeat_hz: None,
            command_timeout_ms: 1500,
            link_timeout_ms: 3000,
            altitude_source: AltitudeSource::Altitude,
        }
    }
}

impl FcConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        let hz = self.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
        Duration::from_secs_f32(1.0 / hz)
    }
}

pub fn run_fc_autodetect(fc: &FcConfig) -> Result<AutodetectResult> {
    let devs = fc.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = fc.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    let timeout = Duration::from_millis(fc.heartbeat_timeout_ms.unwrap_or(1500));
    autodetect_fc(devs, bauds, timeout, fc)
}

/// The MAVLink address to open: either the configured one or the first
/// autodetected serial port.
pub fn resolve_connection(fc: &FcConfig) -> Result<String> {
    if fc.autodetect {
        let res = run_fc_autodetect(fc)?;
        let addr = res.chosen.context("fc autodetect failed: no heartbeat found")?;
        info!("fc: using autodetected {}", addr);
        Ok(addr)
    } else {
        anyhow::ensure!(!fc.connection.is_empty(), "fc.connection missing (autodetect=false)");
        Ok(fc.connection.clone())
    }
}

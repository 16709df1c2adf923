use std::time::{Duration, Instant};

use anyhow::Result;
use mavlink::common::MavMessage;
use tracing::{info, warn};

use crate::mav::FcLink;
use crate::FcConfig;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub address: String,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    /// MAVLink address of the first candidate that produced a heartbeat.
    pub chosen: Option<String>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![921600, 57600, 115200]
}

pub fn candidate_addresses(devs: &[String], bauds: &[u32]) -> Vec<String> {
    devs.iter()
        .flat_map(|dev| bauds.iter().map(move |baud| format!("serial:{}:{}", dev, baud)))
        .collect()
}

pub fn autodetect_fc(
    candidate_devs: Vec<String>,
    candidate_bauds: Vec<u32>,
    heartbeat_timeout: Duration,
    cfg: &FcConfig,
) -> Result<AutodetectResult> {
    let mut probes = Vec::new();

    for address in candidate_addresses(&candidate_devs, &candidate_bauds) {
        let start = Instant::now();
        let (hb_seen, note) = match FcLink::open(&address, cfg) {
            Ok(link) => {
                if wait_for_heartbeat(link, heartbeat_timeout) {
                    (true, "heartbeat".to_string())
                } else {
                    (false, "no heartbeat".to_string())
                }
            }
            Err(e) => {
                warn!("fc autodetect probe failed {} err={:#}", address, e);
                (false, format!("open/connect failed: {:#}", e))
            }
        };

        probes.push(ProbeResult {
            address: address.clone(),
            hb_seen,
            elapsed_ms: start.elapsed().as_millis() as u64,
            note,
        });

        if hb_seen {
            info!("fc autodetect: OK {}", address);
            return Ok(AutodetectResult { chosen: Some(address), probes });
        }
    }

    Ok(AutodetectResult { chosen: None, probes })
}

/// Read the unstarted link until any heartbeat shows up. The link (and its
/// port) is dropped on return; nothing keeps running afterwards.
fn wait_for_heartbeat(mut link: FcLink, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match link.poll_once() {
            Some((_, MavMessage::HEARTBEAT(_))) => return true,
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(10)),
        }
    }
    false
}

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavResult, MavState, MavType,
        PositionTargetTypemask, COMMAND_ACK_DATA, COMMAND_LONG_DATA, HEARTBEAT_DATA,
        SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavHeader,
};
use pilot_mission::{Commander, ControlError, LatestSnapshot, Request, StopSignal, Telemetry};
use pilot_proto::{AltitudeReading, Pose, VehicleState};
use tracing::{debug, info, warn};

use crate::wire::{self, Inbound, Outbound};
use crate::{px4, AltitudeSource, FcConfig};

#[derive(Debug, Clone, Copy)]
struct LinkIds {
    sys_id: u8,
    comp_id: u8,
    target_sys: u8,
    target_comp: u8,
}

/// Sending half shared by the commander and the heartbeat thread.
#[derive(Clone)]
struct Outbox {
    wire: Outbound,
    ids: LinkIds,
    sequence: Arc<AtomicU8>,
}

impl Outbox {
    fn send(&self, msg: &MavMessage) -> Result<(), ControlError> {
        let hdr = MavHeader {
            system_id: self.ids.sys_id,
            component_id: self.ids.comp_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.wire
            .send(hdr, msg)
            .map_err(|e| ControlError::TransportUnavailable(format!("mavlink send: {}", e)))
    }
}

pub struct FcLink {
    address: String,
    inbound: Inbound,
    out: Outbox,
    altitude_source: AltitudeSource,
    command_timeout: Duration,
    link_timeout: Duration,
    heartbeat_interval: Duration,
}

impl FcLink {
    pub fn open(address: &str, cfg: &FcConfig) -> Result<Self> {
        let (inbound, outbound) = wire::open(address)?;

        Ok(Self {
            address: address.to_string(),
            inbound,
            out: Outbox {
                wire: outbound,
                ids: LinkIds {
                    sys_id: cfg.sys_id,
                    comp_id: cfg.comp_id,
                    target_sys: cfg.target_sys,
                    target_comp: cfg.target_comp,
                },
                sequence: Arc::new(AtomicU8::new(0)),
            },
            altitude_source: cfg.altitude_source,
            command_timeout: cfg.command_timeout(),
            link_timeout: cfg.link_timeout(),
            heartbeat_interval: cfg.heartbeat_interval(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// One read attempt on a link that has not been started. Serial reads
    /// give up after `wire::SERIAL_IO_TIMEOUT`; bad frames count as nothing.
    pub fn poll_once(&mut self) -> Option<(MavHeader, MavMessage)> {
        match self.inbound.recv() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("fc: recv failed on {}: {:?}", self.address, e);
                None
            }
        }
    }

    /// Spawn the reader (telemetry into `telemetry`, acks to the commander)
    /// and the companion heartbeat/link watchdog. Both exit once `stop` is set.
    /// On serial the reader wakes every `wire::SERIAL_IO_TIMEOUT`; on network
    /// links it may linger inside a blocking recv until the next datagram.
    pub fn start(self, telemetry: Telemetry, stop: StopSignal) -> Result<FcCommander> {
        let (ack_tx, ack_rx) = mpsc::channel();

        {
            let inbound = self.inbound;
            let ids = self.out.ids;
            let source = self.altitude_source;
            let telemetry = telemetry.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("fc-reader".into())
                .spawn(move || read_loop(inbound, ids, source, telemetry, ack_tx, stop))
                .context("spawn fc reader")?;
        }

        {
            let out = self.out.clone();
            let vehicle = telemetry.vehicle.clone();
            let interval = self.heartbeat_interval;
            let link_timeout = self.link_timeout;
            std::thread::Builder::new()
                .name("fc-heartbeat".into())
                .spawn(move || heartbeat_loop(out, vehicle, interval, link_timeout, stop))
                .context("spawn fc heartbeat")?;
        }

        info!("fc: link started on {}", self.address);
        Ok(FcCommander {
            out: self.out,
            acks: ack_rx,
            command_timeout: self.command_timeout,
            boot: Instant::now(),
        })
    }
}

/// Outbound side of a started link: setpoints, mode changes, arming.
pub struct FcCommander {
    out: Outbox,
    acks: Receiver<COMMAND_ACK_DATA>,
    command_timeout: Duration,
    boot: Instant,
}

impl FcCommander {
    fn command(&mut self, request: Request, command: MavCmd, params: [f32; 7]) -> Result<(), ControlError> {
        // Drop acks left over from earlier, timed-out requests.
        while self.acks.try_recv().is_ok() {}

        let ids = self.out.ids;
        let cmd = COMMAND_LONG_DATA {
            target_system: ids.target_sys,
            target_component: ids.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        info!("FC: sending {} ({:?})", request, command);
        self.out.send(&MavMessage::COMMAND_LONG(cmd))?;

        await_ack(&self.acks, request, command, self.command_timeout)
    }
}

/// Wait for the COMMAND_ACK answering `command`. Acks for other commands are
/// skipped and IN_PROGRESS keeps waiting, all within one `timeout`.
fn await_ack(
    acks: &Receiver<COMMAND_ACK_DATA>,
    request: Request,
    command: MavCmd,
    timeout: Duration,
) -> Result<(), ControlError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match acks.recv_timeout(remaining) {
            Ok(ack) if ack.command != command => continue,
            Ok(ack) => match ack.result {
                MavResult::MAV_RESULT_ACCEPTED => return Ok(()),
                MavResult::MAV_RESULT_IN_PROGRESS => continue,
                other => {
                    return Err(ControlError::RequestRejected {
                        request,
                        result: format!("{:?}", other),
                    })
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                return Err(ControlError::Timeout {
                    request,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ControlError::TransportUnavailable("fc reader stopped".into()))
            }
        }
    }
}

impl Commander for FcCommander {
    fn publish_setpoint(&mut self, pose: &Pose) -> Result<(), ControlError> {
        let ids = self.out.ids;
        let msg = setpoint_message(pose, ids.target_sys, ids.target_comp, self.boot.elapsed());
        self.out.send(&msg)
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), ControlError> {
        let (main, sub) = px4::mode_params(mode).ok_or_else(|| ControlError::RequestRejected {
            request: Request::SetMode,
            result: format!("unknown PX4 mode {}", mode),
        })?;
        let custom = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command(
            Request::SetMode,
            MavCmd::MAV_CMD_DO_SET_MODE,
            [custom, main as f32, sub as f32, 0.0, 0.0, 0.0, 0.0],
        )
    }

    fn arm(&mut self, value: bool) -> Result<(), ControlError> {
        let p1 = if value { 1.0 } else { 0.0 };
        self.command(
            Request::Arm,
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [p1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }
}

fn read_loop(
    mut inbound: Inbound,
    ids: LinkIds,
    source: AltitudeSource,
    telemetry: Telemetry,
    acks: Sender<COMMAND_ACK_DATA>,
    stop: StopSignal,
) {
    while !stop.is_stopped() {
        match inbound.recv() {
            Ok(Some((hdr, msg))) => dispatch(&hdr, msg, ids, source, &telemetry, &acks),
            // Serial read timeout: just re-check the stop flag.
            Ok(None) => {}
            Err(e) => {
                debug!("fc: recv failed: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    debug!("fc: reader exiting");
}

/// Route one inbound frame into telemetry or the ack channel.
fn dispatch(
    hdr: &MavHeader,
    msg: MavMessage,
    ids: LinkIds,
    source: AltitudeSource,
    telemetry: &Telemetry,
    acks: &Sender<COMMAND_ACK_DATA>,
) {
    if hdr.system_id != ids.target_sys {
        return;
    }

    match msg {
        MavMessage::HEARTBEAT(hb) if hdr.component_id == ids.target_comp => {
            let state = vehicle_state(&hb);
            let prev = telemetry.vehicle.read();
            if !prev.connected {
                info!("fc: heartbeat from {}:{}, link up", hdr.system_id, hdr.component_id);
            }
            if prev.mode != state.mode || prev.armed != state.armed {
                info!("fc: mode={} armed={}", state.mode, state.armed);
            }
            telemetry.vehicle.replace(state);
        }
        MavMessage::ALTITUDE(alt) if source == AltitudeSource::Altitude => {
            telemetry.altitude.replace(AltitudeReading::now(alt.bottom_clearance));
        }
        MavMessage::DISTANCE_SENSOR(ds) if source == AltitudeSource::DistanceSensor => {
            telemetry.altitude.replace(AltitudeReading::now(ds.current_distance as f32 / 100.0));
        }
        MavMessage::COMMAND_ACK(ack) => {
            // Receiver gone means the commander was dropped; nothing to do.
            let _ = acks.send(ack);
        }
        _ => {}
    }
}

fn heartbeat_loop(
    out: Outbox,
    vehicle: Arc<LatestSnapshot<VehicleState>>,
    interval: Duration,
    link_timeout: Duration,
    stop: StopSignal,
) {
    while !stop.is_stopped() {
        if let Err(e) = out.send(&companion_heartbeat()) {
            debug!("fc: heartbeat send failed: {}", e);
        }

        let lost = vehicle.modify_if_stale(link_timeout, |s| std::mem::replace(&mut s.connected, false));
        if lost {
            warn!("fc: no heartbeat for {:?}, link lost", link_timeout);
        }

        std::thread::sleep(interval);
    }
}

pub fn vehicle_state(hb: &HEARTBEAT_DATA) -> VehicleState {
    VehicleState {
        connected: true,
        armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
        mode: px4::mode_name(hb.custom_mode),
    }
}

fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn position_only_mask() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

/// Local ENU pose as a position-only LOCAL_NED setpoint.
pub fn setpoint_message(pose: &Pose, target_sys: u8, target_comp: u8, since_boot: Duration) -> MavMessage {
    let (north, east, down) = pose.to_ned();
    MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms: since_boot.as_millis() as u32,
        target_system: target_sys,
        target_component: target_comp,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask: position_only_mask(),
        x: north,
        y: east,
        z: down,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: 0.0,
        yaw_rate: 0.0,
    })
}

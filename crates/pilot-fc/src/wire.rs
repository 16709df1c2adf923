//! Byte-level halves of a MAVLink link.
//!
//! A serial port is split into a reader and a writer over `try_clone`d
//! handles, so a reader parked waiting for bytes never holds up setpoints or
//! commands. Network links keep the shared `MavConnection`, whose reads and
//! writes already lock separately.

use std::io::{self, BufReader};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, MavlinkVersion};
use tokio_serial::SerialPort;

/// Serial reads and writes give up after this long, so the reader sees the
/// stop flag and a wedged port cannot stall the tick loop.
pub const SERIAL_IO_TIMEOUT: Duration = Duration::from_millis(100);

type SharedConn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

pub enum Inbound {
    Shared(SharedConn),
    Serial(BufReader<Box<dyn SerialPort>>),
}

impl Inbound {
    /// Next frame. A serial read timeout returns `Ok(None)`.
    pub fn recv(&mut self) -> Result<Option<(MavHeader, MavMessage)>, MessageReadError> {
        let res = match self {
            Inbound::Shared(conn) => conn.recv(),
            Inbound::Serial(port) => mavlink::read_versioned_msg(port, MavlinkVersion::V2),
        };
        match res {
            Ok(frame) => Ok(Some(frame)),
            Err(MessageReadError::Io(e)) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Clone)]
pub enum Outbound {
    Shared(SharedConn),
    Serial(Arc<Mutex<Box<dyn SerialPort>>>),
}

impl Outbound {
    pub fn send(&self, hdr: MavHeader, msg: &MavMessage) -> Result<(), String> {
        match self {
            Outbound::Shared(conn) => conn.send(&hdr, msg).map(|_| ()).map_err(|e| e.to_string()),
            Outbound::Serial(port) => {
                // The port holds no state of ours, so a poisoned lock is still usable.
                let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
                mavlink::write_versioned_msg(&mut *port, MavlinkVersion::V2, hdr, msg)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
        }
    }
}

pub fn open(address: &str) -> Result<(Inbound, Outbound)> {
    if let Some((dev, baud)) = parse_serial(address) {
        let reader = tokio_serial::new(dev, baud)
            .timeout(SERIAL_IO_TIMEOUT)
            .open()
            .with_context(|| format!("open fc serial device {}", dev))?;
        let writer = reader
            .try_clone()
            .with_context(|| format!("clone fc serial device {}", dev))?;
        return Ok((
            Inbound::Serial(BufReader::new(reader)),
            Outbound::Serial(Arc::new(Mutex::new(writer))),
        ));
    }

    let conn = mavlink::connect::<MavMessage>(address)
        .with_context(|| format!("mavlink connect {}", address))?;
    let conn: SharedConn = Arc::from(conn);
    Ok((Inbound::Shared(conn.clone()), Outbound::Shared(conn)))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// "serial:/dev/ttyACM0:921600" -> ("/dev/ttyACM0", 921600)
pub fn parse_serial(address: &str) -> Option<(&str, u32)> {
    let rest = address.strip_prefix("serial:")?;
    let (dev, baud) = rest.rsplit_once(':')?;
    Some((dev, baud.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_addresses_are_split() {
        assert_eq!(parse_serial("serial:/dev/ttyACM0:921600"), Some(("/dev/ttyACM0", 921600)));
        assert_eq!(parse_serial("udpin:0.0.0.0:14540"), None);
        assert_eq!(parse_serial("serial:/dev/ttyACM0"), None);
    }

    #[test]
    fn timeouts_are_not_errors() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::UnexpectedEof)));
    }
}

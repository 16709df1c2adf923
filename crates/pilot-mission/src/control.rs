use std::fmt;

use pilot_proto::Pose;
use thiserror::Error;

/// Outbound half of the FC link.
pub trait Commander {
    /// Fire-and-forget.
    fn publish_setpoint(&mut self, pose: &Pose) -> Result<(), ControlError>;

    /// Blocks until the FC acknowledges or the transport gives up.
    fn set_mode(&mut self, mode: &str) -> Result<(), ControlError>;

    /// Blocks until the FC acknowledges or the transport gives up.
    fn arm(&mut self, value: bool) -> Result<(), ControlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    SetMode,
    Arm,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::SetMode => f.write_str("set-mode"),
            Request::Arm => f.write_str("arm"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("{request} rejected by FC ({result})")]
    RequestRejected { request: Request, result: String },

    #[error("{request} not acknowledged within {waited_ms} ms")]
    Timeout { request: Request, waited_ms: u64 },
}

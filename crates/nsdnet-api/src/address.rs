// ── Device addressing ──
//
// A device address names one remote entity a proxy stands in for:
// an interface kind plus an index within that kind.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Interface kind codes understood by NSDNet servers.
pub mod kind {
    /// The messaging device: properties, client directory, and message queue.
    pub const NSDNET: u16 = 1;
    /// Planar pose telemetry plus velocity actuation.
    pub const POSITION2D: u16 = 4;
}

/// `(kind, index)` pair identifying a remote device.
///
/// Rendered on the wire as `kind:index`, e.g. `1:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    pub kind: u16,
    pub index: u16,
}

impl DeviceAddress {
    pub const fn new(kind: u16, index: u16) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("address '{s}' is not of the form kind:index")))?;

        let kind = kind
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid device kind in address '{s}'")))?;
        let index = index
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid device index in address '{s}'")))?;

        Ok(Self { kind, index })
    }
}

//! Device communication protocols.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol a device speaks, identified by a stable integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceProtocol {
    /// GB/T 28181 national standard
    Gb28181,
    Onvif,
    Rtsp,
    Http,
    Rtmp,
    /// Vendor-private protocol
    Private,
}

impl DeviceProtocol {
    /// All protocols, in type order.
    pub const ALL: [DeviceProtocol; 6] = [
        DeviceProtocol::Gb28181,
        DeviceProtocol::Onvif,
        DeviceProtocol::Rtsp,
        DeviceProtocol::Http,
        DeviceProtocol::Rtmp,
        DeviceProtocol::Private,
    ];

    /// Integer type as stored on device records.
    pub fn type_id(&self) -> i32 {
        match self {
            DeviceProtocol::Gb28181 => 1,
            DeviceProtocol::Onvif => 2,
            DeviceProtocol::Rtsp => 3,
            DeviceProtocol::Http => 4,
            DeviceProtocol::Rtmp => 5,
            DeviceProtocol::Private => 6,
        }
    }

    /// Short code, e.g. `GB28181`.
    pub fn code(&self) -> &'static str {
        match self {
            DeviceProtocol::Gb28181 => "GB28181",
            DeviceProtocol::Onvif => "ONVIF",
            DeviceProtocol::Rtsp => "RTSP",
            DeviceProtocol::Http => "HTTP",
            DeviceProtocol::Rtmp => "RTMP",
            DeviceProtocol::Private => "PRIVATE",
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            DeviceProtocol::Gb28181 => "GB28181 national standard protocol",
            DeviceProtocol::Onvif => "ONVIF protocol",
            DeviceProtocol::Rtsp => "RTSP protocol",
            DeviceProtocol::Http => "HTTP protocol",
            DeviceProtocol::Rtmp => "RTMP protocol",
            DeviceProtocol::Private => "Private protocol",
        }
    }

    /// Look up a protocol by integer type.
    pub fn from_type(type_id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.type_id() == type_id)
    }

    /// Look up a protocol by code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl fmt::Display for DeviceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<i32> for DeviceProtocol {
    type Error = i32;

    fn try_from(type_id: i32) -> Result<Self, Self::Error> {
        Self::from_type(type_id).ok_or(type_id)
    }
}

impl FromStr for DeviceProtocol {
    type Err = String;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::from_code(code).ok_or_else(|| format!("unknown device protocol code '{}'", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trip() {
        for protocol in DeviceProtocol::ALL {
            assert_eq!(DeviceProtocol::from_type(protocol.type_id()), Some(protocol));
        }
        assert_eq!(DeviceProtocol::Gb28181.type_id(), 1);
        assert_eq!(DeviceProtocol::Private.type_id(), 6);
    }

    #[test]
    fn test_unknown_type_and_code() {
        assert_eq!(DeviceProtocol::from_type(0), None);
        assert_eq!(DeviceProtocol::try_from(99), Err(99));
        assert!("SIP".parse::<DeviceProtocol>().is_err());
    }

    #[test]
    fn test_code_lookup() {
        assert_eq!("ONVIF".parse::<DeviceProtocol>(), Ok(DeviceProtocol::Onvif));
        assert_eq!(DeviceProtocol::from_code("GB28181"), Some(DeviceProtocol::Gb28181));
        assert_eq!(DeviceProtocol::Rtsp.to_string(), "RTSP");
    }
}

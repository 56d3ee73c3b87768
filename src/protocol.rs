use serde::{Deserialize, Serialize};

/// Leadership status of the unit answering at an address
pub const DEVICE_PATH: &str = "/ipcontrol/v1/devices/current";

/// Volume of the current source on the current system
///
/// Firmware lookups for the system and source ids are unreliable, so the
/// `current` aliases are used unconditionally.
pub const VOLUME_PATH: &str = "/ipcontrol/v1/systems/current/sources/current/soundControl/volume";

/// Native mute toggle (not reliable on all firmware)
pub const MUTE_PATH: &str = "/ipcontrol/v1/systems/current/sources/current/soundControl/mute";

/// Build a request URL for an endpoint (`host`, `host:port` or `[v6]:port`)
pub fn url(endpoint: &str, path: &str) -> String {
    format!("http://{}{}", endpoint, path)
}

/// Response body of [`DEVICE_PATH`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "isSystemLeader", default)]
    pub is_system_leader: bool,

    #[serde(rename = "deviceName", default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(rename = "systemId", default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
}

/// Volume body, both for reads and writes of [`VOLUME_PATH`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub volume: u8,
}

/// Request body of [`MUTE_PATH`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mute {
    pub muted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_endpoint_and_path() {
        assert_eq!(
            url("10.0.0.5", VOLUME_PATH),
            "http://10.0.0.5/ipcontrol/v1/systems/current/sources/current/soundControl/volume"
        );
        assert_eq!(
            url("[fe80::1]:8080", DEVICE_PATH),
            "http://[fe80::1]:8080/ipcontrol/v1/devices/current"
        );
    }

    #[test]
    fn device_info_tolerates_extra_fields() {
        let info: DeviceInfo = serde_json::from_str(
            r#"{"isSystemLeader": true, "deviceName": "Left", "model": "Phantom I", "role": "FrontLeft"}"#,
        )
        .unwrap();
        assert!(info.is_system_leader);
        assert_eq!(info.device_name.as_deref(), Some("Left"));

        let info: DeviceInfo = serde_json::from_str("{}").unwrap();
        assert!(!info.is_system_leader);
    }

    #[test]
    fn volume_rejects_out_of_range_bodies() {
        assert!(serde_json::from_str::<Volume>(r#"{"volume": -1}"#).is_err());
        assert!(serde_json::from_str::<Volume>(r#"{"level": 3}"#).is_err());
        assert_eq!(
            serde_json::to_value(Volume { volume: 42 }).unwrap(),
            serde_json::json!({ "volume": 42 })
        );
    }
}

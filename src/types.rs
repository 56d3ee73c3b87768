use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Raw scancode as reported by the remote-control receiver
pub type Scancode = u32;

/// Endpoint string: `host`, `host:port` or `[v6]:port`
pub type Endpoint = String;

/// Semantic action bound to a scancode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    VolumeUp,
    VolumeDown,
    Mute,
    Unmute,
}

impl Action {
    /// Parse a configured action name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "volume_up" => Some(Action::VolumeUp),
            "volume_down" => Some(Action::VolumeDown),
            "mute" => Some(Action::Mute),
            "unmute" => Some(Action::Unmute),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::VolumeUp => "volume_up",
            Action::VolumeDown => "volume_down",
            Action::Mute => "mute",
            Action::Unmute => "unmute",
        }
    }

    /// Debounce class this action belongs to, if any
    pub fn debounce_class(&self) -> Option<DebounceClass> {
        match self {
            Action::VolumeUp | Action::VolumeDown => Some(DebounceClass::Volume),
            Action::Mute | Action::Unmute => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Group of actions sharing one debounce timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebounceClass {
    Volume,
}

/// How mute requests reach the speaker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MuteStrategy {
    /// Volume 0 on mute, restore the remembered volume on unmute
    #[default]
    Emulated,
    /// Native mute endpoint
    Native,
}

/// A service announced by a discovery transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Advertised service name
    pub name: String,
    /// Resolved endpoints, preferred first
    pub addresses: Vec<Endpoint>,
}

impl Candidate {
    pub fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Endpoint>,
    {
        Self {
            name: name.into(),
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a candidate from resolved IP addresses, IPv4 first
    pub fn from_ips<'a>(name: impl Into<String>, ips: impl IntoIterator<Item = &'a IpAddr>) -> Self {
        let mut ips: Vec<IpAddr> = ips.into_iter().copied().collect();
        ips.sort_by_key(|ip| (ip.is_ipv6(), *ip));
        Self {
            name: name.into(),
            addresses: ips.iter().map(endpoint_for).collect(),
        }
    }

    /// Case-insensitive substring match of the advertised name
    pub fn matches(&self, target: &str) -> bool {
        self.name.to_lowercase().contains(&target.to_lowercase())
    }
}

/// Endpoint string for an IP on the default HTTP port
pub fn endpoint_for(ip: &IpAddr) -> Endpoint {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

/// Observable state of the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active endpoint, discovery may be running
    Unresolved,
    /// A candidate is being checked for leadership
    Validating,
    /// Requests go to this endpoint
    Active(Endpoint),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unresolved => f.write_str("unresolved"),
            ConnectionState::Validating => f.write_str("validating"),
            ConnectionState::Active(endpoint) => write!(f, "active ({})", endpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Phantom-Living._http._tcp.local.", "Phantom", true)]
    #[case("PHANTOM gold", "phantom", true)]
    #[case("phantom", "Phantom", true)]
    #[case("Kitchen Sonos", "Phantom", false)]
    #[case("Phan", "Phantom", false)]
    fn candidate_name_matching(#[case] name: &str, #[case] target: &str, #[case] expected: bool) {
        let candidate = Candidate::new(name, ["10.0.0.5"]);
        assert_eq!(candidate.matches(target), expected);
    }

    #[test]
    fn ipv4_addresses_come_first() {
        let ips: Vec<IpAddr> = vec!["fe80::1".parse().unwrap(), "10.0.0.5".parse().unwrap()];
        let candidate = Candidate::from_ips("Phantom", &ips);
        assert_eq!(candidate.addresses, vec!["10.0.0.5", "[fe80::1]"]);
    }

    #[test]
    fn action_names() {
        for action in [Action::VolumeUp, Action::VolumeDown, Action::Mute, Action::Unmute] {
            assert_eq!(Action::from_name(action.name()), Some(action));
        }
        assert_eq!(Action::from_name("power"), None);
        assert_eq!(Action::Mute.debounce_class(), None);
        assert_eq!(Action::VolumeDown.debounce_class(), Some(DebounceClass::Volume));
    }
}

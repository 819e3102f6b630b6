//! Handshake record and the process protocol state machine.
//!
//! The host passes the magic cookie (and the application protocol versions
//! it supports) through the environment. The plugin checks the cookie,
//! picks a version and announces it on the first stdout line:
//! `CORE|APP|NETWORK|ADDR|PROTOCOL`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Version of the line format and envelope framing itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Environment variable through which the host lists the versions it accepts.
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Transport announced by plugins in this system.
pub const NETWORK_STDIO: &str = "stdio";

/// Envelope protocol announced by plugins in this system.
pub const PROTOCOL_JSONRPC: &str = "jsonrpc";

/// Pre-shared startup record. Both sides must be built with the same values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            magic_cookie_key: "PLUGIN_MAGIC_COOKIE".to_string(),
            magic_cookie_value: "hello".to_string(),
        }
    }
}

impl HandshakeConfig {
    /// Check the cookie using `lookup` to read the environment.
    pub fn validate_cookie<F>(&self, lookup: F) -> Result<(), HandshakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(&self.magic_cookie_key) {
            None => Err(HandshakeError::CookieMissing {
                key: self.magic_cookie_key.clone(),
            }),
            Some(v) if v == self.magic_cookie_value => Ok(()),
            Some(_) => Err(HandshakeError::CookieMismatch {
                key: self.magic_cookie_key.clone(),
            }),
        }
    }

    /// Plugin side: pick the application protocol version to announce.
    ///
    /// `host_versions` is the raw value of [`PROTOCOL_VERSIONS_ENV`]; when the
    /// host did not set it, the plugin's own version is used as is.
    pub fn negotiate_version(&self, host_versions: Option<&str>) -> Result<u32, HandshakeError> {
        let Some(raw) = host_versions.filter(|s| !s.trim().is_empty()) else {
            return Ok(self.protocol_version);
        };
        let host = parse_version_list(raw)?;
        if host.contains(&self.protocol_version) {
            Ok(self.protocol_version)
        } else {
            Err(HandshakeError::NoCommonVersion {
                plugin: self.protocol_version,
                host,
            })
        }
    }

    /// Line the plugin prints once it is ready to serve.
    pub fn handshake_line(&self, app_version: u32) -> HandshakeLine {
        HandshakeLine {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
            network: NETWORK_STDIO.to_string(),
            address: "-".to_string(),
            protocol: PROTOCOL_JSONRPC.to_string(),
        }
    }
}

/// Parse a comma-separated version list such as `"1,2"`.
pub fn parse_version_list(raw: &str) -> Result<Vec<u32>, HandshakeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| HandshakeError::Malformed(format!("bad protocol version {s:?}")))
        })
        .collect()
}

/// Render a version list for [`PROTOCOL_VERSIONS_ENV`].
pub fn format_version_list(versions: &[u32]) -> String {
    versions
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// The plugin's announcement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub app_version: u32,
    pub network: String,
    pub address: String,
    pub protocol: String,
}

impl HandshakeLine {
    /// Host side: accept the line only if both versions are supported.
    pub fn check(&self, supported: &[u32]) -> Result<u32, HandshakeError> {
        if self.core_version != CORE_PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedCoreVersion {
                got: self.core_version,
                expected: CORE_PROTOCOL_VERSION,
            });
        }
        if !supported.contains(&self.app_version) {
            return Err(HandshakeError::UnsupportedVersion {
                got: self.app_version,
                supported: supported.to_vec(),
            });
        }
        if self.network != NETWORK_STDIO || self.protocol != PROTOCOL_JSONRPC {
            return Err(HandshakeError::Malformed(format!(
                "unsupported transport {}/{}",
                self.network, self.protocol
            )));
        }
        Ok(self.app_version)
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.protocol
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('|').collect();
        if parts.len() != 5 {
            return Err(HandshakeError::Malformed(s.trim().to_string()));
        }
        let version = |raw: &str| {
            raw.parse::<u32>()
                .map_err(|_| HandshakeError::Malformed(s.trim().to_string()))
        };
        Ok(Self {
            core_version: version(parts[0])?,
            app_version: version(parts[1])?,
            network: parts[2].to_string(),
            address: parts[3].to_string(),
            protocol: parts[4].to_string(),
        })
    }
}

/// Lifecycle of one plugin process as seen by either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    Unstarted,
    Handshaking,
    Ready,
    Terminated,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolState::Unstarted => "unstarted",
            ProtocolState::Handshaking => "handshaking",
            ProtocolState::Ready => "ready",
            ProtocolState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Inputs that drive [`ProtocolState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent {
    Spawned,
    HandshakeSucceeded,
    HandshakeFailed,
    Disconnected,
}

impl fmt::Display for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ProtocolState {
    pub fn next(self, event: ProtocolEvent) -> Result<ProtocolState, HandshakeError> {
        use ProtocolEvent::*;
        use ProtocolState::*;
        match (self, event) {
            (Unstarted, Spawned) => Ok(Handshaking),
            (Handshaking, HandshakeSucceeded) => Ok(Ready),
            (Handshaking, HandshakeFailed) => Ok(Terminated),
            (_, Disconnected) => Ok(Terminated),
            (from, event) => Err(HandshakeError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }

    /// Whether RPC calls may be dispatched in this state.
    pub fn accepts_calls(self) -> bool {
        self == ProtocolState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cookie_present_and_matching() {
        let cfg = HandshakeConfig::default();
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "hello")]);
        assert!(cfg.validate_cookie(|k| vars.get(k).cloned()).is_ok());
    }

    #[test]
    fn test_cookie_missing() {
        let cfg = HandshakeConfig::default();
        let err = cfg.validate_cookie(|_| None).unwrap_err();
        assert!(matches!(err, HandshakeError::CookieMissing { .. }));
    }

    #[test]
    fn test_cookie_mismatch() {
        let cfg = HandshakeConfig::default();
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "goodbye")]);
        let err = cfg.validate_cookie(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, HandshakeError::CookieMismatch { .. }));
    }

    #[test]
    fn test_negotiate_without_host_list_uses_own_version() {
        let cfg = HandshakeConfig::default();
        assert_eq!(cfg.negotiate_version(None).unwrap(), 1);
        assert_eq!(cfg.negotiate_version(Some("")).unwrap(), 1);
    }

    #[test]
    fn test_negotiate_with_overlap_and_without() {
        let cfg = HandshakeConfig::default();
        assert_eq!(cfg.negotiate_version(Some("1, 2")).unwrap(), 1);
        let err = cfg.negotiate_version(Some("2,3")).unwrap_err();
        assert_eq!(err, HandshakeError::NoCommonVersion { plugin: 1, host: vec![2, 3] });
        assert!(matches!(
            cfg.negotiate_version(Some("x")),
            Err(HandshakeError::Malformed(_))
        ));
    }

    #[test]
    fn test_handshake_line_parse_and_display() {
        let line: HandshakeLine = "1|1|stdio|-|jsonrpc\n".parse().unwrap();
        assert_eq!(line.app_version, 1);
        assert_eq!(line.to_string(), "1|1|stdio|-|jsonrpc");
        assert_eq!(line, HandshakeConfig::default().handshake_line(1));
    }

    #[test]
    fn test_handshake_line_rejects_garbage() {
        assert!("hello world".parse::<HandshakeLine>().is_err());
        assert!("a|1|stdio|-|jsonrpc".parse::<HandshakeLine>().is_err());
    }

    #[test]
    fn test_host_rejects_unsupported_versions() {
        let line = HandshakeConfig::default().handshake_line(3);
        assert!(matches!(
            line.check(&[1, 2]),
            Err(HandshakeError::UnsupportedVersion { got: 3, .. })
        ));
        let mut core = HandshakeConfig::default().handshake_line(1);
        core.core_version = 9;
        assert!(matches!(
            core.check(&[1]),
            Err(HandshakeError::UnsupportedCoreVersion { got: 9, .. })
        ));
        assert_eq!(HandshakeConfig::default().handshake_line(2).check(&[1, 2]).unwrap(), 2);
    }

    #[test]
    fn test_state_machine_happy_path() {
        let s = ProtocolState::Unstarted;
        let s = s.next(ProtocolEvent::Spawned).unwrap();
        assert_eq!(s, ProtocolState::Handshaking);
        assert!(!s.accepts_calls());
        let s = s.next(ProtocolEvent::HandshakeSucceeded).unwrap();
        assert!(s.accepts_calls());
        let s = s.next(ProtocolEvent::Disconnected).unwrap();
        assert_eq!(s, ProtocolState::Terminated);
    }

    #[test]
    fn test_state_machine_failure_terminates() {
        let s = ProtocolState::Handshaking
            .next(ProtocolEvent::HandshakeFailed)
            .unwrap();
        assert_eq!(s, ProtocolState::Terminated);
        assert!(s.next(ProtocolEvent::HandshakeSucceeded).is_err());
        assert!(ProtocolState::Ready.next(ProtocolEvent::Spawned).is_err());
    }
}

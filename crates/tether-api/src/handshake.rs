use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use tether_model::PluginType;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable a host sets before launching a plugin.
pub const COOKIE_KEY: &str = "TETHER_PLUGIN_COOKIE";
pub const COOKIE_VALUE: &str = "6b0e3f1a9c2d4e58tether";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("malformed handshake line {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    #[error("protocol version mismatch: host speaks {expected}, plugin speaks {got}")]
    Version { expected: u32, got: u32 },

    #[error("plugin type mismatch: expected {expected}, plugin is {got}")]
    PluginType { expected: PluginType, got: PluginType },

    #[error("unsupported network {0:?} (expected: tcp)")]
    Network(String),

    #[error("invalid plugin address {0:?}")]
    Address(String),
}

/// First stdout line of a plugin: `<version>|<type>|<network>|<address>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    pub plugin_type: PluginType,
    pub network: String,
    pub address: String,
}

impl Handshake {
    pub fn tcp(plugin_type: PluginType, addr: SocketAddr) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            plugin_type,
            network: "tcp".to_string(),
            address: addr.to_string(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let line = line.trim();
        let malformed = |reason: &str| HandshakeError::Malformed {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = line.split('|').collect();
        let [version, kind, network, address] = parts.as_slice() else {
            return Err(malformed("expected 4 fields"));
        };

        let protocol_version = version
            .parse::<u32>()
            .map_err(|_| malformed("protocol version is not a number"))?;
        let plugin_type = kind
            .parse::<PluginType>()
            .map_err(|_| malformed("unknown plugin type"))?;
        if network.is_empty() || address.is_empty() {
            return Err(malformed("empty network or address"));
        }

        Ok(Self {
            protocol_version,
            plugin_type,
            network: network.to_string(),
            address: address.to_string(),
        })
    }

    /// Check the handshake against what the host expects and return the address
    /// to dial.
    pub fn validate(
        &self,
        expected_version: u32,
        expected_type: PluginType,
    ) -> Result<SocketAddr, HandshakeError> {
        if self.protocol_version != expected_version {
            return Err(HandshakeError::Version {
                expected: expected_version,
                got: self.protocol_version,
            });
        }
        if self.plugin_type != expected_type {
            return Err(HandshakeError::PluginType {
                expected: expected_type,
                got: self.plugin_type,
            });
        }
        if self.network != "tcp" {
            return Err(HandshakeError::Network(self.network.clone()));
        }
        self.address
            .parse()
            .map_err(|_| HandshakeError::Address(self.address.clone()))
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.protocol_version, self.plugin_type, self.network, self.address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let addr: SocketAddr = "127.0.0.1:40123".parse().unwrap();
        let hs = Handshake::tcp(PluginType::Driver, addr);
        assert_eq!(hs.to_string(), "1|driver|tcp|127.0.0.1:40123");
        assert_eq!(Handshake::parse("1|driver|tcp|127.0.0.1:40123\n").unwrap(), hs);
        assert_eq!(hs.validate(PROTOCOL_VERSION, PluginType::Driver).unwrap(), addr);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for line in [
            "",
            "hello world",
            "1|driver|tcp",
            "1|driver|tcp|127.0.0.1:1|grpc",
            "x|driver|tcp|127.0.0.1:1",
            "1|network|tcp|127.0.0.1:1",
            "1|driver||127.0.0.1:1",
        ] {
            assert!(
                matches!(Handshake::parse(line), Err(HandshakeError::Malformed { .. })),
                "{line:?} should be rejected"
            );
        }
    }

    #[test]
    fn validation_failures() {
        let hs = Handshake::parse("2|device|tcp|127.0.0.1:9000").unwrap();
        assert_eq!(
            hs.validate(1, PluginType::Device),
            Err(HandshakeError::Version {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            hs.validate(2, PluginType::Driver),
            Err(HandshakeError::PluginType {
                expected: PluginType::Driver,
                got: PluginType::Device
            })
        );

        let unix = Handshake::parse("1|driver|unix|/tmp/plugin.sock").unwrap();
        assert_eq!(
            unix.validate(1, PluginType::Driver),
            Err(HandshakeError::Network("unix".into()))
        );

        let bad = Handshake::parse("1|driver|tcp|localhost").unwrap();
        assert!(matches!(
            bad.validate(1, PluginType::Driver),
            Err(HandshakeError::Address(_))
        ));
    }
}

//! ZeroMQ endpoint addressing.

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Where a socket binds or connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix-domain socket; fastest same-host option.
    Ipc(String),
    /// TCP for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn ipc(path: impl Into<String>) -> Self {
        Self::Ipc(path.into())
    }

    /// The ZeroMQ endpoint string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{path}"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Parse a configured endpoint like `tcp://127.0.0.1:5555` or
    /// `ipc:///tmp/vigil.sock`.
    pub fn parse(endpoint: &str) -> Result<Self, BusError> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(BusError::Endpoint("empty ipc path".to_string()));
            }
            return Ok(Self::Ipc(path.to_string()));
        }
        if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| BusError::Endpoint(format!("missing port in '{endpoint}'")))?;
            let port = port
                .parse()
                .map_err(|_| BusError::Endpoint(format!("bad port in '{endpoint}'")))?;
            if host.is_empty() {
                return Err(BusError::Endpoint(format!("missing host in '{endpoint}'")));
            }
            return Ok(Self::tcp(host, port));
        }
        Err(BusError::Endpoint(format!(
            "unsupported endpoint '{endpoint}' (expected tcp:// or ipc://)"
        )))
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint())
    }
}

impl std::str::FromStr for Transport {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for endpoint in ["tcp://127.0.0.1:5555", "ipc:///tmp/vigil.sock"] {
            assert_eq!(Transport::parse(endpoint).unwrap().endpoint(), endpoint);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Transport::parse("http://x").is_err());
        assert!(Transport::parse("tcp://nohost").is_err());
        assert!(Transport::parse("tcp://:1234").is_err());
        assert!(Transport::parse("ipc://").is_err());
    }
}

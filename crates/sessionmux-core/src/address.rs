//! Network endpoint identifier.
//!
//! The routing layer treats an [`Address`] as an opaque key. Parsing and
//! formatting exist for transports and logs, nothing in the routing path
//! looks inside.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Host and port of a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("missing port in {s:?}")))?;
        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("missing host in {s:?}")));
        }
        let port = port
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("bad port in {s:?}: {e}")))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_is_host_colon_port() {
        assert_eq!(Address::new("10.0.0.1", 4801).to_string(), "10.0.0.1:4801");
    }

    #[test]
    fn parses_host_and_port() {
        let addr: Address = "localhost:9000".parse().unwrap();
        assert_eq!(addr.host(), "localhost");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn rejects_missing_or_bad_port() {
        assert!("localhost".parse::<Address>().is_err());
        assert!(":80".parse::<Address>().is_err());
        assert!("localhost:http".parse::<Address>().is_err());
        assert!("localhost:70000".parse::<Address>().is_err());
    }
}

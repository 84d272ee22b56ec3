//! Aether addresses: `scheme://host[:port][/dim1:dim2:...]`.

use crate::error::{ProtocolError, ProtocolResult};
use aether_tree::Dimension;
use std::fmt;
use std::str::FromStr;

/// Port used when an address does not name one.
pub const DEFAULT_PORT: u16 = 6969;

/// Wire format selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// Length-prefixed CBOR frames (`aep`, `aebp`).
    #[default]
    Binary,
    /// One JSON token per line (`aetp`).
    Text,
    /// External record format (`aexp`). Parsed, but has no codec here.
    External,
}

impl WireFormat {
    /// Returns the canonical scheme for this format.
    pub fn scheme(self) -> &'static str {
        match self {
            WireFormat::Binary => "aep",
            WireFormat::Text => "aetp",
            WireFormat::External => "aexp",
        }
    }

    /// Looks a format up by scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "aep" | "aebp" => Some(WireFormat::Binary),
            "aetp" => Some(WireFormat::Text),
            "aexp" => Some(WireFormat::External),
            _ => None,
        }
    }
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "binary" => Ok(WireFormat::Binary),
            "text" => Ok(WireFormat::Text),
            other => Self::from_scheme(other)
                .ok_or_else(|| ProtocolError::UnsupportedScheme(other.into())),
        }
    }
}

/// A parsed aether address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AetherUrl {
    /// Wire format from the scheme.
    pub format: WireFormat,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Position in the tree.
    pub dimension: Dimension,
}

impl AetherUrl {
    /// Parses an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unknown, the host is missing, the
    /// port is not a number, or the dimension is malformed.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let (scheme, rest) = text
            .split_once("://")
            .ok_or_else(|| ProtocolError::UnsupportedScheme(text.to_string()))?;
        let format = WireFormat::from_scheme(scheme)
            .ok_or_else(|| ProtocolError::UnsupportedScheme(scheme.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(at) => rest.split_at(at),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ProtocolError::codec(format!("bad port in {text:?}")))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ProtocolError::codec(format!("missing host in {text:?}")));
        }

        Ok(Self {
            format,
            host: host.to_string(),
            port,
            dimension: Dimension::parse(path)?,
        })
    }

    /// Returns `host:port` for socket connection.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the same address at another dimension.
    pub fn with_dimension(&self, dimension: Dimension) -> Self {
        Self {
            dimension,
            ..self.clone()
        }
    }
}

impl FromStr for AetherUrl {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AetherUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.format.scheme(), self.host, self.port)?;
        if !self.dimension.is_root() {
            write!(f, "/{}", self.dimension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full() {
        let url = AetherUrl::parse("aetp://example.org:7000/rooms:lobby").unwrap();
        assert_eq!(url.format, WireFormat::Text);
        assert_eq!(url.host, "example.org");
        assert_eq!(url.port, 7000);
        assert_eq!(url.dimension, "rooms:lobby".parse().unwrap());
        assert_eq!(url.to_string(), "aetp://example.org:7000/rooms:lobby");
    }

    #[test]
    fn defaults() {
        let url = AetherUrl::parse("aep://localhost").unwrap();
        assert_eq!(url.format, WireFormat::Binary);
        assert_eq!(url.port, DEFAULT_PORT);
        assert!(url.dimension.is_root());
        assert_eq!(url.authority(), "localhost:6969");
    }

    #[test]
    fn scheme_variants() {
        assert_eq!(AetherUrl::parse("aebp://h").unwrap().format, WireFormat::Binary);
        assert_eq!(AetherUrl::parse("aexp://h").unwrap().format, WireFormat::External);
        assert!(matches!(
            AetherUrl::parse("http://h"),
            Err(ProtocolError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(AetherUrl::parse("aep://h:notaport").is_err());
        assert!(AetherUrl::parse("aep://:6969").is_err());
        assert!(AetherUrl::parse("aep://h/a::b").is_err());
        assert!(AetherUrl::parse("no-scheme").is_err());
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Maximum Unix socket path length.
/// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS and most BSDs.
#[cfg(target_os = "linux")]
const MAX_UNIX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_UNIX_PATH_LEN: usize = 104;

/// Port a `ws://` URL names when it omits one.
const DEFAULT_WS_PORT: u16 = 80;

/// Where a device link connects to.
///
/// Accepted forms:
/// - `ws://host[:port][/path]`, a WebSocket carrying frames as binary messages
/// - `tcp://host:port` or bare `host:port` (IPv6 hosts in brackets: `[::1]:9001`)
/// - `unix:///path/to/device.sock`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// WebSocket server. `path` always starts with `/`.
    Ws {
        host: String,
        port: u16,
        path: String,
    },
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Build a WebSocket endpoint at the root path.
    pub fn ws(host: impl Into<String>, port: u16) -> Self {
        Self::Ws {
            host: host.into(),
            port,
            path: "/".to_string(),
        }
    }

    /// Build a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Build a Unix domain socket endpoint, validating the path length.
    pub fn unix(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let len = path.as_os_str().len();
        if len >= MAX_UNIX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_UNIX_PATH_LEN,
            });
        }
        Ok(Self::Unix(path))
    }

    /// Parse an endpoint string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = |reason| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("endpoint must not be empty"));
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("unix endpoint requires a socket path"));
            }
            return Self::unix(path);
        }

        if let Some(rest) = trimmed.strip_prefix("ws://") {
            let (authority, path) = match rest.find('/') {
                Some(at) => rest.split_at(at),
                None => (rest, "/"),
            };
            let (host, port) =
                split_host_port(authority, Some(DEFAULT_WS_PORT)).map_err(invalid)?;
            return Ok(Self::Ws {
                host: host.to_string(),
                port,
                path: path.to_string(),
            });
        }

        let authority = match trimmed.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(("wss", _)) => return Err(invalid("TLS WebSocket endpoints are not supported")),
            Some(_) => {
                return Err(invalid(
                    "unsupported scheme (expected ws://, tcp:// or unix://)",
                ))
            }
            None => trimmed,
        };
        let (host, port) =
            split_host_port(authority.trim_end_matches('/'), None).map_err(invalid)?;
        Ok(Self::tcp(host, port))
    }

    /// Short transport kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ws { .. } => "ws",
            Self::Tcp { .. } => "tcp",
            Self::Unix(_) => "unix",
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws { host, port, path } if host.contains(':') => {
                write!(f, "ws://[{host}]:{port}{path}")
            }
            Self::Ws { host, port, path } => write!(f, "ws://{host}:{port}{path}"),
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Split `host:port`, stripping IPv6 brackets. `default_port` applies when
/// the port is omitted.
fn split_host_port(
    authority: &str,
    default_port: Option<u16>,
) -> std::result::Result<(&str, u16), &'static str> {
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if !port.ends_with(']') => (host, Some(port)),
        _ => (authority, None),
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err("missing host");
    }
    let port = match (port, default_port) {
        (Some(port), _) => port.parse().map_err(|_| "port is not a number")?,
        (None, Some(port)) => port,
        (None, None) => return Err("missing port"),
    };
    if port == 0 {
        return Err("port must be non-zero");
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host_port() {
        let ep = Endpoint::parse("192.168.4.1:9001").unwrap();
        assert_eq!(ep, Endpoint::tcp("192.168.4.1", 9001));
    }

    #[test]
    fn parses_tcp_scheme_with_trailing_slash() {
        let ep: Endpoint = "tcp://robot.local:9001/".parse().unwrap();
        assert_eq!(ep, Endpoint::tcp("robot.local", 9001));
        assert_eq!(ep.to_string(), "tcp://robot.local:9001");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep = Endpoint::parse("tcp://[::1]:7000").unwrap();
        assert_eq!(ep, Endpoint::tcp("::1", 7000));
        assert_eq!(ep.to_string(), "tcp://[::1]:7000");
    }

    #[test]
    fn parses_unix_path() {
        let ep = Endpoint::parse("unix:///tmp/robot.sock").unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/robot.sock")));
        assert_eq!(ep.kind(), "unix");
    }

    #[test]
    fn rejects_malformed_inputs() {
        for input in ["", "   ", "robot", ":9001", "host:abc", "host:0", "ws://:9001", "wss://host/", "http://host:80", "unix://"] {
            let err = Endpoint::parse(input).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{input:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn rejects_overlong_unix_path() {
        let long = format!("/tmp/{}", "x".repeat(200));
        let err = Endpoint::unix(long).unwrap_err();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn parses_ws_urls() {
        let ep = Endpoint::parse("ws://192.168.4.1:9001").unwrap();
        assert_eq!(ep, Endpoint::ws("192.168.4.1", 9001));
        assert_eq!(ep.kind(), "ws");
        assert_eq!(ep.to_string(), "ws://192.168.4.1:9001/");

        let ep = Endpoint::parse("ws://robot.local/telemetry").unwrap();
        assert_eq!(
            ep,
            Endpoint::Ws {
                host: "robot.local".to_string(),
                port: 80,
                path: "/telemetry".to_string(),
            }
        );
        assert_eq!(ep.to_string(), "ws://robot.local:80/telemetry");

        let ep = Endpoint::parse("ws://[::1]:9001").unwrap();
        assert_eq!(ep, Endpoint::ws("::1", 9001));
        assert_eq!(ep.to_string(), "ws://[::1]:9001/");
        assert_ne!(ep, Endpoint::tcp("::1", 9001));
    }
}

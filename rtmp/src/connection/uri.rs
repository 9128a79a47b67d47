use std::net::IpAddr;
use thiserror::Error;

/// Port used when an RTMP URI does not specify one
pub const DEFAULT_RTMP_PORT: u16 = 1935;

/// Reasons an RTMP URI could not be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriParseError {
    #[error("The URI does not start with rtmp://")]
    InvalidScheme,

    #[error("The URI has no host")]
    MissingHost,

    #[error("The port '{0}' is not a valid port number")]
    InvalidPort(String),

    #[error("The URI has no application name")]
    MissingApplication,

    #[error("The URI has no stream path after the application name")]
    MissingStreamPath,
}

/// The parts of an `rtmp://host[:port]/app/stream-path` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUri {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_path: String,
}

impl RtmpUri {
    pub fn parse(uri: &str) -> Result<RtmpUri, UriParseError> {
        let rest = match uri.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("rtmp://") => &uri[7..],
            _ => return Err(UriParseError::InvalidScheme),
        };

        let slash = rest.find('/').ok_or(UriParseError::MissingApplication)?;
        let (authority, path) = (&rest[..slash], &rest[slash + 1..]);
        let (host, port) = split_authority(authority)?;

        let (app, stream_path) = match path.find('/') {
            Some(index) => (&path[..index], &path[index + 1..]),
            None => (path, ""),
        };

        if app.is_empty() {
            return Err(UriParseError::MissingApplication);
        }

        if stream_path.is_empty() {
            return Err(UriParseError::MissingStreamPath);
        }

        Ok(RtmpUri {
            host: host.to_string(),
            port,
            app: app.to_string(),
            stream_path: stream_path.to_string(),
        })
    }

    /// The host as an IP address, when it is written as one
    pub fn ip_address(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

fn split_authority(authority: &str) -> Result<(&str, u16), UriParseError> {
    let (host, port) = if authority.starts_with('[') {
        // Bracketed IPv6 literal
        let end = authority.find(']').ok_or(UriParseError::MissingHost)?;
        let host = &authority[1..end];
        match &authority[end + 1..] {
            "" => (host, None),
            x if x.starts_with(':') => (host, Some(&x[1..])),
            _ => return Err(UriParseError::MissingHost),
        }
    } else {
        match authority.find(':') {
            Some(index) => (&authority[..index], Some(&authority[index + 1..])),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(UriParseError::MissingHost);
    }

    let port = match port {
        None | Some("") => DEFAULT_RTMP_PORT,
        Some(value) => value
            .parse::<u16>()
            .map_err(|_| UriParseError::InvalidPort(value.to_string()))?,
    };

    Ok((host, port))
}

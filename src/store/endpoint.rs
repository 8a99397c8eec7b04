use std::fmt;

use crate::Result;
use crate::TransportError;
use crate::DEFAULT_STORE_PORT;

/// One configured backend endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
}

impl EndpointDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Accepts `host`, `host:port`, `http://host:port` and
    /// `https://host:port`. The port defaults to 2379, the host to
    /// `localhost`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let authority = match trimmed.split_once("://") {
            Some(("http", rest)) | Some(("https", rest)) => rest,
            Some(_) => return Err(TransportError::InvalidUri(raw.to_string()).into()),
            None => trimmed,
        };
        let authority = authority.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| TransportError::InvalidUri(raw.to_string()))?;
                (host, port)
            }
            None => (authority, DEFAULT_STORE_PORT),
        };

        if host.contains(':') {
            return Err(TransportError::InvalidUri(raw.to_string()).into());
        }
        let host = if host.is_empty() { "localhost" } else { host };

        Ok(Self::new(host, port))
    }

    /// `"host:port"`, the identity used by the down-set and status output
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// `"host:port"` from an advertised client URL such as `http://10.0.0.1:2379`
pub(crate) fn label_from_url(url: &str) -> Option<String> {
    EndpointDescriptor::parse(url).ok().map(|e| e.label())
}

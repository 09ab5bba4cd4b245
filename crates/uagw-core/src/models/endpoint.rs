//! OPC-UA endpoint URL

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BackendError, BackendResult};

/// URL scheme of the OPC-UA binary protocol over TCP
pub const OPC_TCP_SCHEME: &str = "opc.tcp";

/// Default OPC-UA port when the URL does not carry one
pub const DEFAULT_OPC_TCP_PORT: u16 = 4840;

/// A syntactically valid `opc.tcp://host[:port][/path]` URL.
///
/// Only the syntax is checked. Whether anything listens there is the
/// connector's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointUrl {
    raw: String,
    host: String,
    port: u16,
}

impl EndpointUrl {
    pub fn parse(raw: &str) -> BackendResult<Self> {
        let invalid = |reason: &str| BackendError::InvalidEndpoint {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != OPC_TCP_SCHEME {
            return Err(invalid(&format!(
                "scheme must be '{}', got '{}'",
                OPC_TCP_SCHEME,
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        Ok(Self {
            raw: raw.to_string(),
            host,
            port: url.port().unwrap_or(DEFAULT_OPC_TCP_PORT),
        })
    }

    /// The URL exactly as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for EndpointUrl {
    type Error = BackendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EndpointUrl> for String {
    fn from(value: EndpointUrl) -> Self {
        value.raw
    }
}

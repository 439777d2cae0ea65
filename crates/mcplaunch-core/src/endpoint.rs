//! Backend endpoint addressing.

use std::fmt;

use serde::Serialize;

/// Address of the backend started for this session.
///
/// Fixed once the port is allocated; both the `host:port` form and the
/// `http://host:port` URL form are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendEndpoint {
    /// Host the backend binds to.
    pub host: String,
    /// Port allocated for the backend.
    pub port: u16,
}

impl BackendEndpoint {
    /// Create an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form, suitable for socket connects.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port` form handed to the proxy.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

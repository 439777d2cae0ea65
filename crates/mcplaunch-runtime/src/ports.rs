//! Port allocation for the backend server.

use std::net::TcpListener;

use mcplaunch_core::LaunchError;
use tracing::debug;

/// Ask the OS for a currently unused TCP port on `host`.
///
/// Binds a throwaway listener to port 0, reads back the assigned port and
/// drops the listener, which releases the port. Nothing stops another process
/// from taking the port before the backend binds it; that shows up as a
/// backend startup failure and is not retried.
pub fn allocate_port(host: &str) -> Result<u16, LaunchError> {
    let listener = TcpListener::bind((host, 0)).map_err(|source| LaunchError::PortAllocation {
        host: host.to_string(),
        source,
    })?;

    let port = listener
        .local_addr()
        .map_err(|source| LaunchError::PortAllocation {
            host: host.to_string(),
            source,
        })?
        .port();

    drop(listener);
    debug!(host = %host, port = %port, "Allocated ephemeral port");
    Ok(port)
}

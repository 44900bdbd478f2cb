// [[MEMEOOORR]]/apps/agent-kernel/src/port.rs
// Purpose: Finds a free listening port for the control server.
// Architecture: Infrastructure Helper Layer
// Dependencies: Tokio

use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortError {
    #[error("No free port found after {attempts} attempts starting at {start}")]
    Exhausted { start: u16, attempts: u32 },
}

/// Binds and immediately releases `port` on all interfaces.
async fn is_port_available(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::AddrInUse {
                tracing::debug!("Port {} unavailable: {}", port, e);
            }
            false
        }
    }
}

/// Picks a free port, starting at `preferred` and probing upwards.
///
/// At most `max_attempts` ports are probed. The scan also stops at 65535
/// rather than wrapping around.
pub async fn get_available_port(preferred: u16, max_attempts: u32) -> Result<u16, PortError> {
    let mut port = preferred;
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        if is_port_available(port).await {
            return Ok(port);
        }

        match port.checked_add(1) {
            Some(next) => {
                tracing::warn!("Port {} is in use, trying {}", port, next);
                port = next;
            }
            None => break,
        }
    }

    Err(PortError::Exhausted {
        start: preferred,
        attempts,
    })
}

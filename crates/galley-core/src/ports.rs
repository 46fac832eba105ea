//! Ephemeral host port allocation.

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;

use tracing::debug;

use crate::domain::error::PortError;

/// Number of bind attempts before giving up.
pub const PORT_ATTEMPTS: u32 = 10;

/// Hands out host ports for `{{random_port}}`.
pub trait PortAllocator: Send + Sync {
    /// A port that was free when checked and has not been handed out before
    /// by this allocator.
    fn allocate(&self) -> Result<u16, PortError>;
}

/// Asks the OS for a free port by binding port 0 on all interfaces.
///
/// The bound socket is closed before the port is returned, so another
/// process may still claim it in between. Ports already handed out are
/// remembered and never returned twice.
#[derive(Debug, Default)]
pub struct EphemeralPortAllocator {
    issued: Mutex<HashSet<u16>>,
}

impl EphemeralPortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind_ephemeral() -> std::io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", 0))?;
        Ok(listener.local_addr()?.port())
    }
}

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> Result<u16, PortError> {
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=PORT_ATTEMPTS {
            match Self::bind_ephemeral() {
                Ok(port) => {
                    let mut issued = self.issued.lock().map_err(|e| PortError::Exhausted {
                        attempts: attempt,
                        reason: format!("allocator lock poisoned: {}", e),
                    })?;
                    if issued.insert(port) {
                        debug!(port, attempt, "allocated host port");
                        return Ok(port);
                    }
                    last_reason = format!("port {} already handed out", port);
                }
                Err(e) => last_reason = e.to_string(),
            }
        }

        Err(PortError::Exhausted {
            attempts: PORT_ATTEMPTS,
            reason: last_reason,
        })
    }
}

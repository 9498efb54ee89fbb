//! Loopback port allocation.
//!
//! Availability is decided by actually binding a listener, since other
//! processes on the host may hold ports this crate knows nothing about.
//! The port is released again before returning, so a later bind by the dev
//! server can still race with another process: treat the result as a hint,
//! not a reservation.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::error::{Error, Result};

/// Returns the first port in `start..=start + range` that can be bound on
/// 127.0.0.1.
pub fn find_available_port(start: u16, range: u16) -> Result<u16> {
    find_available_port_excluding(start, range, &HashSet::new())
}

/// Like [`find_available_port`], but never returns a port in `exclude`.
///
/// Used to keep sandboxes that are still being created from picking the
/// same port before their dev servers bind it.
pub fn find_available_port_excluding(
    start: u16,
    range: u16,
    exclude: &HashSet<u16>,
) -> Result<u16> {
    let end = start.saturating_add(range);

    for port in start..=end {
        if exclude.contains(&port) {
            continue;
        }
        if is_port_free(port) {
            tracing::debug!(port, "found available port");
            return Ok(port);
        }
    }

    tracing::warn!(start, end, "port range exhausted");
    Err(Error::NoPortAvailable { start, end })
}

/// Probes a single port by binding and immediately dropping a listener.
pub fn is_port_free(port: u16) -> bool {
    match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)) {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(_) => false,
    }
}

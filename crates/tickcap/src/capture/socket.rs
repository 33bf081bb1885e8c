// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast receive socket setup.
//!
//! Binds the wildcard address, enlarges the kernel receive buffer, and
//! joins the configured group on the default interface. All failures here
//! are construction-time fatal; the run loop never touches socket options.

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Open, configure, and bind the capture socket described by `config`.
///
/// The SO_RCVBUF read-back is logged for operator visibility; a smaller
/// grant than requested is a warning, not an error (the kernel clamps to
/// `net.core.rmem_max`).
pub fn open_multicast_socket(config: &CaptureConfig) -> Result<UdpSocket> {
    let group = parse_multicast_group(&config.multicast_addr)?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(CaptureError::Socket)?;
    socket.set_reuse_address(true).map_err(CaptureError::Socket)?;

    socket
        .set_recv_buffer_size(config.socket_buffer_size)
        .map_err(CaptureError::Socket)?;
    match socket.recv_buffer_size() {
        Ok(granted) if granted < config.socket_buffer_size => {
            log::warn!(
                "[RX] SO_RCVBUF granted {} bytes (requested {}); raise net.core.rmem_max for headroom",
                granted,
                config.socket_buffer_size
            );
        }
        Ok(granted) => {
            log::info!("[RX] socket receive buffer size: {} bytes", granted);
        }
        Err(err) => {
            log::warn!("[RX] SO_RCVBUF read-back failed: {}", err);
        }
    }

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
    socket
        .bind(&bind_addr.into())
        .map_err(CaptureError::Socket)?;

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .map_err(CaptureError::Socket)?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(CaptureError::Socket)?;
    log::debug!("[RX] joined multicast group {} on port {}", group, config.port);

    Ok(socket.into())
}

/// Parse and check the configured group address.
fn parse_multicast_group(addr: &str) -> Result<Ipv4Addr> {
    let group: Ipv4Addr = addr
        .parse()
        .map_err(|err| CaptureError::InvalidMulticastAddr {
            addr: addr.to_string(),
            reason: format!("{err}"),
        })?;
    if !group.is_multicast() {
        return Err(CaptureError::InvalidMulticastAddr {
            addr: addr.to_string(),
            reason: "not a multicast address".to_string(),
        });
    }
    Ok(group)
}

/// Shut down the read half of `socket` to unblock a pending `recv_from`.
///
/// UDP has no connection to close, but `shutdown(SHUT_RD)` still wakes a
/// blocked reader; this is the cancellation path for the receive thread.
#[cfg(unix)]
pub(crate) fn shutdown_read(socket: &UdpSocket) {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    // SAFETY: shutdown(2) FFI on a valid, owned socket fd; SHUT_RD only
    // disables further receives and cannot invalidate the descriptor.
    let ret = unsafe { libc::shutdown(fd, libc::SHUT_RD) };
    if ret != 0 {
        log::debug!(
            "[RX] shutdown(SHUT_RD) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
pub(crate) fn shutdown_read(_socket: &UdpSocket) {
    // Non-unix fallback: the run loop still exits at the next datagram via
    // its running flag.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_address() {
        let config = CaptureConfig {
            multicast_addr: "not-an-address".to_string(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            open_multicast_socket(&config),
            Err(CaptureError::InvalidMulticastAddr { .. })
        ));
    }

    #[test]
    fn rejects_unicast_address() {
        let config = CaptureConfig {
            multicast_addr: "192.168.1.1".to_string(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            open_multicast_socket(&config),
            Err(CaptureError::InvalidMulticastAddr { .. })
        ));
    }

    #[test]
    fn parses_group() {
        assert_eq!(
            parse_multicast_group("239.255.0.1").expect("valid group"),
            Ipv4Addr::new(239, 255, 0, 1)
        );
    }
}

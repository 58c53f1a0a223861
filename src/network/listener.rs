use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::socket::{
    self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrStorage,
};
use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsRawFd;

/// Create a non-blocking TCP listener with an explicit accept backlog.
///
/// An IPv6 address is bound dual-stack, so the wildcard `::` also accepts
/// IPv4 clients. Each failing step is reported as [`Error::SocketInit`].
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };

    let fd = socket::socket(family, SockType::Stream, SockFlag::empty(), None)
        .map_err(|e| Error::socket_init("socket", e))?;

    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)
        .map_err(|e| Error::socket_init("setsockopt(SO_REUSEADDR)", e))?;

    if addr.is_ipv6() {
        socket::setsockopt(&fd, sockopt::Ipv6V6Only, &false)
            .map_err(|e| Error::socket_init("setsockopt(IPV6_V6ONLY)", e))?;
    }

    socket::bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))
        .map_err(|e| Error::socket_init("bind", e))?;

    let backlog = i32::try_from(backlog)
        .map_err(|_| Errno::EINVAL)
        .and_then(Backlog::new)
        .map_err(|e| Error::socket_init("listen", e))?;
    socket::listen(&fd, backlog).map_err(|e| Error::socket_init("listen", e))?;

    let listener = TcpListener::from(fd);
    listener
        .set_nonblocking(true)
        .map_err(|e| Error::socket_init("set_nonblocking", e))?;

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    #[test]
    fn binds_an_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let _client = TcpStream::connect(addr).unwrap();
    }

    #[test]
    fn listener_is_non_blocking() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn port_in_use_fails_at_bind() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        let addr = first.local_addr().unwrap();

        let err = bind_listener(addr, 8).unwrap_err();
        assert!(matches!(err, Error::SocketInit { stage: "bind", .. }));
    }

    #[test]
    fn oversized_backlog_fails_at_listen() {
        let err = bind_listener("127.0.0.1:0".parse().unwrap(), u32::MAX).unwrap_err();
        assert!(matches!(err, Error::SocketInit { stage: "listen", .. }));
    }
}

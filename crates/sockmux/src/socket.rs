//! Socket handles and the synchronous connection layer
//!
//! `Socket` wraps a raw descriptor plus connection metadata. Establishment
//! (connect/listen/accept), teardown and synchronous read/write are thin
//! pass-throughs over the OS socket calls; the asynchronous side lives in
//! [`crate::reactor`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use sockmux_core::{SockError, SockResult};

/// Sentinel for a closed/invalid descriptor.
pub const INVALID_FD: RawFd = -1;

/// Address family selection for connect/listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Ipv4,
    Ipv6,
    /// Accept whichever family resolution yields first.
    Any,
}

impl Family {
    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::Ipv4 => addr.is_ipv4(),
            Family::Ipv6 => addr.is_ipv6(),
            Family::Any => true,
        }
    }
}

/// Socket kind. Only stream/TCP today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Tcp,
}

/// A socket handle: native descriptor plus connection metadata.
///
/// Invariant: the descriptor is usable with OS calls iff `is_connected()`.
/// `close` resets the descriptor to [`INVALID_FD`] and clears the flag.
///
/// Read/write take `&self` so a socket can be shared (e.g. captured by a
/// reactor callback behind an `Arc`) while another thread writes to it.
#[derive(Debug)]
pub struct Socket {
    fd: RawFd,
    family: Family,
    kind: SocketKind,
    connected: bool,
    last_error: AtomicI32,
    remote: Option<SocketAddr>,
}

impl Socket {
    /// Adopt an already-connected descriptor.
    pub fn from_raw(fd: RawFd, family: Family, remote: Option<SocketAddr>) -> Self {
        Self {
            fd,
            family,
            kind: SocketKind::Tcp,
            connected: true,
            last_error: AtomicI32::new(0),
            remote,
        }
    }

    /// Resolve `host:port` and connect a stream socket.
    ///
    /// Addresses not matching `family` are skipped; the first successful
    /// connection wins.
    pub fn connect(host: &str, port: u16, family: Family) -> SockResult<Socket> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| SockError::Resolve(format!("{}:{}", host, port)))?
            .filter(|a| family.matches(a))
            .collect();
        if addrs.is_empty() {
            return Err(SockError::NoMatchingAddress);
        }

        let mut last_err = SockError::NoMatchingAddress;
        for addr in addrs {
            let domain = match addr {
                SocketAddr::V4(_) => libc::AF_INET,
                SocketAddr::V6(_) => libc::AF_INET6,
            };
            let fd = match new_stream_fd(domain) {
                Ok(fd) => fd,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };
            let (storage, len) = sockaddr_from(&addr);
            let rc = unsafe {
                libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len)
            };
            if rc == 0 {
                return Ok(Socket::from_raw(fd, family, Some(addr)));
            }
            last_err = SockError::last_os();
            unsafe { libc::close(fd) };
        }
        Err(last_err)
    }

    /// Bind a listener on `port` (all interfaces) and start listening.
    ///
    /// Pass port 0 to let the OS pick; read it back with [`local_port`].
    ///
    /// [`local_port`]: Socket::local_port
    pub fn listen(port: u16, family: Family) -> SockResult<Socket> {
        let (domain, addr) = match family {
            Family::Ipv6 => (
                libc::AF_INET6,
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0)),
            ),
            _ => (
                libc::AF_INET,
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
            ),
        };
        let fd = new_stream_fd(domain)?;

        unsafe {
            let opt: libc::c_int = 1;
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }

        let (storage, len) = sockaddr_from(&addr);
        let rc = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
        if rc != 0 {
            let err = SockError::last_os();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        if unsafe { libc::listen(fd, libc::SOMAXCONN) } != 0 {
            let err = SockError::last_os();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(Socket::from_raw(fd, family, None))
    }

    /// Block until a client connects; return the accepted socket with the
    /// remote endpoint recorded.
    pub fn accept(&self) -> SockResult<Socket> {
        if !self.connected {
            return Err(SockError::NotConnected);
        }
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept(
                self.fd,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if fd < 0 {
            let err = SockError::last_os();
            self.record_error(&err);
            return Err(err);
        }
        Ok(Socket::from_raw(fd, self.family, sockaddr_to_addr(&storage)))
    }

    /// Single recv pass-through. Returns the byte count; 0 means the peer
    /// closed.
    pub fn read(&self, buf: &mut [u8]) -> SockResult<usize> {
        if !self.connected {
            return Err(SockError::NotConnected);
        }
        let n = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if n < 0 {
            let err = SockError::last_os();
            self.record_error(&err);
            return Err(err);
        }
        Ok(n as usize)
    }

    /// Single send pass-through. Returns the bytes actually sent.
    pub fn write(&self, buf: &[u8]) -> SockResult<usize> {
        if !self.connected {
            return Err(SockError::NotConnected);
        }
        let n = unsafe {
            libc::send(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if n < 0 {
            let err = SockError::last_os();
            self.record_error(&err);
            return Err(err);
        }
        Ok(n as usize)
    }

    /// Send the whole buffer, looping over short writes.
    pub fn write_all(&self, mut buf: &[u8]) -> SockResult<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(SockError::Closed);
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Shut down and release the descriptor. Idempotent.
    ///
    /// If the socket is registered with a reactor, remove the registration
    /// first (or use [`crate::Reactor::close`], which does both).
    pub fn close(&mut self) {
        if self.connected {
            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
                libc::close(self.fd);
            }
            self.fd = INVALID_FD;
            self.connected = false;
        }
    }

    /// Port the socket is bound to (getsockname).
    pub fn local_port(&self) -> SockResult<u16> {
        if !self.connected {
            return Err(SockError::NotConnected);
        }
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockname(
                self.fd,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(SockError::last_os());
        }
        sockaddr_to_addr(&storage)
            .map(|a| a.port())
            .ok_or(SockError::NoMatchingAddress)
    }

    /// The raw descriptor ([`INVALID_FD`] once closed).
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Raw errno of the most recent failed operation (0 = none).
    pub fn last_error(&self) -> i32 {
        self.last_error.load(Ordering::Relaxed)
    }

    /// Remote endpoint, when known (connect and accept record it).
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn record_error(&self, err: &SockError) {
        if let Some(code) = err.os_code() {
            self.last_error.store(code, Ordering::Relaxed);
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.connected {
            unsafe { libc::close(self.fd) };
        }
    }
}

fn new_stream_fd(domain: libc::c_int) -> SockResult<RawFd> {
    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(SockError::last_os());
    }
    Ok(fd)
}

fn sockaddr_from(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    // octets are already network order
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            (storage, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            (storage, std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t)
        }
    }
}

fn sockaddr_to_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let sin = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(sin.sin_port),
            )))
        }
        libc::AF_INET6 => {
            let sin6 = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

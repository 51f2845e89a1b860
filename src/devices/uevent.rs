// CLASSIFICATION: COMMUNITY
// Filename: uevent.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Kernel uevent transport and wire parser.
//!
//! The transport owns the netlink kobject-uevent socket and hands out
//! raw datagrams; the parser slices one datagram into a [`Uevent`]
//! without allocating. Interpretation of the fields happens upstream.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use log::debug;
use thiserror::Error;

/// Datagrams at or above this size are discarded whole.
pub const UEVENT_MSG_LEN: usize = 2048;

/// Receive buffer budget requested from the kernel.
const RCVBUF_SIZE: libc::c_int = 256 * 1024;

/// Errors raised while opening the uevent socket.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open uevent netlink socket: {0}")]
    Open(#[source] io::Error),
    #[error("failed to bind uevent netlink socket: {0}")]
    Bind(#[source] io::Error),
}

/// Non-blocking netlink socket subscribed to all kobject uevent groups.
pub struct UeventSocket {
    fd: RawFd,
}

impl UeventSocket {
    /// Open the kernel notification socket.
    pub fn open() -> Result<Self, TransportError> {
        let fd = unsafe {
            libc::socket(
                libc::PF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if fd < 0 {
            return Err(TransportError::Open(io::Error::last_os_error()));
        }

        // SO_RCVBUFFORCE needs CAP_NET_ADMIN; fall back to the clamped
        // variant when running unprivileged.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUFFORCE,
                &RCVBUF_SIZE as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &RCVBUF_SIZE as *const _ as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_pid = std::process::id();
        addr.nl_groups = 0xffff_ffff;
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(TransportError::Bind(err));
        }

        Ok(UeventSocket { fd })
    }

    /// Raw descriptor for `poll`.
    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Receive the next usable datagram into `buf`, returning its
    /// length. `None` means the queue is drained. Oversized datagrams
    /// and datagrams not sent by the kernel are dropped here.
    pub fn receive(&self, buf: &mut [u8; UEVENT_MSG_LEN]) -> Option<usize> {
        loop {
            let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
            let mut addr_len = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut addr as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EAGAIN) => return None,
                    _ => {
                        debug!("uevent recv error: {err}");
                        return None;
                    }
                }
            }
            let n = n as usize;
            if n == 0 || n >= UEVENT_MSG_LEN {
                // overflow -- discard
                continue;
            }
            // only kernel multicast traffic is trusted
            if addr.nl_pid != 0 || addr.nl_groups == 0 {
                continue;
            }
            return Some(n);
        }
    }
}

impl Drop for UeventSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// One parsed uevent. All string fields borrow the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Uevent<'buf> {
    pub action: &'buf str,
    pub path: &'buf str,
    pub subsystem: &'buf str,
    pub firmware: &'buf str,
    pub partition_name: Option<&'buf str>,
    pub device_name: Option<&'buf str>,
    pub partition_num: i32,
    pub major: i32,
    pub minor: i32,
}

impl<'buf> Uevent<'buf> {
    /// Parse one datagram: NUL-separated `KEY=VALUE` records. Unknown
    /// keys (and SEQNUM) are ignored; numbers that fail to parse
    /// become -1.
    pub fn parse(msg: &'buf [u8]) -> Uevent<'buf> {
        let mut ev = Uevent {
            action: "",
            path: "",
            subsystem: "",
            firmware: "",
            partition_name: None,
            device_name: None,
            partition_num: -1,
            major: -1,
            minor: -1,
        };

        for field in msg.split(|&b| b == 0) {
            let field = match std::str::from_utf8(field) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if let Some(v) = field.strip_prefix("ACTION=") {
                ev.action = v;
            } else if let Some(v) = field.strip_prefix("DEVPATH=") {
                ev.path = v;
            } else if let Some(v) = field.strip_prefix("SUBSYSTEM=") {
                ev.subsystem = v;
            } else if let Some(v) = field.strip_prefix("FIRMWARE=") {
                ev.firmware = v;
            } else if let Some(v) = field.strip_prefix("MAJOR=") {
                ev.major = parse_num(v);
            } else if let Some(v) = field.strip_prefix("MINOR=") {
                ev.minor = parse_num(v);
            } else if let Some(v) = field.strip_prefix("PARTN=") {
                ev.partition_num = parse_num(v);
            } else if let Some(v) = field.strip_prefix("PARTNAME=") {
                ev.partition_name = Some(v);
            } else if let Some(v) = field.strip_prefix("DEVNAME=") {
                ev.device_name = Some(v);
            }
        }
        ev
    }
}

fn parse_num(s: &str) -> i32 {
    s.parse().unwrap_or(-1)
}

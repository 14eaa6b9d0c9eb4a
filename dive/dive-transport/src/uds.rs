//! Raw abstract-namespace Unix domain socket plumbing.
//!
//! Rust's standard `UnixListener::bind` takes a filesystem path; the
//! abstract namespace (`sun_path[0] == '\0'`, Linux/Android-only) is not
//! reachable that way, so this talks to the socket syscalls directly,
//! mirroring the original raw `sockaddr_un` construction.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use dive_proto::{DiveError, Result};

/// Builds an abstract-namespace `sockaddr_un` for `name` and returns it with
/// its effective length. Fails if `name` does not fit in `sun_path`.
fn abstract_addr(name: &str) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let name_bytes = name.as_bytes();
    // Reserve the leading NUL that marks this as an abstract-namespace name.
    if name_bytes.len() + 1 > addr.sun_path.len() {
        return Err(DiveError::invalid_argument(format!(
            "uds name {name:?} too long for sun_path"
        )));
    }
    for (slot, byte) in addr.sun_path[1..].iter_mut().zip(name_bytes.iter()) {
        *slot = *byte as libc::c_char;
    }
    let len = std::mem::size_of::<libc::sa_family_t>() + 1 + name_bytes.len();
    Ok((addr, len as libc::socklen_t))
}

fn last_os_error() -> io::Error {
    io::Error::last_os_error()
}

/// An abstract-namespace Unix domain socket in the listening state.
pub struct UdsListener {
    fd: OwnedFd,
}

impl UdsListener {
    pub fn bind(name: &str) -> Result<Self> {
        let (addr, addr_len) = abstract_addr(name)?;
        unsafe {
            let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0);
            if fd < 0 {
                return Err(DiveError::internal(format!("socket(2): {}", last_os_error())));
            }
            let fd = OwnedFd::from_raw_fd(fd);
            let ret = libc::bind(
                fd.as_raw_fd_compat(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                addr_len,
            );
            if ret < 0 {
                return Err(DiveError::internal(format!("bind(2): {}", last_os_error())));
            }
            let ret = libc::listen(fd.as_raw_fd_compat(), libc::SOMAXCONN);
            if ret < 0 {
                return Err(DiveError::internal(format!("listen(2): {}", last_os_error())));
            }
            Ok(Self { fd })
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd_compat()
    }

    /// Blocks until a client is pending (caller is expected to have already
    /// `poll()`-ed for readability with the desired timeout) and accepts it.
    pub fn accept(&self) -> Result<UdsStream> {
        unsafe {
            let fd = libc::accept(self.raw_fd(), std::ptr::null_mut(), std::ptr::null_mut());
            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(UdsStream {
                fd: OwnedFd::from_raw_fd(fd),
            })
        }
    }
}

/// An established abstract-namespace Unix domain socket connection.
pub struct UdsStream {
    fd: OwnedFd,
}

impl UdsStream {
    pub fn connect(name: &str) -> Result<Self> {
        let (addr, addr_len) = abstract_addr(name)?;
        unsafe {
            let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0);
            if fd < 0 {
                return Err(DiveError::unavailable(format!("socket(2): {}", last_os_error())));
            }
            let fd = OwnedFd::from_raw_fd(fd);
            let ret = libc::connect(
                fd.as_raw_fd_compat(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                addr_len,
            );
            if ret < 0 {
                return Err(DiveError::unavailable(format!("connect(2): {}", last_os_error())));
            }
            Ok(Self { fd })
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd_compat()
    }

    pub fn try_clone(&self) -> Result<Self> {
        unsafe {
            let dup_fd = libc::dup(self.raw_fd());
            if dup_fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(Self {
                fd: OwnedFd::from_raw_fd(dup_fd),
            })
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        set_sock_timeout(self.raw_fd(), libc::SO_RCVTIMEO, timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        set_sock_timeout(self.raw_fd(), libc::SO_SNDTIMEO, timeout)
    }

    pub fn shutdown(&self) -> Result<()> {
        unsafe {
            if libc::shutdown(self.raw_fd(), libc::SHUT_RDWR) < 0 {
                let err = last_os_error();
                // Already shut down / not connected: treat as idempotent success.
                if err.raw_os_error() != Some(libc::ENOTCONN) {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::recv(
                self.raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if ret < 0 {
            Err(last_os_error())
        } else {
            Ok(ret as usize)
        }
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::send(
                self.raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if ret < 0 {
            Err(last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}

fn set_sock_timeout(fd: RawFd, opt: libc::c_int, timeout: Option<std::time::Duration>) -> Result<()> {
    let tv = match timeout {
        Some(d) => libc::timeval {
            tv_sec: d.as_secs() as libc::time_t,
            tv_usec: d.subsec_micros() as libc::suseconds_t,
        },
        None => libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };
    unsafe {
        let ret = libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            &tv as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        );
        if ret < 0 {
            return Err(last_os_error().into());
        }
    }
    Ok(())
}

/// Waits up to `timeout_ms` (negative = forever) for `fd` to become
/// readable. Returns `Ok(true)` if readable, `Ok(false)` on timeout.
pub fn poll_readable(fd: RawFd, timeout_ms: i64) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ms = if timeout_ms < 0 {
        -1
    } else {
        timeout_ms.min(i32::MAX as i64) as i32
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, ms) };
    if ret < 0 {
        let err = last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err.into());
    }
    Ok(ret > 0)
}

/// Small helper trait so `OwnedFd` reads naturally as a raw fd accessor
/// without importing `AsRawFd` at every call site in this module.
trait AsRawFdCompat {
    fn as_raw_fd_compat(&self) -> RawFd;
}

impl AsRawFdCompat for OwnedFd {
    fn as_raw_fd_compat(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.as_raw_fd()
    }
}


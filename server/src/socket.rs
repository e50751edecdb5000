//! The UNIX-domain listening socket: path, permission bits
//! and owning uid/gid are configurable; a `.lock` lockfile enforces
//! single-server invariance; the socket itself is `SOCK_SEQPACKET | CLOEXEC |
//! NONBLOCK`. `std`/`tokio`'s `UnixListener` only speaks `SOCK_STREAM`, so
//! this is built directly on `libc`, in the idiom `rialto_player::shm` already
//! uses for the shared-memory buffer (raw syscalls behind a safe wrapper,
//! errors mapped into `RialtoError::Setup`).

use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::SocketAddr as UnixSocketAddr;
use std::path::{Path, PathBuf};

use rialto_common::config::SocketSettings;
use rialto_common::{RialtoError, RialtoResult};

fn io_err(context: &str) -> RialtoError {
    RialtoError::Setup(format!("{context}: {}", std::io::Error::last_os_error()))
}

pub struct NamedSocket {
    fd: OwnedFd,
    path: PathBuf,
    lockfile: Option<File>,
}

impl NamedSocket {
    /// Binds and starts listening. Fails if another server already holds the
    /// `.lock` file for this path.
    pub fn bind(settings: &SocketSettings) -> RialtoResult<Self> {
        let lock_path = lockfile_path(&settings.path);
        let lockfile = acquire_lockfile(&lock_path)?;

        if settings.path.exists() {
            let _ = std::fs::remove_file(&settings.path);
        }

        // SAFETY: arguments are constants; no preconditions beyond a valid
        // address family/type/protocol triple, which these are.
        let raw_fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK, 0) };
        if raw_fd < 0 {
            return Err(io_err("socket(2) failed"));
        }
        // SAFETY: `raw_fd` was just returned by `socket` and is owned here.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        bind_fd(&fd, &settings.path)?;
        apply_permissions(&settings.path, settings.permissions, settings.owner_uid, settings.owner_gid)?;

        // SAFETY: `fd` is a valid socket just bound above.
        let listen_result = unsafe { libc::listen(fd.as_raw_fd(), 128) };
        if listen_result != 0 {
            return Err(io_err("listen(2) failed"));
        }

        Ok(Self {
            fd,
            path: settings.path.clone(),
            lockfile: Some(lockfile),
        })
    }

    /// Accepts one connection, blocking the calling thread. Returns the
    /// accepted connection's raw file descriptor.
    pub fn accept(&self) -> RialtoResult<OwnedFd> {
        loop {
            // SAFETY: `self.fd` is a valid listening socket for the lifetime
            // of `self`.
            let raw = unsafe { libc::accept4(self.fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_CLOEXEC) };
            if raw >= 0 {
                // SAFETY: `raw` was just returned by `accept4` and is owned
                // here.
                return Ok(unsafe { OwnedFd::from_raw_fd(raw) });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                // The listening socket is non-blocking; poll it with a
                // short sleep rather than pulling in an async reactor for a
                // component whose wire protocol is out of scope.
                std::thread::sleep(std::time::Duration::from_millis(20));
                continue;
            }
            return Err(io_err("accept4(2) failed"));
        }
    }

    /// Unlinks the socket path while keeping already-accepted connections
    /// alive.
    pub fn block_new_connections(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamedSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        if let Some(lockfile) = self.lockfile.take() {
            drop(lockfile);
            let _ = std::fs::remove_file(lockfile_path(&self.path));
        }
    }
}

fn lockfile_path(socket_path: &Path) -> PathBuf {
    let mut path = socket_path.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

fn acquire_lockfile(lock_path: &Path) -> RialtoResult<File> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path)
        .map_err(|err| RialtoError::Setup(format!("opening lockfile {}: {err}", lock_path.display())))?;

    // SAFETY: `file`'s fd is valid for the duration of this call.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        return Err(RialtoError::Setup(format!(
            "another server already holds {}",
            lock_path.display()
        )));
    }
    Ok(file)
}

fn bind_fd(fd: &OwnedFd, path: &Path) -> RialtoResult<()> {
    let addr = UnixSocketAddr::from_pathname(path)
        .map_err(|err| RialtoError::Setup(format!("invalid socket path {}: {err}", path.display())))?;

    // `std::os::unix::net::SocketAddr` has no portable way to get a
    // `sockaddr_un` out for a raw `libc::bind`, so build one directly.
    let mut sockaddr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    sockaddr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let path_bytes = path.as_os_str().as_encoded_bytes();
    if path_bytes.len() >= sockaddr.sun_path.len() {
        return Err(RialtoError::Setup(format!("socket path too long: {}", path.display())));
    }
    for (dst, src) in sockaddr.sun_path.iter_mut().zip(path_bytes.iter()) {
        *dst = *src as libc::c_char;
    }
    let _ = addr;

    let len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    // SAFETY: `sockaddr` is a validly initialised `sockaddr_un` with a
    // NUL-terminated path shorter than `sun_path`'s capacity.
    let result = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            std::ptr::addr_of!(sockaddr).cast::<libc::sockaddr>(),
            len,
        )
    };
    if result != 0 {
        return Err(io_err("bind(2) failed"));
    }
    Ok(())
}

fn apply_permissions(path: &Path, mode: u32, uid: Option<u32>, gid: Option<u32>) -> RialtoResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|err| RialtoError::Setup(format!("chmod {}: {err}", path.display())))?;

    if uid.is_some() || gid.is_some() {
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| RialtoError::Setup("socket path contains a NUL byte".into()))?;
        let uid = uid.map_or(u32::MAX, |v| v) as libc::uid_t;
        let gid = gid.map_or(u32::MAX, |v| v) as libc::gid_t;
        // SAFETY: `c_path` is a valid NUL-terminated C string for the
        // lifetime of this call.
        let result = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
        if result != 0 {
            return Err(io_err("chown(2) failed"));
        }
    }
    Ok(())
}

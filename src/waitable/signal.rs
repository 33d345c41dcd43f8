//! Cross-thread binary wake-up signal.
//!
//! A [`WaitableSignal`] is a non-blocking pipe whose read end is exposed as a
//! [`WaitableHandle`]. Signalling has pulse semantics: signalling an already
//! signalled instance does nothing, so at most one byte is ever pending.

use super::handle::{WaitMode, WaitableHandle, set_nonblocking};
use crate::error::{SignalError, SignalResult};

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Binary signal usable from any thread and observable through the multiplexer.
pub struct WaitableSignal {
    read_fd: RawFd,
    write_fd: RawFd,
    signaled: AtomicBool,
}

impl WaitableSignal {
    /// Creates an unsignalled instance.
    ///
    /// # Errors
    /// [`SignalError::CreateFailed`] if the underlying pipe cannot be created
    /// or configured.
    pub fn new() -> SignalResult<Self> {
        let mut fds = [0 as RawFd; 2];

        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(SignalError::CreateFailed(io::Error::last_os_error()));
        }

        // Built before configuring so that Drop closes both ends on failure.
        let signal = Self {
            read_fd: fds[0],
            write_fd: fds[1],
            signaled: AtomicBool::new(false),
        };

        for fd in fds {
            set_nonblocking(WaitableHandle::from_raw_fd(fd)).map_err(SignalError::CreateFailed)?;

            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                return Err(SignalError::CreateFailed(io::Error::last_os_error()));
            }
        }

        Ok(signal)
    }

    /// Makes the handle ready for reading.
    ///
    /// # Errors
    /// [`SignalError::SignalFailed`] if the wake-up byte cannot be written.
    pub fn signal(&self) -> SignalResult<()> {
        if self.signaled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let byte = 1u8;

        loop {
            let ret =
                unsafe { libc::write(self.write_fd, &byte as *const u8 as *const libc::c_void, 1) };

            if ret == 1 {
                return Ok(());
            }

            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            self.signaled.store(false, Ordering::Release);
            return Err(SignalError::SignalFailed(error));
        }
    }

    /// Consumes the pending pulse.
    ///
    /// Call only after the multiplexer has reported [`handle`](Self::handle)
    /// ready.
    ///
    /// # Errors
    /// [`SignalError::ResetFailed`] if no pulse was pending.
    pub fn reset(&self) -> SignalResult<()> {
        // Cleared before reading: a concurrent signal() then writes a new byte
        // instead of being lost.
        self.signaled.store(false, Ordering::Release);

        let mut byte = 0u8;

        loop {
            let ret =
                unsafe { libc::read(self.read_fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };

            if ret == 1 {
                return Ok(());
            }

            if ret == 0 {
                return Err(SignalError::ResetFailed(io::Error::from(io::ErrorKind::UnexpectedEof)));
            }

            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            return Err(SignalError::ResetFailed(error));
        }
    }

    /// The handle becoming ready when the signal is raised.
    pub fn handle(&self) -> WaitableHandle {
        WaitableHandle::from_raw_fd(self.read_fd)
    }

    /// The handle paired with the mode it must be waited for.
    pub fn entry(&self) -> (WaitableHandle, WaitMode) {
        (self.handle(), WaitMode::Read)
    }
}

impl Drop for WaitableSignal {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

impl std::fmt::Debug for WaitableSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitableSignal")
            .field("handle", &self.handle())
            .field("signaled", &self.signaled.load(Ordering::Acquire))
            .finish()
    }
}

//! Readiness handles and the multiplexer blocking on them.
//!
//! A [`WaitableHandle`] is a raw file descriptor the caller owns; the
//! multiplexer never closes it. Waiting is built on `poll(2)`, which always
//! reports error and hang-up conditions regardless of the requested mode.

use crate::error::{WaitError, WaitResult};

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Opaque readiness-reporting handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitableHandle(RawFd);

impl WaitableHandle {
    pub const fn from_raw_fd(fd: RawFd) -> Self {
        Self(fd)
    }

    pub const fn as_raw_fd(self) -> RawFd {
        self.0
    }
}

impl fmt::Debug for WaitableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaitableHandle({})", self.0)
    }
}

/// Readiness a handle is waited for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WaitMode {
    Read,
    Write,
}

impl WaitMode {
    fn poll_events(self) -> libc::c_short {
        match self {
            WaitMode::Read => libc::POLLIN,
            WaitMode::Write => libc::POLLOUT,
        }
    }
}

/// A handle paired with the readiness it is waited for.
pub type WaitableHandleEntry = (WaitableHandle, WaitMode);

/// Blocks until at least one of `handles` is ready or `timeout` elapses.
///
/// # Arguments
/// - `handles`: the handles to wait for, each with its mode.
/// - `timeout`: `None` blocks until a handle is ready; `Some(Duration::ZERO)`
///   polls without blocking.
///
/// # Returns
/// The index (into `handles`) of every ready handle, in ascending order. An
/// error or hang-up condition counts as ready for either mode. A timeout
/// yields an empty list.
///
/// # Errors
/// [`WaitError::WaitFailed`] when `poll(2)` fails for a reason other than
/// being interrupted by a signal.
pub fn wait_for_multiple_handles(
    handles: &[WaitableHandleEntry],
    timeout: Option<Duration>,
) -> WaitResult<Vec<usize>> {
    let mut fds: Vec<libc::pollfd> = handles
        .iter()
        .map(|(handle, mode)| libc::pollfd {
            fd: handle.as_raw_fd(),
            events: mode.poll_events(),
            revents: 0,
        })
        .collect();

    // A timeout too large to represent is treated as infinite.
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

    loop {
        let timeout_ms = match deadline {
            Some(deadline) => {
                duration_to_poll_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => -1,
        };

        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

        if ret < 0 {
            let error = io::Error::last_os_error();

            if error.kind() == io::ErrorKind::Interrupted {
                tracing::trace!("wait interrupted, retrying");
                continue;
            }

            tracing::error!(%error, "poll failed");
            return Err(WaitError::WaitFailed(error));
        }

        let ready: Vec<usize> = fds
            .iter()
            .enumerate()
            .filter(|(_, fd)| {
                fd.revents & (fd.events | libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
            })
            .map(|(index, _)| index)
            .collect();

        tracing::trace!(handles = handles.len(), ready = ready.len(), "wait finished");
        return Ok(ready);
    }
}

/// Blocks until `handle` is ready for `mode` or `timeout` elapses.
///
/// Returns `true` when the handle became ready.
pub fn wait_for_single_handle(
    handle: WaitableHandle,
    mode: WaitMode,
    timeout: Option<Duration>,
) -> WaitResult<bool> {
    let ready = wait_for_multiple_handles(&[(handle, mode)], timeout)?;
    Ok(!ready.is_empty())
}

/// Switches `handle` to non-blocking mode.
pub fn set_nonblocking(handle: WaitableHandle) -> io::Result<()> {
    let fd = handle.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

// Rounds up so that a wait never returns before the requested time.
fn duration_to_poll_timeout(timeout: Duration) -> libc::c_int {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

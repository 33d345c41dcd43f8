//! Anonymous non-blocking pipe.

use super::WaitableInputOutput;
use crate::buffer::ByteQueue;
use crate::error::{IoError, IoResult};
use crate::waitable::{WaitableHandle, set_nonblocking};

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

const CLOSED: RawFd = -1;

/// A unidirectional pipe whose both ends are non-blocking.
///
/// Reading yields what was written to the other end; once the write end is
/// closed and drained, reads report end of stream.
#[derive(Debug)]
pub struct Pipe {
    read_fd: AtomicI32,
    write_fd: AtomicI32,
}

impl Pipe {
    /// # Errors
    /// [`IoError::OpenFailed`] if the pipe cannot be created or configured.
    pub fn new() -> IoResult<Self> {
        let mut fds = [CLOSED; 2];

        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(IoError::OpenFailed(io::Error::last_os_error()));
        }

        let pipe = Self {
            read_fd: AtomicI32::new(fds[0]),
            write_fd: AtomicI32::new(fds[1]),
        };

        for fd in fds {
            set_nonblocking(WaitableHandle::from_raw_fd(fd)).map_err(IoError::OpenFailed)?;
        }

        Ok(pipe)
    }

    /// Closes the read end. Later writes report a broken connection.
    pub fn close_read(&self) {
        close_fd(&self.read_fd);
    }

    /// Closes the write end. The reader sees end of stream once drained.
    pub fn close_write(&self) {
        close_fd(&self.write_fd);
    }
}

impl WaitableInputOutput for Pipe {
    fn waitable_read_handle(&self) -> WaitableHandle {
        WaitableHandle::from_raw_fd(self.read_fd.load(Ordering::Acquire))
    }

    fn waitable_write_handle(&self) -> WaitableHandle {
        WaitableHandle::from_raw_fd(self.write_fd.load(Ordering::Acquire))
    }

    fn read(&self, size: usize) -> IoResult<Option<ByteQueue>> {
        let fd = self.read_fd.load(Ordering::Acquire);
        if fd == CLOSED {
            return Err(IoError::NotOpened);
        }

        if size == 0 {
            return Ok(None);
        }

        let mut buffer = vec![0u8; size];

        loop {
            let ret = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut libc::c_void, size) };

            if ret > 0 {
                buffer.truncate(ret as usize);
                return Ok(Some(ByteQueue::from(buffer)));
            }

            if ret == 0 {
                return Ok(Some(ByteQueue::new()));
            }

            let error = io::Error::last_os_error();
            match error.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(None),
                io::ErrorKind::ConnectionReset => return Err(IoError::ConnectionBroken),
                _ => return Err(IoError::ReadFailed(error)),
            }
        }
    }

    fn write(&self, buffer: &ByteQueue, size: usize) -> IoResult<usize> {
        let fd = self.write_fd.load(Ordering::Acquire);
        if fd == CLOSED {
            return Err(IoError::NotOpened);
        }

        let size = size.min(buffer.size());
        if size == 0 {
            return Ok(0);
        }

        let mut data = vec![0u8; size];
        buffer.flatten(&mut data)?;

        loop {
            let ret = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, size) };

            if ret >= 0 {
                return Ok(ret as usize);
            }

            let error = io::Error::last_os_error();
            match error.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(0),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                    return Err(IoError::ConnectionBroken);
                }
                _ => return Err(IoError::WriteFailed(error)),
            }
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        close_fd(&self.read_fd);
        close_fd(&self.write_fd);
    }
}

fn close_fd(fd: &AtomicI32) {
    let fd = fd.swap(CLOSED, Ordering::AcqRel);

    if fd != CLOSED {
        unsafe { libc::close(fd) };
    }
}

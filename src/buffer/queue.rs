//! Chunked byte queue used to move data between threads and across pipes
//! and sockets.
//!
//! Bytes are appended at the tail and consumed from the head. Appending never
//! reallocates or moves bytes already queued: every append becomes its own
//! chunk, and adopted or unmanaged memory is referenced in place.
//!
//! The queue is not internally synchronized. Confine an instance to one
//! thread at a time or wrap it in a lock.

use super::chunk::{BufferChunk, ReleaseFn};
use crate::error::{BufferError, BufferResult};

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::ptr::NonNull;

/// Ordered sequence of bytes backed by discrete memory chunks.
///
/// The cached size always equals the sum of every chunk's unconsumed length,
/// and a chunk that runs empty is removed (and released) immediately.
///
/// # Example
/// ```
/// use eventcore::ByteQueue;
///
/// let mut queue = ByteQueue::new();
/// queue.append_copy(b"abcd");
/// queue.append_owned(b"ef".to_vec());
///
/// let mut head = [0u8; 3];
/// queue.flatten_consume(&mut head).unwrap();
///
/// assert_eq!(&head, b"abc");
/// assert_eq!(queue.to_vec(), b"def");
/// ```
#[derive(Default)]
pub struct ByteQueue {
    chunks: VecDeque<BufferChunk>,
    size: usize,
}

impl ByteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unconsumed bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Appends a private copy of `data`.
    pub fn append_copy(&mut self, data: &[u8]) {
        self.push_chunk(BufferChunk::copy_of(data));
    }

    /// Adopts the bytes of `owner` without copying them.
    ///
    /// `owner` is dropped exactly once, when its bytes have been fully consumed
    /// or when the queue is dropped.
    pub fn append_owned<T>(&mut self, owner: T)
    where
        T: AsRef<[u8]> + Send + 'static,
    {
        self.push_chunk(BufferChunk::adopted(owner));
    }

    /// Adopts caller-supplied memory without copying it.
    ///
    /// `release(ptr, len)` is invoked exactly once: when the block has been
    /// fully consumed, when the queue is cleared or dropped, or immediately
    /// if `len` is zero.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes, and the memory must not
    /// be written to or freed until `release` runs.
    pub unsafe fn append_unmanaged<F>(&mut self, ptr: NonNull<u8>, len: usize, release: F)
    where
        F: FnOnce(NonNull<u8>, usize) + Send + 'static,
    {
        let release: ReleaseFn = Box::new(release);

        // SAFETY: forwarded from the caller.
        let chunk = unsafe { BufferChunk::unmanaged(ptr, len, release) };
        self.push_chunk(chunk);
    }

    /// Appends a copy of every byte of `other`, leaving `other` untouched.
    pub fn append_copy_from(&mut self, other: &ByteQueue) {
        for chunk in &other.chunks {
            self.push_chunk(chunk.to_owned_chunk());
        }
    }

    /// Moves every chunk of `other` to the tail of this queue without copying.
    pub fn append_move_from(&mut self, other: &mut ByteQueue) {
        self.size += other.size;
        self.chunks.append(&mut other.chunks);
        other.size = 0;
    }

    /// Appends a copy of this queue to `other`. This queue stays untouched.
    pub fn append_copy_to(&self, other: &mut ByteQueue) {
        other.append_copy_from(self);
    }

    /// Moves every chunk of this queue to the tail of `other`.
    pub fn append_move_to(&mut self, other: &mut ByteQueue) {
        other.append_move_from(self);
    }

    /// Copies `out.len()` bytes from the head into `out` without consuming
    /// them.
    ///
    /// An empty `out` is a valid no-op.
    ///
    /// # Errors
    /// [`BufferError::OutOfData`] when fewer than `out.len()` bytes are queued.
    pub fn flatten(&self, out: &mut [u8]) -> BufferResult<()> {
        self.ensure_available(out.len())?;

        let mut written = 0;
        for chunk in &self.chunks {
            if written == out.len() {
                break;
            }

            let source = chunk.remaining();
            let count = source.len().min(out.len() - written);
            out[written..written + count].copy_from_slice(&source[..count]);
            written += count;
        }

        Ok(())
    }

    /// Same as [`flatten`](Self::flatten), then removes the copied bytes.
    ///
    /// # Errors
    /// [`BufferError::OutOfData`] when fewer than `out.len()` bytes are queued.
    /// The queue is left untouched in that case.
    pub fn flatten_consume(&mut self, out: &mut [u8]) -> BufferResult<()> {
        self.flatten(out)?;
        self.consume(out.len())
    }

    /// Removes `len` bytes from the head, releasing every chunk that runs empty.
    ///
    /// # Errors
    /// [`BufferError::OutOfData`] when fewer than `len` bytes are queued.
    pub fn consume(&mut self, len: usize) -> BufferResult<()> {
        self.ensure_available(len)?;

        let mut left = len;
        while left > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            let count = front.len().min(left);
            front.advance(count);
            left -= count;

            if front.is_empty() {
                self.chunks.pop_front();
            }
        }

        self.size -= len;
        Ok(())
    }

    /// Removes every byte, releasing all chunks.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }

    pub fn swap(&mut self, other: &mut ByteQueue) {
        std::mem::swap(self, other);
    }

    /// Calls `visitor` with the remaining bytes of each chunk, head first.
    pub fn visit_buckets<F>(&self, mut visitor: F)
    where
        F: FnMut(&[u8]),
    {
        for chunk in &self.chunks {
            visitor(chunk.remaining());
        }
    }

    /// Pops up to `size` bytes from the head into a new queue.
    ///
    /// Whole chunks are moved rather than copied; only a chunk split at the
    /// boundary is copied.
    pub fn read(&mut self, size: usize) -> ByteQueue {
        let mut result = ByteQueue::new();
        let mut left = size.min(self.size);

        while left > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            if front.len() <= left {
                left -= front.len();
                self.size -= front.len();

                if let Some(chunk) = self.chunks.pop_front() {
                    result.push_chunk(chunk);
                }
            } else {
                result.append_copy(&front.remaining()[..left]);
                front.advance(left);
                self.size -= left;
                left = 0;
            }
        }

        result
    }

    /// Appends a copy of up to `size` bytes from the head of `buffer`.
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, buffer: &ByteQueue, size: usize) -> usize {
        let mut left = size.min(buffer.size());
        let written = left;

        for chunk in &buffer.chunks {
            if left == 0 {
                break;
            }

            let source = chunk.remaining();
            let count = source.len().min(left);
            self.append_copy(&source[..count]);
            left -= count;
        }

        written
    }

    /// Copies the whole content into a contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.size);
        self.visit_buckets(|bucket| result.extend_from_slice(bucket));
        result
    }

    /// Number of chunks currently backing the queue.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn push_chunk(&mut self, chunk: BufferChunk) {
        if chunk.is_empty() {
            // Dropped right away, which releases unmanaged memory.
            return;
        }

        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn ensure_available(&self, requested: usize) -> BufferResult<()> {
        if requested > self.size {
            return Err(BufferError::OutOfData {
                requested,
                available: self.size,
            });
        }

        Ok(())
    }
}

impl Clone for ByteQueue {
    /// Deep copy. Every chunk of the clone is privately owned, whatever the
    /// storage of the source.
    fn clone(&self) -> Self {
        let mut copy = ByteQueue::new();
        copy.append_copy_from(self);
        copy
    }
}

impl fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteQueue")
            .field("size", &self.size)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl PartialEq for ByteQueue {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.to_vec() == other.to_vec()
    }
}

impl Eq for ByteQueue {}

impl From<&[u8]> for ByteQueue {
    fn from(data: &[u8]) -> Self {
        let mut queue = ByteQueue::new();
        queue.append_copy(data);
        queue
    }
}

impl From<Vec<u8>> for ByteQueue {
    fn from(data: Vec<u8>) -> Self {
        let mut queue = ByteQueue::new();
        queue.append_owned(data);
        queue
    }
}

impl io::Read for ByteQueue {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.size);
        self.flatten_consume(&mut buf[..count])
            .map_err(|error| io::Error::new(io::ErrorKind::UnexpectedEof, error))?;

        Ok(count)
    }
}

impl io::Write for ByteQueue {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append_copy(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

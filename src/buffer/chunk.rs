//! Storage units of a [`ByteQueue`](super::ByteQueue).
//!
//! A chunk is a window `[begin, end)` over one block of memory. The block is
//! either a private heap copy, memory adopted from an owning Rust value, or
//! caller-supplied memory with a release callback ("unmanaged"). Whatever the
//! storage, it is released exactly once: when the chunk is dropped.

use std::fmt;
use std::ptr::NonNull;

/// Callback invoked once to give unmanaged memory back to its owner.
pub type ReleaseFn = Box<dyn FnOnce(NonNull<u8>, usize) + Send>;

pub(crate) enum Storage {
    Owned(Box<[u8]>),
    Adopted(Box<dyn AsRef<[u8]> + Send>),
    Unmanaged(UnmanagedBlock),
}

/// Memory the queue does not own, paired with the callback releasing it.
pub(crate) struct UnmanagedBlock {
    ptr: NonNull<u8>,
    len: usize,
    release: Option<ReleaseFn>,
}

// SAFETY: `ByteQueue::append_unmanaged` requires the caller to guarantee the
// block stays valid and unmodified until the release callback runs, and the
// callback itself is `Send`. The block is only ever read.
unsafe impl Send for UnmanagedBlock {}

impl UnmanagedBlock {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: validity for `len` bytes is the contract of `append_unmanaged`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for UnmanagedBlock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::trace!(len = self.len, "releasing unmanaged block");
            release(self.ptr, self.len);
        }
    }
}

pub(crate) struct BufferChunk {
    storage: Storage,
    begin: usize,
    end: usize,
}

impl BufferChunk {
    pub(crate) fn copy_of(data: &[u8]) -> Self {
        Self::with_storage(Storage::Owned(data.into()), data.len())
    }

    pub(crate) fn adopted<T>(owner: T) -> Self
    where
        T: AsRef<[u8]> + Send + 'static,
    {
        let len = owner.as_ref().len();
        Self::with_storage(Storage::Adopted(Box::new(owner)), len)
    }

    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes and must not be written to
    /// until `release` has been called.
    pub(crate) unsafe fn unmanaged(ptr: NonNull<u8>, len: usize, release: ReleaseFn) -> Self {
        let block = UnmanagedBlock {
            ptr,
            len,
            release: Some(release),
        };

        Self::with_storage(Storage::Unmanaged(block), len)
    }

    fn with_storage(storage: Storage, len: usize) -> Self {
        Self {
            storage,
            begin: 0,
            end: len,
        }
    }

    fn block(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data,
            Storage::Adopted(owner) => AsRef::<[u8]>::as_ref(&**owner),
            Storage::Unmanaged(block) => block.as_slice(),
        }
    }

    /// The unconsumed bytes of this chunk.
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.block()[self.begin..self.end]
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.begin
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Drops `count` bytes from the front of the window.
    pub(crate) fn advance(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.begin += count;
    }

    /// Private copy of the remaining bytes, independent of the storage kind.
    pub(crate) fn to_owned_chunk(&self) -> Self {
        Self::copy_of(self.remaining())
    }
}

impl fmt::Debug for BufferChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.storage {
            Storage::Owned(_) => "owned",
            Storage::Adopted(_) => "adopted",
            Storage::Unmanaged(_) => "unmanaged",
        };

        f.debug_struct("BufferChunk")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

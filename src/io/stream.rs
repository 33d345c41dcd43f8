//! Buffered streaming over a [`WaitableInputOutput`].
//!
//! Once opened on a thread, a [`StreamSupport`] watches the read handle of
//! its input/output, accumulates what arrives in an input queue and reports
//! it to a [`StreamListener`]. Bytes written through the support are kept in
//! an output queue and flushed while a write watch is active; the watch is
//! dropped as soon as the queue runs empty.

use super::WaitableInputOutput;
use crate::buffer::ByteQueue;
use crate::error::{IoError, IoResult};
use crate::thread::ThreadRef;
use crate::waitable::{WaitMode, WaitableHandle, WaitableHandleListener, WaitableHandleListenerRef};

use std::sync::{Arc, Mutex, Weak};

const READ_CHUNK_SIZE: usize = 4096;

/// Receives stream notifications on the thread the stream was opened on.
pub trait StreamListener: Send + Sync {
    /// New bytes were appended to `input`. Consume what can be handled and
    /// leave the rest for the next notification.
    fn on_input_stream_read(&self, input: &mut ByteQueue);

    /// The peer closed the stream. The support is closed before this call.
    fn on_input_stream_closed(&self);

    /// Reading or writing failed. The support is closed before this call.
    fn on_input_stream_broken(&self);
}

#[derive(Default)]
struct WatchState {
    thread: Option<ThreadRef>,
    writing: bool,
}

struct StreamInner {
    io: Arc<dyn WaitableInputOutput>,
    listener: Arc<dyn StreamListener>,
    input: Mutex<ByteQueue>,
    output: Mutex<ByteQueue>,
    watch: Mutex<WatchState>,
    watcher: WaitableHandleListenerRef,
}

// Bridges handle watches to the stream without keeping it alive.
struct StreamWatcher {
    inner: Weak<StreamInner>,
}

impl WaitableHandleListener for StreamWatcher {
    fn on_waitable_handle_event(&self, _: WaitableHandle, mode: WaitMode) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        match mode {
            WaitMode::Read => inner.handle_read(),
            WaitMode::Write => inner.handle_write(),
        }
    }
}

impl StreamInner {
    fn handle_read(&self) {
        let mut received = false;

        loop {
            match self.io.read(READ_CHUNK_SIZE) {
                Ok(None) => break,
                Ok(Some(chunk)) if chunk.is_empty() => {
                    if received {
                        self.notify_read();
                    }

                    tracing::debug!("input stream closed");
                    self.shutdown();
                    self.listener.on_input_stream_closed();
                    return;
                }
                Ok(Some(mut chunk)) => {
                    tracing::trace!(size = chunk.size(), "input stream read");
                    self.input.lock().unwrap().append_move_from(&mut chunk);
                    received = true;
                }
                Err(error) => {
                    tracing::warn!(%error, "input stream broken");
                    self.shutdown();
                    self.listener.on_input_stream_broken();
                    return;
                }
            }
        }

        if received {
            self.notify_read();
        }
    }

    fn notify_read(&self) {
        let mut input = self.input.lock().unwrap();
        self.listener.on_input_stream_read(&mut input);
    }

    fn handle_write(&self) {
        let result = {
            let mut output = self.output.lock().unwrap();

            self.io.write(&output, output.size()).and_then(|written| {
                output.consume(written)?;
                Ok(output.is_empty())
            })
        };

        match result {
            Ok(true) => self.stop_writing(),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%error, "output stream broken");
                self.shutdown();
                self.listener.on_input_stream_broken();
            }
        }
    }

    fn stop_writing(&self) {
        let mut watch = self.watch.lock().unwrap();

        // Checked under the watch lock: a concurrent write either lands before
        // this check or finds the watch gone and adds it again.
        if !watch.writing || !self.output.lock().unwrap().is_empty() {
            return;
        }

        if let Some(thread) = &watch.thread {
            let handle = self.io.waitable_write_handle();
            if let Err(error) =
                thread.remove_waitable_handle_watch(&self.watcher, handle, WaitMode::Write)
            {
                tracing::error!(%error, "failed to remove write watch");
            }
        }

        watch.writing = false;
    }

    // Removes every watch. Returns false if the support was not opened.
    fn shutdown(&self) -> bool {
        let mut watch = self.watch.lock().unwrap();

        let Some(thread) = watch.thread.take() else {
            return false;
        };

        let mut failures = Vec::new();

        let read = self.io.waitable_read_handle();
        if let Err(error) =
            thread.remove_waitable_handle_watch(&self.watcher, read, WaitMode::Read)
        {
            failures.push(error);
        }

        if watch.writing {
            let write = self.io.waitable_write_handle();
            if let Err(error) =
                thread.remove_waitable_handle_watch(&self.watcher, write, WaitMode::Write)
            {
                failures.push(error);
            }
            watch.writing = false;
        }

        for error in failures {
            tracing::error!(%error, "failed to remove stream watch");
        }

        true
    }
}

/// Streams bytes between a [`WaitableInputOutput`] and byte queues.
pub struct StreamSupport {
    inner: Arc<StreamInner>,
}

impl StreamSupport {
    pub fn new(io: Arc<dyn WaitableInputOutput>, listener: Arc<dyn StreamListener>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StreamInner>| {
            let watcher: WaitableHandleListenerRef = Arc::new(StreamWatcher {
                inner: weak.clone(),
            });

            StreamInner {
                io,
                listener,
                input: Mutex::new(ByteQueue::new()),
                output: Mutex::new(ByteQueue::new()),
                watch: Mutex::new(WatchState::default()),
                watcher,
            }
        });

        Self { inner }
    }

    /// Starts watching the input on `thread`. Notifications run there.
    ///
    /// # Errors
    /// [`IoError::AlreadyOpened`] if the support is already open.
    pub fn open(&self, thread: &ThreadRef) -> IoResult<()> {
        let mut watch = self.inner.watch.lock().unwrap();

        if watch.thread.is_some() {
            return Err(IoError::AlreadyOpened);
        }

        thread.add_waitable_handle_watch(
            self.inner.watcher.clone(),
            self.inner.io.waitable_read_handle(),
            WaitMode::Read,
        )?;
        watch.thread = Some(thread.clone());

        tracing::debug!(thread = thread.id(), "stream opened");
        drop(watch);

        if !self.inner.output.lock().unwrap().is_empty() {
            self.start_writing()?;
        }

        Ok(())
    }

    /// Stops watching. Queued input and output are kept.
    ///
    /// # Errors
    /// [`IoError::NotOpened`] if the support is not open.
    pub fn close(&self) -> IoResult<()> {
        if !self.inner.shutdown() {
            return Err(IoError::NotOpened);
        }

        tracing::debug!("stream closed");
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.inner.watch.lock().unwrap().thread.is_some()
    }

    /// Queues a copy of `data` for writing.
    ///
    /// # Errors
    /// [`IoError::Thread`] if the owning thread cannot be woken.
    pub fn write(&self, data: &[u8]) -> IoResult<()> {
        self.inner.output.lock().unwrap().append_copy(data);
        self.start_writing()
    }

    /// Moves every byte of `data` to the output queue.
    ///
    /// # Errors
    /// [`IoError::Thread`] if the owning thread cannot be woken.
    pub fn write_queue(&self, data: &mut ByteQueue) -> IoResult<()> {
        self.inner.output.lock().unwrap().append_move_from(data);
        self.start_writing()
    }

    /// Takes every byte received and not consumed by the listener.
    pub fn take_input(&self) -> ByteQueue {
        std::mem::take(&mut *self.inner.input.lock().unwrap())
    }

    pub fn input_size(&self) -> usize {
        self.inner.input.lock().unwrap().size()
    }

    pub fn output_size(&self) -> usize {
        self.inner.output.lock().unwrap().size()
    }

    fn start_writing(&self) -> IoResult<()> {
        let mut watch = self.inner.watch.lock().unwrap();

        if watch.writing {
            return Ok(());
        }

        // Output is flushed once the support is opened.
        let Some(thread) = watch.thread.clone() else {
            return Ok(());
        };

        thread.add_waitable_handle_watch(
            self.inner.watcher.clone(),
            self.inner.io.waitable_write_handle(),
            WaitMode::Write,
        )?;
        watch.writing = true;

        Ok(())
    }
}

impl Drop for StreamSupport {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for StreamSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSupport")
            .field("opened", &self.is_opened())
            .field("input", &self.input_size())
            .field("output", &self.output_size())
            .finish()
    }
}

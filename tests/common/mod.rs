#![allow(dead_code)]

use eventcore::{Thread, ThreadBuilder, ThreadRef};

use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Builds and starts a named thread.
pub fn running_thread(name: &str) -> Thread {
    let mut thread = ThreadBuilder::new().name(name).build().unwrap();
    thread.run().unwrap();
    thread
}

/// Runs `function` on `thread` and waits for its result.
pub fn run_on<R, F>(thread: &ThreadRef, function: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    thread
        .post(move || {
            let _ = sender.send(function());
        })
        .unwrap();

    receiver.recv_timeout(TIMEOUT).expect("thread did not run the call in time")
}

/// Waits until every call queued on `thread` so far has run.
pub fn flush(thread: &ThreadRef) {
    run_on(thread, || ());
}

/// Blocks `thread` until the returned sender is used or dropped.
pub fn block_thread(thread: &ThreadRef) -> mpsc::Sender<()> {
    let (release, gate) = mpsc::channel::<()>();
    let (started, wait_started) = mpsc::channel();

    thread
        .post(move || {
            let _ = started.send(());
            let _ = gate.recv_timeout(TIMEOUT);
        })
        .unwrap();

    wait_started.recv_timeout(TIMEOUT).expect("thread did not start the gate call");
    release
}

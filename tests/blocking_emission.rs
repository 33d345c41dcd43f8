mod common;

use eventcore::{EmitMode, EventListenerRef, EventSupport, ThreadError};

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Request(u32);

// Emits from a fresh unmanaged thread so a hung emission fails the test
// instead of stalling it.
fn emit_blocking_from_thread(
    support: &Arc<EventSupport<Request>>,
    request: Request,
) -> Result<(), ThreadError> {
    let support = support.clone();
    let (sender, receiver) = mpsc::channel();

    std::thread::spawn(move || {
        let _ = sender.send(support.emit_event(request, EmitMode::Blocking));
    });

    receiver.recv_timeout(common::TIMEOUT).expect("blocking emission did not return")
}

fn wait_until_stopped(thread: &eventcore::Thread) {
    let deadline = Instant::now() + common::TIMEOUT;
    while thread.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!thread.is_running());
}

#[test]
fn test_unmanaged_emitter_waits_for_remote_listener() {
    let mut worker = common::running_thread("worker");
    let support = EventSupport::<Request>::new();
    let handled = Arc::new(AtomicUsize::new(0));

    let counter = handled.clone();
    let listener: EventListenerRef<Request> = Arc::new(move |request: &Request| {
        std::thread::sleep(Duration::from_millis(100));
        counter.fetch_add(request.0 as usize, Ordering::SeqCst);
    });
    support.add_listener_with_thread(listener, Some(worker.thread_ref()));

    support.emit_event(Request(3), EmitMode::Blocking).unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 3);

    worker.quit().unwrap();
}

#[test]
fn test_blocking_waits_for_every_remote_listener() {
    let mut first = common::running_thread("first");
    let mut second = common::running_thread("second");
    let support = EventSupport::<Request>::new();
    let handled = Arc::new(AtomicUsize::new(0));

    for (thread, delay) in [(&first, 50), (&second, 150)] {
        let counter = handled.clone();
        let listener: EventListenerRef<Request> = Arc::new(move |_: &Request| {
            std::thread::sleep(Duration::from_millis(delay));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        support.add_listener_with_thread(listener, Some(thread.thread_ref()));
    }

    support.emit_event(Request(1), EmitMode::Blocking).unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 2);

    first.quit().unwrap();
    second.quit().unwrap();
}

#[test]
fn test_managed_emitter_keeps_dispatching_while_blocked() {
    let mut caller = common::running_thread("caller");
    let mut callee = common::running_thread("callee");
    let support = Arc::new(EventSupport::<Request>::new());
    let pumped = Arc::new(AtomicBool::new(false));

    // The callee only returns once the caller has run a call posted to it,
    // which requires the caller to keep dispatching while it waits.
    let caller_ref = caller.thread_ref();
    let seen = pumped.clone();
    let listener: EventListenerRef<Request> = Arc::new(move |_: &Request| {
        let flag = Arc::new(AtomicBool::new(false));
        let set = flag.clone();
        caller_ref.post(move || set.store(true, Ordering::SeqCst)).unwrap();

        let deadline = Instant::now() + common::TIMEOUT;
        while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
    });
    support.add_listener_with_thread(listener, Some(callee.thread_ref()));

    let emitter = support.clone();
    let level_after = common::run_on(&caller.thread_ref(), move || {
        emitter.emit_event(Request(1), EmitMode::Blocking).unwrap();
        eventcore::Thread::current().map(|thread| thread.nested_loop().level())
    });

    assert!(pumped.load(Ordering::SeqCst));
    assert_eq!(level_after, Some(0));

    caller.quit().unwrap();
    callee.quit().unwrap();
}

#[test]
fn test_nested_blocking_round_trip() {
    let mut alpha = common::running_thread("alpha");
    let mut beta = common::running_thread("beta");
    let to_beta = Arc::new(EventSupport::<Request>::new());
    let to_alpha = Arc::new(EventSupport::<Request>::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = log.clone();
    let on_alpha: EventListenerRef<Request> = Arc::new(move |request: &Request| {
        record.lock().unwrap().push(format!("alpha {}", request.0));
    });
    to_alpha.add_listener_with_thread(on_alpha, Some(alpha.thread_ref()));

    let record = log.clone();
    let reply = to_alpha.clone();
    let on_beta: EventListenerRef<Request> = Arc::new(move |request: &Request| {
        record.lock().unwrap().push(format!("beta start {}", request.0));
        reply.emit_event(Request(request.0 + 1), EmitMode::Blocking).unwrap();
        record.lock().unwrap().push(format!("beta end {}", request.0));
    });
    to_beta.add_listener_with_thread(on_beta, Some(beta.thread_ref()));

    let emitter = to_beta.clone();
    common::run_on(&alpha.thread_ref(), move || {
        emitter.emit_event(Request(1), EmitMode::Blocking).unwrap();
    });

    assert_eq!(*log.lock().unwrap(), vec!["beta start 1", "alpha 2", "beta end 1"]);

    alpha.quit().unwrap();
    beta.quit().unwrap();
}

#[test]
fn test_same_thread_listener_is_called_directly_when_blocking() {
    let mut thread = common::running_thread("local");
    let support = Arc::new(EventSupport::<Request>::new());
    let nested_levels = Arc::new(Mutex::new(Vec::new()));

    let record = nested_levels.clone();
    let listener: EventListenerRef<Request> = Arc::new(move |_: &Request| {
        let level = eventcore::Thread::current().map(|thread| thread.nested_loop().level());
        record.lock().unwrap().push(level);
    });
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));

    let emitter = support.clone();
    common::run_on(&thread.thread_ref(), move || {
        emitter.emit_event(Request(1), EmitMode::Blocking).unwrap();
    });

    assert_eq!(*nested_levels.lock().unwrap(), vec![Some(0)]);

    thread.quit().unwrap();
}

#[test]
fn test_panicking_listener_still_releases_emitter() {
    let mut worker = common::running_thread("panicking");
    let support = EventSupport::<Request>::new();

    let listener: EventListenerRef<Request> = Arc::new(|_: &Request| panic!("listener failed"));
    support.add_listener_with_thread(listener, Some(worker.thread_ref()));

    support.emit_event(Request(1), EmitMode::Blocking).unwrap();

    assert!(matches!(worker.quit(), Err(ThreadError::QuitFailed)));
}

#[test]
fn test_blocking_to_quit_thread_fails_fast() {
    let mut worker = common::running_thread("quit");
    let support = Arc::new(EventSupport::<Request>::new());
    let handled = Arc::new(AtomicUsize::new(0));

    let counter = handled.clone();
    let listener: EventListenerRef<Request> = Arc::new(move |_: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    support.add_listener_with_thread(listener, Some(worker.thread_ref()));

    worker.quit().unwrap();

    let result = emit_blocking_from_thread(&support, Request(1));

    assert!(matches!(result, Err(ThreadError::NotRunning)));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert_eq!(worker.thread_ref().pending_calls(), 0);
}

#[test]
fn test_blocking_after_listener_panic_killed_loop_fails_fast() {
    let mut worker = common::running_thread("dead");
    let support = Arc::new(EventSupport::<Request>::new());

    let listener: EventListenerRef<Request> = Arc::new(|request: &Request| {
        if request.0 == 1 {
            panic!("listener failed");
        }
    });
    support.add_listener_with_thread(listener, Some(worker.thread_ref()));

    emit_blocking_from_thread(&support, Request(1)).unwrap();
    wait_until_stopped(&worker);

    let result = emit_blocking_from_thread(&support, Request(2));

    assert!(matches!(result, Err(ThreadError::NotRunning)));
    assert_eq!(worker.thread_ref().pending_calls(), 0);
    assert!(matches!(worker.quit(), Err(ThreadError::QuitFailed)));
}

#[test]
fn test_managed_emitter_to_stopped_thread_is_released() {
    let mut caller = common::running_thread("live");
    let mut worker = common::running_thread("stopped");
    let support = Arc::new(EventSupport::<Request>::new());

    let listener: EventListenerRef<Request> = Arc::new(|_: &Request| {});
    support.add_listener_with_thread(listener, Some(worker.thread_ref()));
    worker.quit().unwrap();

    let emitter = support.clone();
    let (result, level_after) = common::run_on(&caller.thread_ref(), move || {
        let result = emitter.emit_event(Request(1), EmitMode::Blocking);
        let level = eventcore::Thread::current().map(|thread| thread.nested_loop().level());
        (result, level)
    });

    assert!(matches!(result, Err(ThreadError::NotRunning)));
    assert_eq!(level_after, Some(0));

    caller.quit().unwrap();
}

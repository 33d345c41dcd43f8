mod common;

use eventcore::{EmitMode, EventListenerRef, EventSupport, Thread};

use pretty_assertions::assert_eq;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq)]
struct Tick(u32);

#[test]
fn test_queued_events_preserve_fifo_order_per_listener() {
    let mut thread = common::running_thread("fifo");
    let support = EventSupport::<Tick>::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["l1", "l2"] {
        let log = log.clone();
        let listener: EventListenerRef<Tick> =
            Arc::new(move |event: &Tick| log.lock().unwrap().push((name, event.0)));
        support.add_listener_with_thread(listener, Some(thread.thread_ref()));
    }

    support.emit_event(Tick(1), EmitMode::Queued).unwrap();
    support.emit_event(Tick(2), EmitMode::Queued).unwrap();
    common::flush(&thread.thread_ref());

    assert_eq!(*log.lock().unwrap(), vec![("l1", 1), ("l2", 1), ("l1", 2), ("l2", 2)]);

    thread.quit().unwrap();
}

#[test]
fn test_deferred_event_waits_for_due_time() {
    let mut thread = common::running_thread("deferred");
    let support = EventSupport::<Tick>::new();
    let (sender, receiver) = mpsc::channel();

    let listener: EventListenerRef<Tick> = Arc::new(move |event: &Tick| {
        sender.send((event.0, Instant::now())).unwrap();
    });
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));

    let start = Instant::now();
    support.emit_event(Tick(1), EmitMode::Deferred(Duration::from_secs(2))).unwrap();
    support.emit_event(Tick(2), EmitMode::Queued).unwrap();

    let (first, _) = receiver.recv_timeout(common::TIMEOUT).unwrap();
    assert_eq!(first, 2, "queued event must arrive before the deferred one");

    let (second, delivered) = receiver.recv_timeout(common::TIMEOUT).unwrap();
    assert_eq!(second, 1);
    assert!(
        delivered.duration_since(start) >= Duration::from_secs(2),
        "deferred event delivered after {:?}",
        delivered.duration_since(start)
    );

    thread.quit().unwrap();
}

#[test]
fn test_timed_events_run_in_due_order() {
    let mut thread = common::running_thread("timed");
    let support = EventSupport::<Tick>::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = log.clone();
    let listener: EventListenerRef<Tick> =
        Arc::new(move |event: &Tick| record.lock().unwrap().push(event.0));
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));

    support.emit_event(Tick(3), EmitMode::Deferred(Duration::from_millis(300))).unwrap();
    support.emit_event(Tick(1), EmitMode::Deferred(Duration::from_millis(100))).unwrap();
    support.emit_event(Tick(2), EmitMode::Deferred(Duration::from_millis(200))).unwrap();

    std::thread::sleep(Duration::from_millis(600));
    common::flush(&thread.thread_ref());

    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);

    thread.quit().unwrap();
}

#[test]
fn test_auto_mode_calls_directly_on_own_thread() {
    let mut thread = common::running_thread("auto");
    let support = Arc::new(EventSupport::<Tick>::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = log.clone();
    let listener: EventListenerRef<Tick> =
        Arc::new(move |event: &Tick| record.lock().unwrap().push(event.0));
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));

    let emitter = support.clone();
    let record = log.clone();
    let seen_during_call = common::run_on(&thread.thread_ref(), move || {
        emitter.emit_event(Tick(7), EmitMode::Auto).unwrap();
        record.lock().unwrap().clone()
    });

    assert_eq!(seen_during_call, vec![7]);

    // From another thread the same mode queues.
    support.emit_event(Tick(8), EmitMode::Auto).unwrap();
    common::flush(&thread.thread_ref());
    assert_eq!(*log.lock().unwrap(), vec![7, 8]);

    thread.quit().unwrap();
}

#[test]
fn test_listener_added_on_thread_inherits_its_affinity() {
    let mut thread = common::running_thread("inherit");
    let support = Arc::new(EventSupport::<Tick>::new());
    let (sender, receiver) = mpsc::channel();

    let registry = support.clone();
    common::run_on(&thread.thread_ref(), move || {
        let listener: EventListenerRef<Tick> = Arc::new(move |_: &Tick| {
            sender.send(Thread::current().map(|thread| thread.id())).unwrap();
        });
        registry.add_listener(listener);
    });

    support.emit_event(Tick(1), EmitMode::Queued).unwrap();

    assert_eq!(receiver.recv_timeout(common::TIMEOUT).unwrap(), Some(thread.thread_ref().id()));

    thread.quit().unwrap();
}

#[test]
fn test_calls_left_at_quit_are_dropped() {
    let mut thread = common::running_thread("leftover");
    let support = EventSupport::<Tick>::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = log.clone();
    let listener: EventListenerRef<Tick> =
        Arc::new(move |event: &Tick| record.lock().unwrap().push(event.0));
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));

    support.emit_event(Tick(1), EmitMode::Deferred(Duration::from_secs(60))).unwrap();
    thread.quit().unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(thread.thread_ref().pending_calls(), 0);
}

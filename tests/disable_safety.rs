mod common;

use eventcore::{EmitMode, EventListenerRef, EventSupport};

use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
struct Notice(&'static str);

fn recording_listener(log: &Arc<Mutex<Vec<&'static str>>>) -> EventListenerRef<Notice> {
    let log = log.clone();
    Arc::new(move |notice: &Notice| log.lock().unwrap().push(notice.0))
}

#[test]
fn test_removed_listener_queued_calls_are_skipped() {
    let mut thread = common::running_thread("disable");
    let support = EventSupport::<Notice>::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let id = support.add_listener_with_thread(recording_listener(&log), Some(thread.thread_ref()));

    let release = common::block_thread(&thread.thread_ref());
    support.emit_event(Notice("queued"), EmitMode::Queued).unwrap();
    support.remove_listener(id);
    release.send(()).unwrap();

    common::flush(&thread.thread_ref());
    assert!(log.lock().unwrap().is_empty());

    thread.quit().unwrap();
}

#[test]
fn test_disabling_keeps_order_of_other_calls() {
    let mut thread = common::running_thread("order");
    let removed_support = EventSupport::<Notice>::new();
    let kept_support = EventSupport::<Notice>::new();
    let removed_log = Arc::new(Mutex::new(Vec::new()));
    let kept_log = Arc::new(Mutex::new(Vec::new()));

    let removed = removed_support
        .add_listener_with_thread(recording_listener(&removed_log), Some(thread.thread_ref()));
    kept_support.add_listener_with_thread(recording_listener(&kept_log), Some(thread.thread_ref()));

    let release = common::block_thread(&thread.thread_ref());
    kept_support.emit_event(Notice("first"), EmitMode::Queued).unwrap();
    removed_support.emit_event(Notice("dropped"), EmitMode::Queued).unwrap();
    kept_support.emit_event(Notice("second"), EmitMode::Queued).unwrap();
    removed_support.remove_listener(removed);
    kept_support.emit_event(Notice("third"), EmitMode::Queued).unwrap();
    release.send(()).unwrap();

    common::flush(&thread.thread_ref());

    assert!(removed_log.lock().unwrap().is_empty());
    assert_eq!(*kept_log.lock().unwrap(), vec!["first", "second", "third"]);

    thread.quit().unwrap();
}

#[test]
fn test_dropping_support_disables_queued_calls() {
    let mut thread = common::running_thread("dropped");
    let log = Arc::new(Mutex::new(Vec::new()));

    let release = common::block_thread(&thread.thread_ref());
    {
        let support = EventSupport::<Notice>::new();
        support.add_listener_with_thread(recording_listener(&log), Some(thread.thread_ref()));
        support.emit_event(Notice("orphan"), EmitMode::Queued).unwrap();
    }
    release.send(()).unwrap();

    common::flush(&thread.thread_ref());
    assert!(log.lock().unwrap().is_empty());

    thread.quit().unwrap();
}

#[test]
fn test_removal_releases_blocked_emitter() {
    let mut thread = common::running_thread("release");
    let support = Arc::new(EventSupport::<Notice>::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let id = support.add_listener_with_thread(recording_listener(&log), Some(thread.thread_ref()));

    let release = common::block_thread(&thread.thread_ref());

    let emitter = support.clone();
    let blocked =
        std::thread::spawn(move || emitter.emit_event(Notice("blocking"), EmitMode::Blocking));

    // The blocking call lands behind the gate before the listener goes away.
    while thread.thread_ref().pending_calls() == 0 {
        std::thread::yield_now();
    }
    support.remove_listener(id);
    release.send(()).unwrap();

    blocked.join().unwrap().unwrap();
    assert!(log.lock().unwrap().is_empty());

    thread.quit().unwrap();
}

#[test]
fn test_listener_readded_after_removal_gets_new_events() {
    let mut thread = common::running_thread("readd");
    let support = EventSupport::<Notice>::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let listener = recording_listener(&log);

    let release = common::block_thread(&thread.thread_ref());
    let id = support.add_listener_with_thread(listener.clone(), Some(thread.thread_ref()));
    support.emit_event(Notice("old"), EmitMode::Queued).unwrap();
    support.remove_listener(id);
    support.add_listener_with_thread(listener, Some(thread.thread_ref()));
    support.emit_event(Notice("new"), EmitMode::Queued).unwrap();
    release.send(()).unwrap();

    common::flush(&thread.thread_ref());
    assert_eq!(*log.lock().unwrap(), vec!["new"]);

    thread.quit().unwrap();
}

mod common;

use eventcore::Thread;
use eventcore::event::LoopPayload;

use pretty_assertions::assert_eq;
use std::sync::mpsc;

fn label(payload: Option<LoopPayload>) -> Option<&'static str> {
    payload.and_then(|payload| payload.downcast::<&'static str>().ok()).map(|value| *value)
}

#[test]
fn test_nested_loop_keeps_dispatching_and_returns_payload() {
    let mut thread = common::running_thread("nested");
    let thread_ref = thread.thread_ref();
    let (levels, seen_levels) = mpsc::channel();

    let returned = common::run_on(&thread.thread_ref(), move || {
        let current = Thread::current().unwrap();
        let handle = current.nested_loop().new_handle();

        // Posted from another thread while this one waits in the nested loop.
        let remote = thread_ref.clone();
        let spawner = std::thread::spawn(move || {
            remote
                .post(move || {
                    let current = Thread::current().unwrap();
                    levels.send(current.nested_loop().level()).unwrap();
                    current.nested_loop().exit(handle, Box::new(7u32));
                })
                .unwrap();
        });

        let payload = current.nested_loop().begin(handle);
        spawner.join().unwrap();

        payload.and_then(|payload| payload.downcast::<u32>().ok()).map(|value| *value)
    });

    assert_eq!(returned, Some(7));
    assert_eq!(seen_levels.recv_timeout(common::TIMEOUT).unwrap(), 1);
    assert_eq!(thread.thread_ref().nested_loop().level(), 0);

    thread.quit().unwrap();
}

#[test]
fn test_inner_loop_exited_last_unwinds_both_levels() {
    let mut thread = common::running_thread("stacked");

    let order = common::run_on(&thread.thread_ref(), move || {
        let current = Thread::current().unwrap();
        let outer = current.nested_loop().new_handle();
        let inner = current.nested_loop().new_handle();
        let (record, order) = mpsc::channel();

        let inner_record = record.clone();
        current
            .post(move || {
                let current = Thread::current().unwrap();

                // Exit the outer context first: it cannot unwind until the
                // inner one is done.
                let exits = current.clone();
                current
                    .post(move || {
                        exits.nested_loop().exit(outer, Box::new("outer"));
                        exits.nested_loop().exit(inner, Box::new("inner"));
                    })
                    .unwrap();

                let payload = current.nested_loop().begin(inner);
                inner_record.send(label(payload)).unwrap();
            })
            .unwrap();

        let payload = current.nested_loop().begin(outer);
        record.send(label(payload)).unwrap();

        order.try_iter().collect::<Vec<_>>()
    });

    assert_eq!(order, vec![Some("inner"), Some("outer")]);

    thread.quit().unwrap();
}

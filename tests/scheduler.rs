//! Round-robin scheduling properties, driven deterministically on the
//! cooperative backend.

use taskmux::{Adaptor, AdaptorBuilder, BackendKind, ContextConfig, ContextHandle, Error};

use std::sync::{Arc, Mutex};

fn coop_adaptor() -> Adaptor {
    AdaptorBuilder::new().backend(BackendKind::Coop).build()
}

fn recording_context(
    adaptor: &Adaptor,
    events: &Arc<Mutex<Vec<&'static str>>>,
    tag: &'static str,
) -> ContextHandle {
    let events = events.clone();
    adaptor
        .create_context(ContextConfig::new().with_step(move || {
            events.lock().unwrap().push(tag);
        }))
        .unwrap()
}

#[test]
fn test_round_robin_dispatches_each_once_per_cycle() {
    let adaptor = coop_adaptor();
    let events = Arc::new(Mutex::new(Vec::new()));

    let a = recording_context(&adaptor, &events, "a");
    let b = recording_context(&adaptor, &events, "b");
    let c = recording_context(&adaptor, &events, "c");
    adaptor.complete();

    for _ in 0..3 {
        a.proceed().unwrap();
        b.proceed().unwrap();
        c.proceed().unwrap();
    }

    let dispatched = adaptor.run_pending();
    assert_eq!(dispatched, 9);
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &["a", "b", "c", "a", "b", "c", "a", "b", "c"],
        "each context runs exactly once per full cycle before any runs twice"
    );
}

#[test]
fn test_repeated_readiness_cannot_starve_peers() {
    let adaptor = coop_adaptor();
    let events = Arc::new(Mutex::new(Vec::new()));

    let a = recording_context(&adaptor, &events, "a");
    let b = recording_context(&adaptor, &events, "b");
    recording_context(&adaptor, &events, "c");
    adaptor.complete();

    a.proceed().unwrap();
    a.proceed().unwrap();
    a.proceed().unwrap();
    b.proceed().unwrap();

    adaptor.run_pending();
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &["a", "b", "a", "a"],
        "the cursor advances past a dispatched context before it can run again"
    );
}

#[test]
fn test_disabled_context_is_never_dispatched() {
    let adaptor = coop_adaptor();
    let events = Arc::new(Mutex::new(Vec::new()));

    let a = recording_context(&adaptor, &events, "a");
    let b = recording_context(&adaptor, &events, "b");
    let c = recording_context(&adaptor, &events, "c");
    adaptor.complete();

    a.proceed().unwrap();
    b.proceed().unwrap();
    c.proceed().unwrap();
    b.disable().unwrap();

    adaptor.run_pending();
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &["a", "c"],
        "a disabled context must be skipped even with readiness pending"
    );

    // Re-enabling keeps the neighbours registered before and after it.
    b.enable().unwrap();
    events.lock().unwrap().clear();

    a.proceed().unwrap();
    b.proceed().unwrap();
    c.proceed().unwrap();
    adaptor.run_pending();
    assert_eq!(events.lock().unwrap().as_slice(), &["a", "b", "c"]);
}

#[test]
fn test_proceed_requires_a_runtime_capability() {
    let adaptor = coop_adaptor();

    let handle = adaptor
        .create_context(ContextConfig::new().with_signal())
        .unwrap();
    adaptor.complete();

    assert_eq!(handle.proceed().err(), Some(Error::NotSupported));
}

#[test]
fn test_run_pending_with_nothing_ready() {
    let adaptor = coop_adaptor();
    let events = Arc::new(Mutex::new(Vec::new()));
    recording_context(&adaptor, &events, "a");
    adaptor.complete();

    assert_eq!(adaptor.run_pending(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_signal_marks_context_ready_for_dispatch() {
    let adaptor = coop_adaptor();
    let events = Arc::new(Mutex::new(Vec::new()));

    let events_clone = events.clone();
    let handle = adaptor
        .create_context(
            ContextConfig::new()
                .with_step(move || {
                    events_clone.lock().unwrap().push("step");
                })
                .with_signal(),
        )
        .unwrap();
    adaptor.complete();

    handle.signal().unwrap();
    assert_eq!(adaptor.run_pending(), 1);
    assert_eq!(events.lock().unwrap().as_slice(), &["step"]);
    assert_eq!(
        handle.signal_check(),
        Ok(true),
        "the signal stays pending until a check call observes it"
    );
}

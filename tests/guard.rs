//! Re-entrant guard behaviour on the preemptive backends.

use taskmux::{AdaptorBuilder, BackendKind, ContextConfig, Error};

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_guard_is_reentrant_for_the_same_owner() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Threads).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_guard(Duration::from_millis(100)))
        .unwrap();
    adaptor.complete();

    handle.acquire().unwrap();
    handle.acquire().unwrap();
    handle.release().unwrap();
    handle.release().unwrap();

    assert_eq!(
        handle.release().err(),
        Some(Error::Failed),
        "an unmatched release must fail softly"
    );
}

#[test]
fn test_acquire_timeout_is_bounded() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Parking).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_guard(Duration::from_millis(200)))
        .unwrap();
    adaptor.complete();

    handle.acquire().unwrap();

    let contender = handle.clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let start = Instant::now();
        let result = contender.acquire();
        tx.send((result, start.elapsed())).unwrap();
    });

    let (result, elapsed) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("contender must come back, never hang");
    assert_eq!(result.err(), Some(Error::Failed));
    assert!(
        elapsed >= Duration::from_millis(150),
        "timeout returned too early: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "timeout returned far too late: {elapsed:?}"
    );

    handle.release().unwrap();
}

#[test]
fn test_release_by_non_owner_fails() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Threads).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_guard(Duration::from_millis(100)))
        .unwrap();
    adaptor.complete();

    handle.acquire().unwrap();

    let other = handle.clone();
    let stolen = thread::spawn(move || other.release())
        .join()
        .unwrap();
    assert_eq!(stolen.err(), Some(Error::Failed));

    handle.release().unwrap();
}

#[test]
fn test_contended_acquire_succeeds_after_release() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Threads).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_guard(Duration::from_secs(2)))
        .unwrap();
    adaptor.complete();

    handle.acquire().unwrap();

    let contender = handle.clone();
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        let result = contender.acquire();
        tx.send(result).unwrap();
        if result.is_ok() {
            contender.release().unwrap();
        }
    });

    thread::sleep(Duration::from_millis(50));
    handle.release().unwrap();

    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("contender must observe the release");
    assert_eq!(result, Ok(()));
    waiter.join().unwrap();
}

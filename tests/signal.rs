//! Signal semantics: coalescing, check calls, and the guard pairing.

use taskmux::{AdaptorBuilder, BackendKind, ContextConfig, ContextHandle, Error};

use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[test]
fn test_signals_coalesce_to_one_pending_event() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Coop).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_signal())
        .unwrap();
    adaptor.complete();

    handle.signal().unwrap();
    handle.signal().unwrap();
    handle.signal().unwrap();

    assert_eq!(
        handle.signal_check(),
        Ok(true),
        "at least one event must be pending"
    );
    assert_eq!(
        handle.signal_check(),
        Ok(false),
        "signals do not stack as N events"
    );
}

#[test]
fn test_signal_check_and_acquire_holds_guard_on_observation() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Threads).build();
    let handle = adaptor
        .create_context(
            ContextConfig::new()
                .with_signal()
                .with_guard(Duration::from_millis(100)),
        )
        .unwrap();
    adaptor.complete();

    handle.signal().unwrap();

    assert_eq!(handle.signal_check_and_acquire(), Ok(true));
    // The guard is held and must be released by us.
    assert_eq!(handle.release(), Ok(()));

    // Without a pending signal the guard is not left held.
    assert_eq!(handle.signal_check_and_acquire(), Ok(false));
    assert_eq!(handle.release().err(), Some(Error::Failed));
}

#[test]
fn test_signal_without_capability_is_rejected() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Coop).build();
    let handle = adaptor
        .create_context(ContextConfig::new().with_guard(Duration::from_millis(50)))
        .unwrap();
    adaptor.complete();

    assert_eq!(handle.signal().err(), Some(Error::NotSupported));
    assert_eq!(handle.signal_check().err(), Some(Error::NotSupported));
}

#[test]
fn test_signal_wakes_the_hosting_runtime() {
    let adaptor = AdaptorBuilder::new().backend(BackendKind::Threads).build();

    let slot: Arc<OnceLock<ContextHandle>> = Arc::new(OnceLock::new());
    let (tx, rx) = mpsc::channel();

    let slot_clone = slot.clone();
    let handle = adaptor
        .create_context(
            ContextConfig::new()
                .with_step(move || {
                    let handle = slot_clone.get().expect("handle installed before complete");
                    tx.send(handle.signal_check()).unwrap();
                })
                .with_signal(),
        )
        .unwrap();
    slot.set(handle.clone()).ok().unwrap();
    adaptor.complete();

    handle.signal().unwrap();

    let observed = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("step must be dispatched after a signal");
    assert_eq!(
        observed,
        Ok(true),
        "the step dispatched by a signal observes it pending"
    );

    adaptor.shutdown();
}

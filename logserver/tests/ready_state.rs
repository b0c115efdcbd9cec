use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use stampede_logserver::proxy::ReadyState;

#[test]
fn should_dispatch_fresh_connection_exactly_once() {
    let state = ReadyState::new();
    assert!(!state.channel_ready(), "first signal is a fresh dispatch");
    assert!(state.channel_ready(), "second signal notifies the owner");
    assert!(state.channel_ready());
}

#[test]
fn should_release_ownership_when_no_signal_is_pending() {
    let state = ReadyState::new();
    assert!(!state.channel_ready());
    assert!(!state.end_turn(), "no pending signal, ownership released");
    assert!(!state.channel_ready(), "released connection dispatches fresh");
}

#[test]
fn should_rerun_turn_when_signal_arrived_during_turn() {
    let state = ReadyState::new();
    assert!(!state.channel_ready());
    assert!(state.channel_ready());
    assert!(state.end_turn(), "pending signal forces another turn");
    assert!(!state.end_turn(), "signal consumed, second end releases");
}

#[test]
fn should_not_wait_when_signal_already_arrived() {
    let state = ReadyState::new();
    assert!(!state.channel_ready());
    assert!(state.channel_ready());

    let start = Instant::now();
    state.wait_readable(Duration::from_secs(5));
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "recorded signal must satisfy the wait immediately"
    );
}

#[test]
fn should_wake_waiter_on_readiness_signal() {
    let state = Arc::new(ReadyState::new());
    assert!(!state.channel_ready());

    let waiter_state = state.clone();
    let waiter = thread::spawn(move || {
        let start = Instant::now();
        waiter_state.wait_readable(Duration::from_secs(10));
        start.elapsed()
    });

    thread::sleep(Duration::from_millis(50));
    assert!(state.channel_ready());

    let waited = waiter.join().expect("Failed to join waiter thread");
    assert!(waited < Duration::from_secs(5), "waiter must be woken early");
}

#[test]
fn should_never_dispatch_twice_concurrently() {
    let state = Arc::new(ReadyState::new());
    let signallers = 4;

    for _ in 0..100 {
        let barrier = Arc::new(Barrier::new(signallers));
        let mut threads = Vec::with_capacity(signallers);
        for _ in 0..signallers {
            let state = state.clone();
            let barrier = barrier.clone();
            threads.push(thread::spawn(move || {
                barrier.wait();
                state.channel_ready()
            }));
        }
        let fresh_dispatches = threads
            .into_iter()
            .map(|t| t.join().expect("Failed to join signaller thread"))
            .filter(|owned| !owned)
            .count();
        assert_eq!(fresh_dispatches, 1, "exactly one signal wins the dispatch");

        // Release for the next round, consuming any recorded signal first.
        while state.end_turn() {}
    }
}

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use stampede_logserver::workers::WorkerPool;

fn wait_for(counter: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::Relaxed) != expected {
        assert!(Instant::now() < deadline, "jobs did not complete in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn should_run_every_queued_job() {
    let pool = WorkerPool::new(2, 4, Duration::from_secs(60));
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let counter = counter.clone();
        pool.execute(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }

    wait_for(&counter, 50);
    pool.shutdown();
}

#[test]
fn should_grow_past_core_size_when_jobs_block() {
    let pool = WorkerPool::new(1, 4, Duration::from_secs(60));
    let running = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    // Each job parks until it sees all three running at once, which only
    // happens if the pool grew beyond its single core thread.
    for _ in 0..3 {
        let running = running.clone();
        let done = done.clone();
        pool.execute(Box::new(move || {
            running.fetch_add(1, Ordering::Relaxed);
            let deadline = Instant::now() + Duration::from_secs(5);
            while running.load(Ordering::Relaxed) < 3 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            done.fetch_add(1, Ordering::Relaxed);
        }));
        // Give the pool a moment to see no idle threads.
        thread::sleep(Duration::from_millis(20));
    }

    wait_for(&done, 3);
    assert_eq!(running.load(Ordering::Relaxed), 3);
    pool.shutdown();
}

#[test]
fn should_shut_down_with_idle_threads() {
    let pool = WorkerPool::new(2, 10, Duration::from_secs(300));
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = counter.clone();
        pool.execute(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }
    wait_for(&counter, 1);

    // Must return promptly even though core threads wait without timeout.
    pool.shutdown();
}

#[test]
fn should_not_accumulate_handles_of_retired_threads() {
    let pool = WorkerPool::new(1, 2, Duration::from_millis(50));

    // Each round forces a surplus thread into existence and then lets it
    // retire; tracked handles must stay bounded across rounds.
    for _ in 0..5 {
        let release = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for submitted in 1..=2 {
            let release = release.clone();
            let job_running = running.clone();
            let done = done.clone();
            pool.execute(Box::new(move || {
                job_running.fetch_add(1, Ordering::Relaxed);
                let deadline = Instant::now() + Duration::from_secs(5);
                while release.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(2));
                }
                done.fetch_add(1, Ordering::Relaxed);
            }));
            // The next submission must find nobody idle, forcing growth.
            wait_for(&running, submitted);
        }

        release.store(1, Ordering::Relaxed);
        wait_for(&done, 2);
        // Long enough for the surplus thread to hit its idle timeout.
        thread::sleep(Duration::from_millis(200));
    }

    assert!(
        pool.thread_count() <= 3,
        "retired thread handles must be swept, found {}",
        pool.thread_count()
    );
    pool.shutdown();
}

#[test]
fn should_ignore_jobs_submitted_after_shutdown() {
    let pool = WorkerPool::new(1, 2, Duration::from_secs(60));
    pool.shutdown();

    let counter = Arc::new(AtomicUsize::new(0));
    let observer = counter.clone();
    pool.execute(Box::new(move || {
        observer.fetch_add(1, Ordering::Relaxed);
    }));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::Relaxed), 0);
}

use std::{
    thread::{self, available_parallelism},
    time::Instant,
};

use stampede_client::{Level, LogClient, LogRecord};

pub fn run_test(authority: &str) {
    let repeat_count: usize = 10000;
    let concurrency = available_parallelism()
        .expect("Can't get the number of CPUs")
        .get();

    let start = Instant::now();

    let mut threads: Vec<thread::JoinHandle<()>> = Vec::with_capacity(concurrency);
    for index in 0..concurrency {
        let thread_id = index + 1;
        let authority = authority.to_owned();
        let worker = thread::Builder::new().name(format!("client-{}", thread_id));
        threads.push(
            worker
                .spawn(move || send_records(&authority, repeat_count, thread_id))
                .unwrap(),
        );
    }

    for thread in threads {
        thread.join().expect("Failed to join worker thread");
    }

    let elapsed = start.elapsed();
    println!(
        "Elapsed: {:.2?} sending {} records with {} concurrency",
        elapsed,
        concurrency * repeat_count,
        concurrency
    );
    println!(
        "Average throughput {} records/sec",
        thousands(
            &((concurrency * repeat_count) as f32 / (elapsed.as_micros() as f32 / 1000000.0))
                .floor()
                .to_string()
        )
    );
    println!(
        "Average latency {} µs",
        ((elapsed.as_micros() as f32) / ((concurrency * repeat_count) as f32)).floor()
    );
}

fn send_records(authority: &str, count: usize, thread_id: usize) {
    let mut client = LogClient::connect(authority)
        .unwrap_or_else(|e| panic!("Failed to connect to {}: {}", authority, e));

    let logger = format!("perftest.client{}", thread_id);
    for _ in 0..count {
        let level = match rand::random::<u8>() % 4 {
            0 => Level::Warning,
            1 => Level::Fine,
            2 => Level::Finest,
            _ => Level::Info,
        };
        let message = format!(
            "Benchmark payload {} from thread {}",
            rand::random::<u32>(),
            thread_id
        );
        let record = LogRecord::new(level, &logger, &message);
        client
            .send_record(&record)
            .expect("Failed to write record to stream");
    }

    client.finish().expect("Failed to close log stream");
}

fn thousands(number: &str) -> String {
    number
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(std::str::from_utf8)
        .collect::<Result<Vec<&str>, _>>()
        .unwrap()
        .join(",")
}

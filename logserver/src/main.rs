use log::{error, LevelFilter};
use std::process;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use stampede_logserver::config::ServerConfig;
use stampede_logserver::server::LogServer;

fn main() {
    let mut clog = colog::default_builder();

    #[cfg(debug_assertions)]
    clog.filter_level(LevelFilter::Debug);

    #[cfg(not(debug_assertions))]
    clog.filter_level(LevelFilter::Info);

    clog.init();

    let config = ServerConfig::load();
    let server = match LogServer::start(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start log server: {e}");
            process::exit(1);
        }
    };

    // Handle SIGTERM by setting the stop_signal boolean
    let stop_signal = Arc::new(AtomicBool::new(false));
    let handler_signal = stop_signal.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_signal.store(true, Ordering::Relaxed)) {
        error!("Failed to install signal handler: {e}");
        process::exit(1);
    }

    while !stop_signal.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    server.shutdown();
}

mod flood_test_client;

use log::LevelFilter;
use std::env;

fn main() {
    let mut clog = colog::default_builder();

    #[cfg(debug_assertions)]
    clog.filter_level(LevelFilter::Debug);

    #[cfg(not(debug_assertions))]
    clog.filter_level(LevelFilter::Warn);

    clog.init();

    let args: Vec<String> = env::args().collect();
    let authority: String = match args.get(1) {
        Some(s) => s.clone(),
        None => String::from("localhost:9999"),
    };

    flood_test_client::run_test(&authority);
}

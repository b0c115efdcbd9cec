/// Process-wide immutable settings, loaded once at startup
pub mod config;

/// The accept thread that feeds new connections to the dispatchers
pub mod acceptor;

/// Readiness event loops; each is the sole mutator of its registration set
pub mod listener;

/// Per-connection bridge between the dispatch thread and the worker pool
pub mod proxy;

/// Protocol sniffing and the per-connection handler lifecycle
pub mod protocol;

/// The handler that appends completed log records to the log file
pub mod log_handler;

/// Bounded pool of service threads that execute connection turns
pub mod workers;

/// Server wiring and ordered shutdown
pub mod server;

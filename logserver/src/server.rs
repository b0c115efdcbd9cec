use log::info;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::acceptor::{Acceptor, AcceptorHandle};
use crate::config::ServerConfig;
use crate::listener::{Listener, ListenerHandle};
use crate::workers::WorkerPool;

/// The assembled log server: the acceptor thread, the event dispatch
/// threads, and the worker pool they feed.
pub struct LogServer {
    workers: Arc<WorkerPool>,
    listeners: Vec<ListenerHandle>,
    listener_threads: Vec<JoinHandle<()>>,
    acceptor: AcceptorHandle,
    acceptor_thread: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl LogServer {
    /// Binds the listen socket and starts every thread. On success the
    /// server is live and accepting connections.
    pub fn start(config: ServerConfig) -> io::Result<Self> {
        let config = Arc::new(config);
        let workers = Arc::new(WorkerPool::new(
            config.service_threads.core,
            config.service_threads.max,
            Duration::from_secs(config.service_threads.time_out),
        ));

        let listener_count = config.listener_threads.max(1);
        let mut listeners = Vec::with_capacity(listener_count);
        let mut listener_threads = Vec::with_capacity(listener_count);
        for id in 0..listener_count {
            let (listener, handle) = Listener::new(id, workers.clone(), config.clone())?;
            let thread = thread::Builder::new()
                .name(format!("listener-{id}"))
                .spawn(move || listener.run())?;
            listeners.push(handle);
            listener_threads.push(thread);
        }

        let (acceptor, acceptor_handle) = Acceptor::new(&config, listeners.clone())?;
        let local_addr = acceptor.local_addr();
        let acceptor_thread = thread::Builder::new()
            .name(String::from("acceptor"))
            .spawn(move || acceptor.run())?;

        info!("Log server listening on {local_addr}");
        Ok(Self {
            workers,
            listeners,
            listener_threads,
            acceptor: acceptor_handle,
            acceptor_thread,
            local_addr,
        })
    }

    /// The bound address, resolved after binding so a configured port of
    /// zero reports the port the kernel picked.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, closes every connection, and joins every thread.
    pub fn shutdown(self) {
        info!("Log server shutting down");
        self.acceptor.shutdown();
        let _ = self.acceptor_thread.join();
        for handle in &self.listeners {
            handle.shutdown();
        }
        for thread in self.listener_threads {
            let _ = thread.join();
        }
        self.workers.shutdown();
        info!("Log server stopped");
    }
}

use log::{debug, warn};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use std::collections::VecDeque;
use std::io;
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ServerConfig;
use crate::proxy::RequestProxy;
use crate::workers::WorkerPool;

/// Reserved token for the listener's waker. Connection tokens come from the
/// slab and start at zero, so the top of the range is safe.
const WAKER_TOKEN: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 1024;

/// A requested change to one connection's registration. `None` interest
/// means deregister and close.
struct InterestChange {
    token: Token,
    interest: Option<Interest>,
}

struct ListenerShared {
    waker: Waker,
    accept_queue: Mutex<VecDeque<TcpStream>>,
    /// Registration changes awaiting the listener thread. Requests target
    /// different connections concurrently, so every one must survive until
    /// applied; the queue is drained in order after each poll pass.
    pending: Mutex<VecDeque<InterestChange>>,
    shutdown: AtomicBool,
}

/// Handle through which other threads ask a listener to change its
/// registrations. The listener thread is the only mutator of its poll, so
/// every request lands in the shared slot and a waker kick makes the
/// listener apply it.
#[derive(Clone)]
pub struct ListenerHandle {
    inner: Arc<ListenerShared>,
}

impl ListenerHandle {
    /// Switches the interest a connection is registered for.
    pub fn reregister(&self, token: Token, interest: Interest) {
        self.request(InterestChange {
            token,
            interest: Some(interest),
        });
    }

    /// Cancels the registration and closes the channel.
    pub fn close(&self, token: Token) {
        self.request(InterestChange {
            token,
            interest: None,
        });
    }

    /// Hands a freshly accepted channel to this listener.
    pub fn enqueue(&self, stream: TcpStream) {
        self.inner.accept_queue.lock().unwrap().push_back(stream);
        self.wake();
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.wake();
    }

    fn request(&self, change: InterestChange) {
        self.inner.pending.lock().unwrap().push_back(change);
        self.wake();
    }

    fn wake(&self) {
        if let Err(e) = self.inner.waker.wake() {
            warn!("Listener waker failed: {e}");
        }
    }
}

/// One event dispatch thread. Owns a poll instance and the registrations of
/// every connection assigned to it; accepted channels and registration
/// changes arrive through the shared handle and are applied only here.
pub struct Listener {
    id: usize,
    poll: Poll,
    connections: Slab<Arc<RequestProxy>>,
    shared: Arc<ListenerShared>,
    workers: Arc<WorkerPool>,
    config: Arc<ServerConfig>,
}

impl Listener {
    pub fn new(
        id: usize,
        workers: Arc<WorkerPool>,
        config: Arc<ServerConfig>,
    ) -> io::Result<(Self, ListenerHandle)> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shared = Arc::new(ListenerShared {
            waker,
            accept_queue: Mutex::new(VecDeque::new()),
            pending: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
        });
        let handle = ListenerHandle {
            inner: shared.clone(),
        };
        let listener = Self {
            id,
            poll,
            connections: Slab::new(),
            shared,
            workers,
            config,
        };
        Ok((listener, handle))
    }

    /// The dispatch loop. Blocks on the poll, flips ready proxies to
    /// scheduled and submits the fresh ones to the worker pool, then applies
    /// whatever arrived through the handle while the poll was parked.
    pub fn run(mut self) {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        debug!("Listener {} running", self.id);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("Listener {}: poll failed: {}", self.id, e);
                break;
            }

            let mut fresh: Vec<Arc<RequestProxy>> = Vec::new();
            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                let proxy = match self.connections.get(event.token().0) {
                    Some(proxy) => proxy,
                    None => continue,
                };
                // channel_ready reports whether a worker already owns the
                // connection; only unowned readable ones get a fresh
                // dispatch. Write readiness only matters to a worker
                // already mid-response, so it notifies without claiming.
                if event.is_readable() {
                    if !proxy.channel_ready() {
                        fresh.push(proxy.clone());
                    }
                } else if event.is_writable() {
                    proxy.write_ready();
                }
            }
            for proxy in fresh {
                self.workers.execute(Box::new(move || proxy.run()));
            }

            self.apply_pending();
            self.drain_accept_queue();

            if self.shared.shutdown.load(Ordering::Relaxed) {
                break;
            }
        }
        self.close_all();
        debug!("Listener {} stopped", self.id);
    }

    fn apply_pending(&mut self) {
        loop {
            let change = match self.shared.pending.lock().unwrap().pop_front() {
                Some(change) => change,
                None => break,
            };
            match change.interest {
                Some(interest) => {
                    if let Some(proxy) = self.connections.get(change.token.0) {
                        let mut stream = proxy.stream().lock().unwrap();
                        if let Err(e) = self.poll.registry().reregister(
                            &mut *stream,
                            change.token,
                            interest,
                        ) {
                            warn!(
                                "Listener {}: reregister of connection {} failed: {}",
                                self.id, change.token.0, e
                            );
                        }
                    }
                }
                None => self.remove_connection(change.token),
            }
        }
    }

    fn drain_accept_queue(&mut self) {
        loop {
            let stream = match self.shared.accept_queue.lock().unwrap().pop_front() {
                Some(stream) => stream,
                None => break,
            };
            let handle = ListenerHandle {
                inner: self.shared.clone(),
            };
            let entry = self.connections.vacant_entry();
            let token = Token(entry.key());
            let proxy = Arc::new(RequestProxy::new(token, stream, handle, &self.config));
            {
                let mut stream = proxy.stream().lock().unwrap();
                if let Err(e) =
                    self.poll
                        .registry()
                        .register(&mut *stream, token, Interest::READABLE)
                {
                    warn!("Listener {}: register of new connection failed: {}", self.id, e);
                    continue;
                }
            }
            entry.insert(proxy);
            debug!("Listener {}: accepted connection {}", self.id, token.0);
        }
    }

    fn remove_connection(&mut self, token: Token) {
        if !self.connections.contains(token.0) {
            return;
        }
        let proxy = self.connections.remove(token.0);
        {
            let mut stream = proxy.stream().lock().unwrap();
            if let Err(e) = self.poll.registry().deregister(&mut *stream) {
                debug!(
                    "Listener {}: deregister of connection {} failed: {}",
                    self.id, token.0, e
                );
            }
            let _ = stream.shutdown(Shutdown::Both);
        }
        proxy.mark_closed();
        debug!("Listener {}: closed connection {}", self.id, token.0);
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.iter().map(|(key, _)| Token(key)).collect();
        for token in tokens {
            self.remove_connection(token);
        }
    }
}

use log::{debug, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::listener::ListenerHandle;

const LISTEN_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

const DEFAULT_BACKLOG: i32 = 128;

struct AcceptorShared {
    waker: Waker,
    shutdown: AtomicBool,
}

#[derive(Clone)]
pub struct AcceptorHandle {
    inner: Arc<AcceptorShared>,
}

impl AcceptorHandle {
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = self.inner.waker.wake() {
            warn!("Acceptor waker failed: {e}");
        }
    }
}

/// Accepts inbound connections and deals them out to the event dispatch
/// threads round robin. Runs its own small poll so shutdown can interrupt a
/// parked accept.
pub struct Acceptor {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatchers: Vec<ListenerHandle>,
    next: usize,
    shared: Arc<AcceptorShared>,
}

impl Acceptor {
    pub fn new(
        config: &ServerConfig,
        dispatchers: Vec<ListenerHandle>,
    ) -> io::Result<(Self, AcceptorHandle)> {
        let mut listener = bind_listener(config)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shared = Arc::new(AcceptorShared {
            waker,
            shutdown: AtomicBool::new(false),
        });
        let handle = AcceptorHandle {
            inner: shared.clone(),
        };
        let acceptor = Self {
            poll,
            listener,
            local_addr,
            dispatchers,
            next: 0,
            shared,
        };
        Ok((acceptor, handle))
    }

    /// The address the server is actually listening on. Differs from the
    /// configured one when port zero was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn run(mut self) {
        let mut events = Events::with_capacity(16);
        debug!("Acceptor listening on {}", self.local_addr);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("Acceptor: poll failed: {e}");
                break;
            }
            if self.shared.shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.accept_ready();
        }
        debug!("Acceptor stopped");
    }

    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let index = self.next;
                    self.next = (self.next + 1) % self.dispatchers.len();
                    debug!("Accepted connection from {peer}, assigned to listener {index}");
                    self.dispatchers[index].enqueue(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Accept failed: {e}");
                    break;
                }
            }
        }
    }
}

fn bind_listener(config: &ServerConfig) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], config.port));
    socket.bind(&addr.into())?;
    let backlog = if config.listen_queue_size > 0 {
        config.listen_queue_size
    } else {
        DEFAULT_BACKLOG
    };
    socket.listen(backlog)?;
    Ok(TcpListener::from_std(socket.into()))
}

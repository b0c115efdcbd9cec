use log::{debug, warn};
use mio::net::TcpStream;
use mio::{Interest, Token};
use std::fmt;
use std::io::{self, Read};
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::listener::ListenerHandle;
use crate::protocol::{self, Detection, ProtocolHandler};

/// Upper bound on one wait for write readiness; write signals are noisy so
/// the wait leans on the timeout rather than the notify.
const WRITE_WAIT: Duration = Duration::from_millis(1500);

/// Why a worker's turn on a connection ended early.
pub enum TurnError {
    /// No bytes arrived within the applicable window. Recovered locally:
    /// the connection stays open and is rescheduled by the next readiness
    /// event.
    TimedOut(&'static str),
    /// The peer closed the stream.
    EndOfStream,
    /// The connection's first bytes match no known protocol header.
    UnsupportedProtocol,
    /// A socket error.
    Io(io::Error),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::TimedOut(stage) => write!(f, "timed out reading {stage}"),
            TurnError::EndOfStream => write!(f, "end of stream"),
            TurnError::UnsupportedProtocol => write!(f, "unsupported protocol"),
            TurnError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl From<io::Error> for TurnError {
    fn from(e: io::Error) -> Self {
        TurnError::Io(e)
    }
}

struct Flags {
    /// A worker currently owns, or is queued to own, this connection.
    scheduled: bool,
    /// A readiness signal arrived while no worker was waiting for it.
    pending_notify: bool,
}

/// The scheduled / pending-notify handshake between the dispatch thread and
/// the worker pool. The scheduled flag guarantees at most one worker ever
/// owns a connection; the pending-notify flag records a readiness signal
/// that arrived between a worker's last read attempt and the moment it
/// begins waiting, so the signal is never lost.
pub struct ReadyState {
    flags: Mutex<Flags>,
    ready: Condvar,
}

impl ReadyState {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                scheduled: false,
                pending_notify: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Called by the dispatch thread when the channel becomes ready.
    /// Returns true when a worker already owns the connection, in which case
    /// the readiness is recorded and any waiting worker woken instead of
    /// dispatching again. Returns false for a fresh dispatch, marking the
    /// connection scheduled before any worker sees it.
    pub fn channel_ready(&self) -> bool {
        let mut flags = self.flags.lock().unwrap();
        if flags.scheduled {
            flags.pending_notify = true;
            self.ready.notify_one();
            true
        } else {
            flags.scheduled = true;
            false
        }
    }

    /// Called by the dispatch thread on write readiness. Wakes the owning
    /// worker if there is one and is otherwise ignored; a write signal never
    /// claims ownership, so a stale write edge cannot strand the connection
    /// in the scheduled state.
    pub fn write_ready(&self) {
        let mut flags = self.flags.lock().unwrap();
        if flags.scheduled {
            flags.pending_notify = true;
            self.ready.notify_one();
        }
    }

    /// Blocks the worker until the dispatch thread signals read readiness or
    /// the timeout passes. A notify that arrived before the wait began is
    /// consumed immediately instead of waiting.
    pub fn wait_readable(&self, max_wait: Duration) {
        let mut flags = self.flags.lock().unwrap();
        if !flags.pending_notify {
            let (guard, _) = self.ready.wait_timeout(flags, max_wait).unwrap();
            flags = guard;
        }
        flags.pending_notify = false;
    }

    /// Waits for write readiness. The wait always blocks for up to the
    /// timeout; writes are retried on wakeup either way, so a signal that
    /// arrived before the wait began costs only the timeout.
    pub fn wait_writable(&self, max_wait: Duration) {
        let flags = self.flags.lock().unwrap();
        let (mut flags, _) = self.ready.wait_timeout(flags, max_wait).unwrap();
        flags.pending_notify = false;
    }

    /// Ends a worker's turn. Returns true when a readiness signal arrived in
    /// the turn's tail: the worker then keeps ownership and must run another
    /// turn, because the readiness edge will not be delivered again.
    /// Otherwise the connection returns to idle, eligible for a fresh
    /// dispatch.
    pub fn end_turn(&self) -> bool {
        let mut flags = self.flags.lock().unwrap();
        if flags.pending_notify {
            flags.pending_notify = false;
            true
        } else {
            flags.scheduled = false;
            false
        }
    }

    /// Wakes a waiting worker without going through the dispatch thread.
    /// Used during teardown so a worker blocked in a long read wait notices
    /// promptly that its connection is gone.
    pub fn interrupt(&self) {
        let mut flags = self.flags.lock().unwrap();
        flags.pending_notify = true;
        self.ready.notify_one();
    }
}

impl Default for ReadyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents one connection for both the dispatch end and the service
/// thread end. The dispatch thread flips the proxy to ready and, unless a
/// worker is already processing the connection, schedules it on the worker
/// pool; otherwise it just notifies the processing worker that the channel
/// is ready for more I/O. The worker side reads and runs the protocol
/// handler, waiting on the proxy whenever the channel has nothing for it.
pub struct RequestProxy {
    token: Token,
    stream: Mutex<TcpStream>,
    state: ReadyState,
    listener: ListenerHandle,
    config: Arc<ServerConfig>,
    read_buffer: Mutex<Vec<u8>>,
    handler: Mutex<Option<Box<dyn ProtocolHandler>>>,
    closed: AtomicBool,
}

impl RequestProxy {
    pub(crate) fn new(
        token: Token,
        stream: TcpStream,
        listener: ListenerHandle,
        config: &Arc<ServerConfig>,
    ) -> Self {
        Self {
            token,
            stream: Mutex::new(stream),
            state: ReadyState::new(),
            listener,
            config: config.clone(),
            read_buffer: Mutex::new(vec![0u8; config.read_buffer_size]),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn stream(&self) -> &Mutex<TcpStream> {
        &self.stream
    }

    /// Tells the proxy that the channel is ready for I/O. Dispatch thread
    /// only. Returns true if a worker already owned the connection.
    pub fn channel_ready(&self) -> bool {
        self.state.channel_ready()
    }

    /// Tells the proxy the channel can take writes again. Dispatch thread
    /// only.
    pub fn write_ready(&self) {
        self.state.write_ready()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Marks the connection dead and wakes any waiting worker. Called by the
    /// owning listener when it tears the registration down.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.state.interrupt();
    }

    /// Executed on a worker pool thread. Runs request turns until the
    /// channel has nothing more to offer, then releases ownership. A turn
    /// that ends with a readiness signal already recorded runs again
    /// immediately, since the edge-triggered poll will not repeat it.
    pub fn run(&self) {
        loop {
            match self.process() {
                Ok(()) => {}
                Err(TurnError::TimedOut(stage)) => {
                    debug!("Connection {}: timed out reading {}", self.token.0, stage);
                }
                Err(TurnError::EndOfStream) => {
                    debug!("Connection {}: closed by peer", self.token.0);
                    self.close();
                }
                Err(TurnError::UnsupportedProtocol) => {
                    warn!(
                        "Connection {}: does not speak a supported protocol, closing",
                        self.token.0
                    );
                    self.close();
                }
                Err(TurnError::Io(e)) => {
                    warn!("Connection {}: {}, closing", self.token.0, e);
                    self.close();
                }
            }

            let run_again = self.state.end_turn();
            if self.is_closed() || !run_again {
                break;
            }
        }
    }

    /// One request turn: probe for data, identify the protocol if this
    /// connection does not have a handler yet, feed reads to the handler
    /// until the unit of work completes, then run the response phase.
    fn process(&self) -> Result<(), TurnError> {
        if self.is_closed() {
            return Ok(());
        }

        let mut buffer = self.read_buffer.lock().unwrap();

        // Step 1: just read some data. If nothing shows up shortly after
        // the readiness signal, return the thread to the pool.
        let mut count = self.read(
            &mut buffer,
            0,
            Duration::from_millis(self.config.probe_timeout_millis),
            "initial probe",
        )?;

        // Step 2: identify the protocol. A connection that already has a
        // handler attached is resuming mid-record after a timed-out turn,
        // so its bytes go straight to the handler.
        let mut handler_slot = self.handler.lock().unwrap();
        if handler_slot.is_none() {
            loop {
                match protocol::detect(&buffer[..count]) {
                    Ok(Detection::Match(index)) => {
                        *handler_slot = Some(protocol::create_handler(index, &self.config));
                        break;
                    }
                    Ok(Detection::Insufficient) => {
                        count += self.read(
                            &mut buffer,
                            count,
                            Duration::from_millis(self.config.header_timeout_millis),
                            "protocol header",
                        )?;
                    }
                    Err(_) => return Err(TurnError::UnsupportedProtocol),
                }
            }
        }
        let handler = match handler_slot.as_mut() {
            Some(handler) => handler,
            None => return Ok(()),
        };

        loop {
            // Step 3: keep reading until the handler reports the unit of
            // work complete.
            while handler.process_request(&buffer[..count])? {
                count = self.read(
                    &mut buffer,
                    0,
                    Duration::from_millis(self.config.read_timeout_millis),
                    "request body",
                )?;
            }
            count = 0;

            // Step 4: the response phase. A true return means the channel
            // could not take the whole response, so the channel switches to
            // write interest until the remainder drains.
            let needs_write = {
                let mut stream = self.stream.lock().unwrap();
                handler.process_response(&mut *stream)?
            };
            if needs_write {
                self.listener.reregister(self.token, Interest::WRITABLE);
                loop {
                    self.state.wait_writable(WRITE_WAIT);
                    let still_writing = {
                        let mut stream = self.stream.lock().unwrap();
                        handler.continue_response(&mut *stream)?
                    };
                    if !still_writing {
                        break;
                    }
                }
                self.listener.reregister(self.token, Interest::READABLE);
            }

            if !handler.request_pending() {
                // The poll does not refire for bytes that arrived before the
                // last read, so the socket must be drained before the turn
                // ends; anything already buffered starts the next unit now.
                match self.try_read(&mut buffer)? {
                    Some(drained) => count = drained,
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// A single non-blocking read with no wait. `Ok(None)` means the socket
    /// has nothing buffered.
    fn try_read(&self, buffer: &mut [u8]) -> Result<Option<usize>, TurnError> {
        loop {
            let attempt = {
                let mut stream = self.stream.lock().unwrap();
                stream.read(buffer)
            };
            match attempt {
                Ok(0) => return Err(TurnError::EndOfStream),
                Ok(count) => return Ok(Some(count)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TurnError::Io(e)),
            }
        }
    }

    /// Reads into `buffer[offset..]`, waiting on readiness signals until the
    /// deadline when the channel has nothing. The stream lock is held only
    /// across the non-blocking read itself, never across a wait.
    fn read(
        &self,
        buffer: &mut [u8],
        offset: usize,
        timeout: Duration,
        stage: &'static str,
    ) -> Result<usize, TurnError> {
        let deadline = Instant::now() + timeout;
        loop {
            let attempt = {
                let mut stream = self.stream.lock().unwrap();
                stream.read(&mut buffer[offset..])
            };
            match attempt {
                Ok(0) => return Err(TurnError::EndOfStream),
                Ok(count) => return Ok(count),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.is_closed() {
                        return Err(TurnError::EndOfStream);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TurnError::TimedOut(stage));
                    }
                    self.state.wait_readable(deadline - now);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TurnError::Io(e)),
            }
        }
    }

    /// Shuts the channel down immediately, so the peer observes the close
    /// without waiting on the listener thread, then requests deregistration
    /// through the owning listener's registration entry point.
    fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            {
                let stream = self.stream.lock().unwrap();
                let _ = stream.shutdown(Shutdown::Both);
            }
            self.listener.close(self.token);
        }
    }
}

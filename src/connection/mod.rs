//! The single physical connection shared by every session, transaction and query.
//!
//! # Overview
//!
//! A [`Connection`] owns one TCP stream and two background threads:
//!
//! - the *writer* drains a bounded outbound queue and serializes one frame at a time onto the
//!   stream; callers of [`Connection::send`] only ever block on that queue's backpressure.
//! - the *reader* decodes inbound frames and hands each to the [`ResponseRouter`], which pushes
//!   it into the [`Collector`] waiting on the frame's lane. The reader never runs caller code and
//!   never waits on a consumer.
//!
//! Every logical request gets a fresh lane. A request is registered with the router before its
//! first byte is written, so a fast server can never answer a lane nobody is listening on.
//!
//! # Failure
//!
//! Closing is idempotent and happens exactly once, whether triggered by the caller, by the reader
//! hitting EOF, or by a failed write. Every collector still pending at that moment receives
//! [`Error::ConnectionClosed`], and later requests fail with the same error before touching the
//! network.
mod collector;
mod router;

use std::{
    io::{BufReader, BufWriter},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, SyncSender},
    },
    thread,
    time::Duration,
};

use log::{debug, info, trace, warn};

pub use collector::Collector;
pub use router::{Owner, ResponseRouter};

use crate::{
    Error,
    options::ClientOptions,
    protocol::{ClientFrame, ProtocolTransport, Request, Response},
};

/// Identity of one logical request on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    id: u64,
    owner: Owner,
}

impl Lane {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct Shared {
    router: Arc<Mutex<ResponseRouter>>,
    outbound: Mutex<Option<SyncSender<ClientFrame>>>,
    stream: TcpStream,
    peer: SocketAddr,
    open: AtomicBool,
    next_lane: AtomicU64,
    request_timeout: Option<Duration>,
}

/// Cheaply cloneable handle to the shared connection. The connection closes
/// when [`Connection::close`] is called or the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn connect<A: ToSocketAddrs>(addr: A, options: &ClientOptions) -> Result<Self, Error> {
        options.validate()?;

        let stream = match options.connect_timeout {
            None => TcpStream::connect(addr).map_err(|e| Error::Connect(e.to_string()))?,
            Some(timeout) => connect_timeout(addr, timeout)?,
        };
        Self::from_stream(stream, options)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, options: &ClientOptions) -> Result<Self, Error> {
        options.validate()?;

        let connect_err = |e: std::io::Error| Error::Connect(e.to_string());
        stream.set_nodelay(true).map_err(connect_err)?;
        let peer = stream.peer_addr().map_err(connect_err)?;
        let reader = stream.try_clone().map_err(connect_err)?;
        let writer = stream.try_clone().map_err(connect_err)?;

        let (sender, receiver) = mpsc::sync_channel(options.outbound_capacity);
        let router = Arc::new(Mutex::new(ResponseRouter::new()));
        let shared = Arc::new(Shared {
            router: Arc::clone(&router),
            outbound: Mutex::new(Some(sender)),
            stream,
            peer,
            open: AtomicBool::new(true),
            next_lane: AtomicU64::new(1),
            request_timeout: options.request_timeout,
        });

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("sluice-writer".into())
            .spawn(move || write_loop(writer, receiver, weak))
            .map_err(connect_err)?;

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("sluice-reader".into())
            .spawn(move || read_loop(reader, router, weak))
            .map_err(connect_err)?;

        info!("connected to {peer}");
        Ok(Self { shared })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.router().pending()
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub(crate) fn open_lane(&self, owner: Owner) -> Lane {
        let id = self.shared.next_lane.fetch_add(1, Ordering::Relaxed);
        Lane { id, owner }
    }

    /// Queues a frame for the writer thread.
    pub(crate) fn send(&self, frame: ClientFrame) -> Result<(), Error> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }

        let sender = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::ConnectionClosed)?;
        sender.send(frame).map_err(|_| Error::ConnectionClosed)
    }

    /// Registers a collector for `lane` and then transmits `request` on it.
    pub(crate) fn dispatch(&self, lane: &Lane, request: Request) -> Result<Collector, Error> {
        let collector = self.shared.router().register(lane.id, lane.owner)?;

        if let Err(e) = self.send(ClientFrame {
            lane: lane.id,
            request,
        }) {
            self.shared.router().withdraw(lane.id);
            return Err(e);
        }
        Ok(collector)
    }

    /// Sends a request expecting exactly one response.
    pub(crate) fn unary(&self, owner: Owner, request: Request) -> Result<Response, Error> {
        let lane = self.open_lane(owner);
        let mut collector = self.dispatch(&lane, request)?;

        let response = match self.shared.request_timeout {
            Some(timeout) => collector.poll(timeout)?,
            None => collector.take()?,
        };
        match router::server_error(&response) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    /// Sends a request without waiting for its response. The reply is
    /// discarded when it arrives.
    pub(crate) fn post(&self, owner: Owner, request: Request) -> Result<(), Error> {
        let lane = self.open_lane(owner);
        self.dispatch(&lane, request).map(drop)
    }

    pub(crate) fn fail_transaction(&self, transaction: u64, err: Error) {
        let failed = self.shared.router().fail_transaction(transaction, err);
        if failed > 0 {
            debug!("failed {failed} pending request(s) of transaction {transaction}");
        }
    }

    pub(crate) fn fail_session(&self, session: u64, err: Error) {
        let failed = self.shared.router().fail_session(session, err);
        if failed > 0 {
            debug!("failed {failed} pending request(s) of session {session}");
        }
    }
}

impl Shared {
    fn router(&self) -> MutexGuard<'_, ResponseRouter> {
        self.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        let failed = self.router().close(Error::ConnectionClosed);
        info!(
            "closing connection to {}; {failed} pending request(s) failed",
            self.peer
        );

        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("socket shutdown: {e}");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpStream, Error> {
    let mut last = None;
    for addr in addr
        .to_socket_addrs()
        .map_err(|e| Error::Connect(e.to_string()))?
    {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("could not connect to {addr}: {e}");
                last = Some(e);
            }
        }
    }

    Err(Error::Connect(match last {
        Some(e) => e.to_string(),
        None => "address resolved to nothing".into(),
    }))
}

fn write_loop(stream: TcpStream, receiver: Receiver<ClientFrame>, shared: Weak<Shared>) {
    let mut transport = ProtocolTransport::new(BufWriter::new(stream));

    for frame in receiver.iter() {
        trace!("sending {frame:?}");
        if let Err(e) = transport.write_request(frame) {
            warn!("failed to write to connection: {e}");
            if let Some(shared) = shared.upgrade() {
                shared.close();
            }
            break;
        }
    }
    debug!("writer thread exiting");
}

fn read_loop(stream: TcpStream, router: Arc<Mutex<ResponseRouter>>, shared: Weak<Shared>) {
    let mut transport = ProtocolTransport::new(BufReader::new(stream));

    loop {
        match transport.read_response() {
            Ok(frame) => {
                trace!("received {frame:?}");
                router
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .route(frame);
            }
            Err(e) if e.is_eof() => {
                info!("connection closed by peer");
                break;
            }
            Err(e) => {
                let closing = shared.upgrade().is_none_or(|s| !s.open.load(Ordering::Acquire));
                if closing {
                    debug!("reader stopped: {e}");
                } else {
                    warn!("broken connection: {e}");
                }
                break;
            }
        }
    }

    match shared.upgrade() {
        Some(shared) => shared.close(),
        None => {
            router
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .close(Error::ConnectionClosed);
        }
    }
    debug!("reader thread exiting");
}

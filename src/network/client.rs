use crate::protocol::{Disposition, Service};
use crate::store::VarStore;
use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifecycle of an accepted client socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Reading and writing normally
    Connected,
    /// Close requested; flushing what is left in the write buffer
    Draining,
    /// Will be deregistered and dropped at the end of the sweep
    PendingClose,
}

/// Everything a client needs from the event loop while it is serviced.
pub(crate) struct Sweep<'a> {
    pub registry: &'a Registry,
    pub service: &'a mut dyn Service,
    pub store: &'a mut VarStore,
    pub read_buf: &'a mut [u8],
    pub close_after_service: bool,
    pub drain_timeout: Duration,
}

/// One accepted connection plus its readiness flags.
///
/// mio reports readiness edge-triggered. `readable` stays set until a read
/// returns `WouldBlock`, which lets the loop do one bounded read per client
/// per iteration without losing data left in the socket.
///
/// Reads pause while more than `write_high_water` bytes wait to be written,
/// so a peer that sends without reading cannot grow the buffer unbounded.
pub struct Client {
    token: Token,
    stream: TcpStream,
    addr: SocketAddr,
    state: ClientState,

    readable: bool,
    writable: bool,
    write_interest: bool,

    write_buffer: BytesMut,
    write_high_water: usize,
    draining_since: Option<Instant>,
}

impl Client {
    pub fn new(
        token: Token,
        stream: TcpStream,
        addr: SocketAddr,
        write_high_water: usize,
    ) -> Self {
        Self {
            token,
            stream,
            addr,
            state: ClientState::Connected,
            // data may have arrived before registration; the first read settles it
            readable: true,
            writable: false,
            write_interest: false,
            write_buffer: BytesMut::new(),
            write_high_water,
            draining_since: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// True while a read should be attempted this iteration
    pub fn wants_read(&self) -> bool {
        self.readable
            && self.state == ClientState::Connected
            && self.write_buffer.len() < self.write_high_water
    }

    /// Bytes still waiting to be written
    pub fn pending_writes(&self) -> Option<&[u8]> {
        if self.write_buffer.is_empty() {
            None
        } else {
            Some(&self.write_buffer[..])
        }
    }

    pub(crate) fn register(&mut self, registry: &Registry) -> std::io::Result<()> {
        registry.register(&mut self.stream, self.token, Interest::READABLE)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            debug!("Error deregistering client {}: {}", self.addr, e);
        }
    }

    pub(crate) fn mark_ready(&mut self, readable: bool, writable: bool) {
        self.readable |= readable;
        self.writable |= writable;
    }

    /// Flush pending output, then perform at most one bounded read.
    pub(crate) fn service(&mut self, sweep: &mut Sweep<'_>) {
        if self.writable {
            self.writable = false;
            self.flush(sweep.registry);
        }

        if let Some(since) = self.draining_since {
            if self.state == ClientState::Draining && since.elapsed() >= sweep.drain_timeout {
                debug!(
                    "Dropping {} unflushed bytes for {}",
                    self.write_buffer.len(),
                    self.addr
                );
                self.state = ClientState::PendingClose;
                return;
            }
        }

        if self.wants_read() {
            self.read_once(sweep);
        }
    }

    fn read_once(&mut self, sweep: &mut Sweep<'_>) {
        match self.stream.read(sweep.read_buf) {
            Ok(0) => {
                debug!("Client {} closed the connection", self.addr);
                self.state = ClientState::PendingClose;
            }
            Ok(n) => {
                let input = &sweep.read_buf[..n];
                let disposition = sweep
                    .service
                    .on_read(input, sweep.store, &mut self.write_buffer);

                if disposition == Disposition::Close || sweep.close_after_service {
                    self.state = ClientState::Draining;
                    self.draining_since = Some(Instant::now());
                }

                self.flush(sweep.registry);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => self.readable = false,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                if e.kind() != ErrorKind::ConnectionReset {
                    warn!("Error reading from {}: {}", self.addr, e);
                }
                self.state = ClientState::PendingClose;
            }
        }
    }

    fn flush(&mut self, registry: &Registry) {
        while !self.write_buffer.is_empty() {
            match self.stream.write(&self.write_buffer[..]) {
                Ok(0) => {
                    self.state = ClientState::PendingClose;
                    return;
                }
                Ok(n) => self.write_buffer.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.set_write_interest(registry, true);
                    return;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Error writing to {}: {}", self.addr, e);
                    self.state = ClientState::PendingClose;
                    return;
                }
            }
        }

        self.set_write_interest(registry, false);

        if self.state == ClientState::Draining {
            self.state = ClientState::PendingClose;
        }
    }

    fn set_write_interest(&mut self, registry: &Registry, enabled: bool) {
        if self.write_interest == enabled {
            return;
        }

        let interest = if enabled {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        match registry.reregister(&mut self.stream, self.token, interest) {
            Ok(()) => self.write_interest = enabled,
            Err(e) => {
                warn!("Error reregistering client {}: {}", self.addr, e);
                self.state = ClientState::PendingClose;
            }
        }
    }
}

/// Ordered, capacity-bounded set of live clients.
///
/// Removal keeps the survivors contiguous and in their original order, so
/// clients are always serviced in the order they were accepted.
pub struct ClientSet {
    clients: Vec<Client>,
    capacity: usize,
}

impl ClientSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    /// Append a client, handing it back when the set is full
    pub fn insert(&mut self, client: Client) -> Result<(), Client> {
        if self.is_full() {
            return Err(client);
        }
        self.clients.push(client);
        Ok(())
    }

    pub fn get(&self, token: Token) -> Option<&Client> {
        self.clients.iter().find(|c| c.token == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.iter_mut()
    }

    /// Record readiness reported by the poller for `token`
    pub(crate) fn mark_ready(&mut self, token: Token, readable: bool, writable: bool) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.token == token) {
            client.mark_ready(readable, writable);
        }
    }

    /// True if any client still has unread input
    pub fn any_wants_read(&self) -> bool {
        self.clients.iter().any(Client::wants_read)
    }

    /// Drop every client in `PendingClose`, returning how many were removed.
    pub(crate) fn compact(&mut self, registry: &Registry) -> usize {
        let before = self.clients.len();

        self.clients.retain_mut(|client| {
            if client.state != ClientState::PendingClose {
                return true;
            }
            client.deregister(registry);
            debug!("Closed connection from {}", client.addr);
            false
        });

        before - self.clients.len()
    }

    /// Deregister and drop every client
    pub(crate) fn close_all(&mut self, registry: &Registry) -> usize {
        let count = self.clients.len();
        for mut client in self.clients.drain(..) {
            client.deregister(registry);
        }
        count
    }
}

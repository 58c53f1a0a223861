use crate::network::{bind_listener, Client, ClientSet, Sweep};
use crate::protocol::{Echo, Service};
use crate::store::VarStore;
use crate::{config::Config, error::Error, error::Result};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;

/// Cloneable handle that stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the event loop to stop and wake it if it is blocked in poll.
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        self.requested.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!("Failed to wake event loop: {}", e);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Single-threaded variable server.
///
/// One poll loop owns the listener, every client socket, the variable store
/// and the service that interprets client input. Nothing here is shared, so
/// nothing needs locking; only the [`ShutdownHandle`] crosses threads.
pub struct Server {
    config: Config,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    clients: ClientSet,
    store: VarStore,
    service: Box<dyn Service>,
    shutdown: ShutdownHandle,
    read_buf: Vec<u8>,
    next_token: usize,
}

impl Server {
    /// Bind the listener and prepare an echoing server
    pub fn new(config: Config) -> Result<Self> {
        Self::with_service(config, Echo)
    }

    /// Bind the listener, define the configured variables and register
    /// everything with the poller.
    pub fn with_service<S: Service + 'static>(config: Config, service: S) -> Result<Self> {
        config.validate()?;

        let std_listener = bind_listener(config.listen_addr(), config.backlog)?;
        let local_addr = std_listener.local_addr()?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(|e| Error::socket_init("poll", e))?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|e| Error::socket_init("register", e))?;
        let waker =
            Waker::new(poll.registry(), WAKER).map_err(|e| Error::socket_init("waker", e))?;

        let mut store = VarStore::new();
        for var in &config.variables {
            store.define(&var.name, &var.type_name)?;
        }

        info!(
            "Server listening on {} (backlog {}, {} variables)",
            local_addr,
            config.backlog,
            store.len()
        );

        Ok(Self {
            clients: ClientSet::with_capacity(config.max_clients),
            read_buf: vec![0u8; config.read_buffer_size],
            events: Events::with_capacity(1024),
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            service: Box::new(service),
            next_token: FIRST_CLIENT,
            config,
            poll,
            listener,
            local_addr,
            store,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn store(&self) -> &VarStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VarStore {
        &mut self.store
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Run the event loop until shutdown is requested.
    ///
    /// A fatal poll or accept error ends the loop and is returned; sockets
    /// stay open until [`Server::teardown`].
    pub fn run(&mut self) -> Result<()> {
        info!("Server event loop started");

        while !self.shutdown.is_shutdown() {
            match self.poll_once() {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Event loop stopped: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("Event loop iteration failed: {}", e),
            }
        }

        info!("Server event loop stopped");
        Ok(())
    }

    /// One poll, accept and service sweep.
    pub fn poll_once(&mut self) -> Result<()> {
        let timeout = if self.clients.any_wants_read() {
            Duration::ZERO
        } else {
            self.config.poll_timeout()
        };

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                return Err(Error::FatalIo {
                    op: "poll",
                    source: e,
                })
            }
        }

        let mut accept_ready = false;
        for event in self.events.iter() {
            match event.token() {
                LISTENER => accept_ready = true,
                WAKER => {}
                token => self.clients.mark_ready(
                    token,
                    event.is_readable() || event.is_read_closed() || event.is_error(),
                    event.is_writable(),
                ),
            }
        }

        if accept_ready {
            self.accept_pending()?;
        }

        self.service_clients();

        let closed = self.clients.compact(self.poll.registry());
        if closed > 0 {
            debug!(
                "Removed {} closed connections, {} remain",
                closed,
                self.clients.len()
            );
        }

        Ok(())
    }

    /// Accept until the queue is empty
    fn accept_pending(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted
                            | ErrorKind::ConnectionAborted
                            | ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!("Transient accept error: {}", e);
                }
                Err(e) => {
                    return Err(Error::FatalIo {
                        op: "accept",
                        source: e,
                    })
                }
            }
        }
    }

    /// Register an accepted stream and add it to the client set.
    ///
    /// A stream that cannot be admitted is dropped, which closes it.
    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.clients.is_full() {
            warn!(
                "Refusing connection from {}: {} clients connected",
                addr,
                self.clients.len()
            );
            return;
        }

        if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
            debug!("Could not set nodelay for {}: {}", addr, e);
        }

        let token = Token(self.next_token);
        self.next_token += 1;

        let mut client = Client::new(token, stream, addr, self.config.write_high_water);
        if let Err(e) = client.register(self.poll.registry()) {
            warn!("Failed to register connection from {}: {}", addr, e);
            return;
        }

        match self.clients.insert(client) {
            Ok(()) => debug!("New connection from {} as {:?}", addr, token),
            Err(mut client) => {
                warn!("Refusing connection from {}: client set is full", addr);
                client.deregister(self.poll.registry());
            }
        }
    }

    fn service_clients(&mut self) {
        let mut sweep = Sweep {
            registry: self.poll.registry(),
            service: &mut *self.service,
            store: &mut self.store,
            read_buf: &mut self.read_buf,
            close_after_service: self.config.close_after_service,
            drain_timeout: self.config.drain_timeout(),
        };

        for client in self.clients.iter_mut() {
            client.service(&mut sweep);
        }
    }

    /// Close every client socket and the listener.
    ///
    /// Returns the number of client connections that were closed.
    pub fn teardown(mut self) -> usize {
        let closed = self.clients.close_all(self.poll.registry());
        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            debug!("Error deregistering listener: {}", e);
        }

        info!("Server torn down, closed {} client connections", closed);
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as StdTcpStream;

    fn local_config() -> Config {
        Config {
            bind_addr: "127.0.0.1".parse().unwrap(),
            port: 0,
            poll_timeout_ms: 20,
            close_after_service: false,
            ..Default::default()
        }
    }

    #[test]
    fn failed_registration_drops_only_that_stream() {
        let mut server = Server::new(local_config()).unwrap();

        // a second registration of the same socket is refused by the poller
        let side = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let _peer = StdTcpStream::connect(side.local_addr().unwrap()).unwrap();
        let (accepted, addr) = side.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        let mut stream = TcpStream::from_std(accepted);
        server
            .poll
            .registry()
            .register(&mut stream, Token(999), Interest::READABLE)
            .unwrap();

        server.admit(stream, addr);
        assert_eq!(server.client_count(), 0);

        // the loop keeps accepting afterwards
        let _client = StdTcpStream::connect(server.local_addr()).unwrap();
        for _ in 0..50 {
            server.poll_once().unwrap();
            if server.client_count() == 1 {
                break;
            }
        }
        assert_eq!(server.client_count(), 1);
        assert_eq!(server.teardown(), 1);
    }

    #[test]
    fn full_set_refuses_without_registering() {
        let mut server = Server::new(Config {
            max_clients: 1,
            ..local_config()
        })
        .unwrap();
        let _first = StdTcpStream::connect(server.local_addr()).unwrap();
        let _second = StdTcpStream::connect(server.local_addr()).unwrap();

        for _ in 0..50 {
            server.poll_once().unwrap();
        }
        assert_eq!(server.client_count(), 1);
        assert_eq!(server.next_token, FIRST_CLIENT + 1);
    }
}

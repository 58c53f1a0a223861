//! End-to-end tests for the event loop over real loopback sockets.
//!
//! Some tests run the server on a background thread with `run()`, others
//! drive `poll_once()` from the test thread to observe the client set.

use bytes::BytesMut;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use varsvr::config::VariableConfig;
use varsvr::protocol::Disposition;
use varsvr::{Config, Server, ShutdownHandle, VarStore};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// HELPERS
// ============================================================================

fn local_config() -> Config {
    Config {
        bind_addr: "127.0.0.1".parse().unwrap(),
        port: 0,
        poll_timeout_ms: 50,
        ..Default::default()
    }
}

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: JoinHandle<(varsvr::Result<()>, usize)>,
}

impl Running {
    fn stop(self) -> usize {
        self.shutdown.shutdown();
        let (result, closed) = self.thread.join().expect("server thread panicked");
        result.expect("event loop failed");
        closed
    }
}

fn spawn(mut server: Server) -> Running {
    let addr = server.local_addr();
    let shutdown = server.shutdown_handle();
    let thread = thread::spawn(move || {
        let result = server.run();
        let closed = server.teardown();
        (result, closed)
    });

    Running {
        addr,
        shutdown,
        thread,
    }
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    stream.set_write_timeout(Some(IO_TIMEOUT)).unwrap();
    stream
}

/// Run the loop on this thread until `done` holds or the deadline passes.
fn pump(server: &mut Server, mut done: impl FnMut(&Server) -> bool) -> bool {
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        server.poll_once().expect("poll_once");
        if done(server) {
            return true;
        }
    }
    false
}

// ============================================================================
// CLOSE-AFTER-SERVICE (DEFAULT) MODE
// ============================================================================

#[test]
fn echoes_and_then_closes() {
    let running = spawn(Server::new(local_config()).unwrap());

    let mut client = connect(running.addr);
    client.write_all(b"ping").unwrap();

    // read_to_end only returns once the server has closed the connection
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, b"ping");

    assert_eq!(running.stop(), 0);
}

#[test]
fn second_client_is_served_while_first_is_mid_exchange() {
    let config = Config {
        close_after_service: false,
        ..local_config()
    };
    let running = spawn(Server::new(config).unwrap());

    // first client sends half a message and leaves the echo unread
    let mut first = connect(running.addr);
    first.write_all(b"pi").unwrap();

    let mut second = connect(running.addr);
    second.write_all(b"pong").unwrap();
    let mut reply = [0u8; 4];
    second.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"pong");
    drop(second);

    first.write_all(b"ng").unwrap();
    let mut reply = [0u8; 4];
    first.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"ping");

    // the first client is still connected at teardown
    assert!(running.stop() >= 1);
}

#[test]
fn close_after_service_handles_clients_in_turn() {
    let running = spawn(Server::new(local_config()).unwrap());

    let mut first = connect(running.addr);
    let mut second = connect(running.addr);

    second.write_all(b"pong").unwrap();
    let mut reply = Vec::new();
    second.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, b"pong");

    first.write_all(b"ping").unwrap();
    let mut reply = Vec::new();
    first.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, b"ping");

    running.stop();
}

#[test]
fn many_sequential_clients() {
    let running = spawn(Server::new(local_config()).unwrap());

    for i in 0..20 {
        let mut client = connect(running.addr);
        let message = format!("message {}", i);
        client.write_all(message.as_bytes()).unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, message);
    }

    running.stop();
}

// ============================================================================
// PERSISTENT MODE
// ============================================================================

#[test]
fn persistent_connections_serve_many_exchanges() {
    let config = Config {
        close_after_service: false,
        ..local_config()
    };
    let running = spawn(Server::new(config).unwrap());

    let mut client = connect(running.addr);
    for word in ["one", "two", "six"] {
        client.write_all(word.as_bytes()).unwrap();
        let mut reply = [0u8; 3];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, word.as_bytes());
    }

    // still connected when the server is torn down
    assert_eq!(running.stop(), 1);
}

#[test]
fn large_payload_survives_bounded_reads_and_partial_writes() {
    let config = Config {
        close_after_service: false,
        read_buffer_size: 64,
        ..local_config()
    };
    let running = spawn(Server::new(config).unwrap());

    let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
    let mut reader = connect(running.addr);
    let mut writer = reader.try_clone().unwrap();

    let to_send = payload.clone();
    let sender = thread::spawn(move || writer.write_all(&to_send).unwrap());

    let mut echoed = vec![0u8; payload.len()];
    reader.read_exact(&mut echoed).unwrap();
    sender.join().unwrap();
    assert!(echoed == payload, "echoed bytes differ from payload");

    running.stop();
}

// ============================================================================
// CLIENT SET MAINTENANCE
// ============================================================================

#[test]
fn peer_hangup_removes_the_client() {
    let mut server = Server::new(Config {
        close_after_service: false,
        ..local_config()
    })
    .unwrap();

    let client = connect(server.local_addr());
    assert!(pump(&mut server, |s| s.client_count() == 1));

    drop(client);
    assert!(pump(&mut server, |s| s.client_count() == 0));
    assert_eq!(server.teardown(), 0);
}

#[test]
fn clients_beyond_capacity_are_refused() {
    let mut server = Server::new(Config {
        close_after_service: false,
        max_clients: 1,
        ..local_config()
    })
    .unwrap();

    let _kept = connect(server.local_addr());
    assert!(pump(&mut server, |s| s.client_count() == 1));

    let mut refused = connect(server.local_addr());
    for _ in 0..5 {
        server.poll_once().unwrap();
    }
    assert_eq!(server.client_count(), 1);

    let mut buf = [0u8; 8];
    match refused.read(&mut buf) {
        Ok(0) => {}
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
        other => panic!("expected the refused connection to be closed, got {:?}", other),
    }

    assert_eq!(server.teardown(), 1);
}

#[test]
fn teardown_closes_connected_clients() {
    let mut server = Server::new(Config {
        close_after_service: false,
        ..local_config()
    })
    .unwrap();

    let mut clients: Vec<_> = (0..3).map(|_| connect(server.local_addr())).collect();
    assert!(pump(&mut server, |s| s.client_count() == 3));
    assert_eq!(server.teardown(), 3);

    for client in &mut clients {
        let mut buf = [0u8; 1];
        match client.read(&mut buf) {
            Ok(0) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
            other => panic!("expected a closed connection, got {:?}", other),
        }
    }
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[test]
fn shutdown_interrupts_a_long_poll() {
    let config = Config {
        poll_timeout_ms: 60_000,
        ..local_config()
    };
    let running = spawn(Server::new(config).unwrap());

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    running.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

// ============================================================================
// STORE-BACKED SERVICES
// ============================================================================

fn lookup_service(input: &[u8], store: &mut VarStore, output: &mut BytesMut) -> Disposition {
    let name = String::from_utf8_lossy(input);
    match store.format(name.trim()) {
        Ok(rendered) => output.extend_from_slice(rendered.as_bytes()),
        Err(e) => output.extend_from_slice(format!("error: {}", e).as_bytes()),
    }
    Disposition::Close
}

#[test]
fn service_reads_configured_variables() {
    let config = Config {
        close_after_service: false,
        variables: vec![
            VariableConfig {
                name: "answer".to_string(),
                type_name: "int32".to_string(),
            },
            VariableConfig {
                name: "site".to_string(),
                type_name: "text".to_string(),
            },
        ],
        ..local_config()
    };

    let mut server = Server::with_service(config, lookup_service).unwrap();
    let names: Vec<_> = server.store().names().collect();
    assert_eq!(names, vec!["answer", "site"]);
    {
        let store = server.store_mut();
        let answer = store.lookup("answer").unwrap();
        store.get_mut(answer).unwrap().set_numeric(42).unwrap();
        let site = store.lookup("site").unwrap();
        store.get_mut(site).unwrap().set_text("pump house").unwrap();
    }
    let running = spawn(server);

    let ask = |question: &str| {
        let mut client = connect(running.addr);
        client.write_all(question.as_bytes()).unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        reply
    };

    // the service asks for the close even though the server is persistent
    assert_eq!(ask("answer\n"), "42");
    assert_eq!(ask("site"), "pump house");
    assert_eq!(ask("missing"), "error: Unknown variable 'missing'");

    running.stop();
}

#[test]
fn duplicate_configured_variables_fail_startup() {
    let var = VariableConfig {
        name: "x".to_string(),
        type_name: "bit".to_string(),
    };
    let config = Config {
        variables: vec![var.clone(), var],
        ..local_config()
    };

    assert!(matches!(
        Server::new(config),
        Err(varsvr::Error::DuplicateKey(name)) if name == "x"
    ));
}

#[test]
fn invalid_config_is_rejected_before_binding() {
    let config = Config {
        max_clients: 0,
        ..local_config()
    };
    assert!(matches!(Server::new(config), Err(varsvr::Error::Config(_))));
}

//! The readiness-based event loop (spec §4.6): one listening socket plus one
//! client socket per accepted connection, all multiplexed through a single
//! `mio::Poll`. Grounded in the teacher's `examples/server.rs` accept loop
//! and `client::reactor::Reactor::run`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::conn::ConnState;
use crate::error::KvError;
use crate::map::Map;

const LISTENER: Token = Token(0);

/// How long a single `poll` call may block for. Bounds shutdown latency;
/// nothing currently consumes the timeout itself (no keepalives/timers are
/// in scope), but a bounded wait keeps room for a future signal handler to
/// interrupt the loop promptly.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

struct Connection {
    stream: TcpStream,
    state: ConnState,
}

/// The single-threaded server: one listener, many client connections, one
/// shared [`Map`].
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    map: Map,
    next_token: usize,
}

impl std::fmt::Debug for Server {
    /// `Poll` has no useful `Debug` representation of its own, so this
    /// reports the observable shape of the server instead: where it's
    /// listening and how many connections are live.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr())
            .field("connections", &self.connections.len())
            .field("map_size", &self.map.size())
            .finish()
    }
}

impl Server {
    /// Binds `addr` with `SO_REUSEPORT`/`SO_REUSEADDR` and registers it with
    /// a fresh readiness poller.
    pub fn bind(addr: SocketAddr) -> Result<Self, KvError> {
        let domain = socket2::Domain::for_address(addr);
        let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
            .map_err(|source| KvError::Bind { addr, source })?;

        socket
            .set_reuse_address(true)
            .map_err(|source| KvError::Bind { addr, source })?;
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|source| KvError::Bind { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| KvError::Bind { addr, source })?;
        socket
            .bind(&addr.into())
            .map_err(|source| KvError::Bind { addr, source })?;
        socket
            .listen(1024)
            .map_err(|source| KvError::Bind { addr, source })?;

        let std_listener: std::net::TcpListener = socket.into();
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(KvError::PollInit)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Server {
            poll,
            listener,
            connections: HashMap::new(),
            map: Map::new(),
            next_token: 1,
        })
    }

    /// Runs the event loop forever. Returns only on a fatal I/O error from
    /// the poller itself.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.poll.poll(&mut events, Some(POLL_TIMEOUT))?;

            for event in &events {
                if event.token() == LISTENER {
                    self.accept_ready();
                } else {
                    self.service(event.token());
                }
            }

            self.reap_closed();
        }
    }

    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        log::warn!("failed to register connection from {peer}: {e}");
                        continue;
                    }

                    log::debug!("accepted connection from {peer} as {token:?}");
                    self.connections.insert(
                        token,
                        Connection {
                            stream,
                            state: ConnState::new(),
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept error: {e}");
                    break;
                }
            }
        }
    }

    fn service(&mut self, token: Token) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.state.step(&mut conn.stream, &mut self.map);
        }
    }

    fn reap_closed(&mut self) {
        let done: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.state.is_done())
            .map(|(token, _)| *token)
            .collect();

        for token in done {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = self.poll.registry().deregister(&mut conn.stream);
                log::debug!("torn down connection {token:?}");
            }
        }
    }

    /// Number of live connections. Exposed for tests and debug logging.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Current map size. Exposed for debug logging.
    pub fn map_size(&self) -> usize {
        self.map.size()
    }

    /// The address the listener is actually bound to. Useful when binding
    /// to port 0 and letting the OS choose, e.g. in tests.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

//! The dispatch loop.
//!
//! Socket I/O happens on two helper threads (UDP receiver, TCP acceptor).
//! They hand complete command lines and requests over channels; this loop
//! waits on those channels and the internal event queue together and is
//! the only place the command engine runs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, TryRecvError};
use log::{error, info, warn};

use tvcontrold_core::{CommandEngine, DaemonConfig, Message, MessageReceiver, Outcome};

use crate::connection::{self, ConnectionLimits, ConnectionRequest};
use crate::datagram;
use crate::error::ServerError;
use crate::request::Request;
use crate::response::{PendingResponse, Status};

/// Datagrams waiting for the loop beyond this are dropped.
const DATAGRAM_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: IpAddr,
    /// UDP and TCP port; 0 lets the OS pick one (for both).
    pub port: u16,
    pub client_timeout: Option<Duration>,
    pub max_request_len: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 1423,
            client_timeout: Some(Duration::from_secs(30)),
            max_request_len: 4096,
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            bind: config.bind_address(),
            port: config.port(),
            client_timeout: config.client_timeout(),
            max_request_len: config.max_request_len(),
        }
    }
}

pub struct EventServer {
    engine: CommandEngine,
    events: MessageReceiver<Message>,
    datagrams: Receiver<String>,
    requests: Receiver<ConnectionRequest>,
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl EventServer {
    /// Bind both sockets and start their threads.
    ///
    /// `events` is the receiving end of the queue device clients (and the
    /// signal handler) push command lines into.
    pub fn bind(
        options: &ServerOptions,
        engine: CommandEngine,
        events: MessageReceiver<Message>,
    ) -> Result<Self, ServerError> {
        let requested = SocketAddr::new(options.bind, options.port);
        let listener = TcpListener::bind(requested).map_err(|source| ServerError::Bind {
            addr: requested,
            source,
        })?;
        let tcp_addr = listener.local_addr()?;
        // same port number for UDP, also when the OS picked it
        let udp_addr = SocketAddr::new(options.bind, tcp_addr.port());
        let socket = UdpSocket::bind(udp_addr).map_err(|source| ServerError::Bind {
            addr: udp_addr,
            source,
        })?;
        let udp_addr = socket.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let (datagram_tx, datagrams) = crossbeam_channel::bounded(DATAGRAM_QUEUE);
        let (request_tx, requests) = crossbeam_channel::bounded(1);
        let limits = ConnectionLimits {
            client_timeout: options.client_timeout.filter(|t| !t.is_zero()),
            max_request_len: options.max_request_len,
        };

        let mut server = Self {
            engine,
            events,
            datagrams,
            requests,
            udp_addr,
            tcp_addr,
            shutdown: shutdown.clone(),
            threads: Vec::new(),
        };
        server
            .threads
            .push(datagram::spawn_receiver(socket, datagram_tx, shutdown.clone())?);
        server
            .threads
            .push(connection::spawn_acceptor(listener, request_tx, shutdown, limits)?);

        info!(target: "server", "listening on udp {} and tcp {}", udp_addr, tcp_addr);
        Ok(server)
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CommandEngine {
        &mut self.engine
    }

    /// Run the dispatch loop until `exit` is executed.
    ///
    /// Each round waits for any source, then takes at most one item from
    /// each in priority order: datagrams, TCP requests, internal events.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(target: "server", "dispatch loop started");
        loop {
            self.wait();
            if self.poll_datagram()? == Outcome::Exit
                || self.poll_request()? == Outcome::Exit
                || self.poll_event()? == Outcome::Exit
            {
                break;
            }
        }
        info!(target: "server", "dispatch loop finished");
        Ok(())
    }

    fn wait(&self) {
        let mut select = Select::new();
        select.recv(&self.datagrams);
        select.recv(&self.requests);
        select.recv(self.events.receiver());
        select.ready();
    }

    fn poll_datagram(&mut self) -> Result<Outcome, ServerError> {
        match self.datagrams.try_recv() {
            Ok(line) => {
                info!(target: "server", "Command: \"{}\"", line);
                Ok(self.dispatch(&line, "command"))
            }
            Err(TryRecvError::Empty) => Ok(Outcome::Continue),
            Err(TryRecvError::Disconnected) => Err(ServerError::SourceClosed("datagram receiver")),
        }
    }

    fn poll_request(&mut self) -> Result<Outcome, ServerError> {
        let ConnectionRequest { request, reply } = match self.requests.try_recv() {
            Ok(pending) => pending,
            Err(TryRecvError::Empty) => return Ok(Outcome::Continue),
            Err(TryRecvError::Disconnected) => {
                return Err(ServerError::SourceClosed("connection acceptor"))
            }
        };
        let (response, outcome) = match request {
            Request::Command(line) => {
                info!(target: "server", "Request: \"{}\"", line);
                let (status, outcome) = match self.engine.execute(&line) {
                    Ok(outcome) => (Status::Ok, outcome),
                    Err(e) => {
                        error!(target: "server", "Error in request: \"{}\": {}", line, e);
                        (Status::InternalError, Outcome::Continue)
                    }
                };
                let body = self.engine.environment_as_csv();
                (PendingResponse::csv(status, body), outcome)
            }
            Request::Ping => (
                PendingResponse::csv(Status::Ok, self.engine.environment_as_csv()),
                Outcome::Continue,
            ),
            Request::Other(_) => (PendingResponse::empty(), Outcome::Continue),
        };
        if reply.send(response).is_err() {
            warn!(target: "server", "client left before the response was ready");
        }
        Ok(outcome)
    }

    fn poll_event(&mut self) -> Result<Outcome, ServerError> {
        match self.events.try_recv() {
            Ok(Some(msg)) => {
                let line = msg.text().into_owned();
                info!(target: "server", "Event: \"{}\"", line);
                Ok(self.dispatch(&line, "event"))
            }
            Ok(None) => Ok(Outcome::Continue),
            Err(_) => Err(ServerError::SourceClosed("event queue")),
        }
    }

    fn dispatch(&mut self, line: &str, source: &str) -> Outcome {
        match self.engine.execute(line) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(target: "server", "Error in {}: \"{}\": {}", source, line, e);
                Outcome::Continue
            }
        }
    }

    /// Stop the socket threads, release every command and clear the
    /// environment.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!(target: "server", "socket thread panicked");
            }
        }
        self.engine.teardown();
    }
}

impl Drop for EventServer {
    fn drop(&mut self) {
        self.stop();
    }
}

//! TCP acceptor serving one client connection at a time.
//!
//! Further clients wait in the listen backlog until the current connection
//! closes. Requests that need the engine are handed to the dispatch loop;
//! the connection thread then writes whatever response the loop arms.

use std::io::{self, Read};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::request::{ParseOutcome, Request, RequestBuffer};
use crate::response::PendingResponse;
use crate::POLL_INTERVAL;

/// A parsed request waiting for the dispatch loop.
pub(crate) struct ConnectionRequest {
    pub request: Request,
    pub reply: Sender<PendingResponse>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionLimits {
    pub client_timeout: Option<Duration>,
    pub max_request_len: usize,
}

struct Acceptor {
    listener: TcpListener,
    requests: Sender<ConnectionRequest>,
    shutdown: Arc<AtomicBool>,
    limits: ConnectionLimits,
}

pub(crate) fn spawn_acceptor(
    listener: TcpListener,
    requests: Sender<ConnectionRequest>,
    shutdown: Arc<AtomicBool>,
    limits: ConnectionLimits,
) -> io::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    let acceptor = Acceptor {
        listener,
        requests,
        shutdown,
        limits,
    };
    thread::Builder::new()
        .name("server-tcp".into())
        .spawn(move || acceptor.run())
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Acceptor {
    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn run(self) {
        while !self.stopping() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!(target: "server", "client connected from {}", addr);
                    match self.serve(stream) {
                        Ok(()) => info!(target: "server", "client {} closed", addr),
                        Err(e) => warn!(target: "server", "client {} dropped: {}", addr, e),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    error!(target: "server", "accept error: {}", e);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
        debug!(target: "server", "acceptor finished");
    }

    fn serve(&self, mut stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        stream.set_write_timeout(self.limits.client_timeout)?;

        let Some(mut response) = self.read_request(&mut stream)? else {
            return Ok(());
        };
        debug!(target: "server", "responding {}", response.status().code());
        if !response.write_to(&mut stream)? {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "client stopped reading"));
        }
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    /// Read until a request is complete and produce its response. `None`
    /// when the client left, went idle or the server is stopping.
    fn read_request(&self, stream: &mut TcpStream) -> io::Result<Option<PendingResponse>> {
        let mut request = RequestBuffer::new(self.limits.max_request_len);
        let mut buf = [0u8; 512];
        let mut last_activity = Instant::now();
        loop {
            if self.stopping() {
                return Ok(None);
            }
            match stream.read(&mut buf) {
                Ok(0) => {
                    if !request.is_empty() {
                        debug!(target: "server", "client closed with incomplete request");
                    }
                    return Ok(None);
                }
                Ok(n) => {
                    last_activity = Instant::now();
                    match request.push(&buf[..n]) {
                        ParseOutcome::Incomplete => {}
                        ParseOutcome::Complete(req) => return self.respond(req),
                        ParseOutcome::Malformed(reason) => {
                            warn!(target: "server", "bad request: {}", reason);
                            return Ok(Some(PendingResponse::bad_request(&reason)));
                        }
                    }
                }
                Err(ref e) if is_timeout(e) => {
                    if let Some(limit) = self.limits.client_timeout {
                        if last_activity.elapsed() >= limit {
                            info!(target: "server", "client idle for {:?}, closing", limit);
                            return Ok(None);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn respond(&self, request: Request) -> io::Result<Option<PendingResponse>> {
        if let Request::Other(path) = &request {
            debug!(target: "server", "nothing at \"{}\"", path);
            return Ok(Some(PendingResponse::empty()));
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let mut pending = ConnectionRequest {
            request,
            reply: reply_tx,
        };
        loop {
            match self.requests.send_timeout(pending, POLL_INTERVAL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) if !self.stopping() => pending = back,
                Err(_) => return Ok(None),
            }
        }
        loop {
            match reply_rx.recv_timeout(POLL_INTERVAL) {
                Ok(response) => return Ok(Some(response)),
                Err(RecvTimeoutError::Timeout) if !self.stopping() => {}
                Err(_) => return Ok(None),
            }
        }
    }
}

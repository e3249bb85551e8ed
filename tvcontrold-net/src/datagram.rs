//! UDP command receiver: one datagram is one command line.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, warn};

use crate::POLL_INTERVAL;

/// Longer datagrams are dropped.
pub(crate) const MAX_DATAGRAM: usize = 256;

pub(crate) fn spawn_receiver(
    socket: UdpSocket,
    lines: Sender<String>,
    shutdown: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    thread::Builder::new()
        .name("server-udp".into())
        .spawn(move || receive_loop(socket, lines, shutdown))
}

fn receive_loop(socket: UdpSocket, lines: Sender<String>, shutdown: Arc<AtomicBool>) {
    // one spare byte tells an oversized datagram from one that fits exactly
    let mut buf = [0u8; MAX_DATAGRAM + 1];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) if n > MAX_DATAGRAM => {
                warn!(target: "server", "datagram from {} exceeds {} bytes, dropped", src, MAX_DATAGRAM);
            }
            Ok((n, src)) => {
                let line = datagram_line(&buf[..n]);
                debug!(target: "server", "datagram from {}: {} bytes", src, n);
                match lines.try_send(line) {
                    Ok(()) => {}
                    Err(TrySendError::Full(line)) => {
                        warn!(target: "server", "dispatch loop busy, dropping \"{}\"", line)
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error!(target: "server", "datagram reception error: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    debug!(target: "server", "datagram receiver finished");
}

/// Datagram payload as a command line, line terminators trimmed.
pub(crate) fn datagram_line(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .to_string()
}

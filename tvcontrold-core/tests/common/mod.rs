#![allow(dead_code)]
//! Test harness utilities for tvcontrold-core integration tests.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tvcontrold_core::channel::{self, MessageReceiver};
use tvcontrold_core::{DeviceSettings, Message, MessageSender};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Settings with a short reconnect delay so tests do not wait seconds.
pub fn fast_settings() -> DeviceSettings {
    DeviceSettings {
        default_port: 23,
        reconnect_delay: Duration::from_millis(50),
    }
}

pub fn event_channel() -> (MessageSender<Message>, MessageReceiver<Message>) {
    channel::message_channel()
}

/// Next event text, or panic after [`TIMEOUT`].
pub fn next_event(rx: &MessageReceiver<Message>) -> String {
    match rx.recv_timeout(TIMEOUT) {
        Ok(Some(msg)) => msg.text().into_owned(),
        other => panic!("no event within {:?}: {:?}", TIMEOUT, other),
    }
}

/// A loopback listener standing in for an AV receiver.
pub struct FakeReceiver {
    listener: TcpListener,
}

impl FakeReceiver {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        Self { listener }
    }

    pub fn address(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    /// Wait for the device client to connect.
    pub fn accept(&self) -> Peer {
        let start = Instant::now();
        while start.elapsed() < TIMEOUT {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false).unwrap();
                    stream
                        .set_read_timeout(Some(Duration::from_millis(50)))
                        .unwrap();
                    return Peer {
                        stream,
                        pending: Vec::new(),
                    };
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("accept failed: {}", e),
            }
        }
        panic!("device client did not connect within {:?}", TIMEOUT);
    }
}

/// Accepted connection from the device client.
pub struct Peer {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl Peer {
    /// Read until `wanted` arrives and consume everything up to its end.
    pub fn expect(&mut self, wanted: &str) {
        let start = Instant::now();
        let mut buf = [0u8; 256];
        loop {
            if let Some(pos) = find(&self.pending, wanted.as_bytes()) {
                self.pending.drain(..pos + wanted.len());
                return;
            }
            if start.elapsed() > TIMEOUT {
                panic!(
                    "expected {:?}, received {:?}",
                    wanted,
                    String::from_utf8_lossy(&self.pending)
                );
            }
            match self.stream.read(&mut buf) {
                Ok(0) => panic!("client closed while expecting {:?}", wanted),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => panic!("read failed: {}", e),
            }
        }
    }

    /// Send a status line as the receiver would.
    pub fn report(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).unwrap();
        self.stream.write_all(b"\r\n").unwrap();
        self.stream.flush().unwrap();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

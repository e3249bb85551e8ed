#![allow(dead_code)]
//! Test harness utilities for tvcontrold-net integration tests.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tvcontrold_core::channel;
use tvcontrold_core::{CommandEngine, DeviceSettings, Message, MessageSender};
use tvcontrold_net::{EventServer, ServerOptions};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn loopback_options() -> ServerOptions {
    ServerOptions {
        bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        client_timeout: Some(Duration::from_secs(30)),
        max_request_len: 4096,
    }
}

/// An event server running its dispatch loop on a background thread.
pub struct RunningServer {
    pub udp: SocketAddr,
    pub tcp: SocketAddr,
    pub events: MessageSender<Message>,
    handle: Option<JoinHandle<EventServer>>,
}

pub fn start() -> RunningServer {
    start_with(loopback_options(), |_| {})
}

/// Start a server after running `setup` against its engine.
pub fn start_with(options: ServerOptions, setup: impl FnOnce(&mut CommandEngine)) -> RunningServer {
    let (events, events_rx) = channel::message_channel();
    let settings = DeviceSettings {
        default_port: 23,
        reconnect_delay: Duration::from_millis(50),
    };
    let mut engine = CommandEngine::new(events.clone(), settings);
    setup(&mut engine);

    let mut server = EventServer::bind(&options, engine, events_rx).unwrap();
    let udp = server.udp_addr();
    let tcp = server.tcp_addr();
    let handle = thread::spawn(move || {
        server.run().unwrap();
        server
    });
    RunningServer {
        udp,
        tcp,
        events,
        handle: Some(handle),
    }
}

impl RunningServer {
    pub fn send_udp(&self, line: &str) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.send_to(line.as_bytes(), self.udp).unwrap();
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.tcp).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream
    }

    /// Send a raw request and read the whole response.
    pub fn http(&self, request: &str) -> String {
        let mut stream = self.connect();
        stream.write_all(request.as_bytes()).unwrap();
        read_response(&mut stream)
    }

    pub fn get(&self, path: &str) -> String {
        self.http(&format!("GET {} HTTP/1.0\r\n\r\n", path))
    }

    /// Ping until the environment dump contains `line`.
    pub fn wait_for_variable(&self, line: &str) -> String {
        let start = Instant::now();
        loop {
            let response = self.get("/ping");
            if body(&response).lines().any(|l| l == line) {
                return response;
            }
            if start.elapsed() > TIMEOUT {
                panic!("{:?} never appeared, last response {:?}", line, response);
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the dispatch loop to end on its own.
    pub fn join(mut self) -> EventServer {
        let handle = self.handle.take().unwrap();
        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() > TIMEOUT {
                panic!("dispatch loop did not exit");
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().unwrap()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // the finished loop still owns the queue until joined
            if let Ok(exit) = Message::try_from("exit") {
                let _ = self.events.try_send(exit);
            }
            let _ = handle.join();
        }
    }
}

pub fn read_response(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

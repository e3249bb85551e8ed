mod common;

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use common::{body, loopback_options, read_response, start, start_with};
use tvcontrold_net::ServerOptions;

#[test]
fn command_request_returns_environment() {
    let server = start();
    let response = server.http("GET /cmd/set%20A%201 HTTP/1.0\r\n\r\n");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "{}", response);
    assert!(response.contains("Content-Type: text/csv\r\n"));
    assert_eq!(body(&response), "A,1\n");
}

#[test]
fn failed_command_reports_server_error() {
    let server = start();
    server.get("/cmd/set%20A%201");
    let response = server.get("/cmd/frobnicate");
    assert!(response.starts_with("HTTP/1.0 500 "), "{}", response);
    assert_eq!(body(&response), "A,1\n");
}

#[test]
fn values_are_csv_escaped() {
    let server = start();
    let response = server.get("/cmd/set%20Q%20say%20%22hi%22");
    assert_eq!(body(&response), "Q,\"say \"\"hi\"\"\"\n");
}

#[test]
fn ping_does_not_execute() {
    let server = start();
    let response = server.get("/ping");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert_eq!(body(&response), "");
}

#[test]
fn datagram_commands_are_executed() {
    let server = start();
    server.send_udp("set B 2\n");
    server.wait_for_variable("B,2");
}

#[test]
fn oversized_datagram_is_dropped() {
    let server = start();
    let long = format!("set BIG {}", "x".repeat(300));
    server.send_udp(&long);
    let value = "y".repeat(256 - "set FIT ".len());
    server.send_udp(&format!("set FIT {}", value));
    let env = server.wait_for_variable(&format!("FIT,{}", value));
    assert!(!env.contains("BIG"), "{}", env);
}

#[test]
fn internal_events_are_executed() {
    let server = start();
    server.events.send_text("set C 3").unwrap();
    server.wait_for_variable("C,3");
}

#[test]
fn device_events_drive_scripts() {
    let server = start_with(loopback_options(), |engine| {
        for line in ["init script on_avr_mute", "\tset MUTED 1"] {
            engine.execute(line).unwrap();
        }
    });
    server.events.send_text("on_avr_mute").unwrap();
    server.wait_for_variable("MUTED,1");
}

#[test]
fn incomplete_request_gets_no_response() {
    let server = start();
    let mut stream = server.connect();
    stream.write_all(b"GET /cmd/set%20D%204 HTTP/1.0\r\n").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Err(e) => assert!(matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)),
        Ok(n) => panic!("unexpected {} byte response", n),
    }

    stream.set_read_timeout(Some(common::TIMEOUT)).unwrap();
    stream.write_all(b"\r\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(body(&response), "D,4\n");
}

#[test]
fn other_methods_are_bad_requests() {
    let server = start();
    let response = server.http("POST /cmd/exit HTTP/1.0\r\n\r\n");
    assert!(response.starts_with("HTTP/1.0 400 Bad Request\r\n"), "{}", response);
    assert!(server.is_running());
}

#[test]
fn unknown_paths_get_empty_ok() {
    let server = start();
    let response = server.get("/index.html");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.contains("Content-Length: 0\r\n"));
    assert_eq!(body(&response), "");
}

#[test]
fn one_connection_at_a_time() {
    let server = start();
    let first = server.connect();
    thread::sleep(Duration::from_millis(100));

    let mut second = server.connect();
    second.write_all(b"GET /ping HTTP/1.0\r\n\r\n").unwrap();
    second
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut buf = [0u8; 64];
    assert!(second.read(&mut buf).is_err());

    drop(first);
    second.set_read_timeout(Some(common::TIMEOUT)).unwrap();
    let response = read_response(&mut second);
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
}

#[test]
fn idle_client_is_dropped() {
    let options = ServerOptions {
        client_timeout: Some(Duration::from_millis(200)),
        ..loopback_options()
    };
    let server = start_with(options, |_| {});
    let mut stream = server.connect();
    let mut buf = [0u8; 16];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);

    // the slot is free again
    let response = server.get("/ping");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
}

#[test]
fn datagram_exit_stops_the_loop() {
    let server = start();
    server.send_udp("exit");
    let stopped = server.join();
    stopped.shutdown();
}

#[test]
fn request_exit_replies_then_stops() {
    let server = start();
    let response = server.get("/cmd/exit");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    let stopped = server.join();
    assert!(stopped.engine().environment().is_empty());
}

#[test]
fn shutdown_releases_engine_state() {
    let server = start();
    server.get("/cmd/set%20E%205");
    server.send_udp("exit");
    let mut stopped = server.join();
    assert_eq!(stopped.engine().environment().get("E"), Some("5"));
    stopped.engine_mut().execute("set F 6").unwrap();
    stopped.shutdown();
}

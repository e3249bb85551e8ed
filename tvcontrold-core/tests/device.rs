mod common;

use std::thread;
use std::time::Duration;

use common::{event_channel, fast_settings, next_event, FakeReceiver};
use tvcontrold_core::channel::DEFAULT_CAPACITY;
use tvcontrold_core::device::spawn_pioneer;
use tvcontrold_core::{CommandError, DeviceError};

const QUERY: &str = "?P\r\n?V\r\n?M\r\n?MC\r\n";

#[test]
fn refresh_is_sent_on_connect() {
    let avr = FakeReceiver::bind();
    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    client.release();
}

#[test]
fn volume_steps_from_reported_level() {
    let avr = FakeReceiver::bind();
    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    peer.report("VOL100");
    thread::sleep(Duration::from_millis(200));

    client.execute("volumeup").unwrap();
    peer.expect("101VL\r\n");
    client.execute("input dvd").unwrap();
    peer.expect("04FN\r\n");
    client.release();
}

#[test]
fn status_reports_become_events() {
    let avr = FakeReceiver::bind();
    let (tx, rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    peer.report("MUT1");
    peer.report("MUT0");
    assert_eq!(next_event(&rx), "on_avr_mute");
    peer.report("FN04");
    assert_eq!(next_event(&rx), "on_avr_input_dvd");
    client.release();
}

#[test]
fn power_report_triggers_refresh() {
    let avr = FakeReceiver::bind();
    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    client.execute("poweron").unwrap();
    peer.expect("PO\r\n");
    peer.report("PWR0");
    peer.expect(QUERY);
    client.release();
}

#[test]
fn reconnects_after_peer_closes() {
    let avr = FakeReceiver::bind();
    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    drop(peer);

    let mut peer = avr.accept();
    peer.expect(QUERY);
    client.execute("standby").unwrap();
    peer.expect("PF\r\n");
    client.release();
}

#[test]
fn unknown_device_command_is_rejected() {
    let avr = FakeReceiver::bind();
    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    assert!(matches!(
        client.execute("listenmode disco"),
        Err(CommandError::InvalidArguments { .. })
    ));
    assert!(matches!(
        client.execute("mcacc 7"),
        Err(CommandError::InvalidArguments { .. })
    ));
    client.release();
}

#[test]
fn commands_queue_while_disconnected() {
    let avr = FakeReceiver::bind();
    let address = avr.address();
    drop(avr);

    let (tx, _rx) = event_channel();
    let client = spawn_pioneer("avr", &address, &fast_settings(), tx).unwrap();
    let mut result = Ok(());
    for _ in 0..100 {
        result = client.execute("volumeup");
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(
        result,
        Err(CommandError::Device(DeviceError::QueueFull(_)))
    ));
    client.release();
}

#[test]
fn events_wait_for_a_full_queue_instead_of_dropping() {
    let avr = FakeReceiver::bind();
    let (tx, rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    let reports = DEFAULT_CAPACITY + 16;
    for _ in 0..reports {
        peer.report("FN04");
    }
    thread::sleep(Duration::from_millis(300));

    for _ in 0..reports {
        assert_eq!(next_event(&rx), "on_avr_input_dvd");
    }
    assert_eq!(rx.try_recv().unwrap(), None);
    client.release();
}

#[test]
fn release_does_not_hang_on_a_full_event_queue() {
    let avr = FakeReceiver::bind();
    let (tx, rx) = event_channel();
    let client = spawn_pioneer("avr", &avr.address(), &fast_settings(), tx).unwrap();

    let mut peer = avr.accept();
    peer.expect(QUERY);
    for _ in 0..DEFAULT_CAPACITY + 8 {
        peer.report("FN04");
    }
    thread::sleep(Duration::from_millis(300));

    client.release();
    assert_eq!(rx.receiver().len(), DEFAULT_CAPACITY);
}

use serial_bridge_lib::serial::mock::MockBackend;
use serial_bridge_lib::serial::{Config, DataBits, ErrorKind, Parity, Port, PurgeSelector, StopBits};
use serial_bridge_lib::PortList;

#[test]
fn mock_scenario_end_to_end() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();

    let mut ports = PortList::new();
    ports.refresh(&backend).unwrap();
    assert_eq!(ports.get(0).unwrap(), "MOCK0");

    let port = Port::open(&backend, "MOCK0").unwrap();
    let cfg = Config::new(9600, DataBits::Eight, Parity::None, StopBits::One);
    port.apply_config(&cfg).unwrap();
    port.write_bytes(&[0x41, 0x42, 0x43]).unwrap();
    assert_eq!(peer.receive(), vec![0x41, 0x42, 0x43]);
    port.close().unwrap();
    assert!(!peer.is_open());
}

#[test]
fn every_config_round_trips() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let port = Port::open(&backend, "MOCK0").unwrap();

    for data_bits in [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight] {
        for parity in [Parity::None, Parity::Odd, Parity::Even, Parity::Mark, Parity::Space] {
            for stop_bits in [StopBits::One, StopBits::OneAndHalf, StopBits::Two] {
                let cfg = Config::new(115200, data_bits, parity, stop_bits);
                port.apply_config(&cfg).unwrap();
                assert_eq!(port.config().unwrap(), cfg);
            }
        }
    }
}

#[test]
fn closed_handle_reports_invalid_handle() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let port = Port::open(&backend, "MOCK0").unwrap();
    port.close().unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(port.read_bytes(&mut buf).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(port.write_bytes(b"late").unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(port.apply_config(&Config::default()).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(port.close().unwrap_err().kind(), ErrorKind::InvalidHandle);
}

#[test]
fn second_open_of_held_port_fails_without_side_effects() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let first = Port::open(&backend, "MOCK0").unwrap();

    let err = Port::open(&backend, "MOCK0").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert!(peer.is_open());

    first.write_bytes(b"ok").unwrap();
    assert_eq!(peer.receive(), b"ok");
}

#[test]
fn purged_output_never_reaches_the_wire() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let port = Port::open(&backend, "MOCK0").unwrap();

    port.write_bytes(b"discard me").unwrap();
    port.purge(PurgeSelector::Output).unwrap();
    port.write_bytes(b"keep").unwrap();
    assert_eq!(peer.receive(), b"keep");
}

#[test]
fn purge_input_leaves_output_alone() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let port = Port::open(&backend, "MOCK0").unwrap();

    peer.send(b"stale");
    port.write_bytes(b"out").unwrap();
    port.purge(PurgeSelector::Input).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(port.read_bytes(&mut buf).unwrap(), 0);
    assert_eq!(peer.receive(), b"out");
}

#[test]
fn purge_both_clears_both_directions() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let port = Port::open(&backend, "MOCK0").unwrap();

    peer.send(b"in");
    port.write_bytes(b"out").unwrap();
    port.purge(PurgeSelector::Both).unwrap();
    assert_eq!(peer.pending_input(), 0);
    assert_eq!(peer.pending_output(), 0);
}

#[test]
fn flush_transmits_queued_output() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let port = Port::open(&backend, "MOCK0").unwrap();

    port.write_bytes(b"queued").unwrap();
    assert_eq!(peer.pending_output(), 6);
    port.flush_output().unwrap();
    assert_eq!(peer.pending_output(), 0);
    assert_eq!(peer.receive_transmitted(), b"queued");
}

#[test]
fn unplugged_device_surfaces_io_errors() {
    let backend = MockBackend::with_ports(&["MOCK0"]);
    let port = Port::open(&backend, "MOCK0").unwrap();
    backend.remove_port("MOCK0");

    let mut buf = [0u8; 8];
    assert_eq!(port.read_bytes(&mut buf).unwrap_err().kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(port.write_bytes(b"x").unwrap_err().kind(), ErrorKind::DeviceUnavailable);
    port.close().unwrap();
}

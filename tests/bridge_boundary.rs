use std::sync::Arc;
use std::time::Duration;

use serial_bridge_lib::bridge::{clear_error, current_error, current_error_kind};
use serial_bridge_lib::serial::mock::MockBackend;
use serial_bridge_lib::{Bridge, ErrorKind, Settings, NULL_TOKEN};

fn bridge_with(ports: &[&str]) -> (Arc<MockBackend>, Bridge) {
    let backend = Arc::new(MockBackend::with_ports(ports));
    let bridge = Bridge::new(backend.clone(), Settings::default()).unwrap();
    (backend, bridge)
}

#[test]
fn scenario_through_tokens() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();

    let token = bridge.open("MOCK0");
    assert_ne!(token, NULL_TOKEN);
    assert!(bridge.config(token, 9600, 8, 0, 1));
    let data = [0x41, 0x42, 0x43];
    assert!(bridge.write(token, &data, 0, 3));
    assert_eq!(peer.receive(), data.to_vec());
    assert!(bridge.close(token));
    assert_eq!(bridge.open_handles(), 0);
}

#[test]
fn invalid_windows_never_reach_the_device() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let token = bridge.open("MOCK0");
    peer.send(b"untouched");

    let mut buf = [0u8; 16];
    for (offset, len) in [(-1, 4), (0, -1), (10, 7), (16, 1), (i32::MAX, 1)] {
        clear_error();
        assert_eq!(bridge.read(token, &mut buf, offset, len), -1, "read {} {}", offset, len);
        assert_eq!(current_error_kind(), Some(ErrorKind::InvalidParameter));

        clear_error();
        assert!(!bridge.write(token, &buf, offset, len), "write {} {}", offset, len);
        assert_eq!(current_error_kind(), Some(ErrorKind::InvalidParameter));
    }

    assert_eq!(peer.pending_input(), 9);
    assert!(peer.write_sizes().is_empty());
    clear_error();
}

#[test]
fn reads_land_inside_the_window() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let token = bridge.open("MOCK0");
    peer.send(b"abcdef");

    let mut buf = [0xFFu8; 10];
    assert_eq!(bridge.read(token, &mut buf, 4, 3), 3);
    assert_eq!(&buf, &[0xFF, 0xFF, 0xFF, 0xFF, b'a', b'b', b'c', 0xFF, 0xFF, 0xFF]);

    assert!(bridge.write(token, b"0123456789", 2, 5));
    assert_eq!(peer.receive(), b"23456");
}

#[test]
fn read_timeout_of_zero_returns_zero_not_error() {
    let (_backend, bridge) = bridge_with(&["MOCK0"]);
    let token = bridge.open("MOCK0");
    assert!(bridge.set_read_timeout(token, 0));

    clear_error();
    let mut buf = [0u8; 4];
    assert_eq!(bridge.read(token, &mut buf, 0, 4), 0);
    assert_eq!(current_error(), 0);
}

#[test]
fn closed_token_is_invalid_for_everything() {
    let (_backend, bridge) = bridge_with(&["MOCK0"]);
    let token = bridge.open("MOCK0");
    assert!(bridge.close(token));

    let mut buf = [0u8; 4];
    clear_error();
    assert_eq!(bridge.read(token, &mut buf, 0, 4), -1);
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

    clear_error();
    assert!(!bridge.write(token, &buf, 0, 4));
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

    clear_error();
    assert!(!bridge.config(token, 9600, 8, 0, 1));
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

    clear_error();
    assert!(!bridge.close(token));
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

    clear_error();
    assert!(!bridge.flush(token));
    assert!(!bridge.purge(token, 0));
    assert_eq!(bridge.read_config(token), None);
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));
    clear_error();
}

#[test]
fn stale_token_does_not_reach_reopened_port() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();

    let stale = bridge.open("MOCK0");
    assert!(bridge.close(stale));
    let fresh = bridge.open("MOCK0");
    assert_ne!(stale, fresh);

    clear_error();
    assert!(!bridge.write(stale, b"x", 0, 1));
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));
    assert!(peer.write_sizes().is_empty());
    assert!(bridge.write(fresh, b"y", 0, 1));
    clear_error();
}

#[test]
fn failed_close_still_invalidates_token() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let token = bridge.open("MOCK0");

    peer.fail_next_close();
    clear_error();
    assert!(!bridge.close(token));
    assert_eq!(current_error_kind(), Some(ErrorKind::DeviceUnavailable));
    assert_eq!(bridge.open_handles(), 0);

    clear_error();
    assert!(!bridge.close(token));
    assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));
    clear_error();
}

#[test]
fn success_does_not_clear_previous_error() {
    let (_backend, bridge) = bridge_with(&["MOCK0"]);
    clear_error();
    assert_eq!(bridge.open("MISSING"), NULL_TOKEN);
    let code = current_error();
    assert_ne!(code, 0);

    let token = bridge.open("MOCK0");
    assert_ne!(token, NULL_TOKEN);
    assert_eq!(current_error(), code);
    clear_error();
    assert_eq!(current_error(), 0);
}

#[test]
fn concurrent_ports_keep_errors_apart() {
    let (backend, bridge) = bridge_with(&["MOCK0", "MOCK1"]);
    let bridge = Arc::new(bridge);
    let good = bridge.open("MOCK0");
    let doomed = bridge.open("MOCK1");
    backend.remove_port("MOCK1");

    let failing = {
        let bridge = bridge.clone();
        std::thread::spawn(move || {
            clear_error();
            let mut buf = [0u8; 4];
            for _ in 0..50 {
                assert_eq!(bridge.read(doomed, &mut buf, 0, 4), -1);
            }
            current_error_kind()
        })
    };
    let working = {
        let bridge = bridge.clone();
        std::thread::spawn(move || {
            clear_error();
            for _ in 0..50 {
                assert!(bridge.write(good, b"ping", 0, 4));
            }
            current_error()
        })
    };

    assert_eq!(failing.join().unwrap(), Some(ErrorKind::DeviceUnavailable));
    assert_eq!(working.join().unwrap(), 0);
    assert_eq!(backend.peer("MOCK0").unwrap().receive().len(), 200);
}

#[test]
fn calls_on_one_handle_are_serialised() {
    let (backend, bridge) = bridge_with(&["MOCK0"]);
    let peer = backend.peer("MOCK0").unwrap();
    let bridge = Arc::new(bridge);
    let token = bridge.open("MOCK0");

    let writers: Vec<_> = (0..4u8)
        .map(|id| {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                let block = [id; 3000];
                for _ in 0..10 {
                    assert!(bridge.write(token, &block, 0, block.len() as i32));
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    // each 3000-byte write arrives contiguous, never interleaved with another thread's
    let wire = peer.receive();
    assert_eq!(wire.len(), 4 * 10 * 3000);
    for block in wire.chunks(3000) {
        assert!(block.iter().all(|&b| b == block[0]));
    }
}

#[test]
fn blocked_read_does_not_block_other_handles() {
    let (backend, bridge) = bridge_with(&["SLOW", "FAST"]);
    let bridge = Arc::new(bridge);
    let slow = bridge.open("SLOW");
    let fast = bridge.open("FAST");
    assert!(bridge.set_read_timeout(slow, 300));

    let reader = {
        let bridge = bridge.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            bridge.read(slow, &mut buf, 0, 4)
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    let start = std::time::Instant::now();
    assert!(bridge.write(fast, b"go", 0, 2));
    assert!(start.elapsed() < Duration::from_millis(200));
    assert_eq!(backend.peer("FAST").unwrap().receive(), b"go");
    assert_eq!(reader.join().unwrap(), 0);
}

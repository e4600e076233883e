use std::io::{Read, Write};
use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::time::Duration;

use liso::relay::{PipeRelay, RelayStatus};
use liso::transport::Transport;

/// Connected (mio server side, std client side) pair for driving a relay
/// without a poll loop.
fn socket_pair() -> (mio::net::TcpStream, StdTcpStream) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = StdTcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let (server, _) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (mio::net::TcpStream::from_std(server), client)
}

#[test]
fn test_file_relay_streams_byte_exact() {
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
    let mut src = tempfile::tempfile().unwrap();
    src.write_all(&payload).unwrap();
    src.flush().unwrap();
    use std::io::{Seek, SeekFrom};
    src.seek(SeekFrom::Start(0)).unwrap();

    let (mut server, mut client) = socket_pair();
    let mut transport = Transport::Plain;
    let mut relay = PipeRelay::from_file(src);
    assert!(relay.source_token().is_none());

    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match relay.step(&mut server, &mut transport) {
            RelayStatus::Done => break,
            RelayStatus::Fatal => panic!("relay failed"),
            RelayStatus::Continue => {}
            RelayStatus::Blocked => {
                // Socket buffer is full; make room on the client side.
                let n = client.read(&mut chunk).unwrap();
                assert!(n > 0);
                received.extend_from_slice(&chunk[..n]);
            }
        }
    }

    drop(relay);
    drop(server);
    client.read_to_end(&mut received).unwrap();
    assert_eq!(received, payload);
}

#[test]
fn test_empty_file_relay_finishes_immediately() {
    let src = tempfile::tempfile().unwrap();
    let (mut server, _client) = socket_pair();
    let mut transport = Transport::Plain;
    let mut relay = PipeRelay::from_file(src);

    assert_eq!(relay.step(&mut server, &mut transport), RelayStatus::Done);
    assert!(!relay.has_staged());
}

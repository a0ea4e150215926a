use std::{
    net::{Ipv4Addr, SocketAddrV4},
    thread::spawn,
    time::{Duration, Instant},
};

use socklib::{
    net::inet::{
        Address, DatagramSocket, InetSocket, Reuse, StreamClient, StreamOptions, StreamServer,
        StreamSocket,
    },
    ServerState, Socket, Timeout, WriteMode,
};

#[test]
fn test_datagram_origin_matches_client() {
    _ = pretty_env_logger::try_init();

    let server = DatagramSocket::bind(&Address::any(9999)).unwrap();

    let client = DatagramSocket::new().unwrap();

    client
        .write_message(b"x", Some(&Address::new(libc::INADDR_LOOPBACK, 9999)))
        .unwrap();

    let mut buf = [0u8; 8];
    let mut origin = Address::default();

    assert!(server.wait_data(Timeout::Millis(1000)).unwrap() > 0);
    assert_eq!(server.read_message(&mut buf, Some(&mut origin)).unwrap(), 1);
    assert_eq!(buf[0], b'x');

    let local = client.local_address().unwrap();

    assert_eq!(origin.port(), local.port());
    assert_eq!(origin.ip(), Ipv4Addr::LOCALHOST);
}

#[test]
fn test_tcp_echo() {
    _ = pretty_env_logger::try_init();

    let mut server =
        StreamServer::new(&Address::new(libc::INADDR_LOOPBACK, 0), Reuse::Reuse).unwrap();

    server.listen().unwrap();

    assert_eq!(server.state(), ServerState::Listening);

    let addr = server.local_address().unwrap();

    let echo = spawn(move || {
        let conn = server
            .get_connection(Timeout::Millis(2000), None)
            .unwrap()
            .unwrap();

        let mut buf = [0u8; 11];

        assert_eq!(conn.read(&mut buf, Timeout::Forever).unwrap(), 11);

        conn.write(&buf, WriteMode::WaitQueued).unwrap();
    });

    let client = StreamClient::new().unwrap();

    client.set_nodelay(true).unwrap();
    client.connect(&addr).unwrap();

    let conn: StreamSocket = client.into();

    assert_eq!(SocketAddrV4::from(conn.peer_address().unwrap()).port(), addr.port());

    conn.write(b"hello world", WriteMode::WaitQueued).unwrap();

    let mut buf = [0u8; 11];

    assert_eq!(conn.read(&mut buf, Timeout::Millis(2000)).unwrap(), 11);
    assert_eq!(&buf, b"hello world");

    echo.join().unwrap();
}

#[test]
fn test_get_connection_respects_deadline() {
    let mut server =
        StreamServer::new(&Address::new(libc::INADDR_LOOPBACK, 0), Reuse::DontReuse).unwrap();

    server.listen().unwrap();

    let start = Instant::now();

    assert!(server
        .get_connection(Timeout::Millis(150), None)
        .unwrap()
        .is_none());

    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(140));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn test_read_after_peer_close() {
    let mut server =
        StreamServer::new(&Address::new(libc::INADDR_LOOPBACK, 0), Reuse::DontReuse).unwrap();

    server.listen().unwrap();

    let addr = server.local_address().unwrap();

    let client = StreamSocket::connect(&addr).unwrap();

    let conn = server
        .get_connection(Timeout::Millis(1000), None)
        .unwrap()
        .unwrap();

    client.write(b"bye", WriteMode::WaitQueued).unwrap();

    drop(client);

    let mut buf = [0u8; 64];

    let start = Instant::now();

    assert_eq!(conn.read(&mut buf, Timeout::Millis(3000)).unwrap(), 3);
    assert!(start.elapsed() < Duration::from_secs(2));
}

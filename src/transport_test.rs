use std::net::TcpListener;

use super::*;

fn local_endpoint(port: u16) -> Endpoint {
    Endpoint {
        host: "127.0.0.1".to_owned(),
        port,
        secure: false,
    }
}

#[test]
fn plain_connect_reaches_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut stream = connect(&local_endpoint(port), &Timeouts::default()).unwrap();
    assert!(matches!(stream, MaybeTlsStream::Plain(_)));

    let (mut peer, _) = listener.accept().unwrap();
    stream.write_all(b"ping").unwrap();
    stream.flush().unwrap();
    let mut buf = [0_u8; 4];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");
}

#[test]
fn refused_connect_is_a_connect_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = connect(&local_endpoint(port), &Timeouts::default())
        .err()
        .expect("nothing listening");
    assert!(matches!(err, Error::Connect { ref addr, .. } if addr == &format!("127.0.0.1:{port}")));
}

#[test]
fn read_timeout_is_applied_to_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let timeouts = Timeouts {
        read: Some(Duration::from_millis(50)),
        ..Timeouts::default()
    };

    let mut stream = connect(&local_endpoint(port), &timeouts).unwrap();
    let (_peer, _) = listener.accept().unwrap();

    let mut buf = [0_u8; 1];
    let err = stream.read(&mut buf).unwrap_err();
    assert!(matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    ));
}

#[test]
fn shutdown_closes_plain_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut stream = connect(&local_endpoint(port), &Timeouts::default()).unwrap();
    let (mut peer, _) = listener.accept().unwrap();
    stream.shutdown().unwrap();

    let mut buf = Vec::new();
    assert_eq!(peer.read_to_end(&mut buf).unwrap(), 0);
}

#[test]
fn tls_config_builds_with_bundled_roots() {
    let config = tls_config().unwrap();
    assert!(config.alpn_protocols.is_empty());
}
